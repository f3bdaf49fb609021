//!
//!	Core library entry point.
//!
extern crate bincode;
extern crate byteorder;
extern crate flate2;
extern crate libc;
extern crate serde;

pub mod comm;
pub mod config;
pub mod coordinator;
pub mod hitlist;
pub mod mapfile;
pub mod output;
pub mod partition;
pub mod scan;
pub mod select;

use std::fs;

/// Check if file exists by reading its metadata
pub fn file_exists(filename: &str) -> bool {
    match fs::metadata(filename) {
        Ok(meta) => meta.is_file(),
        Err(_) => false,
    }
}

//!
//!	Output file naming and byte-accounted append streams.
//!
use std::fs;
use std::fs::File;
use std::io::BufWriter;
use std::io::Result;
use std::io::Write;

/// Per-worker intermediate filename: the shared output name with the rank
/// appended. A single-worker pool writes the plain name.
pub fn rank_filename(output: &str, rank: usize, pool: usize) -> String {
    if pool > 1 {
        format!("{}{}", output, rank)
    } else {
        output.to_owned()
    }
}

/// Companion report listing hit IDs that matched no record.
pub fn not_found_filename(output: &str) -> String {
    format!("{}.notFound", output)
}

/// Buffered append stream tracking the bytes it has written.
pub struct OutputFile {
    path: String,
    writer: BufWriter<File>,
    bytes: u64,
}

impl OutputFile {
    pub fn create(path: &str) -> Result<OutputFile> {
        let file = File::create(path)?;
        Ok(OutputFile {
            path: path.to_owned(),
            writer: BufWriter::new(file),
            bytes: 0,
        })
    }

    /// Append bytes, accounting what was actually written. A short write is
    /// reported as a warning, not an error.
    pub fn append(&mut self, bytes: &[u8]) -> Result<usize> {
        let mut done = 0;
        while done < bytes.len() {
            let written = self.writer.write(&bytes[done..])?;
            if written == 0 {
                println!("Warning: short write to {} ({} of {} bytes)",
                         self.path, done, bytes.len());
                break;
            }
            done += written;
        }
        self.bytes += done as u64;
        Ok(done)
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Flush and close the stream; an output nothing was written to is
    /// removed. Returns the byte count.
    pub fn finish(mut self) -> Result<u64> {
        self.writer.flush()?;
        if self.bytes == 0 {
            fs::remove_file(&self.path)?;
        }
        Ok(self.bytes)
    }
}

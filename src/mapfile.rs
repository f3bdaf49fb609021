//!
//!	Thin wrappers over the memory mapping syscalls used by the scanner.
//!
//!	All unsafe code lives here. Mapping failures are fatal; the advisory
//!	calls (madvise, posix_fadvise, mlock) are best-effort and only warn.
//!
use libc;
use std::fs::File;
use std::io::Error;
use std::io::ErrorKind;
use std::io::Result;
use std::os::unix::io::AsRawFd;
use std::ptr;
use std::slice;

/// System page size in bytes.
pub fn page_size() -> u64 {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as u64 }
}

/// One mapped scan window; unmapped (and unlocked) on drop.
pub struct MapWindow {
    ptr: *mut libc::c_void,
    len: usize,
    locked: bool,
}

impl MapWindow {
    /// Map `len` bytes of `file` starting at the page-aligned `offset` as a
    /// private read-only view.
    pub fn map(file: &File, offset: u64, len: usize) -> Result<MapWindow> {
        if len == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "empty map window"));
        }
        let ptr = unsafe {
            libc::mmap(ptr::null_mut(),
                       len,
                       libc::PROT_READ,
                       libc::MAP_PRIVATE,
                       file.as_raw_fd(),
                       offset as libc::off_t)
        };
        if ptr == libc::MAP_FAILED {
            return Err(Error::new(ErrorKind::Other, format!(
                "mmap of {} bytes at offset {} failed: {}",
                len, offset, Error::last_os_error())));
        }
        Ok(MapWindow { ptr: ptr, len: len, locked: false })
    }

    /// Tell the kernel the window will be read front to back, soon.
    pub fn advise(&self) {
        for &advice in &[libc::MADV_SEQUENTIAL, libc::MADV_WILLNEED] {
            let rc = unsafe { libc::madvise(self.ptr, self.len, advice) };
            if rc != 0 {
                println!("Warning: madvise failed: {}", Error::last_os_error());
            }
        }
    }

    /// Best-effort page lock; routinely refused under RLIMIT_MEMLOCK.
    pub fn lock(&mut self) {
        let rc = unsafe { libc::mlock(self.ptr, self.len) };
        if rc == 0 {
            self.locked = true;
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.ptr as *const u8, self.len) }
    }
}

impl Drop for MapWindow {
    fn drop(&mut self) {
        unsafe {
            if self.locked {
                libc::munlock(self.ptr, self.len);
            }
            libc::munmap(self.ptr, self.len);
        }
    }
}

/// Advise the kernel about the upcoming sequential read of a file range,
/// ahead of mapping it.
pub fn advise_file(file: &File, offset: u64, len: u64) {
    let advices = [libc::POSIX_FADV_SEQUENTIAL,
                   libc::POSIX_FADV_WILLNEED,
                   libc::POSIX_FADV_NOREUSE];
    for &advice in &advices {
        let rc = unsafe {
            libc::posix_fadvise(file.as_raw_fd(),
                                offset as libc::off_t,
                                len as libc::off_t,
                                advice)
        };
        if rc != 0 {
            println!("Warning: posix_fadvise failed: {}",
                     Error::from_raw_os_error(rc));
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate tempfile;

    use mapfile::{page_size, MapWindow};
    use std::io::prelude::*;

    #[test]
    fn page_size_is_a_nonzero_power_of_two() {
        let page = page_size();
        assert!(page > 0);
        assert_eq!(page & (page - 1), 0);
    }

    #[test]
    fn mapped_bytes_match_file_contents() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b">r1\nACGT\n").unwrap();
        file.flush().unwrap();

        let map = MapWindow::map(&file, 0, 9).unwrap();
        map.advise();
        assert_eq!(map.len(), 9);
        assert_eq!(map.bytes(), b">r1\nACGT\n");
    }

    #[test]
    fn empty_window_is_rejected() {
        let file = tempfile::tempfile().unwrap();
        assert!(MapWindow::map(&file, 0, 0).is_err());
    }
}

//!
//!	Record-aligned partitioning of the query file across workers.
//!
//!	Each worker receives a `(page_offset, skew, length)` triple: the range
//!	starts at the page boundary below its first record so it can be mapped
//!	directly, and `skew` points at the `>` beginning that record.
//!
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::cmp;
use std::fs::File;
use std::io::Cursor;
use std::io::Error;
use std::io::ErrorKind;
use std::io::Result;
use std::os::unix::fs::FileExt;

/// Byte introducing a FASTA record header.
pub const RECORD_START: u8 = b'>';

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartEntry {
    pub page_offset: u64,
    pub skew: u64,
    pub length: u64,
}

impl PartEntry {
    /// First meaningful byte of the range.
    pub fn start(&self) -> u64 {
        self.page_offset + self.skew
    }

    /// One past the last meaningful byte of the range.
    pub fn end(&self) -> u64 {
        self.page_offset + self.skew + self.length
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartitionPlan {
    pub entries: Vec<PartEntry>,
}

/// Scan `[down_to, from)` backward, page by page, for a `>` that begins a
/// record (preceded by a newline, or sitting at file offset 0).
fn find_record_start_backward(file: &File, from: u64, down_to: u64, page: u64)
                              -> Result<Option<u64>> {
    let mut buf = vec![0u8; page as usize + 1];
    let mut chunk_end = from;

    while chunk_end > down_to {
        let chunk_start = cmp::max(down_to, chunk_end.saturating_sub(page));
        // read one extra leading byte for the newline check
        let read_start = if chunk_start > 0 { chunk_start - 1 } else { 0 };
        let len = (chunk_end - read_start) as usize;
        file.read_exact_at(&mut buf[..len], read_start)?;

        let mut pos = chunk_end;
        while pos > chunk_start {
            pos -= 1;
            let byte = buf[(pos - read_start) as usize];
            if byte == RECORD_START
                && (pos == 0 || buf[(pos - 1 - read_start) as usize] == b'\n') {
                return Ok(Some(pos));
            }
        }
        chunk_end = chunk_start;
    }
    Ok(None)
}

impl PartitionPlan {
    /// Carve `size` bytes into at most `workers` record-aligned ranges.
    ///
    /// The worker count shrinks whenever a range would come out empty (a
    /// single record covering a whole nominal partition, or a file too
    /// small to page-align that many pieces).
    pub fn compute(file: &File, size: u64, workers: usize, page: u64)
                   -> Result<PartitionPlan> {
        if size < 1 {
            return Err(Error::new(ErrorKind::InvalidInput, "query file is empty"));
        }
        if workers < 1 || page < 1 {
            return Err(Error::new(ErrorKind::InvalidInput,
                                  "need at least one worker and a nonzero page size"));
        }

        let mut count = workers;
        'retry: loop {
            if count == 1 {
                return Ok(PartitionPlan {
                    entries: vec![PartEntry { page_offset: 0, skew: 0, length: size }],
                });
            }

            // nominal page-aligned partition size
            let nominal = ((size + count as u64 - 1) / count as u64) / page * page;
            if nominal == 0 {
                count -= 1;
                continue 'retry;
            }

            let mut entries: Vec<PartEntry> = Vec::with_capacity(count);
            let mut prev_end = 0u64;
            for index in 0..count {
                let (page_offset, skew) = if index == 0 {
                    (0, 0)
                } else {
                    let page_offset = prev_end / page * page;
                    (page_offset, prev_end - page_offset)
                };
                let start = page_offset + skew;
                let nominal_end = page_offset + nominal;

                if index == count - 1 || nominal_end >= size {
                    entries.push(PartEntry {
                        page_offset: page_offset,
                        skew: skew,
                        length: size - start,
                    });
                    break;
                }

                match find_record_start_backward(file, nominal_end, start, page)? {
                    None => {
                        return Err(Error::new(ErrorKind::InvalidData, format!(
                            "no record start within {} bytes at offset {}: \
                             malformed FASTA input", nominal, page_offset)));
                    }
                    Some(pos) if pos == start => {
                        // one record spans the whole partition
                        count -= 1;
                        continue 'retry;
                    }
                    Some(pos) => {
                        entries.push(PartEntry {
                            page_offset: page_offset,
                            skew: skew,
                            length: pos - start,
                        });
                        prev_end = pos;
                    }
                }
            }
            return Ok(PartitionPlan { entries: entries });
        }
    }

    pub fn workers(&self) -> usize {
        self.entries.len()
    }

    /// Little-endian frame for the plan broadcast.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.entries.len() * 24);
        buf.write_u32::<LittleEndian>(self.entries.len() as u32).unwrap();
        for entry in &self.entries {
            buf.write_u64::<LittleEndian>(entry.page_offset).unwrap();
            buf.write_u64::<LittleEndian>(entry.skew).unwrap();
            buf.write_u64::<LittleEndian>(entry.length).unwrap();
        }
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<PartitionPlan> {
        let mut cursor = Cursor::new(bytes);
        let count = cursor.read_u32::<LittleEndian>()?;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            entries.push(PartEntry {
                page_offset: cursor.read_u64::<LittleEndian>()?,
                skew: cursor.read_u64::<LittleEndian>()?,
                length: cursor.read_u64::<LittleEndian>()?,
            });
        }
        Ok(PartitionPlan { entries: entries })
    }
}

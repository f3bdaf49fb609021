//!
//!	Chunked scanner walking one partition of the mapped query file.
//!
//!	The partition is mapped in page-aligned windows of bounded size. A
//!	record straddling two windows is reassembled in a carry buffer, so the
//!	records handed to the sink are invariant to the window size.
//!
use mapfile;
use mapfile::MapWindow;
use partition::{PartEntry, RECORD_START};
use std::cmp;
use std::fs::File;
use std::io::Error;
use std::io::ErrorKind;
use std::io::Result;

/// One parsed FASTA record, borrowing window or carry bytes.
pub struct Record<'a> {
    /// Record bytes from the leading `>` through the end of the body.
    pub bytes: &'a [u8],
    /// Index of the newline terminating the header line.
    pub header_end: usize,
    /// Non-newline byte count of the body.
    pub seq_len: u64,
}

impl<'a> Record<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Record<'a>> {
        if bytes.first() != Some(&RECORD_START) {
            return Err(Error::new(ErrorKind::InvalidData,
                                  "record does not start with '>': malformed FASTA input"));
        }
        let header_end = match bytes.iter().position(|&b| b == b'\n') {
            Some(index) => index,
            None => {
                return Err(Error::new(ErrorKind::InvalidData,
                                      "header without terminating newline: malformed FASTA input"));
            }
        };
        let body = &bytes[header_end + 1..];
        let newlines = body.iter().filter(|&&b| b == b'\n').count();
        Ok(Record {
            bytes: bytes,
            header_end: header_end,
            seq_len: (body.len() - newlines) as u64,
        })
    }

    /// Header line including the leading `>`, excluding the newline.
    pub fn header(&self) -> &'a [u8] {
        &self.bytes[..self.header_end]
    }

    /// Body bytes including their internal newlines.
    pub fn body(&self) -> &'a [u8] {
        &self.bytes[self.header_end + 1..]
    }
}

/// Driven with each record in partition order; returning false stops the
/// scan (budget exhausted).
pub trait RecordSink {
    fn record(&mut self, rec: &Record) -> Result<bool>;
}

/// Next `>` at `from` or later that begins a record, i.e. follows a newline.
fn find_record_start(hay: &[u8], from: usize) -> Option<usize> {
    let mut pos = cmp::max(from, 1);
    while pos < hay.len() {
        if hay[pos] == RECORD_START && hay[pos - 1] == b'\n' {
            return Some(pos);
        }
        pos += 1;
    }
    None
}

/// Last record start strictly after `after`.
fn rfind_record_start(hay: &[u8], after: usize) -> Option<usize> {
    let mut pos = hay.len();
    while pos > after + 1 {
        pos -= 1;
        if hay[pos] == RECORD_START && hay[pos - 1] == b'\n' {
            return Some(pos);
        }
    }
    None
}

pub struct Scanner<'a> {
    file: &'a File,
    entry: PartEntry,
    window_size: u64,
    page: u64,
    verbose: bool,
}

impl<'a> Scanner<'a> {
    /// Scanner over one partition. The window size is rounded up to a whole
    /// number of pages, at least one.
    pub fn new(file: &'a File, entry: PartEntry, window_size: u64, page: u64,
               verbose: bool) -> Scanner<'a> {
        Scanner {
            file: file,
            entry: entry,
            window_size: cmp::max(page, (window_size + page - 1) / page * page),
            page: page,
            verbose: verbose,
        }
    }

    /// Walk the partition window by window, feeding every record to `sink`
    /// until the partition ends or the sink reports its budget is spent.
    pub fn run<S: RecordSink>(&self, sink: &mut S) -> Result<()> {
        let content_end = self.entry.end();
        let mut logical = self.entry.start();
        let mut carry: Vec<u8> = Vec::new();
        let mut stop = false;

        while logical < content_end && !stop {
            let map_offset = logical / self.page * self.page;
            let head = (logical - map_offset) as usize;
            let map_end = cmp::min(map_offset + head as u64 + self.window_size,
                                   content_end);
            let map_len = (map_end - map_offset) as usize;

            mapfile::advise_file(self.file, map_offset, map_len as u64);
            let mut map = MapWindow::map(self.file, map_offset, map_len)?;
            map.advise();
            map.lock();

            let window = &map.bytes()[head..];
            let terminal = map_end == content_end;
            if self.verbose {
                println!("# - window {}..{} ({} bytes)", logical, map_end, window.len());
            }

            let mut cursor = 0;
            if !carry.is_empty() {
                // the bytes before the first record start complete the
                // record carried over from the previous window
                let resume = if window[0] == RECORD_START && carry.last() == Some(&b'\n') {
                    Some(0)
                } else {
                    find_record_start(window, 1)
                };
                match resume {
                    Some(pos) => {
                        carry.extend_from_slice(&window[..pos]);
                        stop = !sink.record(&Record::parse(&carry)?)?;
                        carry.clear();
                        cursor = pos;
                    }
                    None => {
                        carry.extend_from_slice(window);
                        logical = map_end;
                        continue;
                    }
                }
            }

            if !stop {
                // records past the window's last record start wait for the
                // next window in the carry buffer
                let region_end = if terminal {
                    window.len()
                } else {
                    rfind_record_start(window, cursor).unwrap_or(cursor)
                };

                let mut pos = cursor;
                while pos < region_end && !stop {
                    let next = find_record_start(&window[..region_end], pos + 1)
                        .unwrap_or(region_end);
                    stop = !sink.record(&Record::parse(&window[pos..next])?)?;
                    pos = next;
                }
                if !terminal && !stop {
                    carry.extend_from_slice(&window[region_end..]);
                }
            }
            logical = map_end;
        }

        if !stop && !carry.is_empty() {
            sink.record(&Record::parse(&carry)?)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    extern crate tempfile;

    use mapfile;
    use partition::{PartEntry, PartitionPlan};
    use scan::{Record, RecordSink, Scanner};
    use std::fs::File;
    use std::io::prelude::*;
    use std::io::Result;

    struct Collect {
        records: Vec<Vec<u8>>,
        limit: Option<usize>,
    }

    impl Collect {
        fn new() -> Collect {
            Collect { records: Vec::new(), limit: None }
        }
    }

    impl RecordSink for Collect {
        fn record(&mut self, rec: &Record) -> Result<bool> {
            self.records.push(rec.bytes.to_vec());
            Ok(match self.limit {
                Some(limit) => self.records.len() < limit,
                None => true,
            })
        }
    }

    fn fasta_file(records: usize, body_len: usize) -> (File, Vec<u8>) {
        let mut data = Vec::new();
        for index in 0..records {
            data.extend_from_slice(format!(">r{}|f{}\n", index, index).as_bytes());
            let mut left = body_len + index * 7;
            while left > 0 {
                let line = ::std::cmp::min(60, left);
                data.extend_from_slice(&vec![b'C'; line]);
                data.push(b'\n');
                left -= line;
            }
        }
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&data).unwrap();
        (file, data)
    }

    fn whole_file_entry(data: &[u8]) -> PartEntry {
        PartEntry { page_offset: 0, skew: 0, length: data.len() as u64 }
    }

    #[test]
    fn record_parsing_and_sequence_length() {
        let rec = Record::parse(b">r2|beta\nGGG\nTTT\n").unwrap();
        assert_eq!(rec.header(), b">r2|beta");
        assert_eq!(rec.body(), b"GGG\nTTT\n");
        assert_eq!(rec.seq_len, 6);
    }

    #[test]
    fn malformed_records_are_rejected() {
        assert!(Record::parse(b"ACGT\n").is_err());
        assert!(Record::parse(b">header-without-newline").is_err());
    }

    #[test]
    fn single_window_scan_sees_every_record_once() {
        let (file, data) = fasta_file(5, 40);
        let page = mapfile::page_size();

        let mut sink = Collect::new();
        Scanner::new(&file, whole_file_entry(&data), 64 * 1024 * 1024, page, false)
            .run(&mut sink)
            .unwrap();

        assert_eq!(sink.records.len(), 5);
        assert_eq!(sink.records.concat(), data);
    }

    #[test]
    fn emitted_records_are_invariant_to_window_size() {
        // records long enough that several straddle a one-page window
        let (file, data) = fasta_file(24, 700);
        assert!(data.len() as u64 > 3 * mapfile::page_size());
        let page = mapfile::page_size();

        let mut narrow = Collect::new();
        Scanner::new(&file, whole_file_entry(&data), page, page, false)
            .run(&mut narrow)
            .unwrap();

        let mut wide = Collect::new();
        Scanner::new(&file, whole_file_entry(&data), 64 * 1024 * 1024, page, false)
            .run(&mut wide)
            .unwrap();

        assert_eq!(narrow.records.len(), 24);
        assert_eq!(narrow.records, wide.records);
        assert_eq!(narrow.records.concat(), data);
    }

    #[test]
    fn record_larger_than_a_window_is_reassembled() {
        let page = mapfile::page_size();
        let (file, data) = fasta_file(2, page as usize * 2);

        let mut sink = Collect::new();
        Scanner::new(&file, whole_file_entry(&data), page, page, false)
            .run(&mut sink)
            .unwrap();

        assert_eq!(sink.records.len(), 2);
        assert_eq!(sink.records.concat(), data);
    }

    #[test]
    fn sink_budget_stops_the_scan() {
        let (file, data) = fasta_file(6, 30);

        let mut sink = Collect::new();
        sink.limit = Some(2);
        Scanner::new(&file, whole_file_entry(&data), 64 * 1024 * 1024,
                     mapfile::page_size(), false)
            .run(&mut sink)
            .unwrap();

        assert_eq!(sink.records.len(), 2);
    }

    #[test]
    fn partitioned_scans_cover_the_file_in_order() {
        let (file, data) = fasta_file(30, 120);
        let page = 16;

        let plan = PartitionPlan::compute(&file, data.len() as u64, 3, page).unwrap();
        let mut all: Vec<Vec<u8>> = Vec::new();
        for entry in &plan.entries {
            // partitions are record aligned, so each scans independently;
            // mapping still requires the real page size
            let mut sink = Collect::new();
            let aligned = PartEntry {
                page_offset: entry.start() / mapfile::page_size() * mapfile::page_size(),
                skew: entry.start() % mapfile::page_size(),
                length: entry.length,
            };
            Scanner::new(&file, aligned, 64 * 1024 * 1024, mapfile::page_size(), false)
                .run(&mut sink)
                .unwrap();
            all.extend(sink.records);
        }
        assert_eq!(all.concat(), data);
    }
}

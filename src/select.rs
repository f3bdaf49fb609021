//!
//!	Record selection and FASTA emission.
//!
//!	Exactly one predicate is active per run. Accepted records are written
//!	under the annotation policy, against per-worker byte and record
//!	budgets; a record is only ever written whole.
//!
use config::AnnotMode;
use hitlist::HitList;
use output::OutputFile;
use scan::{Record, RecordSink};
use std::io::Result;

/// Header field delimiter.
pub const FIELD_DELIM: u8 = b'|';

/// SOH; delimits fields and concatenates alternative headers for a record.
pub const ALT_DELIM: u8 = 0x01;

pub enum Predicate {
    /// Accept every record.
    All,
    /// Accept on exact length or inclusive range match.
    Length { lengths: Vec<u64>, ranges: Vec<(u64, u64)> },
    /// Accept records whose header IDs appear in the hit list.
    Lookup(HitList),
}

impl Predicate {
    pub fn from_filters(lengths: Vec<u64>, ranges: Vec<(u64, u64)>) -> Predicate {
        if lengths.is_empty() && ranges.is_empty() {
            Predicate::All
        } else {
            Predicate::Length { lengths: lengths, ranges: ranges }
        }
    }
}

/// End of the ID starting at `from`: the next field delimiter or header end.
fn id_end(header: &[u8], from: usize) -> usize {
    let mut pos = from;
    while pos < header.len()
        && header[pos] != FIELD_DELIM
        && header[pos] != ALT_DELIM {
        pos += 1;
    }
    pos
}

/// Header prefix through the first `count` fields. Fields are separated by
/// pipe or SOH; a shorter header is used whole.
fn field_prefix(header: &[u8], count: u32) -> &[u8] {
    let mut fields = 0;
    for (index, &byte) in header.iter().enumerate() {
        if byte == FIELD_DELIM || byte == ALT_DELIM {
            fields += 1;
            if fields == count {
                return &header[..index];
            }
        }
    }
    header
}

fn length_accepts(seq_len: u64, lengths: &[u64], ranges: &[(u64, u64)]) -> bool {
    lengths.iter().any(|&len| len == seq_len)
        || ranges.iter().any(|&(lo, hi)| seq_len >= lo && seq_len <= hi)
}

/// Match every header ID (primary, then each SOH-concatenated alternative)
/// against the hit list, counting each matched entry once for this record.
/// Returns the byte offset of the first matching ID within the record.
fn lookup_match(hits: &mut HitList, rec: &Record, matched: &mut Vec<usize>)
                -> Option<usize> {
    matched.clear();
    let header = rec.header();
    let mut first_match = None;
    let mut start = 1;

    loop {
        let end = id_end(header, start);
        if let Some(entry) = hits.lookup(&header[start..end]) {
            if !matched.contains(&entry) {
                matched.push(entry);
                hits.mark_seen(entry);
            }
            if first_match.is_none() {
                first_match = Some(start);
            }
        }
        // the next alternative header begins after the next SOH
        match header[end..].iter().position(|&b| b == ALT_DELIM) {
            Some(offset) => start = end + offset + 1,
            None => break,
        }
    }
    first_match
}

pub struct Selector {
    predicate: Predicate,
    annot: AnnotMode,
    max_records: Option<u64>,
    byte_limit: Option<u64>,
    out: OutputFile,
    records: u64,
    trace: bool,
    matched: Vec<usize>,
}

impl Selector {
    pub fn new(predicate: Predicate, annot: AnnotMode, max_records: Option<u64>,
               byte_limit: Option<u64>, out: OutputFile, trace: bool) -> Selector {
        Selector {
            predicate: predicate,
            annot: annot,
            max_records: max_records,
            byte_limit: byte_limit,
            out: out,
            records: 0,
            trace: trace,
            matched: Vec::new(),
        }
    }

    pub fn records_extracted(&self) -> u64 {
        self.records
    }

    pub fn bytes_written(&self) -> u64 {
        self.out.bytes_written()
    }

    pub fn into_parts(self) -> (Predicate, OutputFile) {
        (self.predicate, self.out)
    }

    /// Bytes to emit for an accepted record whose header logically starts
    /// at `id_start` (1 unless a matched alternative was promoted).
    fn render<'a>(&self, rec: &Record<'a>, id_start: usize) -> Vec<&'a [u8]> {
        match self.annot {
            AnnotMode::All => {
                if id_start == 1 {
                    vec![rec.bytes]
                } else {
                    vec![&b">"[..], &rec.bytes[id_start..]]
                }
            }
            AnnotMode::None => vec![rec.body()],
            AnnotMode::Fields { count, with_body } => {
                let header = &rec.bytes[id_start..rec.header_end];
                let prefix = field_prefix(header, count);
                if with_body {
                    vec![&b">"[..], prefix, &b"\n"[..], rec.body()]
                } else {
                    vec![prefix, &b"\n"[..]]
                }
            }
        }
    }
}

impl RecordSink for Selector {
    fn record(&mut self, rec: &Record) -> Result<bool> {
        if let Some(max) = self.max_records {
            if self.records >= max {
                return Ok(false);
            }
        }

        let id_start = match self.predicate {
            Predicate::All => Some(1),
            Predicate::Length { ref lengths, ref ranges } => {
                if length_accepts(rec.seq_len, lengths, ranges) {
                    Some(1)
                } else {
                    None
                }
            }
            Predicate::Lookup(ref mut hits) => {
                match lookup_match(hits, rec, &mut self.matched) {
                    // without trimming the header is left as found
                    Some(pos) if self.annot.trims() => Some(pos),
                    Some(_) => Some(1),
                    None => None,
                }
            }
        };
        let id_start = match id_start {
            Some(pos) => pos,
            None => return Ok(true),
        };

        let parts = self.render(rec, id_start);
        let total: u64 = parts.iter().map(|part| part.len() as u64).sum();
        if let Some(limit) = self.byte_limit {
            if self.out.bytes_written() + total > limit {
                return Ok(false);
            }
        }
        for part in parts {
            self.out.append(part)?;
        }
        self.records += 1;
        if self.trace {
            let header = rec.header();
            let id = &header[1..id_end(header, 1)];
            println!("# + {} ({} bases)", String::from_utf8_lossy(id), rec.seq_len);
        }

        Ok(match self.max_records {
            Some(max) => self.records < max,
            None => true,
        })
    }
}

#[cfg(test)]
mod tests {
    extern crate tempfile;

    use config::AnnotMode;
    use hitlist::HitList;
    use output::OutputFile;
    use scan::{Record, RecordSink};
    use select::{field_prefix, Predicate, Selector};
    use std::fs;
    use std::io::Cursor;

    fn run_selector<F>(records: &[&[u8]], build: F) -> (Vec<u8>, u64, Predicate)
        where F: FnOnce(OutputFile) -> Selector
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.fa");
        let out = OutputFile::create(path.to_str().unwrap()).unwrap();

        let mut selector = build(out);
        for bytes in records {
            let rec = Record::parse(bytes).unwrap();
            if !selector.record(&rec).unwrap() {
                break;
            }
        }
        let records = selector.records_extracted();
        let (predicate, out) = selector.into_parts();
        out.finish().unwrap();

        let written = if path.exists() { fs::read(&path).unwrap() } else { Vec::new() };
        (written, records, predicate)
    }

    const R1: &'static [u8] = b">r1|alpha\nACGT\n";
    const R2: &'static [u8] = b">r2|beta\nGGG\nTTT\n";

    #[test]
    fn no_filters_pass_records_through_verbatim() {
        let (written, count, _) = run_selector(&[R1, R2], |out| {
            Selector::new(Predicate::from_filters(Vec::new(), Vec::new()),
                          AnnotMode::All, None, None, out, false)
        });
        assert_eq!(count, 2);
        assert_eq!(written, [R1, R2].concat());
    }

    #[test]
    fn exact_length_filter_selects_by_sequence_length() {
        let (written, count, _) = run_selector(&[R1, R2], |out| {
            Selector::new(Predicate::from_filters(vec![6], Vec::new()),
                          AnnotMode::All, None, None, out, false)
        });
        assert_eq!(count, 1);
        assert_eq!(written, R2.to_vec());
    }

    #[test]
    fn range_filter_is_inclusive() {
        let (written, _, _) = run_selector(&[R1, R2], |out| {
            Selector::new(Predicate::from_filters(Vec::new(), vec![(4, 5)]),
                          AnnotMode::All, None, None, out, false)
        });
        assert_eq!(written, R1.to_vec());
    }

    #[test]
    fn annotation_none_writes_body_only() {
        let (written, _, _) = run_selector(&[R2], |out| {
            Selector::new(Predicate::All, AnnotMode::None, None, None, out, false)
        });
        assert_eq!(written, b"GGG\nTTT\n".to_vec());
    }

    #[test]
    fn annotation_first_field_with_body() {
        let (written, _, _) = run_selector(&[R1], |out| {
            Selector::new(Predicate::All,
                          AnnotMode::Fields { count: 1, with_body: true },
                          None, None, out, false)
        });
        assert_eq!(written, b">r1\nACGT\n".to_vec());
    }

    #[test]
    fn annotation_first_field_without_body() {
        let (written, _, _) = run_selector(&[R1, R2], |out| {
            Selector::new(Predicate::All,
                          AnnotMode::Fields { count: 1, with_body: false },
                          None, None, out, false)
        });
        assert_eq!(written, b"r1\nr2\n".to_vec());
    }

    #[test]
    fn field_count_beyond_header_keeps_it_whole() {
        assert_eq!(field_prefix(b"r1|alpha", 5), b"r1|alpha");
        assert_eq!(field_prefix(b"r1|alpha|x", 2), b"r1|alpha");
    }

    #[test]
    fn byte_budget_never_splits_a_record() {
        // R1 is 15 bytes; a 20 byte budget fits R1 but not R1+R2
        let (written, count, _) = run_selector(&[R1, R2], |out| {
            Selector::new(Predicate::All, AnnotMode::All, None, Some(20), out, false)
        });
        assert_eq!(count, 1);
        assert_eq!(written, R1.to_vec());
    }

    #[test]
    fn record_ceiling_stops_the_scan() {
        let (written, count, _) = run_selector(&[R1, R2, R1], |out| {
            Selector::new(Predicate::All, AnnotMode::All, Some(2), None, out, false)
        });
        assert_eq!(count, 2);
        assert_eq!(written, [R1, R2].concat());
    }

    #[test]
    fn lookup_accepts_on_primary_id_and_counts_matches() {
        let hits = HitList::from_id_reader(Cursor::new(&b"r2\nmissing\n"[..])).unwrap();
        let (written, _, predicate) = run_selector(&[R1, R2], |out| {
            Selector::new(Predicate::Lookup(hits), AnnotMode::All, None, None, out, false)
        });
        assert_eq!(written, R2.to_vec());
        match predicate {
            Predicate::Lookup(hits) => assert_eq!(hits.seen_counts(), vec![1, 0]),
            _ => panic!("predicate changed"),
        }
    }

    #[test]
    fn matched_alternative_header_leads_the_output() {
        let rec: &[u8] = b">z|foo\x01h2|bar\nACGT\n";
        let hits = HitList::from_id_reader(Cursor::new(&b"h2\n"[..])).unwrap();
        let (written, _, _) = run_selector(&[rec], |out| {
            Selector::new(Predicate::Lookup(hits),
                          AnnotMode::Fields { count: 1, with_body: true },
                          None, None, out, false)
        });
        assert_eq!(written, b">h2\nACGT\n".to_vec());
    }

    #[test]
    fn unmatched_alternative_header_is_untouched_without_trimming() {
        let rec: &[u8] = b">z|foo\x01h2|bar\nACGT\n";
        let hits = HitList::from_id_reader(Cursor::new(&b"h2\n"[..])).unwrap();
        let (written, _, _) = run_selector(&[rec], |out| {
            Selector::new(Predicate::Lookup(hits), AnnotMode::All, None, None, out, false)
        });
        assert_eq!(written, rec.to_vec());
    }
}

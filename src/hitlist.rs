//!
//!	Hit-list index consulted by lookup mode.
//!
//!	The index is built once per worker from either a tabular BLAST results
//!	file (query-id, hit-id columns) or a plain ID-per-line file, and keeps a
//!	seen-counter per hit ID so unmatched IDs can be reported after the scan.
//!
use std::fs;
use std::fs::File;
use std::io::prelude::*;
use std::io::BufReader;
use std::io::Error;
use std::io::ErrorKind;
use std::io::Result;
use std::io::SeekFrom;
use flate2::read::GzDecoder;

/// Longest identifier kept in the index; longer IDs are truncated.
pub const MAX_ID_BYTES: usize = 63;

struct HitEntry {
    id: Vec<u8>,
    seen: u64,
}

pub struct HitList {
    queries: Vec<Vec<u8>>,
    entries: Vec<HitEntry>,
}

/// Open a hit-list input, unwrapping gzip when the magic bytes match.
fn open_maybe_gz(path: &str) -> Result<Box<BufRead>> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 2];
    let read_len = file.read(&mut magic)?;
    file.seek(SeekFrom::Start(0))?;

    if read_len == 2 && magic == [0x1f, 0x8b] {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Truncate an oversize ID, warning once per occurrence. Truncation is
/// deterministic so every worker indexes identical entries.
fn clamp_id(id: &[u8]) -> &[u8] {
    if id.len() > MAX_ID_BYTES {
        println!("Warning: identifier '{}' exceeds {} bytes, truncating",
                 String::from_utf8_lossy(id), MAX_ID_BYTES);
        &id[..MAX_ID_BYTES]
    } else {
        id
    }
}

fn push_unique(list: &mut Vec<Vec<u8>>, id: &[u8]) {
    let id = clamp_id(id);
    if !list.iter().any(|known| known.as_slice() == id) {
        list.push(id.to_vec());
    }
}

impl HitList {
    /// Build the index from a tabular BLAST results file.
    pub fn from_blast_table(path: &str) -> Result<HitList> {
        Self::from_blast_reader(open_maybe_gz(path)?)
    }

    /// Build the index from a plain ID-per-line file.
    pub fn from_id_list(path: &str) -> Result<HitList> {
        Self::from_id_reader(open_maybe_gz(path)?)
    }

    /// Build the index from any reader of tabular BLAST results.
    pub fn from_blast_reader<R: BufRead>(reader: R) -> Result<HitList> {
        let mut queries: Vec<Vec<u8>> = Vec::new();
        let mut hits: Vec<Vec<u8>> = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let mut tokens = line.split_whitespace();
            let query = tokens.next();
            let hit = tokens.next();
            match (query, hit) {
                (Some(query), Some(hit)) => {
                    push_unique(&mut queries, query.as_bytes());
                    // a hit equal to its own query carries no information
                    if hit != query {
                        push_unique(&mut hits, hit.as_bytes());
                    }
                }
                _ => {
                    return Err(Error::new(ErrorKind::InvalidData, format!(
                        "malformed BLAST tabular line '{}'", line.trim())));
                }
            }
        }
        Self::build(queries, hits)
    }

    /// Build the index from any reader of IDs, one per line.
    pub fn from_id_reader<R: BufRead>(reader: R) -> Result<HitList> {
        let mut hits: Vec<Vec<u8>> = Vec::new();

        for line in reader.lines() {
            let line = line?;
            let id = line.trim();
            if !id.is_empty() {
                push_unique(&mut hits, id.as_bytes());
            }
        }
        Self::build(Vec::new(), hits)
    }

    fn build(queries: Vec<Vec<u8>>, hits: Vec<Vec<u8>>) -> Result<HitList> {
        if hits.is_empty() {
            return Err(Error::new(ErrorKind::InvalidData, "empty hit list"));
        }
        Ok(HitList {
            queries: queries,
            entries: hits.into_iter().map(|id| HitEntry { id: id, seen: 0 }).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn query_count(&self) -> usize {
        self.queries.len()
    }

    /// Bytewise, case-sensitive lookup of a candidate header ID. Candidates
    /// longer than the index limit are compared after the same truncation
    /// applied at build time.
    pub fn lookup(&self, id: &[u8]) -> Option<usize> {
        let id = if id.len() > MAX_ID_BYTES { &id[..MAX_ID_BYTES] } else { id };
        self.entries.iter().position(|entry| entry.id.as_slice() == id)
    }

    /// Count one matching source record against a hit entry.
    pub fn mark_seen(&mut self, index: usize) {
        self.entries[index].seen += 1;
    }

    /// Per-entry seen-counters, in index order (the characteristic vector).
    pub fn seen_counts(&self) -> Vec<u64> {
        self.entries.iter().map(|entry| entry.seen).collect()
    }

    /// Write the IDs whose reduced counter is zero, one per line. The file
    /// is removed again when every ID was seen; returns whether it was kept.
    pub fn write_not_found(&self, counts: &[u64], path: &str) -> Result<bool> {
        if counts.len() != self.entries.len() {
            return Err(Error::new(ErrorKind::InvalidData,
                                  "seen-counter length mismatch"));
        }
        let mut missing = 0;
        {
            let mut file = File::create(path)?;
            for (entry, &count) in self.entries.iter().zip(counts) {
                if count == 0 {
                    file.write_all(&entry.id)?;
                    file.write_all(b"\n")?;
                    missing += 1;
                }
            }
        }
        if missing == 0 {
            fs::remove_file(path)?;
        }
        Ok(missing > 0)
    }
}

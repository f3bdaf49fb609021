//!
//!	Run configuration assembled from the command line options.
//!
use std::io::Error;
use std::io::ErrorKind;
use std::io::Result;

/// At most this many exact length filters per run.
pub const MAX_LENGTHS: usize = 5;

/// At most this many length range filters per run.
pub const MAX_RANGES: usize = 5;

fn config_error(msg: String) -> Error {
    Error::new(ErrorKind::InvalidInput, msg)
}

/// What part of each accepted record is written out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnnotMode {
    /// Full header line plus sequence body (the record verbatim).
    All,
    /// Sequence body only, no header line.
    None,
    /// Header truncated after `count` fields; `with_body` controls whether
    /// the sequence body follows.
    Fields { count: u32, with_body: bool },
}

impl AnnotMode {
    /// Decode the signed annotation count given on the command line.
    ///
    /// `all` keeps the whole header, `0` drops it, a positive count keeps
    /// that many header fields plus the body, a negative count keeps the
    /// fields without the body. Anything else is a configuration error.
    pub fn decode(token: &str) -> Result<AnnotMode> {
        if token.eq_ignore_ascii_case("all") {
            return Ok(AnnotMode::All);
        }
        let value = token.parse::<i32>().map_err(|_| {
            config_error(format!("invalid annotation mode '{}'", token))
        })?;
        if value == 0 {
            Ok(AnnotMode::None)
        } else if value > 0 {
            Ok(AnnotMode::Fields { count: value as u32, with_body: true })
        } else {
            Ok(AnnotMode::Fields { count: (-(value as i64)) as u32, with_body: false })
        }
    }

    /// True when the header is rewritten before emission.
    pub fn trims(&self) -> bool {
        *self != AnnotMode::All
    }
}

/// Record selection mode; exactly one per run.
#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    /// Length based filtering (accepts everything when no lengths are set).
    Filter,
    /// Lookup against the hit IDs of a tabular BLAST results file.
    LookupBlastTable(String),
    /// Lookup against a plain ID-per-line file.
    LookupIdList(String),
}

/// Validated option record consumed by the coordinator.
#[derive(Debug, Clone)]
pub struct FilterParams {
    pub query_file: String,
    pub output_file: String,
    pub max_records: Option<u64>,
    pub lengths: Vec<u64>,
    pub ranges: Vec<(u64, u64)>,
    pub annot: AnnotMode,
    pub byte_limit: Option<u64>,
    pub mode: Mode,
    pub map_size: u64,
    pub keep_parts: bool,
    pub verbose: bool,
    pub trace: bool,
}

/// Parse a byte count with an optional KB/MB/GB suffix (powers of 1024).
pub fn parse_byte_limit(text: &str) -> Result<u64> {
    let text = text.trim();
    let (digits, shift) = if text.len() >= 2 && text.is_char_boundary(text.len() - 2) {
        let (head, tail) = text.split_at(text.len() - 2);
        match tail.to_uppercase().as_ref() {
            "KB" => (head, 10),
            "MB" => (head, 20),
            "GB" => (head, 30),
            _ => (text, 0),
        }
    } else {
        (text, 0)
    };
    let value = digits.trim().parse::<u64>().map_err(|_| {
        config_error(format!("invalid byte limit '{}'", text))
    })?;
    value.checked_mul(1u64 << shift).ok_or_else(|| {
        config_error(format!("byte limit '{}' is out of range", text))
    })
}

/// Parse a comma separated list of exact sequence lengths.
pub fn parse_lengths(text: &str) -> Result<Vec<u64>> {
    let mut lengths = Vec::new();
    for token in text.split(',') {
        let value = token.trim().parse::<u64>().map_err(|_| {
            config_error(format!("invalid sequence length '{}'", token))
        })?;
        lengths.push(value);
    }
    if lengths.len() > MAX_LENGTHS {
        return Err(config_error(format!(
            "at most {} exact lengths may be given", MAX_LENGTHS)));
    }
    Ok(lengths)
}

/// Parse one inclusive lo:hi length range.
fn parse_range(token: &str) -> Result<(u64, u64)> {
    let parts: Vec<&str> = token.split(':').collect();
    if parts.len() != 2 {
        return Err(config_error(format!("invalid length range '{}'", token)));
    }
    let lo = parts[0].trim().parse::<u64>();
    let hi = parts[1].trim().parse::<u64>();
    match (lo, hi) {
        (Ok(lo), Ok(hi)) => {
            if lo > hi {
                Err(config_error(format!("empty length range '{}'", token)))
            } else {
                Ok((lo, hi))
            }
        }
        _ => Err(config_error(format!("invalid length range '{}'", token))),
    }
}

/// Parse a comma separated list of lo:hi ranges, dropping duplicates.
pub fn parse_ranges(text: &str) -> Result<Vec<(u64, u64)>> {
    let mut ranges: Vec<(u64, u64)> = Vec::new();
    for token in text.split(',') {
        let range = parse_range(token)?;
        if !ranges.contains(&range) {
            ranges.push(range);
        }
    }
    if ranges.len() > MAX_RANGES {
        return Err(config_error(format!(
            "at most {} length ranges may be given", MAX_RANGES)));
    }
    Ok(ranges)
}

impl FilterParams {
    /// Build and validate the run configuration from raw option values.
    pub fn new(query: &str,
               out: &str,
               max_records: &Option<String>,
               lengths: &Option<String>,
               ranges: &Option<String>,
               annot: &str,
               max_bytes: &Option<String>,
               hits: &Option<String>,
               ids: &Option<String>,
               pipeline: &str,
               map_size: &str,
               keep_parts: bool,
               verbose: bool,
               trace: bool) -> Result<FilterParams> {
        if query.is_empty() {
            return Err(config_error("no query file given".to_owned()));
        }
        if query == out {
            return Err(config_error(format!(
                "query file and output file are both '{}'", query)));
        }

        let pipeline = pipeline.parse::<u8>().map_err(|_| {
            config_error(format!("invalid pipeline selector '{}'", pipeline))
        })?;
        match pipeline {
            0 | 1 => {}
            2 => return Err(config_error(
                "the muscle pipeline is under development".to_owned())),
            other => return Err(config_error(format!(
                "invalid pipeline selector '{}'", other))),
        }

        let mode = match (hits, ids) {
            (&Some(_), &Some(_)) => {
                return Err(config_error(
                    "--hits and --ids are mutually exclusive".to_owned()));
            }
            (&Some(ref path), &None) => Mode::LookupBlastTable(path.clone()),
            (&None, &Some(ref path)) => Mode::LookupIdList(path.clone()),
            (&None, &None) => Mode::Filter,
        };
        match mode {
            Mode::LookupBlastTable(ref path) | Mode::LookupIdList(ref path) => {
                if path == query {
                    return Err(config_error(format!(
                        "query file and hit list are both '{}'", path)));
                }
                if lengths.is_some() || ranges.is_some() {
                    return Err(config_error(
                        "length filters cannot be combined with a hit list".to_owned()));
                }
            }
            Mode::Filter => {}
        }

        let lengths = match *lengths {
            Some(ref text) => parse_lengths(text)?,
            None => Vec::new(),
        };
        let ranges = match *ranges {
            Some(ref text) => parse_ranges(text)?,
            None => Vec::new(),
        };
        let max_records = match *max_records {
            Some(ref text) => Some(text.parse::<u64>().map_err(|_| {
                config_error(format!("invalid record count '{}'", text))
            })?),
            None => None,
        };
        let byte_limit = match *max_bytes {
            Some(ref text) => Some(parse_byte_limit(text)?),
            None => None,
        };
        let map_size = map_size.parse::<u64>().map_err(|_| {
            config_error(format!("invalid map size '{}'", map_size))
        })?;
        if map_size == 0 {
            return Err(config_error("map size must be at least 1 MiB".to_owned()));
        }

        Ok(FilterParams {
            query_file: query.to_owned(),
            output_file: out.to_owned(),
            max_records: max_records,
            lengths: lengths,
            ranges: ranges,
            annot: AnnotMode::decode(annot)?,
            byte_limit: byte_limit,
            mode: mode,
            map_size: map_size * 1024 * 1024,
            keep_parts: keep_parts,
            verbose: verbose,
            trace: trace,
        })
    }
}

#[cfg(test)]
mod tests {
    use config::{AnnotMode, FilterParams, Mode};
    use config::{parse_byte_limit, parse_lengths, parse_ranges};

    fn base_params(hits: Option<String>, lengths: Option<String>) -> ::std::io::Result<FilterParams> {
        FilterParams::new("db.fa", "filter.out", &None, &lengths, &None, "all",
                          &None, &hits, &None, "0", "256", false, false, false)
    }

    #[test]
    fn byte_limit_suffixes_are_powers_of_1024() {
        assert_eq!(parse_byte_limit("1024").unwrap(), 1024);
        assert_eq!(parse_byte_limit("4KB").unwrap(), 4 * 1024);
        assert_eq!(parse_byte_limit("2MB").unwrap(), 2 * 1024 * 1024);
        assert_eq!(parse_byte_limit("1GB").unwrap(), 1024 * 1024 * 1024);
        assert!(parse_byte_limit("4TB").is_err());
        assert!(parse_byte_limit("").is_err());
    }

    #[test]
    fn annotation_mode_decoding() {
        assert_eq!(AnnotMode::decode("all").unwrap(), AnnotMode::All);
        assert_eq!(AnnotMode::decode("0").unwrap(), AnnotMode::None);
        assert_eq!(AnnotMode::decode("2").unwrap(),
                   AnnotMode::Fields { count: 2, with_body: true });
        assert_eq!(AnnotMode::decode("-1").unwrap(),
                   AnnotMode::Fields { count: 1, with_body: false });
        assert!(AnnotMode::decode("full").is_err());
    }

    #[test]
    fn ranges_are_deduplicated_and_capped() {
        assert_eq!(parse_ranges("1:5,3:9,1:5").unwrap(), vec![(1, 5), (3, 9)]);
        assert!(parse_ranges("9:1").is_err());
        assert!(parse_ranges("1:2,2:3,3:4,4:5,5:6,6:7").is_err());
    }

    #[test]
    fn lengths_are_capped_at_five() {
        assert_eq!(parse_lengths("4,6").unwrap(), vec![4, 6]);
        assert!(parse_lengths("1,2,3,4,5,6").is_err());
    }

    #[test]
    fn lookup_and_length_filters_are_exclusive() {
        assert!(base_params(Some("hits.txt".to_owned()), Some("4".to_owned())).is_err());
        let params = base_params(Some("hits.txt".to_owned()), None).unwrap();
        assert_eq!(params.mode, Mode::LookupBlastTable("hits.txt".to_owned()));
    }

    #[test]
    fn muscle_pipeline_is_rejected() {
        let err = FilterParams::new("db.fa", "filter.out", &None, &None, &None, "all",
                                    &None, &None, &None, "2", "256", false, false, false);
        assert!(err.is_err());
        let err = FilterParams::new("db.fa", "filter.out", &None, &None, &None, "all",
                                    &None, &None, &None, "7", "256", false, false, false);
        assert!(err.is_err());
    }

    #[test]
    fn query_must_differ_from_outputs() {
        let err = FilterParams::new("db.fa", "db.fa", &None, &None, &None, "all",
                                    &None, &None, &None, "0", "256", false, false, false);
        assert!(err.is_err());
        let err = FilterParams::new("db.fa", "filter.out", &None, &None, &None, "all",
                                    &None, &None, &Some("db.fa".to_owned()), "0", "256",
                                    false, false, false);
        assert!(err.is_err());
    }
}

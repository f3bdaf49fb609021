#![allow(non_snake_case)]

extern crate filterfastalib;
extern crate docopt;
extern crate serde;

use filterfastalib::comm::SoloComm;
use filterfastalib::config::FilterParams;
use filterfastalib::coordinator;
use filterfastalib::coordinator::RunOptions;
use filterfastalib::file_exists;

use docopt::Docopt;
use serde::Deserialize;
use std::process::exit;

/* Main usage/arguments */

const USAGE: &'static str = "
FASTA subset extraction

Usage:
  filterFasta <query-file> [options]
  filterFasta (-h | --help)
  filterFasta --version

Options:
  -h --help            Show this screen.
  --version            Show version.
  --out=<file>         Output FASTA filename [default: filter.out].
  --max-records=<n>    Stop after extracting n records.
  --lengths=<list>     Comma-separated exact sequence lengths to accept (up to 5).
  --ranges=<list>      Comma-separated lo:hi inclusive length ranges (up to 5).
  --annot=<n>          Header annotation policy: 'all' keeps the whole header,
                       0 drops it, n > 0 keeps the first n fields and the
                       sequence, n < 0 keeps the first n fields without the
                       sequence [default: all].
  --max-bytes=<b>      Output byte budget per worker; accepts KB, MB and GB
                       suffixes (powers of 1024).
  --hits=<file>        Extract records whose IDs match the hit column of a
                       tabular BLAST results file.
  --ids=<file>         Extract records whose IDs match a plain ID list file.
  --pipeline=<p>       Downstream pipeline selector (0=none, 1=hmmer,
                       2=muscle) [default: 0].
  --map-size=<mb>      Scan window size in MiB [default: 256].
  --keep-parts         Keep per-worker intermediate files after combining.
  --verbose            Print progress information.
  --trace              Print per-record information.
";

#[derive(Debug, Deserialize)]
struct Args {
    arg_query_file: String,
    flag_out: String,
    flag_max_records: Option<String>,
    flag_lengths: Option<String>,
    flag_ranges: Option<String>,
    flag_annot: String,
    flag_max_bytes: Option<String>,
    flag_hits: Option<String>,
    flag_ids: Option<String>,
    flag_pipeline: String,
    flag_map_size: String,
    flag_keep_parts: bool,
    flag_verbose: bool,
    flag_trace: bool,
    flag_version: bool,
}

fn main() {
    // Parse command line arguments
    let args: Args = Docopt::new(USAGE)
                            .and_then(|d| d.deserialize())
                            .unwrap_or_else(|e| e.exit());

    if args.flag_version {
        println!("FASTA subset extraction, v{}.{}.{}",
            env!( "CARGO_PKG_VERSION_MAJOR" ),
            env!( "CARGO_PKG_VERSION_MINOR" ),
            env!( "CARGO_PKG_VERSION_PATCH" ) );
        return;
    }

    let params = match FilterParams::new(
        &args.arg_query_file,
        &args.flag_out,
        &args.flag_max_records,
        &args.flag_lengths,
        &args.flag_ranges,
        &args.flag_annot,
        &args.flag_max_bytes,
        &args.flag_hits,
        &args.flag_ids,
        &args.flag_pipeline,
        &args.flag_map_size,
        args.flag_keep_parts,
        args.flag_verbose,
        args.flag_trace) {
        Ok(params) => params,
        Err(err) => {
            println!("Error: {}", err);
            exit(-2);
        }
    };

    if !file_exists(&params.query_file) {
        println!("Error: FASTA file {} does not exist!", params.query_file);
        exit(-1);
    }

    if params.verbose {
        println!("# query: {}", params.query_file);
        println!("# output: {}", params.output_file);
    }

    let opts = RunOptions {
        distribute: cfg!(feature = "distribute"),
        combine: cfg!(feature = "combine"),
    };
    let mut comm = SoloComm;
    match coordinator::run(&mut comm, &params, &opts) {
        Ok(summary) => {
            if summary.participated {
                println!("# extracted {} records ({} bytes)",
                         summary.records, summary.bytes);
            }
        }
        Err(err) => {
            println!("Error: {}", err);
            exit(-1);
        }
    }
}

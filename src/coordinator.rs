//!
//!	Run orchestration: sizes the worker pool, distributes the partition
//!	plan, drives the per-worker scan and reduces the results.
//!
use bincode;
use comm::{Communicator, CHUNK_SIZE};
use config::{FilterParams, Mode};
use hitlist::HitList;
use mapfile;
use output;
use output::OutputFile;
use partition::PartitionPlan;
use scan::Scanner;
use select::{Predicate, Selector};
use std::fs;
use std::fs::File;
use std::io::Error;
use std::io::ErrorKind;
use std::io::Read;
use std::io::Result;
use std::io::Write;
use std::io::copy;

/// Compile-time opt-ins resolved by the binary.
pub struct RunOptions {
    /// Stream input files to one worker per remote host before the scan.
    pub distribute: bool,
    /// Concatenate per-worker outputs into one file on worker 0.
    pub combine: bool,
}

pub struct RunSummary {
    pub records: u64,
    pub bytes: u64,
    /// False on workers excluded when the pool shrank.
    pub participated: bool,
}

/// Execute one extraction run over the whole worker pool.
///
/// Every active rank must call this with identical parameters; collective
/// calls keep the pool in step.
pub fn run<C: Communicator>(comm: &mut C, params: &FilterParams,
                            opts: &RunOptions) -> Result<RunSummary> {
    let page = mapfile::page_size();

    // worker 0 carves the plan; everyone receives it
    let mut frame = if comm.rank() == 0 {
        let file = File::open(&params.query_file)?;
        let size = file.metadata()?.len();
        let plan = PartitionPlan::compute(&file, size, comm.size(), page)?;
        plan.encode()
    } else {
        Vec::new()
    };
    comm.broadcast(0, &mut frame)?;
    let plan = PartitionPlan::decode(&frame)?;

    if params.verbose && comm.rank() == 0 {
        println!("# workers: {}", plan.workers());
        for (rank, entry) in plan.entries.iter().enumerate() {
            println!("# partition {}: page offset {} skew {} length {}",
                     rank, entry.page_offset, entry.skew, entry.length);
        }
    }

    if !comm.shrink(plan.workers())? {
        // the file is too small for the requested pool
        return Ok(RunSummary { records: 0, bytes: 0, participated: false });
    }

    if opts.distribute && comm.size() > 1 {
        let mut inputs = vec![params.query_file.clone()];
        match params.mode {
            Mode::LookupBlastTable(ref path) | Mode::LookupIdList(ref path) => {
                inputs.push(path.clone());
            }
            Mode::Filter => {}
        }
        distribute_inputs(comm, &inputs)?;
    }

    let predicate = match params.mode {
        Mode::Filter => {
            Predicate::from_filters(params.lengths.clone(), params.ranges.clone())
        }
        Mode::LookupBlastTable(ref path) => {
            Predicate::Lookup(HitList::from_blast_table(path)?)
        }
        Mode::LookupIdList(ref path) => {
            Predicate::Lookup(HitList::from_id_list(path)?)
        }
    };

    let part_path = output::rank_filename(&params.output_file, comm.rank(), comm.size());
    let out = OutputFile::create(&part_path)?;
    let mut selector = Selector::new(predicate, params.annot, params.max_records,
                                     params.byte_limit, out, params.trace);

    let file = File::open(&params.query_file)?;
    let entry = plan.entries[comm.rank()];
    Scanner::new(&file, entry, params.map_size, page, params.verbose)
        .run(&mut selector)?;

    let records = selector.records_extracted();
    let (predicate, out) = selector.into_parts();
    let bytes = out.finish()?;

    // hit accounting across the pool
    if let Predicate::Lookup(ref hits) = predicate {
        if let Some(counts) = comm.reduce_sum_u64(0, &hits.seen_counts())? {
            let report = output::not_found_filename(&params.output_file);
            let kept = hits.write_not_found(&counts, &report)?;
            if kept && params.verbose {
                println!("# unmatched IDs listed in {}", report);
            }
        }
    }

    if opts.combine && comm.size() > 1 {
        combine_outputs(comm, &params.output_file, &part_path, bytes,
                        params.keep_parts)?;
    }

    Ok(RunSummary { records: records, bytes: bytes, participated: true })
}

/// Stream every input file from worker 0 to the lowest rank of each other
/// host, in bounded chunks; co-located workers read the file locally.
fn distribute_inputs<C: Communicator>(comm: &mut C, inputs: &[String]) -> Result<()> {
    let name = comm.processor_name();
    let gathered = comm.gather_bytes(0, name.as_bytes())?;

    let mut frame = match gathered {
        Some(names) => {
            let mut seen: Vec<Vec<u8>> = vec![names[0].clone()];
            let mut targets: Vec<u64> = Vec::new();
            for (rank, name) in names.iter().enumerate().skip(1) {
                if !seen.contains(name) {
                    seen.push(name.clone());
                    targets.push(rank as u64);
                }
            }
            bincode::serialize(&targets)
                .map_err(|err| Error::new(ErrorKind::InvalidData, err.to_string()))?
        }
        None => Vec::new(),
    };
    comm.broadcast(0, &mut frame)?;
    let targets: Vec<u64> = bincode::deserialize(&frame)
        .map_err(|err| Error::new(ErrorKind::InvalidData, err.to_string()))?;
    if targets.is_empty() {
        return Ok(());
    }

    for path in inputs {
        if comm.rank() == 0 {
            let mut file = File::open(path)?;
            let mut buf = vec![0u8; CHUNK_SIZE];
            loop {
                let read = file.read(&mut buf)?;
                // the empty chunk doubles as the end-of-file marker
                for &to in &targets {
                    comm.send(to as usize, &buf[..read])?;
                }
                if read == 0 {
                    break;
                }
            }
        } else if targets.contains(&(comm.rank() as u64)) {
            let mut file = File::create(path)?;
            loop {
                let chunk = comm.recv(0)?;
                if chunk.is_empty() {
                    break;
                }
                file.write_all(&chunk)?;
            }
        }
    }
    Ok(())
}

/// Concatenate the per-rank outputs onto worker 0, in rank order, into the
/// shared output file.
fn combine_outputs<C: Communicator>(comm: &mut C, output: &str, part_path: &str,
                                    bytes: u64, keep_parts: bool) -> Result<()> {
    let gathered = comm.gather_u64(0, bytes)?;

    if comm.rank() == 0 {
        let counts = gathered.ok_or_else(|| {
            Error::new(ErrorKind::BrokenPipe, "byte counts missing on worker 0")
        })?;
        let total: u64 = counts.iter().sum();
        let mut dest = File::create(output)?;
        dest.set_len(total)?;

        if bytes > 0 {
            copy(&mut File::open(part_path)?, &mut dest)?;
        }
        for from in 1..comm.size() {
            let mut left = counts[from];
            while left > 0 {
                let chunk = comm.recv(from)?;
                if chunk.is_empty() || chunk.len() as u64 > left {
                    return Err(Error::new(ErrorKind::BrokenPipe, format!(
                        "unexpected chunk from rank {} while combining", from)));
                }
                dest.write_all(&chunk)?;
                left -= chunk.len() as u64;
            }
        }
    } else if bytes > 0 {
        let mut file = File::open(part_path)?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let read = file.read(&mut buf)?;
            if read == 0 {
                break;
            }
            comm.send(0, &buf[..read])?;
        }
    }

    if !keep_parts && bytes > 0 {
        fs::remove_file(part_path)?;
    }
    Ok(())
}

//!
//!	Collectives contract between cooperating workers.
//!
//!	Bootstrapping a real multi-process messaging layer is outside the core;
//!	this trait is its contract. `SoloComm` is the degenerate single-worker
//!	group the binary runs with, and `LocalComm` is an in-process,
//!	channel-backed reference group used to exercise the coordinator.
//!
use bincode;
use libc;
use std::io::Error;
use std::io::ErrorKind;
use std::io::Result;
use std::sync::mpsc::{channel, Receiver, Sender};

/// Upper bound for one point-to-point transfer when streaming file bytes.
pub const CHUNK_SIZE: usize = 4 * 1024 * 1024;

fn comm_error(msg: String) -> Error {
    Error::new(ErrorKind::BrokenPipe, msg)
}

/// Message-passing collectives connecting the worker pool.
///
/// Collective calls must be entered by every active rank, in the same
/// order. Non-root ranks receive `None` from the rooted collectives.
pub trait Communicator {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Name of the physical host this worker runs on.
    fn processor_name(&self) -> String;

    fn barrier(&mut self) -> Result<()>;

    /// Distribute root's buffer to every rank.
    fn broadcast(&mut self, root: usize, data: &mut Vec<u8>) -> Result<()>;

    /// Collect one value per rank, in rank order, onto root.
    fn gather_u64(&mut self, root: usize, value: u64) -> Result<Option<Vec<u64>>>;

    /// Collect one byte buffer per rank, in rank order, onto root.
    fn gather_bytes(&mut self, root: usize, data: &[u8]) -> Result<Option<Vec<Vec<u8>>>>;

    /// Element-wise sum of equal-length vectors across ranks, onto root.
    fn reduce_sum_u64(&mut self, root: usize, values: &[u64]) -> Result<Option<Vec<u64>>>;

    fn send(&mut self, to: usize, data: &[u8]) -> Result<()>;
    fn recv(&mut self, from: usize) -> Result<Vec<u8>>;

    /// Shrink the pool to its first `new_size` ranks. Returns false on the
    /// excluded ranks, which must release resources and exit cleanly.
    fn shrink(&mut self, new_size: usize) -> Result<bool>;
}

/// This host's name, as reported by the system.
pub fn hostname() -> String {
    let mut buf = [0u8; 256];
    let rc = unsafe {
        libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len())
    };
    if rc == 0 {
        let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        String::from_utf8_lossy(&buf[..len]).into_owned()
    } else {
        "localhost".to_owned()
    }
}

/// The one-worker group: every collective is trivial.
pub struct SoloComm;

impl Communicator for SoloComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn processor_name(&self) -> String {
        hostname()
    }

    fn barrier(&mut self) -> Result<()> {
        Ok(())
    }

    fn broadcast(&mut self, _root: usize, _data: &mut Vec<u8>) -> Result<()> {
        Ok(())
    }

    fn gather_u64(&mut self, _root: usize, value: u64) -> Result<Option<Vec<u64>>> {
        Ok(Some(vec![value]))
    }

    fn gather_bytes(&mut self, _root: usize, data: &[u8]) -> Result<Option<Vec<Vec<u8>>>> {
        Ok(Some(vec![data.to_vec()]))
    }

    fn reduce_sum_u64(&mut self, _root: usize, values: &[u64]) -> Result<Option<Vec<u64>>> {
        Ok(Some(values.to_vec()))
    }

    fn send(&mut self, to: usize, _data: &[u8]) -> Result<()> {
        Err(comm_error(format!("no peer rank {} in a solo group", to)))
    }

    fn recv(&mut self, from: usize) -> Result<Vec<u8>> {
        Err(comm_error(format!("no peer rank {} in a solo group", from)))
    }

    fn shrink(&mut self, new_size: usize) -> Result<bool> {
        Ok(new_size >= 1)
    }
}

/// In-process worker group over unbounded channels; one handle per rank,
/// each driven from its own thread.
pub struct LocalComm {
    rank: usize,
    size: usize,
    name: String,
    tx: Vec<Sender<Vec<u8>>>,
    rx: Vec<Receiver<Vec<u8>>>,
}

/// Build a fully connected group of `size` ranks.
pub fn local_group(size: usize) -> Vec<LocalComm> {
    let mut senders: Vec<Vec<Sender<Vec<u8>>>> =
        (0..size).map(|_| Vec::with_capacity(size)).collect();
    let mut receivers: Vec<Vec<Option<Receiver<Vec<u8>>>>> =
        (0..size).map(|_| (0..size).map(|_| None).collect()).collect();

    for from in 0..size {
        for to in 0..size {
            let (tx, rx) = channel();
            senders[from].push(tx);
            receivers[to][from] = Some(rx);
        }
    }

    let name = hostname();
    senders
        .into_iter()
        .zip(receivers)
        .enumerate()
        .map(|(rank, (tx, rx))| LocalComm {
            rank: rank,
            size: size,
            name: name.clone(),
            tx: tx,
            rx: rx.into_iter().map(|slot| slot.unwrap()).collect(),
        })
        .collect()
}

impl LocalComm {
    /// Override the reported host name (a group on one machine is otherwise
    /// a single "host" and input distribution degenerates to a no-op).
    pub fn set_processor_name(&mut self, name: &str) {
        self.name = name.to_owned();
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn processor_name(&self) -> String {
        self.name.clone()
    }

    fn barrier(&mut self) -> Result<()> {
        if self.rank == 0 {
            for from in 1..self.size {
                self.recv(from)?;
            }
            for to in 1..self.size {
                self.send(to, &[])?;
            }
        } else {
            self.send(0, &[])?;
            self.recv(0)?;
        }
        Ok(())
    }

    fn broadcast(&mut self, root: usize, data: &mut Vec<u8>) -> Result<()> {
        if self.rank == root {
            for to in 0..self.size {
                if to != root {
                    self.send(to, data)?;
                }
            }
        } else {
            *data = self.recv(root)?;
        }
        Ok(())
    }

    fn gather_u64(&mut self, root: usize, value: u64) -> Result<Option<Vec<u64>>> {
        let gathered = self.gather_bytes(root, &value.to_le_bytes())?;
        match gathered {
            Some(buffers) => {
                let mut values = Vec::with_capacity(buffers.len());
                for buffer in buffers {
                    if buffer.len() != 8 {
                        return Err(comm_error("malformed gathered value".to_owned()));
                    }
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(&buffer);
                    values.push(u64::from_le_bytes(raw));
                }
                Ok(Some(values))
            }
            None => Ok(None),
        }
    }

    fn gather_bytes(&mut self, root: usize, data: &[u8]) -> Result<Option<Vec<Vec<u8>>>> {
        if self.rank == root {
            let mut buffers = Vec::with_capacity(self.size);
            for from in 0..self.size {
                if from == root {
                    buffers.push(data.to_vec());
                } else {
                    buffers.push(self.recv(from)?);
                }
            }
            Ok(Some(buffers))
        } else {
            self.send(root, data)?;
            Ok(None)
        }
    }

    fn reduce_sum_u64(&mut self, root: usize, values: &[u64]) -> Result<Option<Vec<u64>>> {
        if self.rank == root {
            let mut totals = values.to_vec();
            for from in 0..self.size {
                if from == root {
                    continue;
                }
                let raw = self.recv(from)?;
                let partial: Vec<u64> = bincode::deserialize(&raw)
                    .map_err(|err| comm_error(err.to_string()))?;
                if partial.len() != totals.len() {
                    return Err(comm_error("reduce length mismatch".to_owned()));
                }
                for (total, value) in totals.iter_mut().zip(partial) {
                    *total += value;
                }
            }
            Ok(Some(totals))
        } else {
            let raw = bincode::serialize(&values.to_vec())
                .map_err(|err| comm_error(err.to_string()))?;
            self.send(root, &raw)?;
            Ok(None)
        }
    }

    fn send(&mut self, to: usize, data: &[u8]) -> Result<()> {
        self.tx[to]
            .send(data.to_vec())
            .map_err(|_| comm_error(format!("rank {} is gone", to)))
    }

    fn recv(&mut self, from: usize) -> Result<Vec<u8>> {
        self.rx[from]
            .recv()
            .map_err(|_| comm_error(format!("rank {} is gone", from)))
    }

    fn shrink(&mut self, new_size: usize) -> Result<bool> {
        if new_size < 1 || new_size > self.size {
            return Err(comm_error(format!("cannot shrink pool to {}", new_size)));
        }
        self.size = new_size;
        Ok(self.rank < new_size)
    }
}

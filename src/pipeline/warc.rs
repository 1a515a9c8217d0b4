//! WARC-to-WARC parallel pipeline.
//!
//! The same queue/sentinel/reaper discipline as the line pipeline, but
//! the units are whole WARC records (possibly tens of megabytes) and
//! the outputs of different workers are interleaved: each collector
//! frames its child's stdout with its own [`WarcReader`] and writes
//! records straight to the shared output, taking the output mutex only
//! for the one write call. With compression enabled, each record is
//! gzipped into its own member outside the lock.
//!
//! Input readers (one per input file, or one for stdin) enforce a
//! 20 MiB per-record limit and drop the empty recovery records the
//! reader emits for elided gaps, so workers only ever see complete
//! records.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use tracing::debug;

use crate::io::decompress::{gz_compress, DecompressReader};
use crate::io::split::RecordWrite;
use crate::io::warc::WarcReader;
use crate::pipeline::child::{launch, wait_exit, CaptiveChild};

/// Per-record ceiling on the input side; anything larger is skipped by
/// the WARC reader and surfaces as an audited gap.
pub const RECORD_LIMIT: usize = 20 * 1024 * 1024;

/// Gzip level for `-z` output.
const GZIP_LEVEL: u32 = 6;

type SharedOut = Arc<Mutex<Box<dyn RecordWrite>>>;

/// Feeder: queue to child stdin. An empty record is the sentinel.
fn feed(tasks: Receiver<Vec<u8>>, mut stdin: ChildStdin) -> Result<()> {
    use std::io::Write;
    // Once the pipe breaks, keep consuming (and discarding) until the
    // sentinel so the input readers never block on a full queue.
    let mut broken: Option<std::io::Error> = None;
    while let Ok(record) = tasks.recv() {
        if record.is_empty() {
            break;
        }
        if broken.is_none() {
            if let Err(e) = stdin.write_all(&record) {
                broken = Some(e);
            }
        }
    }
    match broken {
        Some(e) => Err(e).context("writing a record to child stdin"),
        None => Ok(()),
    }
}

/// Collector: frame the child's stdout and write each record to the
/// shared output. Compression happens before the lock is taken.
fn collect(stdout: ChildStdout, out: SharedOut, compress: bool) -> Result<()> {
    let mut reader = WarcReader::new(DecompressReader::new(stdout)?);
    while let Some(record) = reader.read(usize::MAX)? {
        if record.payload.is_empty() {
            continue;
        }
        let bytes = if compress {
            gz_compress(&record.payload, GZIP_LEVEL)?
        } else {
            record.payload
        };
        let mut out = out.lock().expect("output mutex poisoned");
        out.write_record(&bytes)?;
    }
    Ok(())
}

/// Input reader: frame one source and enqueue complete records.
fn read_input(source: Box<dyn Read + Send>, tasks: &Sender<Vec<u8>>) -> Result<()> {
    let mut reader = WarcReader::new(DecompressReader::new(source)?);
    read_records(&mut reader, tasks)
}

fn read_records(reader: &mut WarcReader, tasks: &Sender<Vec<u8>>) -> Result<()> {
    while let Some(record) = reader.read(RECORD_LIMIT)? {
        // Skipped gaps show up as empty records; the queue's empty
        // record means shutdown, so they must not be forwarded.
        if record.payload.is_empty() {
            continue;
        }
        if tasks.send(record.payload).is_err() {
            return Err(anyhow!("all workers stopped early"));
        }
    }
    Ok(())
}

struct Worker {
    feeder: JoinHandle<Result<()>>,
    collector: JoinHandle<Result<()>>,
}

impl Worker {
    fn launch(
        tasks: Receiver<Vec<u8>>,
        out: SharedOut,
        compress: bool,
        argv: &[String],
        reap: &Sender<Child>,
    ) -> Result<Self> {
        let CaptiveChild {
            stdin,
            stdout,
            child,
        } = launch(argv)?;
        reap.send(child).expect("reaper outlives worker launch");
        let feeder = thread::spawn(move || feed(tasks, stdin));
        let collector = thread::spawn(move || collect(stdout, out, compress));
        Ok(Worker { feeder, collector })
    }

    /// Join both threads; the first failure wins but both are always
    /// joined.
    fn join(self) -> Result<()> {
        let fed = self
            .feeder
            .join()
            .map_err(|_| anyhow!("feeder thread panicked"))
            .and_then(|r| r);
        let collected = self
            .collector
            .join()
            .map_err(|_| anyhow!("collector thread panicked"))
            .and_then(|r| r);
        fed?;
        collected
    }
}

/// Reaper: wait for every child, folding exit statuses worst-of.
/// Abnormal termination is an error.
fn reap(children: Receiver<Child>) -> Result<i32> {
    let mut exit_code = 0;
    for child in children {
        exit_code = exit_code.max(wait_exit(child)?);
    }
    Ok(exit_code)
}

/// Run the WARC pipeline: records from `inputs` (stdin when empty)
/// through `n_workers` copies of `argv`, into `output`. Returns the
/// worst child exit code.
pub fn run(
    inputs: &[PathBuf],
    output: Box<dyn RecordWrite>,
    n_workers: usize,
    compress: bool,
    argv: &[String],
) -> Result<i32> {
    let n_workers = n_workers.max(1);
    let out: SharedOut = Arc::new(Mutex::new(output));
    let (task_tx, task_rx) = bounded::<Vec<u8>>(n_workers);
    let (reap_tx, reap_rx) = unbounded::<Child>();

    let reaper = thread::spawn(move || reap(reap_rx));

    let mut workers = Vec::with_capacity(n_workers);
    for _ in 0..n_workers {
        workers.push(Worker::launch(
            task_rx.clone(),
            out.clone(),
            compress,
            argv,
            &reap_tx,
        )?);
    }
    drop(reap_tx);

    // Read every input; files get their own threads so several
    // compressed sources decode in parallel.
    let read_result = if inputs.is_empty() {
        debug!("reading WARC records from stdin");
        read_input(Box::new(std::io::stdin()), &task_tx)
    } else {
        let mut result = Ok(());
        thread::scope(|scope| {
            let mut handles = Vec::new();
            for path in inputs {
                let task_tx = task_tx.clone();
                handles.push(scope.spawn(move || -> Result<()> {
                    let mut reader = WarcReader::open(path)
                        .with_context(|| format!("opening {}", path.display()))?;
                    read_records(&mut reader, &task_tx)
                        .with_context(|| format!("reading {}", path.display()))
                }));
            }
            for handle in handles {
                let joined = handle
                    .join()
                    .map_err(|_| anyhow!("input reader thread panicked"))
                    .and_then(|r| r);
                if let Err(e) = joined {
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
            }
        });
        result
    };

    // Poison the queue: one empty record per worker.
    for _ in 0..n_workers {
        let _ = task_tx.send(Vec::new());
    }

    let mut first_error = read_result.err();
    for worker in workers {
        if let Err(e) = worker.join() {
            first_error.get_or_insert(e);
        }
    }
    if let Err(e) = out.lock().expect("output mutex poisoned").finish() {
        first_error.get_or_insert(e.into());
    }
    let reaped = reaper
        .join()
        .map_err(|_| anyhow!("reaper thread panicked"))
        .and_then(|r| r);
    match (first_error, reaped) {
        (Some(e), _) => Err(e),
        (None, result) => result,
    }
}

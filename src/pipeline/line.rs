//! Order-preserving line pipeline over a pool of worker subprocesses.
//!
//! One reader (the calling thread) pulls lines from the input. For
//! each line it creates a write-once slot, pushes the write end with
//! the line onto a bounded task queue, and the read end onto an
//! unbounded FIFO for the writer thread. Each worker runs a feeder
//! thread (task queue -> child stdin, slot write ends into a
//! per-worker FIFO) and a collector thread (child stdout -> slots, in
//! the order the feeder pushed them). The writer blocks on each slot
//! in turn, so global input order survives out-of-order worker
//! completion: a slow worker stalls only its own pending slots.
//!
//! Shutdown: at input EOF the reader pushes one sentinel per worker
//! onto the task queue; each feeder forwards the sentinel to its
//! collector and closes the child's stdin; the child exits; the
//! collector drains. A final sentinel on the slot FIFO releases the
//! writer, and the children are reaped with their statuses folded
//! worst-of into the pipeline's exit code.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::process::{Child, ChildStdin, ChildStdout};
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use crate::error::Error;
use crate::pipeline::child::{launch, wait_exit, CaptiveChild};
use crate::pipeline::slot::Slot;

/// One unit of work. `slot` is `None` for the end-of-stream sentinel.
struct Task<S: Slot> {
    line: Vec<u8>,
    slot: Option<S::Writer>,
}

/// A worker: one child process plus its feeder and collector threads.
struct Worker {
    feeder: JoinHandle<Result<()>>,
    collector: JoinHandle<()>,
    child: Child,
}

impl Worker {
    fn launch<S: Slot>(tasks: Receiver<Task<S>>, argv: &[String]) -> Result<Self> {
        let CaptiveChild {
            stdin,
            stdout,
            child,
        } = launch(argv)?;
        // Slot write ends travel feeder -> collector in dispatch
        // order; a `None` tells the collector to stop.
        let (pending_tx, pending_rx) = unbounded::<Option<S::Writer>>();
        let feeder = thread::spawn(move || feed::<S>(tasks, stdin, pending_tx));
        let collector = thread::spawn(move || collect::<S>(stdout, pending_rx));
        Ok(Worker {
            feeder,
            collector,
            child,
        })
    }

    /// Join both threads, then reap the child. Returns its exit code.
    /// The child is reaped even when the feeder failed, so no zombie
    /// outlives the pipeline.
    fn join(self) -> Result<i32> {
        let fed = self
            .feeder
            .join()
            .map_err(|_| anyhow!("feeder thread panicked"))
            .and_then(|r| r);
        self.collector
            .join()
            .map_err(|_| anyhow!("collector thread panicked"))?;
        let code = wait_exit(self.child)?;
        fed?;
        Ok(code)
    }
}

/// Feeder: task queue to child stdin. On the sentinel (or a closed
/// queue) the child's stdin is dropped so it sees EOF.
fn feed<S: Slot>(
    tasks: Receiver<Task<S>>,
    stdin: ChildStdin,
    pending: Sender<Option<S::Writer>>,
) -> Result<()> {
    let mut stdin = BufWriter::new(stdin);
    // Once the pipe breaks, remaining tasks are failed rather than
    // written, so the reader and writer can still drain and abort in
    // an orderly way.
    let mut broken: Option<std::io::Error> = None;
    while let Ok(task) = tasks.recv() {
        let Some(slot) = task.slot else {
            break;
        };
        if broken.is_some() {
            S::fulfill(slot, Err(Error::child("child stdin closed early")));
            continue;
        }
        let _ = pending.send(Some(slot));
        if let Err(e) = write_line(&mut stdin, &task.line) {
            broken = Some(e);
        }
    }
    let _ = pending.send(None);
    if broken.is_none() {
        stdin.flush().context("flushing child stdin")?;
    }
    drop(stdin);
    match broken {
        Some(e) => Err(e).context("writing to child stdin"),
        None => Ok(()),
    }
}

fn write_line(stdin: &mut impl Write, line: &[u8]) -> std::io::Result<()> {
    stdin.write_all(line)?;
    stdin.write_all(b"\n")
}

/// Collector: child stdout to slots, in dispatch order. Errors are
/// captured into the affected slot and re-raised by the writer.
fn collect<S: Slot>(stdout: ChildStdout, pending: Receiver<Option<S::Writer>>) {
    let mut stdout = BufReader::new(stdout);
    let mut line = Vec::new();
    while let Ok(Some(slot)) = pending.recv() {
        line.clear();
        match stdout.read_until(b'\n', &mut line) {
            Ok(0) => S::fulfill(
                slot,
                Err(Error::child("child closed stdout with input pending")),
            ),
            Ok(_) => {
                if line.last() == Some(&b'\n') {
                    line.pop();
                }
                S::fulfill(slot, Ok(line.clone()));
            }
            Err(e) => S::fulfill(slot, Err(e.into())),
        }
    }
}

/// Reader: input lines to tasks and slot read ends. Runs on the
/// calling thread.
fn read_input<S: Slot>(
    mut input: impl BufRead,
    tasks: &Sender<Task<S>>,
    slots: &Sender<Option<S::Reader>>,
) -> Result<()> {
    let mut line = Vec::new();
    loop {
        line.clear();
        let got = input.read_until(b'\n', &mut line)?;
        if got == 0 {
            return Ok(());
        }
        if line.last() == Some(&b'\n') {
            line.pop();
        }
        let (writer, reader) = S::pair();
        // Slot first, then task: the writer must see slots in the
        // exact order tasks were dispatched.
        if slots.send(Some(reader)).is_err() {
            return Err(anyhow!("output writer stopped early"));
        }
        if tasks
            .send(Task {
                line: line.clone(),
                slot: Some(writer),
            })
            .is_err()
        {
            return Err(anyhow!("all workers stopped early"));
        }
    }
}

/// Writer thread: drain slots in input order.
fn write_output<S: Slot>(
    slots: Receiver<Option<S::Reader>>,
    output: impl Write,
) -> Result<()> {
    let mut out = BufWriter::new(output);
    while let Ok(Some(reader)) = slots.recv() {
        let value = S::wait(reader)?;
        out.write_all(&value)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

/// Run the pipeline: `input` lines through `n_workers` copies of
/// `argv`, outputs to `output` in input order. Returns the worst child
/// exit code.
pub fn run<S: Slot>(
    n_workers: usize,
    argv: &[String],
    input: impl BufRead,
    output: impl Write + Send + 'static,
) -> Result<i32> {
    let n_workers = n_workers.max(1);
    let (task_tx, task_rx) = bounded::<Task<S>>(n_workers);
    let (slot_tx, slot_rx) = unbounded::<Option<S::Reader>>();

    let mut workers = Vec::with_capacity(n_workers);
    for _ in 0..n_workers {
        workers.push(Worker::launch::<S>(task_rx.clone(), argv)?);
    }
    let writer = thread::spawn(move || write_output::<S>(slot_rx, output));

    let read_result = read_input::<S>(input, &task_tx, &slot_tx);

    // One sentinel per worker, then release the writer.
    for _ in 0..n_workers {
        let _ = task_tx.send(Task {
            line: Vec::new(),
            slot: None,
        });
    }
    let _ = slot_tx.send(None);

    let mut exit_code = 0;
    let mut first_error = read_result.err();
    for worker in workers {
        match worker.join() {
            Ok(code) => exit_code = exit_code.max(code),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }
    match writer.join().map_err(|_| anyhow!("writer thread panicked")) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            first_error.get_or_insert(e);
        }
        Err(e) => {
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(exit_code),
    }
}

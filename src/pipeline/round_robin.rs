//! Round-robin line pipeline, the simple cousin of the slot design.
//!
//! Line *i* goes to worker *i mod n*; because the assignment is fixed,
//! blocking pipe I/O is the only synchronization needed and memory use
//! stays minimal. The catch: this is correct only when the child is
//! strictly line-synchronous. If a child buffers many inputs before
//! producing output, the output thread can block on worker A while the
//! reader blocks writing to worker B, and nothing ever drains - a
//! deadlock. When it does work (most line-based filters) it is lighter
//! and often faster than the queue designs, but the slot pipeline is
//! the safer default.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::process::{Child, ChildStdin, ChildStdout};
use std::thread;

use anyhow::{anyhow, Context, Result};

use crate::pipeline::child::{launch, wait_exit, CaptiveChild};

struct Worker {
    stdin: Option<BufWriter<ChildStdin>>,
    child: Child,
}

/// Output thread: poll the workers' stdouts in the same round-robin
/// order the reader used, so output order matches input order by
/// construction.
fn write_output(stdouts: Vec<ChildStdout>, output: impl Write) -> Result<()> {
    let mut out = BufWriter::new(output);
    let mut readers: Vec<BufReader<ChildStdout>> =
        stdouts.into_iter().map(BufReader::new).collect();
    let mut done = vec![false; readers.len()];
    let mut open = readers.len();
    let mut lineno = 0usize;
    let mut line = Vec::new();

    while open > 0 {
        let i = lineno % readers.len();
        lineno += 1;
        if done[i] {
            continue;
        }
        line.clear();
        if readers[i].read_until(b'\n', &mut line)? == 0 {
            done[i] = true;
            open -= 1;
            continue;
        }
        if line.last() != Some(&b'\n') {
            line.push(b'\n');
        }
        out.write_all(&line)?;
    }
    out.flush()?;
    Ok(())
}

/// Run the round-robin pipeline. Returns the worst child exit code.
pub fn run(
    n_workers: usize,
    argv: &[String],
    input: impl BufRead,
    output: impl Write + Send + 'static,
) -> Result<i32> {
    let n_workers = n_workers.max(1);
    let mut workers = Vec::with_capacity(n_workers);
    let mut stdouts = Vec::with_capacity(n_workers);
    for _ in 0..n_workers {
        let CaptiveChild {
            stdin,
            stdout,
            child,
        } = launch(argv)?;
        workers.push(Worker {
            stdin: Some(BufWriter::new(stdin)),
            child,
        });
        stdouts.push(stdout);
    }

    let writer = thread::spawn(move || write_output(stdouts, output));

    // Deal each line to the workers in turn.
    let mut input = input;
    let mut line = Vec::new();
    let mut lineno = 0usize;
    loop {
        line.clear();
        if input.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        if line.last() != Some(&b'\n') {
            line.push(b'\n');
        }
        let stdin = workers[lineno % n_workers]
            .stdin
            .as_mut()
            .expect("stdin open until EOF");
        stdin.write_all(&line).context("writing to child stdin")?;
        lineno += 1;
    }

    // Close all worker inputs; the children drain and exit.
    for worker in &mut workers {
        if let Some(mut stdin) = worker.stdin.take() {
            stdin.flush().context("flushing child stdin")?;
        }
    }

    let mut exit_code = 0;
    for worker in workers {
        exit_code = exit_code.max(wait_exit(worker.child)?);
    }
    writer
        .join()
        .map_err(|_| anyhow!("output thread panicked"))??;
    Ok(exit_code)
}

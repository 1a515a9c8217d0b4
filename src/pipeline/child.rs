//! Launching and reaping captive child processes.
//!
//! A worker child is spawned with both standard streams piped; the
//! pipe ends are handed to dedicated feeder and collector threads and
//! the [`Child`] handle goes to whoever is responsible for reaping.

use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use crate::error::{Error, Result};

/// A freshly launched worker with its pipe ends detached.
pub struct CaptiveChild {
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub child: Child,
}

/// Launch `argv` with piped stdin and stdout; stderr is inherited so
/// worker diagnostics reach the terminal.
pub fn launch(argv: &[String]) -> Result<CaptiveChild> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| Error::child("empty child command line"))?;
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|e| Error::child(format!("failed to launch `{program}`: {e}")))?;
    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| Error::child("child stdin was not piped"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::child("child stdout was not piped"))?;
    Ok(CaptiveChild {
        stdin,
        stdout,
        child,
    })
}

/// Wait for a child and return its exit code. Termination by signal
/// (no exit code) is an error: the pipeline must not pretend a killed
/// worker finished its share of the input.
pub fn wait_exit(mut child: Child) -> Result<i32> {
    let status = child.wait()?;
    match status.code() {
        Some(code) => Ok(code),
        None => Err(Error::child(format!(
            "child terminated abnormally: {status}"
        ))),
    }
}

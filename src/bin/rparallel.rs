//! Round-robin line parallelizer.
//!
//! Lines go to workers in strict rotation and blocking pipe I/O is the
//! only synchronization. Light and fast, but only safe with strictly
//! line-synchronous children; see the library docs for the deadlock
//! hazard. Prefer sparallel when in doubt.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use corpusflow::pipeline::round_robin;

/// Feed stdin lines through parallel copies of a child command,
/// round-robin style.
#[derive(Parser)]
#[command(name = "rparallel", version)]
struct Args {
    /// Number of worker child processes.
    #[arg(short = 'j', long = "jobs", default_value_t = num_cpus::get())]
    jobs: usize,

    /// Child command and its arguments.
    #[arg(required = true, allow_hyphen_values = true, trailing_var_arg = true)]
    command: Vec<String>,
}

fn run(args: Args) -> Result<i32> {
    round_robin::run(
        args.jobs,
        &args.command,
        std::io::stdin().lock(),
        std::io::stdout(),
    )
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    match run(Args::parse()) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("rparallel: {e:#}");
            std::process::exit(1);
        }
    }
}

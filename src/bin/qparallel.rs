//! Order-preserving line parallelizer, swap-cell variant.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use corpusflow::pipeline::line;
use corpusflow::pipeline::slot::SwapSlot;

/// Feed stdin lines through parallel copies of a child command,
/// writing their outputs to stdout in input order.
#[derive(Parser)]
#[command(name = "qparallel", version)]
struct Args {
    /// Number of worker child processes.
    #[arg(short = 'j', long = "jobs", default_value_t = num_cpus::get())]
    jobs: usize,

    /// Child command and its arguments.
    #[arg(required = true, allow_hyphen_values = true, trailing_var_arg = true)]
    command: Vec<String>,
}

fn run(args: Args) -> Result<i32> {
    line::run::<SwapSlot>(
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
            eprintln!("qparallel: {e:#}");
            std::process::exit(1);
        }
    }
}

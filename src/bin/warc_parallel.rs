//! Parallelize WARC-to-WARC processing by wrapping a child command.
//!
//! The child is expected to take WARC on stdin and produce WARC on
//! stdout. Records from several inputs are read in parallel and
//! jumbled together; use `--` to separate input files from the child
//! command line.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use corpusflow::io::split::{RecordWrite, SplitWriter, StreamOut};
use corpusflow::pipeline::warc;

/// Example that just copies records through: `warc-parallel cat`.
/// With input files: `warc-parallel -i a.warc b.warc -- ./process.sh`.
#[derive(Parser)]
#[command(name = "warc-parallel", version)]
struct Args {
    /// Input files, read in parallel and jumbled together; stdin when
    /// omitted.
    #[arg(short = 'i', long = "inputs", num_args = 1..)]
    inputs: Vec<PathBuf>,

    /// Output file name, or a shard template whose run of X-es is
    /// replaced by the shard number.
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Number of worker child processes.
    #[arg(short = 'j', long = "jobs", default_value_t = num_cpus::get())]
    jobs: usize,

    /// Compress output records in gzip format.
    #[arg(short = 'z', long = "gzip")]
    gzip: bool,

    /// Maximum file size per output shard.
    #[arg(short = 'b', long = "bytes", default_value_t = 1024 * 1024 * 1024)]
    bytes: u64,

    /// Child command; separate it from the inputs with `--`.
    #[arg(required = true, allow_hyphen_values = true, trailing_var_arg = true)]
    command: Vec<String>,
}

fn run(args: Args) -> Result<i32> {
    let output: Box<dyn RecordWrite> = match &args.output {
        None => Box::new(StreamOut::new(std::io::stdout())),
        Some(template) if template.contains('X') => {
            Box::new(SplitWriter::new(template, args.bytes)?)
        }
        Some(path) => Box::new(StreamOut::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {path}"))?,
        ))),
    };
    warc::run(&args.inputs, output, args.jobs, args.gzip, &args.command)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    match run(Args::parse()) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("warc-parallel: {e:#}");
            std::process::exit(1);
        }
    }
}

//! Merge already-sorted delimited text files under `sort`-style keys.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use corpusflow::sort::{merge, parse_range, LineParser, MergeSource};

/// Merge pre-sorted inputs into one sorted stream.
///
/// Every input must already be sorted under the same keys; the merge
/// is stable, so ties keep their input order.
#[derive(Parser)]
#[command(name = "merge-sort", version)]
struct Args {
    /// Sort key range `BEGIN(,END)?[n][r]`; repeatable.
    #[arg(short = 'k', long = "key", default_value = "1,")]
    keys: Vec<String>,

    /// Field separator (a single byte).
    #[arg(short = 't', long = "field-separator", default_value = "\t")]
    delimiter: String,

    /// Output file, `-` for stdout.
    #[arg(short = 'o', long = "output", default_value = "-")]
    output: String,

    /// Read input file names from this file, `-` for stdin.
    #[arg(short = 'f', long = "files-from")]
    files_from: Option<String>,

    /// Input files.
    files: Vec<String>,
}

fn read_file_list(source: &str, files: &mut Vec<String>) -> Result<()> {
    let reader: Box<dyn BufRead> = if source == "-" {
        Box::new(BufReader::new(std::io::stdin()))
    } else {
        Box::new(BufReader::new(
            File::open(source).with_context(|| format!("opening file list {source}"))?,
        ))
    };
    for line in reader.lines() {
        let name = line?;
        if !name.trim().is_empty() {
            files.push(name);
        }
    }
    Ok(())
}

fn run(args: Args) -> Result<()> {
    let delimiter = match args.delimiter.as_bytes() {
        [byte] => *byte,
        _ => bail!("field separator must be a single byte"),
    };
    let ranges = args
        .keys
        .iter()
        .map(|key| Ok(parse_range(key)?))
        .collect::<Result<Vec<_>>>()?;
    let parser = LineParser::new(ranges, delimiter);

    let mut files = args.files;
    if let Some(list) = &args.files_from {
        read_file_list(list, &mut files)?;
    }

    let sources = files
        .iter()
        .map(|name| MergeSource::open(&parser, name))
        .collect::<Result<Vec<_>>>()?;

    let out: Box<dyn Write> = if args.output == "-" {
        Box::new(std::io::stdout().lock())
    } else {
        Box::new(
            File::create(&args.output)
                .with_context(|| format!("creating {}", args.output))?,
        )
    };
    merge(&parser, sources, out)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    if let Err(e) = run(Args::parse()) {
        eprintln!("merge-sort: {e:#}");
        std::process::exit(1);
    }
}

//! K-way merge driver over per-input cursors.

use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::io::decompress::DecompressReader;
use crate::sort::compare::compare_keys;
use crate::sort::key::{FieldSpan, LineParser};

/// One sorted input: the current line, its parsed key, and the
/// backing reader. Inputs are read through the decompressor, so
/// compressed sorted files work transparently.
pub struct MergeSource {
    name: String,
    backing: BufReader<DecompressReader>,
    line: Vec<u8>,
    fields: Vec<FieldSpan>,
    lineno: u64,
    eof: bool,
}

impl MergeSource {
    /// Open a file (or stdin for `-`) and position on its first line.
    pub fn open(parser: &LineParser, name: &str) -> Result<Self> {
        let reader = if name == "-" {
            DecompressReader::new(std::io::stdin())
        } else {
            DecompressReader::open(Path::new(name))
        }
        .with_context(|| format!("opening {name}"))?;
        let mut source = MergeSource {
            name: name.to_string(),
            backing: BufReader::new(reader),
            line: Vec::new(),
            fields: Vec::new(),
            lineno: 0,
            eof: false,
        };
        source.advance(parser)?;
        Ok(source)
    }

    /// Move to the next line and parse its key.
    pub fn advance(&mut self, parser: &LineParser) -> Result<()> {
        self.line.clear();
        let got = self
            .backing
            .read_until(b'\n', &mut self.line)
            .with_context(|| format!("reading {}", self.name))?;
        if got == 0 {
            self.eof = true;
            return Ok(());
        }
        if self.line.last() == Some(&b'\n') {
            self.line.pop();
        }
        self.lineno += 1;
        parser
            .parse(&self.line, &mut self.fields)
            .with_context(|| format!("parse error on line {} of {}", self.lineno, self.name))
    }

    pub fn eof(&self) -> bool {
        self.eof
    }

    pub fn line(&self) -> &[u8] {
        &self.line
    }

    pub fn fields(&self) -> &[FieldSpan] {
        &self.fields
    }
}

/// Merge already-sorted sources into `out`. At every step the emitted
/// line is the minimum of the current heads, with ties broken by input
/// order, so the merge is stable within equal keys.
pub fn merge(parser: &LineParser, mut sources: Vec<MergeSource>, out: impl Write) -> Result<()> {
    let mut out = std::io::BufWriter::new(out);
    loop {
        let mut best: Option<usize> = None;
        for (i, source) in sources.iter().enumerate() {
            if source.eof() {
                continue;
            }
            best = match best {
                None => Some(i),
                Some(b) => {
                    let current = &sources[b];
                    if compare_keys(
                        current.line(),
                        current.fields(),
                        source.line(),
                        source.fields(),
                    ) == std::cmp::Ordering::Greater
                    {
                        Some(i)
                    } else {
                        Some(b)
                    }
                }
            };
        }
        let Some(best) = best else {
            break;
        };
        out.write_all(sources[best].line())?;
        out.write_all(b"\n")?;
        sources[best].advance(parser)?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sort::key::parse_range;
    use tempfile::NamedTempFile;

    fn write_temp(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn merges_two_sorted_inputs() {
        // Sorted by -k 2,2n -k 1,1r -t ,
        let f1 = write_temp("b,2\na,3\n");
        let f2 = write_temp("c,1\nb,2\n");
        let parser = LineParser::new(
            vec![parse_range("2,2n").unwrap(), parse_range("1,1r").unwrap()],
            b',',
        );
        let sources = vec![
            MergeSource::open(&parser, f1.path().to_str().unwrap()).unwrap(),
            MergeSource::open(&parser, f2.path().to_str().unwrap()).unwrap(),
        ];
        let mut out = Vec::new();
        merge(&parser, sources, &mut out).unwrap();
        assert_eq!(out, b"c,1\nb,2\nb,2\na,3\n");
    }

    #[test]
    fn merge_of_merged_output_is_identity() {
        let merged = "a\tx\nb\ty\nc\tz\n";
        let file = write_temp(merged);
        let parser = LineParser::new(vec![parse_range("1,").unwrap()], b'\t');
        let sources =
            vec![MergeSource::open(&parser, file.path().to_str().unwrap()).unwrap()];
        let mut out = Vec::new();
        merge(&parser, sources, &mut out).unwrap();
        assert_eq!(out, merged.as_bytes());
    }
}

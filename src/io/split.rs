//! Size-capped output sharding under an `X`-run name template.
//!
//! A template like `shard-XXX.warc.gz` names a sequence of files
//! `shard-000.warc.gz`, `shard-001.warc.gz`, ... The writer opens
//! files lazily and rolls over before a write that would push the
//! current file past its byte limit, so a record is never split
//! across two files.

use std::fs::File;
use std::io::{BufWriter, Write};

use tracing::debug;

use crate::error::{Error, Result};

/// A path containing a run of `X` characters to be replaced by a
/// zero-padded decimal counter.
#[derive(Debug, Clone)]
pub struct NameTemplate {
    prefix: String,
    suffix: String,
    width: usize,
}

impl NameTemplate {
    /// Parse a template. The last run of `X`s in the name is the
    /// counter field; its length sets the zero padding.
    pub fn parse(template: &str) -> Result<Self> {
        let end = template
            .rfind('X')
            .ok_or_else(|| Error::Template(template.to_string()))?;
        let mut start = end;
        while start > 0 && template.as_bytes()[start - 1] == b'X' {
            start -= 1;
        }
        Ok(NameTemplate {
            prefix: template[..start].to_string(),
            suffix: template[end + 1..].to_string(),
            width: 1 + end - start,
        })
    }

    /// Render the file name for shard `n`.
    pub fn format(&self, n: usize) -> String {
        format!(
            "{}{:0width$}{}",
            self.prefix,
            n,
            self.suffix,
            width = self.width
        )
    }
}

/// A sink for complete records; each call lands in exactly one file.
pub trait RecordWrite: Send {
    fn write_record(&mut self, data: &[u8]) -> Result<()>;

    /// Flush buffered output once the pipeline is done writing.
    fn finish(&mut self) -> Result<()>;
}

/// Forward whole records to any byte sink (stdout, a single file).
pub struct StreamOut<W: Write + Send> {
    inner: W,
}

impl<W: Write + Send> StreamOut<W> {
    pub fn new(inner: W) -> Self {
        StreamOut { inner }
    }
}

impl<W: Write + Send> RecordWrite for StreamOut<W> {
    fn write_record(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write_all(data)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

/// Writes at most `bytes_limit` bytes per file, moving to the next
/// name in the template sequence on rollover.
pub struct SplitWriter {
    template: NameTemplate,
    bytes_limit: u64,
    file_n: usize,
    current: Option<BufWriter<File>>,
    bytes_written: u64,
}

impl SplitWriter {
    pub fn new(template: &str, bytes_limit: u64) -> Result<Self> {
        Ok(SplitWriter {
            template: NameTemplate::parse(template)?,
            bytes_limit,
            file_n: 0,
            current: None,
            bytes_written: 0,
        })
    }

    fn open_next(&mut self) -> Result<()> {
        let name = self.template.format(self.file_n);
        self.file_n += 1;
        debug!(%name, "opening output shard");
        // Finish the previous file before the new one takes over.
        if let Some(mut old) = self.current.take() {
            old.flush()?;
        }
        self.current = Some(BufWriter::new(File::create(&name)?));
        self.bytes_written = 0;
        Ok(())
    }
}

impl RecordWrite for SplitWriter {
    fn write_record(&mut self, data: &[u8]) -> Result<()> {
        // First write, or a write that would push past the limit.
        if self.current.is_none() || self.bytes_written + data.len() as u64 > self.bytes_limit {
            self.open_next()?;
        }
        let out = self.current.as_mut().expect("shard opened above");
        out.write_all(data)?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(out) = self.current.as_mut() {
            out.flush()?;
        }
        Ok(())
    }
}

impl Drop for SplitWriter {
    fn drop(&mut self) {
        if let Some(mut out) = self.current.take() {
            let _ = out.flush();
        }
    }
}

//! WARC/1.0 record framing over the streaming decompressor.
//!
//! [`WarcReader::read`] yields one [`Record`] per call. A record is a
//! complete byte image (header lines, blank separator, body, trailing
//! CRLF CRLF); when the reader has to throw bytes away to get back to
//! a record boundary it instead yields an empty payload with a
//! non-zero `skipped` count, so downstream can audit every elided gap.
//!
//! Framing violations are handled by scanning forward for the next
//! `WARC/1.0` token; decode errors from the compressed layer are
//! handled by jumping to the next sidecar-index offset when an index
//! is present, or to the next xz magic otherwise.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use memchr::{memchr, memmem};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::io::decompress::DecompressReader;

/// Header reads grow the record buffer in chunks of this size.
const HEADER_READ: usize = 4096;
/// Scratch size for discarding oversize record bodies.
const DISCARD_CHUNK: usize = 32768;
/// Bytes kept across refills when scanning for a record boundary, so a
/// token spanning two reads is still found.
const SCAN_TAIL: usize = 8;

const VERSION_TOKEN: &[u8] = b"WARC/1.0";
const CONTENT_LENGTH: &[u8] = b"content-length:";

/// One framed WARC record, or an elided gap.
///
/// `payload` is either a complete record image ending in `\r\n\r\n`,
/// or empty with `skipped > 0` when bytes were discarded for recovery
/// or because the record exceeded the caller's size limit.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Record {
    /// Bytes discarded before (or instead of) this record.
    pub skipped: u64,
    /// Complete record bytes; empty for a gap.
    pub payload: Vec<u8>,
}

/// Framed-record reader over a [`DecompressReader`].
pub struct WarcReader {
    reader: DecompressReader,
    /// Bytes read past the previous record's end, prepended to the
    /// next record. Swapped in and out of the record buffer so that
    /// over-reads are never lost.
    overhang: Vec<u8>,
    /// Sorted compressed-byte offsets from the sidecar index; empty
    /// when no index was found.
    index: Vec<u64>,
}

impl WarcReader {
    /// Frame records from an already-open decompressor. No sidecar
    /// index is available on this path.
    pub fn new(reader: DecompressReader) -> Self {
        WarcReader {
            reader,
            overhang: Vec::new(),
            index: Vec::new(),
        }
    }

    /// Open a WARC file, together with its sidecar offset index if one
    /// exists next to it (`foo.warc.gz` -> `foo.txt`).
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = DecompressReader::open(path)?;
        let index = match load_index(&index_path(path)) {
            Ok(index) => index,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable sidecar index");
                Vec::new()
            }
        };
        Ok(WarcReader {
            reader,
            overhang: Vec::new(),
            index,
        })
    }

    /// Read the next record. Records whose total framed size exceeds
    /// `size_limit` are discarded and reported as a gap. Returns `None`
    /// at true end of input.
    pub fn read(&mut self, size_limit: usize) -> Result<Option<Record>> {
        let mut buf = std::mem::take(&mut self.overhang);
        match self.read_record(&mut buf, size_limit) {
            Ok(record) => Ok(record),
            Err(Error::Framing(reason)) => {
                debug!(%reason, "framing error, scanning for the next record");
                self.recover_framing(buf).map(Some)
            }
            Err(Error::Decode(reason)) => {
                debug!(%reason, "decode error, jumping forward");
                let skipped = if self.index.is_empty() {
                    self.reader.skip()?
                } else {
                    self.reader.skip_to(&self.index)?
                };
                warn!(skipped, "skipped undecodable input");
                Ok(Some(Record {
                    skipped,
                    payload: Vec::new(),
                }))
            }
            Err(e) => Err(e),
        }
    }

    /// Compressed bytes consumed from the underlying source.
    pub fn raw_read(&self) -> u64 {
        self.reader.raw_read()
    }

    fn read_record(&mut self, buf: &mut Vec<u8>, size_limit: usize) -> Result<Option<Record>> {
        let mut header = HeaderLines::new(buf);

        // Leading blank lines are tolerated; the first real line must
        // be the version token.
        let version = loop {
            match header.line(&mut self.reader)? {
                None if header.at_clean_boundary() => return Ok(None),
                None => {
                    return Err(Error::UnexpectedEof("inside a record header".into()));
                }
                Some(line) if line.is_empty() => continue,
                Some(line) => break line,
            }
        };
        if version != VERSION_TOKEN {
            return Err(Error::framing(format!(
                "expected WARC/1.0 but got `{}`",
                String::from_utf8_lossy(&version)
            )));
        }

        let mut body_length: Option<u64> = None;
        loop {
            let line = header
                .line(&mut self.reader)?
                .ok_or_else(|| Error::UnexpectedEof("inside a record header".into()))?;
            if line.is_empty() {
                break;
            }
            if line.len() >= CONTENT_LENGTH.len()
                && line[..CONTENT_LENGTH.len()].eq_ignore_ascii_case(CONTENT_LENGTH)
            {
                if body_length.is_some() {
                    return Err(Error::framing("two Content-Length headers"));
                }
                body_length = Some(parse_content_length(&line[CONTENT_LENGTH.len()..])?);
            }
        }
        let body_length = body_length
            .ok_or_else(|| Error::framing("record header has no Content-Length"))?;

        let consumed = header.consumed();
        let total = consumed as u64 + body_length + 4; // CRLF CRLF trailer

        if (buf.len() as u64) > total {
            // The header read over-scanned into the next record; park
            // the tail for the following call.
            self.overhang = buf.split_off(total as usize);
        } else if total > size_limit as u64 {
            debug!(total, size_limit, "discarding oversize record");
            self.discard(total - buf.len() as u64)?;
            buf.clear();
            return Ok(Some(Record {
                skipped: total,
                payload: Vec::new(),
            }));
        } else {
            let start = buf.len();
            buf.resize(total as usize, 0);
            let mut filled = start;
            while filled < buf.len() {
                let got = self.reader.read(&mut buf[filled..])?;
                if got == 0 {
                    return Err(Error::UnexpectedEof(format!(
                        "while reading a record body of length {body_length}"
                    )));
                }
                filled += got;
            }
        }

        if !buf.ends_with(b"\r\n\r\n") {
            return Err(Error::framing("record does not end in CRLF CRLF"));
        }
        Ok(Some(Record {
            skipped: 0,
            payload: std::mem::take(buf),
        }))
    }

    /// Read and throw away `amount` decompressed bytes.
    fn discard(&mut self, mut amount: u64) -> Result<()> {
        let mut scratch = vec![0u8; DISCARD_CHUNK];
        while amount > 0 {
            let want = scratch.len().min(amount as usize);
            let got = self.reader.read(&mut scratch[..want])?;
            if got == 0 {
                return Err(Error::UnexpectedEof(
                    "while discarding an oversize record".into(),
                ));
            }
            amount -= got as u64;
        }
        Ok(())
    }

    /// Scan forward from a broken record start to the next `WARC/1.0`
    /// token. Bytes before the token are reported as skipped; the
    /// token and everything after it become the next record's lead-in.
    fn recover_framing(&mut self, mut buf: Vec<u8>) -> Result<Record> {
        // A trailer failure may already have parked overhang; reclaim
        // it so the scan sees one contiguous window.
        buf.append(&mut self.overhang);
        let mut skipped = 0u64;
        // Start one byte in so a token at the broken record's own
        // start is not immediately re-found.
        let mut from = 1usize.min(buf.len());
        loop {
            if let Some(pos) = memmem::find(&buf[from..], VERSION_TOKEN) {
                let at = from + pos;
                skipped += at as u64;
                self.overhang = buf.split_off(at);
                warn!(skipped, "skipped to the next record boundary");
                return Ok(Record {
                    skipped,
                    payload: Vec::new(),
                });
            }
            // Keep a short tail in case the token spans this refill.
            let keep = buf.len().min(SCAN_TAIL);
            let discard = buf.len() - keep;
            skipped += discard as u64;
            buf.drain(..discard);
            from = 0;

            let start = buf.len();
            buf.resize(start + HEADER_READ, 0);
            let got = self.reader.read(&mut buf[start..])?;
            buf.truncate(start + got);
            if got == 0 {
                skipped += buf.len() as u64;
                warn!(skipped, "no further record boundary before end of input");
                return Ok(Record {
                    skipped,
                    payload: Vec::new(),
                });
            }
        }
    }
}

/// Incremental line splitter over the record buffer. Lines are
/// returned without their terminator; a trailing `\r` is stripped.
struct HeaderLines<'a> {
    buf: &'a mut Vec<u8>,
    consumed: usize,
    seen_non_blank: bool,
}

impl<'a> HeaderLines<'a> {
    fn new(buf: &'a mut Vec<u8>) -> Self {
        HeaderLines {
            buf,
            consumed: 0,
            seen_non_blank: false,
        }
    }

    /// Bytes consumed through the most recent line's terminator.
    fn consumed(&self) -> usize {
        self.consumed
    }

    /// True when the input so far is only fully-consumed blank lines,
    /// so end of input here is a clean boundary rather than a
    /// truncated record.
    fn at_clean_boundary(&self) -> bool {
        !self.seen_non_blank && self.consumed == self.buf.len()
    }

    /// Next header line, reading more input as needed. `None` at end
    /// of input before any terminator.
    fn line(&mut self, reader: &mut DecompressReader) -> Result<Option<Vec<u8>>> {
        let newline = loop {
            if let Some(pos) = memchr(b'\n', &self.buf[self.consumed..]) {
                break self.consumed + pos;
            }
            let start = self.buf.len();
            self.buf.resize(start + HEADER_READ, 0);
            let got = reader.read(&mut self.buf[start..])?;
            self.buf.truncate(start + got);
            if got == 0 {
                return Ok(None);
            }
        };
        let mut line = self.buf[self.consumed..newline].to_vec();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if !line.is_empty() {
            self.seen_non_blank = true;
        }
        self.consumed = newline + 1;
        Ok(Some(line))
    }
}

/// Parse the value of a `Content-Length` header: optional leading
/// whitespace, then a decimal integer, with nothing after it.
fn parse_content_length(value: &[u8]) -> Result<u64> {
    let text = std::str::from_utf8(value)
        .map_err(|_| Error::framing("Content-Length is not ASCII"))?
        .trim_start_matches([' ', '\t']);
    text.parse().map_err(|_| {
        Error::framing(format!("Content-Length parse error in `{text}`"))
    })
}

/// Sidecar index path: the name with its `.warc[.<ext>]` suffix
/// replaced by `.txt`.
fn index_path(path: &Path) -> PathBuf {
    let name = path.file_name().and_then(|n| n.to_str());
    match name.and_then(|n| n.find(".warc").map(|at| &n[..at])) {
        Some(base) => path.with_file_name(format!("{base}.txt")),
        None => path.with_extension("txt"),
    }
}

/// Load a sidecar index: one decimal compressed-byte offset per line.
/// A missing file is an empty index; malformed lines are skipped.
fn load_index(path: &Path) -> Result<Vec<u64>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut offsets = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.parse::<u64>() {
            Ok(offset) => offsets.push(offset),
            Err(_) => warn!(path = %path.display(), %line, "ignoring malformed index line"),
        }
    }
    offsets.sort_unstable();
    Ok(offsets)
}

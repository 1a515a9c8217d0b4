//! Streaming decompression with codec auto-detection.
//!
//! [`DecompressReader`] reads gzip, bzip2, xz, or plain bytes from any
//! source, picking the codec by leading magic bytes. Concatenated
//! streams are transparent: when a codec reports end-of-stream with
//! input left over, a fresh decoder is built on the residue and reading
//! continues, so `read` returns 0 only at true end of input. The
//! residue may even be an uncompressed tail after a compressed leader.
//!
//! Two forward-only skip primitives support error recovery in callers:
//! [`DecompressReader::skip`] scans for the next xz magic, and
//! [`DecompressReader::skip_to`] jumps to the next offset from a
//! sidecar index. Both discard compressed bytes and restart a fresh
//! decoder; the reader itself never retries a failed decode.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use flate2::{Decompress as GzDecompress, FlushDecompress, Status as GzStatus};
use memchr::memmem;

use crate::error::{Error, Result};

/// Longest magic prefix we need to see to pick a codec (xz, 6 bytes).
pub const MAGIC_LEN: usize = 6;

/// Compressed input is read in chunks of this size.
const INPUT_BUFFER: usize = 16384;

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const BZIP2_MAGIC: &[u8] = b"BZh";
const XZ_MAGIC: &[u8] = &[0xfd, b'7', b'z', b'X', b'Z', 0x00];

type Source = Box<dyn Read + Send>;

/// One streaming step of a codec: how much input it ate, how much
/// output it produced, and whether its stream ended.
struct Step {
    consumed: usize,
    produced: usize,
    end: bool,
}

/// Incremental decoder over caller-managed buffers.
///
/// Implementations wrap the low-level streaming state of their codec
/// crate; `step` may make no progress when it needs more input.
trait Codec: Send {
    fn step(&mut self, input: &[u8], output: &mut [u8], input_done: bool) -> Result<Step>;
}

struct GzipCodec {
    inner: GzDecompress,
}

impl GzipCodec {
    fn new() -> Self {
        // Window bits 15 with gzip wrapping; the zlib backend handles
        // the member header and trailer.
        GzipCodec {
            inner: GzDecompress::new_gzip(15),
        }
    }
}

impl Codec for GzipCodec {
    fn step(&mut self, input: &[u8], output: &mut [u8], _input_done: bool) -> Result<Step> {
        let before_in = self.inner.total_in();
        let before_out = self.inner.total_out();
        let status = self
            .inner
            .decompress(input, output, FlushDecompress::None)
            .map_err(|e| Error::decode(format!("gzip: {e}")))?;
        Ok(Step {
            consumed: (self.inner.total_in() - before_in) as usize,
            produced: (self.inner.total_out() - before_out) as usize,
            end: status == GzStatus::StreamEnd,
        })
    }
}

struct Bzip2Codec {
    inner: bzip2::Decompress,
}

impl Bzip2Codec {
    fn new() -> Self {
        Bzip2Codec {
            inner: bzip2::Decompress::new(false),
        }
    }
}

impl Codec for Bzip2Codec {
    fn step(&mut self, input: &[u8], output: &mut [u8], _input_done: bool) -> Result<Step> {
        let before_in = self.inner.total_in();
        let before_out = self.inner.total_out();
        let status = self
            .inner
            .decompress(input, output)
            .map_err(|e| Error::decode(format!("bzip2: {e}")))?;
        Ok(Step {
            consumed: (self.inner.total_in() - before_in) as usize,
            produced: (self.inner.total_out() - before_out) as usize,
            end: status == bzip2::Status::StreamEnd,
        })
    }
}

struct XzCodec {
    inner: xz2::stream::Stream,
}

impl XzCodec {
    fn new() -> Result<Self> {
        let inner = xz2::stream::Stream::new_stream_decoder(u64::MAX, 0)
            .map_err(|e| Error::decode(format!("xz: {e}")))?;
        Ok(XzCodec { inner })
    }
}

impl Codec for XzCodec {
    fn step(&mut self, input: &[u8], output: &mut [u8], input_done: bool) -> Result<Step> {
        let action = if input_done {
            xz2::stream::Action::Finish
        } else {
            xz2::stream::Action::Run
        };
        let before_in = self.inner.total_in();
        let before_out = self.inner.total_out();
        let status = self
            .inner
            .process(input, output, action)
            .map_err(|e| Error::decode(format!("xz: {e}")))?;
        Ok(Step {
            consumed: (self.inner.total_in() - before_in) as usize,
            produced: (self.inner.total_out() - before_out) as usize,
            end: status == xz2::stream::Status::StreamEnd,
        })
    }
}

/// Result of driving a stream state once.
enum StreamRead {
    /// Produced output; the stream continues.
    Bytes(usize),
    /// The codec hit end-of-stream; residual input stays buffered and
    /// the caller must install a successor decoder.
    End { produced: usize },
}

/// A live codec over one compressed segment of the input.
struct StreamState {
    codec: Box<dyn Codec>,
    source: Source,
    buf: Vec<u8>,
    /// Unconsumed input window is `buf[start..end]`.
    start: usize,
    end: usize,
    source_eof: bool,
}

impl StreamState {
    fn new(codec: Box<dyn Codec>, source: Source, prefix: Vec<u8>) -> Self {
        let mut buf = prefix;
        let end = buf.len();
        if buf.len() < INPUT_BUFFER {
            buf.resize(INPUT_BUFFER, 0);
        }
        StreamState {
            codec,
            source,
            buf,
            start: 0,
            end,
            source_eof: false,
        }
    }

    fn window_len(&self) -> usize {
        self.end - self.start
    }

    /// Compact the window to the front and append more compressed
    /// input, counting it toward `raw`.
    fn fill(&mut self, raw: &mut u64) -> Result<()> {
        if self.start > 0 {
            self.buf.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }
        if self.end == self.buf.len() {
            return Err(Error::decode("decoder stalled with a full input buffer"));
        }
        let got = self.source.read(&mut self.buf[self.end..])?;
        if got == 0 {
            self.source_eof = true;
        } else {
            self.end += got;
            *raw += got as u64;
        }
        Ok(())
    }

    /// Decompress until at least one output byte is available or the
    /// stream ends. Loops over refills so a short `read` on the source
    /// never surfaces as a spurious 0.
    fn read_step(&mut self, out: &mut [u8], raw: &mut u64) -> Result<StreamRead> {
        if out.is_empty() {
            return Ok(StreamRead::Bytes(0));
        }
        let mut produced = 0;
        loop {
            if self.start == self.end && !self.source_eof {
                self.fill(raw)?;
            }
            let step = self.codec.step(
                &self.buf[self.start..self.end],
                &mut out[produced..],
                self.source_eof,
            )?;
            self.start += step.consumed;
            produced += step.produced;
            if step.end {
                return Ok(StreamRead::End { produced });
            }
            if produced > 0 {
                return Ok(StreamRead::Bytes(produced));
            }
            if step.consumed == 0 {
                if self.source_eof {
                    return Err(Error::decode("compressed stream ended unexpectedly"));
                }
                // Partial token in the window; append more input.
                self.fill(raw)?;
            }
        }
    }

    /// Scan forward for the next xz magic, preserving an 8-byte tail
    /// across refills so a magic spanning two reads is still caught.
    /// Returns the discarded byte count and whether a magic was found;
    /// on a hit the window starts exactly at the magic.
    fn seek_magic(&mut self, raw: &mut u64) -> Result<(u64, bool)> {
        let mut skipped = 0u64;
        loop {
            if let Some(pos) = memmem::find(&self.buf[self.start..self.end], XZ_MAGIC) {
                skipped += pos as u64;
                self.start += pos;
                return Ok((skipped, true));
            }
            if self.source_eof {
                skipped += self.window_len() as u64;
                self.start = self.end;
                return Ok((skipped, false));
            }
            let keep = self.window_len().min(8);
            skipped += (self.window_len() - keep) as u64;
            self.start = self.end - keep;
            self.fill(raw)?;
        }
    }

    /// Advance the underlying file to the first index offset strictly
    /// beyond the current compressed position. Returns the number of
    /// compressed bytes stepped over; the window afterwards starts at
    /// the target (or at EOF if the file is shorter).
    fn seek_offset(&mut self, offsets: &[u64], raw: &mut u64) -> Result<u64> {
        let pos = *raw - self.window_len() as u64;
        let target = offsets
            .iter()
            .copied()
            .find(|&offset| offset > pos)
            .ok_or(Error::NoTarget { position: pos })?;

        if target < *raw {
            // Already buffered; just drop the leading part of the window.
            self.start += (target - pos) as usize;
        } else {
            // Read and discard up to the target, reusing the input
            // buffer as scratch.
            self.start = self.end;
            while *raw < target {
                let want = self.buf.len().min((target - *raw) as usize);
                let got = self.source.read(&mut self.buf[..want])?;
                if got == 0 {
                    self.source_eof = true;
                    break;
                }
                *raw += got as u64;
            }
            self.end = self.start;
        }
        Ok((*raw - self.window_len() as u64) - pos)
    }

    fn residual(&self) -> Vec<u8> {
        self.buf[self.start..self.end].to_vec()
    }
}

/// Decoder state, monotone toward `Complete`. A `Stream` may be
/// replaced by a fresh `Stream` or `Passthrough*` when its codec ends,
/// which is how concatenated inputs stay transparent.
enum State {
    Complete,
    Passthrough(Source),
    PassthroughWithPrefix {
        prefix: Vec<u8>,
        pos: usize,
        source: Source,
    },
    Stream(Box<StreamState>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Magic {
    Gzip,
    Bzip2,
    Xz,
}

fn detect_magic(header: &[u8]) -> Option<Magic> {
    if header.starts_with(GZIP_MAGIC) {
        Some(Magic::Gzip)
    } else if header.starts_with(BZIP2_MAGIC) {
        Some(Magic::Bzip2)
    } else if header.starts_with(XZ_MAGIC) {
        Some(Magic::Xz)
    } else {
        None
    }
}

/// Build the state for whatever starts at `prefix ++ source`. Reads at
/// most enough bytes to complete the magic probe; every byte consumed
/// ends up in the successor state, so nothing is lost.
fn new_state(mut source: Source, mut prefix: Vec<u8>, raw: &mut u64) -> Result<State> {
    while prefix.len() < MAGIC_LEN {
        let mut probe = [0u8; MAGIC_LEN];
        let want = MAGIC_LEN - prefix.len();
        let got = source.read(&mut probe[..want])?;
        if got == 0 {
            break;
        }
        *raw += got as u64;
        prefix.extend_from_slice(&probe[..got]);
    }
    if prefix.is_empty() {
        return Ok(State::Complete);
    }
    let codec: Box<dyn Codec> = match detect_magic(&prefix) {
        Some(Magic::Gzip) => Box::new(GzipCodec::new()),
        Some(Magic::Bzip2) => Box::new(Bzip2Codec::new()),
        Some(Magic::Xz) => Box::new(XzCodec::new()?),
        None => {
            return Ok(State::PassthroughWithPrefix {
                prefix,
                pos: 0,
                source,
            })
        }
    };
    Ok(State::Stream(Box::new(StreamState::new(
        codec, source, prefix,
    ))))
}

/// Streaming decoder with codec auto-detection and skip primitives.
///
/// Construction probes the magic bytes immediately, so opening a
/// truncated or unreadable source fails early. [`read`] then behaves
/// like `Read::read` except that it crosses concatenated stream
/// boundaries and distinguishes decode corruption ([`Error::Decode`])
/// from OS failures ([`Error::Io`]).
///
/// [`read`]: DecompressReader::read
pub struct DecompressReader {
    state: State,
    raw_read: u64,
}

impl DecompressReader {
    /// Wrap any byte source, detecting the codec from its first bytes.
    pub fn new<R: Read + Send + 'static>(source: R) -> Result<Self> {
        let mut raw_read = 0;
        let state = new_state(Box::new(source), Vec::new(), &mut raw_read)?;
        Ok(DecompressReader { state, raw_read })
    }

    /// Open a file and wrap it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(File::open(path)?)
    }

    /// Total compressed bytes consumed from the underlying source so
    /// far. This is the offset basis used by WARC sidecar indexes.
    pub fn raw_read(&self) -> u64 {
        self.raw_read
    }

    /// Read decompressed bytes. Returns 0 only at true end of input;
    /// stream boundaries inside concatenated input are invisible.
    pub fn read(&mut self, out: &mut [u8]) -> Result<usize> {
        loop {
            match &mut self.state {
                State::Complete => return Ok(0),
                State::Passthrough(source) => {
                    let got = source.read(out)?;
                    self.raw_read += got as u64;
                    return Ok(got);
                }
                State::PassthroughWithPrefix { prefix, pos, .. } => {
                    let sending = out.len().min(prefix.len() - *pos);
                    out[..sending].copy_from_slice(&prefix[*pos..*pos + sending]);
                    *pos += sending;
                    if *pos == prefix.len() {
                        self.downgrade_prefix();
                    }
                    return Ok(sending);
                }
                State::Stream(stream) => {
                    match stream.read_step(out, &mut self.raw_read)? {
                        StreamRead::Bytes(n) => return Ok(n),
                        StreamRead::End { produced } => {
                            self.install_successor()?;
                            if produced > 0 {
                                return Ok(produced);
                            }
                            // Nothing produced this round; retry on the
                            // successor so callers never see a false EOF.
                        }
                    }
                }
            }
        }
    }

    /// Read until `out` is full or end of input; returns bytes read.
    pub fn read_exact_or_eof(&mut self, out: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < out.len() {
            let got = self.read(&mut out[filled..])?;
            if got == 0 {
                break;
            }
            filled += got;
        }
        Ok(filled)
    }

    /// Discard compressed input up to the next xz magic and restart
    /// decoding there. Returns the number of bytes thrown away; at end
    /// of input without a magic the reader becomes complete and the
    /// whole remainder counts as skipped.
    ///
    /// Only available while a compressed stream is active.
    pub fn skip(&mut self) -> Result<u64> {
        let (skipped, found) = match &mut self.state {
            State::Stream(stream) => stream.seek_magic(&mut self.raw_read)?,
            _ => return Err(Error::Unsupported("skip")),
        };
        if found {
            self.install_successor()?;
        } else {
            self.state = State::Complete;
        }
        Ok(skipped)
    }

    /// Jump to the smallest offset in `offsets` strictly greater than
    /// the current compressed position and restart decoding there.
    /// `offsets` must be sorted ascending. Returns the compressed byte
    /// count skipped, or [`Error::NoTarget`] when no offset lies ahead.
    ///
    /// Only available while a compressed stream is active.
    pub fn skip_to(&mut self, offsets: &[u64]) -> Result<u64> {
        let skipped = match &mut self.state {
            State::Stream(stream) => stream.seek_offset(offsets, &mut self.raw_read)?,
            _ => return Err(Error::Unsupported("skip_to")),
        };
        self.install_successor()?;
        Ok(skipped)
    }

    /// Replace a finished (or abandoned) stream state with whatever the
    /// residual buffered input plus the file says comes next.
    fn install_successor(&mut self) -> Result<()> {
        if let State::Stream(stream) = std::mem::replace(&mut self.state, State::Complete) {
            let residual = stream.residual();
            self.state = new_state(stream.source, residual, &mut self.raw_read)?;
        }
        Ok(())
    }

    /// A drained prefix state becomes a plain passthrough.
    fn downgrade_prefix(&mut self) {
        if let State::PassthroughWithPrefix { source, .. } =
            std::mem::replace(&mut self.state, State::Complete)
        {
            self.state = State::Passthrough(source);
        }
    }
}

impl Read for DecompressReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        DecompressReader::read(self, buf).map_err(|e| match e {
            Error::Io(io) => io,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        })
    }
}

/// Compress a whole buffer as one gzip member.
///
/// Each call yields an independent member, so outputs may be
/// concatenated and still decode as a single stream.
pub fn gz_compress(data: &[u8], level: u32) -> Result<Vec<u8>> {
    use std::io::Write;
    let mut encoder =
        flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::new(level));
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_each_magic() {
        assert_eq!(detect_magic(&[0x1f, 0x8b, 0, 0, 0, 0]), Some(Magic::Gzip));
        assert_eq!(detect_magic(b"BZh91AY"), Some(Magic::Bzip2));
        assert_eq!(
            detect_magic(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]),
            Some(Magic::Xz)
        );
        assert_eq!(detect_magic(b"plain text"), None);
        assert_eq!(detect_magic(&[0x1f]), None);
    }

    #[test]
    fn empty_input_is_complete() {
        let mut reader = DecompressReader::new(io::empty()).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
        assert_eq!(reader.raw_read(), 0);
    }

    #[test]
    fn short_plain_input_passes_through() {
        let mut reader = DecompressReader::new(io::Cursor::new(b"hi".to_vec())).unwrap();
        let mut out = Vec::new();
        Read::read_to_end(&mut reader, &mut out).unwrap();
        assert_eq!(out, b"hi");
        assert_eq!(reader.raw_read(), 2);
    }

    #[test]
    fn skip_unsupported_on_plain_input() {
        let mut reader = DecompressReader::new(io::Cursor::new(b"plain text".to_vec())).unwrap();
        assert!(matches!(reader.skip(), Err(Error::Unsupported(_))));
        assert!(matches!(reader.skip_to(&[10]), Err(Error::Unsupported(_))));
    }
}

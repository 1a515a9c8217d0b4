//! Streaming preprocessing toolkit for large multilingual corpora.
//!
//! corpusflow bundles the machinery shared by a family of command-line
//! tools that prepare WARC web-archive dumps and line-oriented text for
//! downstream use:
//!
//! - [`io::decompress`] - a polymorphic streaming decoder that detects
//!   gzip, bzip2, and xz by magic bytes, handles concatenated streams,
//!   and exposes forward-only skip primitives for error recovery.
//! - [`io::warc`] - a framed-record reader over the decompressor that
//!   validates WARC/1.0 framing and recovers from corruption.
//! - [`pipeline`] - dispatch cores that marshal lines or WARC records
//!   through a pool of long-lived child subprocesses over pipes.
//! - [`sort`] - a k-way merge of pre-sorted inputs under the classical
//!   field-range key syntax.
//!
//! Everything here uses blocking I/O on ordinary OS threads; there is
//! no event loop. The binaries under `src/bin/` are thin argument
//! parsers around these modules.

pub mod error;
pub mod io;
pub mod pipeline;
pub mod sort;

pub use error::{Error, Result};
pub use io::decompress::DecompressReader;
pub use io::warc::{Record, WarcReader};

//! Error types shared across the readers, pipelines, and the sort driver.

use thiserror::Error;

/// Result type alias for corpusflow operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the streaming readers and pipeline cores.
///
/// The WARC reader treats [`Error::Decode`] and [`Error::Framing`] as
/// recoverable (it skips forward and reports the gap); everything else
/// propagates to the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// OS error on read, write, or open. Fatal to the current reader.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A codec reported corrupt input.
    #[error("decode error: {0}")]
    Decode(String),

    /// A WARC header or trailer violated the framing rules.
    #[error("WARC framing error: {0}")]
    Framing(String),

    /// The input ended inside a record.
    #[error("unexpected end of file {0}")]
    UnexpectedEof(String),

    /// A finite sort key range demanded more columns than the line has.
    #[error("field range demands column {end} but the line has only {columns} columns")]
    OutOfRange { end: usize, columns: usize },

    /// `skip_to` found no index offset beyond the current position.
    #[error("no jump target beyond offset {position} in the index")]
    NoTarget { position: u64 },

    /// A sort key specifier did not match `BEGIN(,END)?[n][r]`.
    #[error("bad sort key `{0}`: {1}")]
    KeySpec(String, String),

    /// An output name template had no `X` run to substitute.
    #[error("output template `{0}` contains no X-es")]
    Template(String),

    /// A worker child failed to launch, exited non-zero, or died to a signal.
    #[error("child process: {0}")]
    Child(String),

    /// The operation is not available in the reader's current state.
    #[error("{0} is not implemented for this input")]
    Unsupported(&'static str),
}

impl Error {
    /// Create a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Error::Decode(message.into())
    }

    /// Create a framing error.
    pub fn framing(message: impl Into<String>) -> Self {
        Error::Framing(message.into())
    }

    /// Create a child-process error.
    pub fn child(message: impl Into<String>) -> Self {
        Error::Child(message.into())
    }

    /// True for the errors the WARC reader converts into skip recovery.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Decode(_) | Error::Framing(_))
    }
}

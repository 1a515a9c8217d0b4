//! Stream-format readers and writers.
//!
//! This module holds the format-aware half of the toolkit:
//!
//! - [`decompress`] - codec auto-detection and streaming decompression
//!   with forward-only skip primitives. The decoder is a state machine
//!   over a tagged variant; a finished stream installs its own
//!   successor so concatenated inputs read as one byte stream.
//! - [`warc`] - WARC/1.0 record framing on top of the decompressor,
//!   including corruption recovery and the optional sidecar offset
//!   index.
//! - [`split`] - size-capped output sharding under an `X`-run name
//!   template, used by the WARC pipeline's writer.
//!
//! Readers own their underlying file or pipe until they are dropped or
//! replaced by a successor decoder; nothing here shares descriptors
//! across threads.

pub mod decompress;
pub mod split;
pub mod warc;

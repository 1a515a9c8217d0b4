//! K-way merge of pre-sorted delimited text under field-range keys.
//!
//! The key grammar is the classical `sort(1)` field-range syntax:
//! `BEGIN(,END)?[n][r]` with 1-based columns, an omitted or empty
//! `END` meaning "to end of line", and the flags `n` (numeric) and
//! `r` (reverse). [`key::LineParser`] extracts the keyed columns from
//! a line, [`compare`] orders two parsed keys, and [`merge`] drives
//! per-input cursors to a single globally sorted stream.

pub mod compare;
pub mod key;
pub mod merge;

pub use compare::{compare_keys, compare_numeric};
pub use key::{parse_range, FieldRange, FieldSpan, LineParser};
pub use merge::{merge, MergeSource};

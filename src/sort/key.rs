//! Sort-key grammar and line parsing.

use memchr::memchr;

use crate::error::{Error, Result};

/// One `-k` specifier: a half-open column range plus comparison flags.
/// Columns are 0-based here; the user syntax is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRange {
    pub begin: usize,
    /// `None` means "to end of line".
    pub end: Option<usize>,
    pub numeric: bool,
    pub reverse: bool,
}

/// Parse a specifier like `sort` does: `BEGIN(,END)?[n][r]`.
///
/// `4` keys on column 4 alone, `4,` on columns 4 to end of line, and
/// `4,6` on columns 4 through 6 inclusive.
pub fn parse_range(spec: &str) -> Result<FieldRange> {
    let bad = |reason: &str| Error::KeySpec(spec.to_string(), reason.to_string());

    let mut rest = spec;
    let begin = consume_int(&mut rest).ok_or_else(|| bad("expected a leading column number"))?;
    if begin == 0 {
        return Err(bad("sort fields start counting from 1"));
    }
    let mut range = FieldRange {
        begin: begin - 1,
        end: Some(begin),
        numeric: false,
        reverse: false,
    };

    if let Some(after_comma) = rest.strip_prefix(',') {
        rest = after_comma;
        range.end = match consume_int(&mut rest) {
            Some(end) if end < begin => return Err(bad("range ends before it begins")),
            Some(end) => Some(end),
            None => None,
        };
    }

    for flag in rest.chars() {
        match flag {
            'n' => range.numeric = true,
            'r' => range.reverse = true,
            _ => return Err(bad(&format!("unknown sort flag `{flag}`"))),
        }
    }
    Ok(range)
}

fn consume_int(rest: &mut &str) -> Option<usize> {
    let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    let value = rest[..digits].parse().ok()?;
    *rest = &rest[digits..];
    Some(value)
}

/// One keyed column of a line: a byte span plus the flags inherited
/// from the range that captured it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpan {
    pub start: usize,
    pub end: usize,
    pub numeric: bool,
    pub reverse: bool,
}

impl FieldSpan {
    pub fn slice<'a>(&self, line: &'a [u8]) -> &'a [u8] {
        &line[self.start..self.end]
    }
}

/// Extracts the keyed columns of a line under a set of ranges.
///
/// Columns are scanned lazily and their offsets memoized, so a later
/// range that refers to an earlier column never re-splits the line.
#[derive(Debug, Clone)]
pub struct LineParser {
    ranges: Vec<FieldRange>,
    delimiter: u8,
}

impl LineParser {
    pub fn new(ranges: Vec<FieldRange>, delimiter: u8) -> Self {
        LineParser { ranges, delimiter }
    }

    /// Parse `line` into `fields` (cleared first). A finite range
    /// reaching past the available columns is [`Error::OutOfRange`];
    /// an infinite range silently truncates.
    pub fn parse(&self, line: &[u8], fields: &mut Vec<FieldSpan>) -> Result<()> {
        fields.clear();
        let mut columns: Vec<(usize, usize)> = Vec::new();
        let mut pos = 0usize;

        for range in &self.ranges {
            let mut column = range.begin;
            loop {
                if let Some(end) = range.end {
                    if column >= end {
                        break;
                    }
                }
                while columns.len() <= column {
                    if !scan_column(line, self.delimiter, &mut columns, &mut pos) {
                        break;
                    }
                }
                if columns.len() <= column {
                    match range.end {
                        // To-end-of-line ranges stop at the last column.
                        None => break,
                        Some(end) => {
                            return Err(Error::OutOfRange {
                                end,
                                columns: columns.len(),
                            })
                        }
                    }
                }
                let (start, end) = columns[column];
                fields.push(FieldSpan {
                    start,
                    end,
                    numeric: range.numeric,
                    reverse: range.reverse,
                });
                column += 1;
            }
        }
        Ok(())
    }
}

/// Scan one more column off the line; false when exhausted.
fn scan_column(
    line: &[u8],
    delimiter: u8,
    columns: &mut Vec<(usize, usize)>,
    pos: &mut usize,
) -> bool {
    if *pos >= line.len() {
        return false;
    }
    match memchr(delimiter, &line[*pos..]) {
        Some(offset) => {
            columns.push((*pos, *pos + offset));
            *pos += offset + 1;
        }
        None => {
            columns.push((*pos, line.len()));
            *pos = line.len();
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(parser: &LineParser, line: &[u8]) -> Vec<Vec<u8>> {
        let mut spans = Vec::new();
        parser.parse(line, &mut spans).unwrap();
        spans.iter().map(|s| s.slice(line).to_vec()).collect()
    }

    #[test]
    fn parses_the_sort_grammar() {
        assert_eq!(
            parse_range("4").unwrap(),
            FieldRange {
                begin: 3,
                end: Some(4),
                numeric: false,
                reverse: false
            }
        );
        assert_eq!(parse_range("4,").unwrap().end, None);
        assert_eq!(parse_range("4,6").unwrap().end, Some(6));
        let range = parse_range("2,2nr").unwrap();
        assert!(range.numeric && range.reverse);
        assert_eq!(parse_range("3n").unwrap().numeric, true);

        assert!(parse_range("").is_err());
        assert!(parse_range("0").is_err());
        assert!(parse_range("4,2").is_err());
        assert!(parse_range("4x").is_err());
    }

    #[test]
    fn extracts_single_and_open_ranges() {
        let parser = LineParser::new(
            vec![parse_range("2").unwrap()],
            b'\t',
        );
        assert_eq!(fields(&parser, b"a\tb\tc"), vec![b"b".to_vec()]);

        let parser = LineParser::new(vec![parse_range("2,").unwrap()], b'\t');
        assert_eq!(
            fields(&parser, b"a\tb\tc"),
            vec![b"b".to_vec(), b"c".to_vec()]
        );
    }

    #[test]
    fn later_range_reuses_earlier_columns() {
        let parser = LineParser::new(
            vec![parse_range("3").unwrap(), parse_range("1").unwrap()],
            b',',
        );
        assert_eq!(
            fields(&parser, b"x,y,z"),
            vec![b"z".to_vec(), b"x".to_vec()]
        );
    }

    #[test]
    fn finite_range_past_line_is_out_of_range() {
        let parser = LineParser::new(vec![parse_range("5").unwrap()], b'\t');
        let mut spans = Vec::new();
        assert!(matches!(
            parser.parse(b"a\tb", &mut spans),
            Err(Error::OutOfRange { end: 5, columns: 2 })
        ));
    }

    #[test]
    fn infinite_range_truncates_silently() {
        let parser = LineParser::new(vec![parse_range("5,").unwrap()], b'\t');
        assert!(fields(&parser, b"a\tb").is_empty());
    }
}

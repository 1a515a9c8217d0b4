//! Key comparison: lexicographic by field, numeric without parsing.

use std::cmp::Ordering;

use memchr::memchr;

use crate::sort::key::FieldSpan;

/// Compare two numeric strings without converting them, preserving
/// arbitrary precision and ignoring locale:
///
/// - empty sorts below anything non-empty
/// - a lone leading `-` flips the result
/// - integer parts compare by width first (longer wins), then byte-wise
/// - fractional parts compare byte-wise left-justified, so
///   `4.10 < 4.9` and `4.5 < 4.50`
pub fn compare_numeric(left: &[u8], right: &[u8]) -> Ordering {
    match (left.is_empty(), right.is_empty()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        (false, false) => {}
    }

    let (left, right, negative) = match (left[0] == b'-', right[0] == b'-') {
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        (true, true) => (&left[1..], &right[1..], true),
        (false, false) => (left, right, false),
    };

    let left_dot = memchr(b'.', left).unwrap_or(left.len());
    let right_dot = memchr(b'.', right).unwrap_or(right.len());

    let order = left_dot
        .cmp(&right_dot)
        .then_with(|| left[..left_dot].cmp(&right[..right_dot]))
        .then_with(|| fraction(left, left_dot).cmp(fraction(right, right_dot)));

    if negative {
        order.reverse()
    } else {
        order
    }
}

fn fraction(text: &[u8], dot: usize) -> &[u8] {
    if dot < text.len() {
        &text[dot + 1..]
    } else {
        &[]
    }
}

/// Compare two parsed keys field by field under each field's flags.
/// Keys of unequal field counts (possible only with truncating
/// to-end-of-line ranges) order by the shared prefix, then by length.
pub fn compare_keys(
    left_line: &[u8],
    left: &[FieldSpan],
    right_line: &[u8],
    right: &[FieldSpan],
) -> Ordering {
    for (l, r) in left.iter().zip(right.iter()) {
        let a = l.slice(left_line);
        let b = r.slice(right_line);
        let order = if l.numeric {
            compare_numeric(a, b)
        } else {
            a.cmp(b)
        };
        let order = if l.reverse { order.reverse() } else { order };
        if order != Ordering::Equal {
            return order;
        }
    }
    left.len().cmp(&right.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(left: &str, right: &str) -> Ordering {
        compare_numeric(left.as_bytes(), right.as_bytes())
    }

    #[test]
    fn integers_compare_by_width_then_bytes() {
        assert_eq!(num("2", "10"), Ordering::Less);
        assert_eq!(num("10", "9"), Ordering::Greater);
        assert_eq!(num("123", "124"), Ordering::Less);
        assert_eq!(num("7", "7"), Ordering::Equal);
    }

    #[test]
    fn fractions_compare_left_justified() {
        assert_eq!(num("4.10", "4.9"), Ordering::Less);
        assert_eq!(num("4.5", "4.50"), Ordering::Less);
        assert_eq!(num("4", "4.0"), Ordering::Less);
        assert_eq!(num("4.2", "4.2"), Ordering::Equal);
    }

    #[test]
    fn negatives_flip() {
        assert_eq!(num("-1", "-2"), Ordering::Greater);
        assert_eq!(num("-10", "-9"), Ordering::Less);
        assert_eq!(num("-1", "1"), Ordering::Less);
        assert_eq!(num("1", "-1"), Ordering::Greater);
        assert_eq!(num("-4.9", "-4.10"), Ordering::Less);
    }

    #[test]
    fn empty_sorts_first() {
        assert_eq!(num("", ""), Ordering::Equal);
        assert_eq!(num("", "0"), Ordering::Less);
        assert_eq!(num("-5", ""), Ordering::Greater);
    }
}

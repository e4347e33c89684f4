//! Binary search over sequences ordered by line number.

use crate::data::linetypes::LineNumber;

/// Records that sit at a known line
pub trait HasLineNumber {
    fn line_number(&self) -> LineNumber;
}

impl HasLineNumber for LineNumber {
    #[inline]
    fn line_number(&self) -> LineNumber {
        *self
    }
}

/// Find `line` in a list sorted by strictly increasing line number.
///
/// Returns `Ok(index)` on an exact match, or `Err(index)` with the position of
/// the closest greater element (the insertion point) when absent. The first and
/// last elements are checked up front since "first line" and "last line" are
/// the most common targets.
pub fn lookup_line_number<T: HasLineNumber>(list: &[T], line: LineNumber) -> Result<usize, usize> {
    if list.is_empty() {
        return Err(0);
    }

    let mut min = 0usize;
    let mut max = list.len() - 1;

    if list[min].line_number() == line {
        return Ok(min);
    }
    if list[max].line_number() == line {
        return Ok(max);
    }

    while max - min > 1 {
        let probe = min + (max - min) / 2;
        let current = list[probe].line_number();
        if current > line {
            max = probe;
        } else if current < line {
            min = probe;
        } else {
            return Ok(probe);
        }
    }

    if line > list[max].line_number() {
        Err(max + 1)
    } else if line > list[min].line_number() {
        Err(min + 1)
    } else {
        Err(min)
    }
}

/// Count the elements strictly less than `line` (lower bound).
///
/// The elements must be sorted ascending; duplicates are allowed. Only the
/// position is reported, as a line number.
pub fn lookup_line_number_in<T: HasLineNumber>(elements: &[T], line: LineNumber) -> LineNumber {
    let below = elements.partition_point(|element| element.line_number() < line);
    LineNumber::new(u32::try_from(below).unwrap_or(u32::MAX))
}

//! Strongly-typed line numbers, counts, offsets and lengths.
//!
//! Every index lookup passes these around, so each role gets its own type and
//! only the arithmetic that makes sense for it. Adding a byte offset to a line
//! number does not compile.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Zero-based line number in a file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineNumber(u32);

/// A number of lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinesCount(u32);

/// Byte position within a file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineOffset(i64);

/// Length of a line in code units, terminator excluded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineLength(i32);

/// A line number that may be absent (nothing found, cursor unset)
pub type OptionalLineNumber = Option<LineNumber>;

/// Types with a saturation ceiling
pub trait MaxValue {
    fn max_value() -> Self;
}

/// Saturation ceiling of a line type
#[inline]
pub fn max_value<T: MaxValue>() -> T {
    T::max_value()
}

macro_rules! line_type_common {
    ($name:ident, $inner:ty) => {
        impl $name {
            #[inline]
            pub const fn new(value: $inner) -> Self {
                Self(value)
            }

            #[inline]
            pub const fn get(self) -> $inner {
                self.0
            }
        }

        impl MaxValue for $name {
            #[inline]
            fn max_value() -> Self {
                Self(<$inner>::MAX)
            }
        }

        impl From<$inner> for $name {
            #[inline]
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

line_type_common!(LineNumber, u32);
line_type_common!(LinesCount, u32);
line_type_common!(LineOffset, i64);
line_type_common!(LineLength, i32);

impl LineNumber {
    /// Following line, saturating at the ceiling
    #[inline]
    pub fn next(self) -> Self {
        self + LinesCount(1)
    }

    /// Preceding line, flooring at zero
    #[inline]
    pub fn prev(self) -> Self {
        self - LinesCount(1)
    }

    /// Number of lines between two line numbers, in either direction
    #[inline]
    pub fn distance(self, other: LineNumber) -> LinesCount {
        LinesCount(self.0.abs_diff(other.0))
    }

    /// Position usable as a slice index
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Line at a slice position, saturating at the ceiling
    #[inline]
    pub fn from_index(index: usize) -> Self {
        LineNumber(u32::try_from(index).unwrap_or(u32::MAX))
    }
}

impl Add<LinesCount> for LineNumber {
    type Output = LineNumber;

    #[inline]
    fn add(self, count: LinesCount) -> LineNumber {
        LineNumber(self.0.saturating_add(count.0))
    }
}

impl AddAssign<LinesCount> for LineNumber {
    #[inline]
    fn add_assign(&mut self, count: LinesCount) {
        *self = *self + count;
    }
}

impl Sub<LinesCount> for LineNumber {
    type Output = LineNumber;

    #[inline]
    fn sub(self, count: LinesCount) -> LineNumber {
        LineNumber(self.0.saturating_sub(count.0))
    }
}

impl SubAssign<LinesCount> for LineNumber {
    #[inline]
    fn sub_assign(&mut self, count: LinesCount) {
        *self = *self - count;
    }
}

impl LinesCount {
    pub const ZERO: LinesCount = LinesCount(0);

    /// Build a count from a collection length, saturating at the ceiling
    #[inline]
    pub fn from_len(len: usize) -> Self {
        LinesCount(u32::try_from(len).unwrap_or(u32::MAX))
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// The line just past the last one of a run of this many lines
    #[inline]
    pub fn end_line(self) -> LineNumber {
        LineNumber(self.0)
    }
}

impl Add for LinesCount {
    type Output = LinesCount;

    #[inline]
    fn add(self, other: LinesCount) -> LinesCount {
        LinesCount(self.0.saturating_add(other.0))
    }
}

impl Sub for LinesCount {
    type Output = LinesCount;

    #[inline]
    fn sub(self, other: LinesCount) -> LinesCount {
        LinesCount(self.0.saturating_sub(other.0))
    }
}

impl LineOffset {
    /// Offset as an unsigned file position; negative offsets clamp to zero
    #[inline]
    pub fn as_u64(self) -> u64 {
        u64::try_from(self.0).unwrap_or(0)
    }

    #[inline]
    pub fn from_u64(position: u64) -> Self {
        LineOffset(i64::try_from(position).unwrap_or(i64::MAX))
    }
}

impl Add for LineOffset {
    type Output = LineOffset;

    #[inline]
    fn add(self, other: LineOffset) -> LineOffset {
        LineOffset(self.0 + other.0)
    }
}

impl AddAssign for LineOffset {
    #[inline]
    fn add_assign(&mut self, other: LineOffset) {
        self.0 += other.0;
    }
}

impl Sub for LineOffset {
    type Output = LineOffset;

    #[inline]
    fn sub(self, other: LineOffset) -> LineOffset {
        LineOffset(self.0 - other.0)
    }
}

impl LineLength {
    /// Build a length from a code unit count, saturating at the ceiling
    #[inline]
    pub fn from_units(units: u64) -> Self {
        LineLength(i32::try_from(units).unwrap_or(i32::MAX))
    }
}

/// Display adapter printing `none` for an absent line number
pub struct DisplayOptional(pub OptionalLineNumber);

impl fmt::Display for DisplayOptional {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(line) => write!(f, "{line}"),
            None => f.write_str("none"),
        }
    }
}

/// Caret location: a line and an optional column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilePosition {
    line: LineNumber,
    column: i32,
}

impl Default for FilePosition {
    fn default() -> Self {
        Self {
            line: LineNumber::default(),
            column: -1,
        }
    }
}

impl FilePosition {
    pub fn new(line: LineNumber, column: i32) -> Self {
        Self { line, column }
    }

    pub fn line(&self) -> LineNumber {
        self.line
    }

    /// Column, or -1 when the position carries none
    pub fn column(&self) -> i32 {
        self.column
    }

    pub fn has_column(&self) -> bool {
        self.column >= 0
    }
}

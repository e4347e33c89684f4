//! Line-oriented value types and lookups shared by every other module.
//!
//! - [`linetypes`] - Strong numeric types for lines, counts, offsets, lengths
//! - [`bisect`] - Binary search over sequences ordered by line number

pub mod bisect;
pub mod linetypes;

pub use bisect::*;
pub use linetypes::*;

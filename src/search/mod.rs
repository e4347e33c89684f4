//! Pattern search and highlight filters over index snapshots.
//!
//! - [`pattern`] - compiled search patterns (regex or fixed string)
//! - [`engine`] - chunked parallel search, result navigation and refresh
//! - [`task`] - searches on a background thread with streamed matches
//! - [`filter`] - first-match-wins colour rules

pub mod engine;
pub mod filter;
pub mod pattern;
pub mod task;

pub use engine::{SearchConfig, SearchEngine, SearchLimits, SearchResult, SearchStatus, StopReason};
pub use filter::{Colour, CompiledFilterSet, Filter, FilterColours, FilterSet, colourise};
pub use pattern::{PatternSyntax, SearchPattern};
pub use task::{SearchEvent, SearchTask};

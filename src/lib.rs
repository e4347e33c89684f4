//! # logcrawl - line indexing and search for huge, growing log files
//!
//! logcrawl maps line numbers to byte offsets without loading a file into
//! memory, keeps that map current while the file grows or is rotated, and
//! runs cancellable regex searches and highlight filters against it while
//! indexing carries on in the background.
//!
//! ## Architecture
//!
//! - [`data`] - Strongly-typed line numbers, counts, offsets and bisection
//! - [`index`] - Byte sources, encoding detection, the line indexer and the
//!   [`LogReader`](index::LogReader) query API
//! - [`worker`] - Background indexing with snapshot publication and follow mode
//! - [`search`] - Chunked parallel search and first-match-wins filters
//! - [`output`] - Terminal formatting for the CLI
//! - [`utils`] - Configuration, cancellation and progress helpers
//!
//! ## Quick Start
//!
//! ```no_run
//! use logcrawl::index::LogReader;
//! use logcrawl::search::{SearchLimits, SearchPattern};
//!
//! let reader = LogReader::open("/var/log/syslog").unwrap();
//! reader.start_indexing();
//! reader.wait_for_index();
//!
//! let pattern = SearchPattern::new("timeout", false).unwrap();
//! let result = reader.search(pattern, SearchLimits::none()).wait().unwrap();
//! for line in result.matches() {
//!     println!("{}: {}", line, reader.line(*line).unwrap().unwrap_or_default());
//! }
//! ```
//!
//! ## Snapshots
//!
//! Every indexing run builds a new immutable [`IndexedFile`](index::IndexedFile)
//! and publishes it in one step. Readers hold an `Arc` to whichever snapshot
//! was current when they asked, so queries never see a half-built index.
//! Growth is indexed incrementally and shares the unchanged part of the
//! offset table with the previous snapshot.

pub mod data;
pub mod error;
pub mod index;
pub mod output;
pub mod search;
pub mod utils;
pub mod worker;

pub use error::{IndexError, Outcome, SearchError};

//! Line indexing: byte sources, encoding detection, offset tables and the
//! query API over them.

pub mod build;
pub mod encoding;
pub mod reader;
pub mod source;
pub mod stats;
pub mod types;

pub use build::{IndexBuilder, index_full, index_incremental};
pub use encoding::{Detection, Encoding, detect_encoding};
pub use reader::{LogReader, read_lines};
pub use source::{ByteSource, FileIdentity, LocalFile, MappedFile, MemorySource, SourceMetadata};
pub use stats::FileStats;
pub use types::*;

use crate::data::{LineLength, LineNumber, LineOffset, LinesCount, OptionalLineNumber};
use crate::error::IndexError;
use crate::index::encoding::Encoding;
use crate::index::source::SourceMetadata;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Number of offsets per shared block of an [`OffsetTable`]
pub const OFFSET_BLOCK_LEN: usize = 1 << 16;

/// Version number of a published snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Generation(u64);

impl Generation {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Line start offsets, stored in fixed-size blocks.
///
/// Full blocks are never written again, so cloning a table and appending to
/// the clone shares every full block with the original and copies at most the
/// last one.
#[derive(Debug, Clone, Default)]
pub struct OffsetTable {
    blocks: Vec<Arc<Vec<LineOffset>>>,
    len: usize,
}

impl OffsetTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, index: usize) -> Option<LineOffset> {
        self.blocks
            .get(index / OFFSET_BLOCK_LEN)
            .and_then(|block| block.get(index % OFFSET_BLOCK_LEN))
            .copied()
    }

    pub fn last(&self) -> Option<LineOffset> {
        self.blocks.last().and_then(|block| block.last()).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = LineOffset> + '_ {
        self.blocks.iter().flat_map(|block| block.iter().copied())
    }

    /// Append an offset, reporting allocation failure instead of aborting
    pub(crate) fn try_push(&mut self, offset: LineOffset) -> Result<(), IndexError> {
        debug_assert!(self.last().is_none_or(|last| last < offset));

        let oom = |lines| IndexError::OutOfMemory { lines };
        if self.blocks.last().is_none_or(|block| block.len() == OFFSET_BLOCK_LEN) {
            self.blocks.try_reserve(1).map_err(|_| oom(self.len))?;
            let mut block = Vec::new();
            block
                .try_reserve_exact(OFFSET_BLOCK_LEN)
                .map_err(|_| oom(self.len))?;
            self.blocks.push(Arc::new(block));
        }
        if let Some(block) = self.blocks.last_mut() {
            Arc::make_mut(block).push(offset);
            self.len += 1;
        }
        Ok(())
    }

    /// Remove the last offset
    pub(crate) fn pop(&mut self) -> Option<LineOffset> {
        let block = self.blocks.last_mut()?;
        let offset = Arc::make_mut(block).pop();
        if block.is_empty() {
            self.blocks.pop();
        }
        if offset.is_some() {
            self.len -= 1;
        }
        offset
    }

    /// Index of the last entry at or before `offset`
    pub fn line_containing(&self, offset: LineOffset) -> Option<usize> {
        // Blocks whose first entry is at or before the offset
        let block_count = self
            .blocks
            .partition_point(|block| block.first().is_some_and(|first| *first <= offset));
        let block_index = block_count.checked_sub(1)?;
        let block = &self.blocks[block_index];
        let in_block = block.partition_point(|start| *start <= offset) - 1;
        Some(block_index * OFFSET_BLOCK_LEN + in_block)
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Number of leading blocks physically shared with `other`
    pub fn shared_blocks(&self, other: &OffsetTable) -> usize {
        self.blocks
            .iter()
            .zip(&other.blocks)
            .take_while(|(a, b)| Arc::ptr_eq(a, b))
            .count()
    }
}

/// An immutable line index over a file.
///
/// Entry `i` of the offset table is the first byte of line `i`. A final line
/// without terminator is still a line, ending at `indexed_size`.
#[derive(Debug, Clone)]
pub struct IndexedFile {
    pub(crate) offsets: OffsetTable,
    pub(crate) encoding: Encoding,
    pub(crate) encoding_guessed: bool,
    pub(crate) indexed_size: u64,
    pub(crate) last_line_terminated: bool,
    pub(crate) max_line_length: LineLength,
    pub(crate) generation: Generation,
    pub(crate) lineage: Generation,
    pub(crate) source_metadata: Option<SourceMetadata>,
}

impl Default for IndexedFile {
    /// Same shape as indexing zero bytes: no lines, nothing left unterminated
    fn default() -> Self {
        Self {
            offsets: OffsetTable::default(),
            encoding: Encoding::default(),
            encoding_guessed: false,
            indexed_size: 0,
            last_line_terminated: true,
            max_line_length: LineLength::default(),
            generation: Generation::default(),
            lineage: Generation::default(),
            source_metadata: None,
        }
    }
}

impl IndexedFile {
    /// An index of nothing
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn line_count(&self) -> LinesCount {
        LinesCount::from_len(self.offsets.len())
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn last_line(&self) -> OptionalLineNumber {
        let count = self.line_count();
        (!count.is_zero()).then(|| count.end_line().prev())
    }

    /// First byte of a line
    pub fn offset(&self, line: LineNumber) -> Option<LineOffset> {
        self.offsets.get(line.index())
    }

    /// Byte range `[start, end)` of a line, terminator included
    pub fn line_range(&self, line: LineNumber) -> Option<(u64, u64)> {
        self.lines_range(line, LinesCount::new(1))
    }

    /// Byte range covering `count` lines from `first`, clamped to the index
    pub fn lines_range(&self, first: LineNumber, count: LinesCount) -> Option<(u64, u64)> {
        let start = self.offsets.get(first.index())?.as_u64();
        let end = self
            .offsets
            .get(first.index().saturating_add(count.as_usize()))
            .map_or(self.indexed_size, LineOffset::as_u64);
        Some((start, end))
    }

    /// The line containing a byte offset, if it has been indexed
    pub fn line_at_offset(&self, offset: LineOffset) -> OptionalLineNumber {
        if offset.as_u64() >= self.indexed_size || offset < LineOffset::new(0) {
            return None;
        }
        self.offsets
            .line_containing(offset)
            .map(|index| LineNumber::new(u32::try_from(index).unwrap_or(u32::MAX)))
    }

    /// The existing line closest to `target`
    pub fn closest_line(&self, target: LineNumber) -> OptionalLineNumber {
        self.last_line().map(|last| target.min(last))
    }

    pub fn offsets(&self) -> impl Iterator<Item = LineOffset> + '_ {
        self.offsets.iter()
    }

    pub fn offset_table(&self) -> &OffsetTable {
        &self.offsets
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Detection found nothing conclusive and fell back to a default
    pub fn encoding_guessed(&self) -> bool {
        self.encoding_guessed
    }

    /// Bytes of the file covered by this index
    pub fn indexed_size(&self) -> u64 {
        self.indexed_size
    }

    pub fn is_last_line_terminated(&self) -> bool {
        self.last_line_terminated
    }

    /// Longest line, in code units
    pub fn max_line_length(&self) -> LineLength {
        self.max_line_length
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Generation of the full index this one was extended from
    pub fn lineage(&self) -> Generation {
        self.lineage
    }

    /// Source state observed when this index was built
    pub fn source_metadata(&self) -> Option<&SourceMetadata> {
        self.source_metadata.as_ref()
    }

    /// True when `self` only appends lines to `older`
    pub fn extends(&self, older: &IndexedFile) -> bool {
        self.lineage == older.lineage && self.generation >= older.generation
    }
}

/// Tuning for indexing runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Bytes read and scanned between cancellation checks
    pub read_block_bytes: usize,
    /// Extra attempts for a block whose read failed
    pub read_retries: u32,
    /// Pause between read attempts
    pub retry_delay_ms: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            read_block_bytes: 1024 * 1024,
            read_retries: 3,
            retry_delay_ms: 50,
        }
    }
}

impl IndexConfig {
    /// Block size actually used: even, so UTF-16 units never straddle blocks
    pub fn effective_block_bytes(&self) -> usize {
        self.read_block_bytes.max(64) & !1
    }
}

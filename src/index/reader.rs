//! Query API over a file's index: line access, positions, search and filters.
//!
//! [`LogReader`] wraps an [`IndexWorker`] and answers every query from the
//! snapshot current at the time of the call. Decoded lines go through a small
//! LRU cache that is dropped whenever a new snapshot is published.

use crate::data::{LineLength, LineNumber, LineOffset, LinesCount, OptionalLineNumber};
use crate::error::{IndexError, SearchError};
use crate::index::build::read_with_retry;
use crate::index::encoding::Encoding;
use crate::index::source::{ByteSource, LocalFile};
use crate::index::types::{Generation, IndexConfig, IndexedFile};
use crate::search::engine::{SearchConfig, SearchLimits, SearchResult};
use crate::search::filter::{CompiledFilterSet, FilterColours, FilterSet, colourise};
use crate::search::pattern::SearchPattern;
use crate::search::task::SearchTask;
use crate::utils::app_data::AppConfig;
use crate::worker::{FollowHandle, IndexEvent, IndexStatus, IndexWorker, UpdatePlan};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Decode `count` lines from `first`, clamped to the lines in `snapshot`.
///
/// Line terminators are dropped. If the file shrank since `snapshot` was
/// built, lines past its new end come back empty.
pub fn read_lines(
    snapshot: &IndexedFile,
    source: &dyn ByteSource,
    first: LineNumber,
    count: LinesCount,
    config: &IndexConfig,
) -> Result<Vec<String>, IndexError> {
    let available = snapshot.line_count().as_usize().saturating_sub(first.index());
    let count = count.as_usize().min(available);
    if count == 0 {
        return Ok(Vec::new());
    }
    let Some((start, end)) = snapshot.lines_range(first, LinesCount::from_len(count)) else {
        return Ok(Vec::new());
    };

    let bytes = read_with_retry(source, start, end, config)?;
    let encoding = snapshot.encoding();
    let slice = |from: u64, to: u64| {
        let lo = usize::try_from(from - start).unwrap_or(usize::MAX).min(bytes.len());
        let hi = usize::try_from(to - start).unwrap_or(usize::MAX).min(bytes.len());
        &bytes[lo..hi.max(lo)]
    };

    let mut lines = Vec::with_capacity(count);
    let mut line_start = start;
    for i in 1..=count {
        let line_end = snapshot
            .offset(first + LinesCount::from_len(i))
            .map_or(end, LineOffset::as_u64);
        lines.push(encoding.decode_line(slice(line_start, line_end)));
        line_start = line_end;
    }
    Ok(lines)
}

struct LineCache {
    generation: Generation,
    lines: LruCache<LineNumber, Arc<str>>,
}

/// A log file opened for browsing
pub struct LogReader {
    worker: Arc<IndexWorker>,
    search_config: SearchConfig,
    follow_interval: Duration,
    cache: Mutex<LineCache>,
}

impl LogReader {
    /// Open a file on disk with the default configuration
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let source = LocalFile::open(path.as_ref())?;
        Ok(Self::new(Arc::new(source), &AppConfig::default()))
    }

    /// Reader over any byte source; nothing is indexed until asked
    pub fn new(source: Arc<dyn ByteSource>, config: &AppConfig) -> Self {
        let capacity = NonZeroUsize::new(config.line_cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            worker: Arc::new(IndexWorker::new(source, config.index_config())),
            search_config: config.search_config(),
            follow_interval: config.follow_interval(),
            cache: Mutex::new(LineCache {
                generation: Generation::default(),
                lines: LruCache::new(capacity),
            }),
        }
    }

    pub fn worker(&self) -> &Arc<IndexWorker> {
        &self.worker
    }

    pub fn source(&self) -> &Arc<dyn ByteSource> {
        self.worker.source()
    }

    /// The current snapshot
    pub fn snapshot(&self) -> Arc<IndexedFile> {
        self.worker.snapshot()
    }

    /// The current snapshot, or `IndexStale` if it is not `held`
    pub fn ensure_current(&self, held: Generation) -> Result<Arc<IndexedFile>, IndexError> {
        self.worker.ensure_current(held)
    }

    pub fn line_count(&self) -> LinesCount {
        self.snapshot().line_count()
    }

    pub fn max_line_length(&self) -> LineLength {
        self.snapshot().max_line_length()
    }

    pub fn encoding(&self) -> Encoding {
        self.snapshot().encoding()
    }

    pub fn line_offset(&self, line: LineNumber) -> Option<LineOffset> {
        self.snapshot().offset(line)
    }

    pub fn line_at_offset(&self, offset: LineOffset) -> OptionalLineNumber {
        self.snapshot().line_at_offset(offset)
    }

    pub fn closest_line(&self, target: LineNumber) -> OptionalLineNumber {
        self.snapshot().closest_line(target)
    }

    /// Text of one line, without its terminator
    pub fn line(&self, line: LineNumber) -> Result<Option<Arc<str>>, IndexError> {
        let snapshot = self.snapshot();
        if line.index() >= snapshot.line_count().as_usize() {
            return Ok(None);
        }

        if let Some(text) = self.cached(&snapshot, line) {
            return Ok(Some(text));
        }

        let text: Arc<str> = read_lines(
            &snapshot,
            self.source().as_ref(),
            line,
            LinesCount::new(1),
            self.worker.config(),
        )?
        .pop()
        .unwrap_or_default()
        .into();

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if cache.generation == snapshot.generation() {
            cache.lines.put(line, Arc::clone(&text));
        }
        Ok(Some(text))
    }

    /// Text of up to `count` lines from `first`
    pub fn lines(&self, first: LineNumber, count: LinesCount) -> Result<Vec<String>, IndexError> {
        let snapshot = self.snapshot();
        read_lines(&snapshot, self.source().as_ref(), first, count, self.worker.config())
    }

    fn cached(&self, snapshot: &IndexedFile, line: LineNumber) -> Option<Arc<str>> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if cache.generation != snapshot.generation() {
            cache.lines.clear();
            cache.generation = snapshot.generation();
            return None;
        }
        cache.lines.get(&line).cloned()
    }

    pub fn set_forced_encoding(&self, encoding: Option<Encoding>) {
        self.worker.set_forced_encoding(encoding);
    }

    pub fn start_indexing(&self) {
        self.worker.start_indexing();
    }

    pub fn start_indexing_incremental(&self) {
        self.worker.start_indexing_incremental();
    }

    /// Start whatever run the file's current state calls for
    pub fn refresh(&self) -> Result<UpdatePlan, IndexError> {
        self.worker.refresh()
    }

    pub fn cancel_indexing(&self) {
        self.worker.cancel();
    }

    pub fn subscribe(&self) -> Receiver<IndexEvent> {
        self.worker.subscribe()
    }

    /// Block until the in-flight run finishes
    pub fn wait_for_index(&self) -> Option<IndexStatus> {
        self.worker.wait()
    }

    /// Keep the index in step with the file until the handle is dropped
    pub fn follow(&self) -> FollowHandle {
        FollowHandle::start(Arc::clone(&self.worker), self.follow_interval)
    }

    /// Search the current snapshot on a background thread
    pub fn search(&self, pattern: SearchPattern, limits: SearchLimits) -> SearchTask {
        SearchTask::spawn(
            self.snapshot(),
            Arc::clone(self.source()),
            pattern,
            limits,
            self.search_config.clone(),
        )
    }

    /// Bring an earlier result up to date with the current snapshot
    pub fn refresh_search(&self, previous: SearchResult, limits: SearchLimits) -> SearchTask {
        SearchTask::spawn_refresh(
            self.snapshot(),
            Arc::clone(self.source()),
            previous,
            limits,
            self.search_config.clone(),
        )
    }

    /// Filter colours for a range of lines, compiling `filters` afresh
    pub fn colourise(
        &self,
        filters: &FilterSet,
        first: LineNumber,
        count: LinesCount,
    ) -> Result<Vec<Option<FilterColours>>, SearchError> {
        let compiled = CompiledFilterSet::compile(filters)?;
        let snapshot = self.snapshot();
        colourise(
            &snapshot,
            self.source().as_ref(),
            &compiled,
            first,
            count,
            &self.search_config,
        )
    }
}

//! Chunked, parallel line search over an index snapshot.
//!
//! Lines are read in chunks of [`SearchConfig::chunk_lines`]; one batch of
//! chunks (one per rayon worker) is searched in parallel, then results are
//! merged in line order. Cancellation, the deadline and the match limit are
//! checked between batches, so a stopped search holds exactly the matches of
//! the lines it got through.

use crate::data::{LineNumber, LinesCount, OptionalLineNumber};
use crate::data::{lookup_line_number, lookup_line_number_in};
use crate::error::{IndexError, SearchError};
use crate::index::reader::read_lines;
use crate::index::source::ByteSource;
use crate::index::types::{Generation, IndexConfig, IndexedFile};
use crate::search::pattern::SearchPattern;
use crate::utils::cancel::{CancelToken, percent};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Tuning for search and filter passes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Lines read and matched per unit of parallel work
    pub chunk_lines: usize,
    /// Extra attempts for a chunk whose read failed
    pub read_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            chunk_lines: 5000,
            read_retries: 3,
            retry_delay_ms: 50,
        }
    }
}

impl SearchConfig {
    pub(crate) fn read_config(&self) -> IndexConfig {
        IndexConfig {
            read_retries: self.read_retries,
            retry_delay_ms: self.retry_delay_ms,
            ..IndexConfig::default()
        }
    }
}

/// Optional bounds on a search
#[derive(Debug, Clone, Default)]
pub struct SearchLimits {
    /// Stop once this many matches are held
    pub max_matches: Option<usize>,
    /// Stop at the first batch boundary past this instant
    pub deadline: Option<Instant>,
}

impl SearchLimits {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_max_matches(mut self, max: usize) -> Self {
        self.max_matches = Some(max);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Why a search stopped before the last line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    MatchLimit,
    Deadline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStatus {
    Complete,
    Incomplete(StopReason),
}

/// Matching line numbers, in ascending order, for one snapshot
#[derive(Debug, Clone)]
pub struct SearchResult {
    matches: Vec<LineNumber>,
    pattern: SearchPattern,
    generation: Generation,
    lineage: Generation,
    lines_searched: LinesCount,
    status: SearchStatus,
}

impl SearchResult {
    pub fn matches(&self) -> &[LineNumber] {
        &self.matches
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn pattern(&self) -> &SearchPattern {
        &self.pattern
    }

    /// Generation of the snapshot that was searched
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn lineage(&self) -> Generation {
        self.lineage
    }

    /// Lines `[0, lines_searched)` were examined
    pub fn lines_searched(&self) -> LinesCount {
        self.lines_searched
    }

    pub fn status(&self) -> SearchStatus {
        self.status
    }

    pub fn is_complete(&self) -> bool {
        self.status == SearchStatus::Complete
    }

    /// Fail with `IndexStale` unless `snapshot` is the one searched
    pub fn check_current(&self, snapshot: &IndexedFile) -> Result<(), IndexError> {
        if snapshot.generation() == self.generation {
            Ok(())
        } else {
            Err(IndexError::IndexStale {
                held: self.generation,
                current: snapshot.generation(),
            })
        }
    }

    /// First match after `from`
    pub fn next_match(&self, from: LineNumber) -> OptionalLineNumber {
        let index = match lookup_line_number(&self.matches, from) {
            Ok(i) => i + 1,
            Err(i) => i,
        };
        self.matches.get(index).copied()
    }

    /// Last match before `from`
    pub fn previous_match(&self, from: LineNumber) -> OptionalLineNumber {
        let index = match lookup_line_number(&self.matches, from) {
            Ok(i) | Err(i) => i.checked_sub(1)?,
        };
        self.matches.get(index).copied()
    }

    /// `target` when it matched, else the next match, else the last one
    pub fn closest_match(&self, target: LineNumber) -> OptionalLineNumber {
        match lookup_line_number(&self.matches, target) {
            Ok(i) => Some(self.matches[i]),
            Err(i) => self.matches.get(i).or(self.matches.last()).copied(),
        }
    }

    /// Number of matches before `line`; its row in a filtered view
    pub fn rank_of(&self, line: LineNumber) -> LineNumber {
        lookup_line_number_in(&self.matches, line)
    }
}

/// Runs searches against one snapshot
pub struct SearchEngine<'a> {
    snapshot: &'a IndexedFile,
    source: &'a dyn ByteSource,
    config: SearchConfig,
}

impl<'a> SearchEngine<'a> {
    pub fn new(snapshot: &'a IndexedFile, source: &'a dyn ByteSource) -> Self {
        Self::with_config(snapshot, source, SearchConfig::default())
    }

    pub fn with_config(
        snapshot: &'a IndexedFile,
        source: &'a dyn ByteSource,
        config: SearchConfig,
    ) -> Self {
        Self {
            snapshot,
            source,
            config,
        }
    }

    /// Search every line of the snapshot.
    ///
    /// `on_matches` receives each batch's new matches, in order, with the
    /// percentage of lines done.
    pub fn search(
        &self,
        pattern: &SearchPattern,
        limits: &SearchLimits,
        cancel: &CancelToken,
        on_matches: impl FnMut(&[LineNumber], u8),
    ) -> Result<SearchResult, SearchError> {
        self.scan(pattern, LineNumber::new(0), Vec::new(), limits, cancel, on_matches)
    }

    /// Bring an earlier result up to date with this snapshot.
    ///
    /// A complete result from the same lineage is extended: only lines from
    /// the last one it searched onward are examined, since that line may
    /// have grown. Anything else is searched from scratch.
    pub fn refresh(
        &self,
        previous: &SearchResult,
        limits: &SearchLimits,
        cancel: &CancelToken,
        on_matches: impl FnMut(&[LineNumber], u8),
    ) -> Result<SearchResult, SearchError> {
        let extendable = previous.is_complete()
            && previous.lineage == self.snapshot.lineage()
            && previous.generation <= self.snapshot.generation()
            && previous.lines_searched <= self.snapshot.line_count();
        if !extendable {
            tracing::debug!(
                previous = %previous.generation,
                current = %self.snapshot.generation(),
                "search result not extendable, searching again"
            );
            return self.search(&previous.pattern, limits, cancel, on_matches);
        }

        let resume = previous.lines_searched.end_line().prev();
        let kept: Vec<LineNumber> = previous
            .matches
            .iter()
            .copied()
            .take_while(|line| *line < resume)
            .collect();
        self.scan(&previous.pattern, resume, kept, limits, cancel, on_matches)
    }

    fn scan(
        &self,
        pattern: &SearchPattern,
        start: LineNumber,
        mut matches: Vec<LineNumber>,
        limits: &SearchLimits,
        cancel: &CancelToken,
        mut on_matches: impl FnMut(&[LineNumber], u8),
    ) -> Result<SearchResult, SearchError> {
        let end = self.snapshot.line_count().as_usize();
        let chunk_lines = self.config.chunk_lines.max(1);
        let batch_lines = chunk_lines.saturating_mul(rayon::current_num_threads().max(1));
        let first = start.index().min(end);
        let mut next = first;

        // A refreshed result may already hold more matches than allowed
        if let Some(max) = limits.max_matches {
            if matches.len() > max {
                matches.truncate(max);
                next = matches.last().map_or(0, |line| line.index() + 1);
            }
        }

        let stop = loop {
            if next >= end {
                break None;
            }
            if cancel.is_cancelled() {
                break Some(StopReason::Cancelled);
            }
            if limits.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                break Some(StopReason::Deadline);
            }
            if limits.max_matches.is_some_and(|max| matches.len() >= max) {
                break Some(StopReason::MatchLimit);
            }

            let batch_end = end.min(next.saturating_add(batch_lines));
            let chunks: Vec<(usize, usize)> = (next..batch_end)
                .step_by(chunk_lines)
                .map(|from| (from, (from + chunk_lines).min(batch_end)))
                .collect();

            let results: Vec<Result<Vec<LineNumber>, SearchError>> = chunks
                .par_iter()
                .map(|&(from, to)| self.search_chunk(pattern, from, to))
                .collect();

            let mut found = Vec::new();
            for result in results {
                found.extend(result?);
            }

            let mut searched_to = batch_end;
            let mut limited = false;
            if let Some(max) = limits.max_matches {
                let room = max.saturating_sub(matches.len());
                if found.len() > room {
                    found.truncate(room);
                    searched_to = found.last().map_or(next, |line| line.index() + 1);
                    limited = true;
                }
            }

            matches.extend_from_slice(&found);
            next = searched_to;
            on_matches(&found, percent((next - first) as u64, (end - first) as u64));

            if limited {
                break Some(StopReason::MatchLimit);
            }
        };

        let status = match stop {
            None => SearchStatus::Complete,
            Some(reason) => {
                tracing::debug!(?reason, lines = next, "search stopped early");
                SearchStatus::Incomplete(reason)
            }
        };

        Ok(SearchResult {
            matches,
            pattern: pattern.clone(),
            generation: self.snapshot.generation(),
            lineage: self.snapshot.lineage(),
            lines_searched: LinesCount::from_len(next),
            status,
        })
    }

    fn search_chunk(
        &self,
        pattern: &SearchPattern,
        from: usize,
        to: usize,
    ) -> Result<Vec<LineNumber>, SearchError> {
        let first = LineNumber::from_index(from);
        let lines = read_lines(
            self.snapshot,
            self.source,
            first,
            LinesCount::from_len(to - from),
            &self.config.read_config(),
        )?;

        Ok(lines
            .iter()
            .enumerate()
            .filter(|(_, text)| pattern.is_match(text))
            .map(|(offset, _)| LineNumber::from_index(from + offset))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Outcome;
    use crate::index::build::index_full;
    use crate::index::source::MemorySource;
    use std::time::Duration;

    fn index(source: &MemorySource) -> IndexedFile {
        match index_full(source, &IndexConfig::default(), None, &CancelToken::new(), |_| {}).unwrap() {
            Outcome::Completed(file) => file,
            Outcome::Cancelled => panic!("not cancelled"),
        }
    }

    fn small_chunks() -> SearchConfig {
        SearchConfig {
            chunk_lines: 3,
            read_retries: 0,
            retry_delay_ms: 0,
        }
    }

    fn numbered(values: &[u32]) -> Vec<LineNumber> {
        values.iter().copied().map(LineNumber::new).collect()
    }

    fn numbered_log(lines: usize) -> MemorySource {
        let text: String = (0..lines).map(|i| format!("line {i}\n")).collect();
        MemorySource::new(text.into_bytes())
    }

    #[test]
    fn test_case_insensitive_search() {
        let source = MemorySource::new(b"Timeout\nok\nTIMEOUT\n".to_vec());
        let file = index(&source);
        let engine = SearchEngine::new(&file, &source);
        let pattern = SearchPattern::new("timeout", false).unwrap();

        let result = engine
            .search(&pattern, &SearchLimits::none(), &CancelToken::new(), |_, _| {})
            .unwrap();

        assert_eq!(result.matches(), numbered(&[0, 2]).as_slice());
        assert!(result.is_complete());
        assert_eq!(result.lines_searched(), LinesCount::new(3));
    }

    #[test]
    fn test_matches_ordered_across_chunks() {
        let source = numbered_log(40);
        let file = index(&source);
        let engine = SearchEngine::with_config(&file, &source, small_chunks());
        let pattern = SearchPattern::new(r"line \d*[05]$", true).unwrap();

        let mut streamed = Vec::new();
        let result = engine
            .search(&pattern, &SearchLimits::none(), &CancelToken::new(), |lines, _| {
                streamed.extend_from_slice(lines)
            })
            .unwrap();

        let expected = numbered(&[0, 5, 10, 15, 20, 25, 30, 35]);
        assert_eq!(result.matches(), expected.as_slice());
        assert_eq!(streamed, expected);
    }

    #[test]
    fn test_empty_file_is_complete_with_no_matches() {
        let source = MemorySource::new(Vec::new());
        let file = index(&source);
        let engine = SearchEngine::new(&file, &source);
        let pattern = SearchPattern::new("x", true).unwrap();

        let mut progress = Vec::new();
        let result = engine
            .search(&pattern, &SearchLimits::none(), &CancelToken::new(), |_, p| progress.push(p))
            .unwrap();
        assert!(result.is_empty());
        assert!(result.is_complete());
        assert!(progress.is_empty());
    }

    #[test]
    fn test_cancelled_search_is_incomplete() {
        let source = numbered_log(20);
        let file = index(&source);
        let engine = SearchEngine::with_config(&file, &source, small_chunks());
        let pattern = SearchPattern::new("line", true).unwrap();
        let cancel = CancelToken::new();

        // One worker thread so each batch is a single chunk
        let pool = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();
        let result = pool
            .install(|| engine.search(&pattern, &SearchLimits::none(), &cancel, |_, _| cancel.cancel()))
            .unwrap();

        assert_eq!(result.status(), SearchStatus::Incomplete(StopReason::Cancelled));
        let searched = result.lines_searched().as_usize();
        assert!(searched < 20);
        // Only lines before the stopping point, all of them matching
        assert_eq!(result.len(), searched);
        assert!(result.matches().iter().all(|line| line.index() < searched));
    }

    #[test]
    fn test_match_limit_truncates() {
        let source = numbered_log(30);
        let file = index(&source);
        let engine = SearchEngine::with_config(&file, &source, small_chunks());
        let pattern = SearchPattern::new("line", true).unwrap();
        let limits = SearchLimits::none().with_max_matches(4);

        let result = engine
            .search(&pattern, &limits, &CancelToken::new(), |_, _| {})
            .unwrap();

        assert_eq!(result.matches(), numbered(&[0, 1, 2, 3]).as_slice());
        assert_eq!(result.status(), SearchStatus::Incomplete(StopReason::MatchLimit));
        assert_eq!(result.lines_searched(), LinesCount::new(4));
    }

    #[test]
    fn test_elapsed_deadline_stops_before_reading() {
        let source = numbered_log(10);
        let file = index(&source);
        let engine = SearchEngine::new(&file, &source);
        let pattern = SearchPattern::new("line", true).unwrap();
        let limits = SearchLimits::none().with_deadline(Instant::now() - Duration::from_millis(1));

        let result = engine
            .search(&pattern, &limits, &CancelToken::new(), |_, _| {})
            .unwrap();
        assert_eq!(result.status(), SearchStatus::Incomplete(StopReason::Deadline));
        assert!(result.is_empty());
    }

    #[test]
    fn test_navigation() {
        let source = MemorySource::new(b"a\nERR\nb\nc\nERR\nd\nERR\n".to_vec());
        let file = index(&source);
        let engine = SearchEngine::new(&file, &source);
        let pattern = SearchPattern::new("ERR", true).unwrap();
        let result = engine
            .search(&pattern, &SearchLimits::none(), &CancelToken::new(), |_, _| {})
            .unwrap();
        assert_eq!(result.matches(), numbered(&[1, 4, 6]).as_slice());

        assert_eq!(result.next_match(LineNumber::new(0)), Some(LineNumber::new(1)));
        assert_eq!(result.next_match(LineNumber::new(1)), Some(LineNumber::new(4)));
        assert_eq!(result.next_match(LineNumber::new(6)), None);
        assert_eq!(result.previous_match(LineNumber::new(4)), Some(LineNumber::new(1)));
        assert_eq!(result.previous_match(LineNumber::new(5)), Some(LineNumber::new(4)));
        assert_eq!(result.previous_match(LineNumber::new(1)), None);
        assert_eq!(result.closest_match(LineNumber::new(4)), Some(LineNumber::new(4)));
        assert_eq!(result.closest_match(LineNumber::new(2)), Some(LineNumber::new(4)));
        assert_eq!(result.closest_match(LineNumber::new(9)), Some(LineNumber::new(6)));
        assert_eq!(result.rank_of(LineNumber::new(4)), LineNumber::new(1));
        assert_eq!(result.rank_of(LineNumber::new(5)), LineNumber::new(2));
    }

    #[test]
    fn test_refresh_extends_after_growth() {
        let source = MemorySource::new(b"ERR one\nok\nERR two\npartial ER".to_vec());
        let file = index(&source);
        let pattern = SearchPattern::new("ERR", true).unwrap();
        let first = SearchEngine::new(&file, &source)
            .search(&pattern, &SearchLimits::none(), &CancelToken::new(), |_, _| {})
            .unwrap();
        assert_eq!(first.matches(), numbered(&[0, 2]).as_slice());

        source.append(b"R done\nERR three\n");
        let grown = crate::index::build::index_incremental(
            &file,
            &source,
            &IndexConfig::default(),
            &CancelToken::new(),
            |_| {},
        )
        .unwrap()
        .completed()
        .unwrap();

        let mut streamed = Vec::new();
        let refreshed = SearchEngine::new(&grown, &source)
            .refresh(&first, &SearchLimits::none(), &CancelToken::new(), |lines, _| {
                streamed.extend_from_slice(lines)
            })
            .unwrap();

        assert_eq!(refreshed.matches(), numbered(&[0, 2, 3, 4]).as_slice());
        // Only the grown last line and the new one were examined
        assert_eq!(streamed, numbered(&[3, 4]));
    }

    #[test]
    fn test_refresh_respects_match_limit() {
        let source = numbered_log(10);
        let file = index(&source);
        let pattern = SearchPattern::new("line", true).unwrap();
        let first = SearchEngine::new(&file, &source)
            .search(&pattern, &SearchLimits::none(), &CancelToken::new(), |_, _| {})
            .unwrap();
        assert_eq!(first.len(), 10);

        source.append(b"line 10\n");
        let grown = crate::index::build::index_incremental(
            &file,
            &source,
            &IndexConfig::default(),
            &CancelToken::new(),
            |_| {},
        )
        .unwrap()
        .completed()
        .unwrap();

        let limits = SearchLimits::none().with_max_matches(4);
        let refreshed = SearchEngine::new(&grown, &source)
            .refresh(&first, &limits, &CancelToken::new(), |_, _| {})
            .unwrap();
        let fresh = SearchEngine::new(&grown, &source)
            .search(&pattern, &limits, &CancelToken::new(), |_, _| {})
            .unwrap();

        assert_eq!(refreshed.matches(), numbered(&[0, 1, 2, 3]).as_slice());
        assert_eq!(refreshed.status(), SearchStatus::Incomplete(StopReason::MatchLimit));
        assert_eq!(refreshed.lines_searched(), LinesCount::new(4));
        assert_eq!(refreshed.matches(), fresh.matches());
        assert_eq!(refreshed.lines_searched(), fresh.lines_searched());
    }

    #[test]
    fn test_stale_result_detected() {
        let source = MemorySource::new(b"x\n".to_vec());
        let file = index(&source);
        let pattern = SearchPattern::new("x", true).unwrap();
        let result = SearchEngine::new(&file, &source)
            .search(&pattern, &SearchLimits::none(), &CancelToken::new(), |_, _| {})
            .unwrap();
        assert!(result.check_current(&file).is_ok());

        let mut newer = file.clone();
        newer.generation = Generation::new(file.generation().get() + 1);
        assert!(matches!(
            result.check_current(&newer),
            Err(IndexError::IndexStale { .. })
        ));
    }
}

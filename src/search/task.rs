//! Searches run on a background thread, reporting as they go.

use crate::data::LineNumber;
use crate::error::SearchError;
use crate::index::source::ByteSource;
use crate::index::types::IndexedFile;
use crate::search::engine::{SearchConfig, SearchEngine, SearchLimits, SearchResult};
use crate::search::pattern::SearchPattern;
use crate::utils::cancel::CancelToken;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

/// Notifications from a running search
#[derive(Debug, Clone)]
pub enum SearchEvent {
    /// Matches found by the latest batch, in line order
    Matches { lines: Vec<LineNumber>, percent: u8 },
    Completed(SearchResult),
    /// The search failed; [`SearchTask::wait`] returns the error itself
    Failed(String),
}

enum Job {
    Search(SearchPattern),
    Refresh(SearchResult),
}

/// Handle to a search running on its own thread
pub struct SearchTask {
    cancel: CancelToken,
    events: Receiver<SearchEvent>,
    thread: Option<JoinHandle<Result<SearchResult, SearchError>>>,
}

impl SearchTask {
    /// Search `snapshot` for `pattern`
    pub fn spawn(
        snapshot: Arc<IndexedFile>,
        source: Arc<dyn ByteSource>,
        pattern: SearchPattern,
        limits: SearchLimits,
        config: SearchConfig,
    ) -> Self {
        Self::start(snapshot, source, Job::Search(pattern), limits, config)
    }

    /// Bring `previous` up to date with `snapshot`
    pub fn spawn_refresh(
        snapshot: Arc<IndexedFile>,
        source: Arc<dyn ByteSource>,
        previous: SearchResult,
        limits: SearchLimits,
        config: SearchConfig,
    ) -> Self {
        Self::start(snapshot, source, Job::Refresh(previous), limits, config)
    }

    fn start(
        snapshot: Arc<IndexedFile>,
        source: Arc<dyn ByteSource>,
        job: Job,
        limits: SearchLimits,
        config: SearchConfig,
    ) -> Self {
        let cancel = CancelToken::new();
        let (tx, events) = mpsc::channel();
        let token = cancel.clone();

        let thread = thread::spawn(move || {
            let engine = SearchEngine::with_config(&snapshot, source.as_ref(), config);
            let outcome = run(&engine, job, &limits, &token, &tx);
            let event = match &outcome {
                Ok(result) => SearchEvent::Completed(result.clone()),
                Err(e) => {
                    tracing::warn!(error = %e, "search failed");
                    SearchEvent::Failed(e.to_string())
                }
            };
            let _ = tx.send(event);
            outcome
        });

        Self {
            cancel,
            events,
            thread: Some(thread),
        }
    }

    /// Progress and completion notifications
    pub fn events(&self) -> &Receiver<SearchEvent> {
        &self.events
    }

    /// Ask the search to stop at its next batch boundary
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Block until the search ends
    pub fn wait(mut self) -> Result<SearchResult, SearchError> {
        match self.thread.take().map(JoinHandle::join) {
            Some(Ok(outcome)) => outcome,
            // The search thread panicked; resume the panic here
            Some(Err(panic)) => std::panic::resume_unwind(panic),
            None => unreachable!("search task joined twice"),
        }
    }
}

impl Drop for SearchTask {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.cancel.cancel();
            let _ = thread.join();
        }
    }
}

fn run(
    engine: &SearchEngine<'_>,
    job: Job,
    limits: &SearchLimits,
    cancel: &CancelToken,
    tx: &Sender<SearchEvent>,
) -> Result<SearchResult, SearchError> {
    let report = |lines: &[LineNumber], percent: u8| {
        let _ = tx.send(SearchEvent::Matches {
            lines: lines.to_vec(),
            percent,
        });
    };
    match job {
        Job::Search(pattern) => engine.search(&pattern, limits, cancel, report),
        Job::Refresh(previous) => engine.refresh(&previous, limits, cancel, report),
    }
}

//! Background indexing.
//!
//! An [`IndexWorker`] owns the index of one source. Runs happen on a
//! dedicated thread; each successful run publishes a new immutable
//! [`IndexedFile`] by swapping the shared handle, so readers see either the
//! previous snapshot or the new one, never a partial one.
//!
//! Only one run is in flight at a time: starting a run cancels and joins the
//! previous one first.

pub mod follow;

pub use follow::FollowHandle;

use crate::data::LinesCount;
use crate::error::{IndexError, Outcome};
use crate::index::build::{index_full, index_incremental};
use crate::index::encoding::Encoding;
use crate::index::source::{ByteSource, SourceMetadata};
use crate::index::types::{Generation, IndexConfig, IndexedFile};
use crate::utils::cancel::CancelToken;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

/// Whether a run is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Indexing,
}

/// How a run ended
#[derive(Debug, Clone)]
pub enum IndexStatus {
    /// A new snapshot was published
    Completed { generation: Generation, lines: LinesCount },
    /// Stopped on request; nothing was published
    Cancelled,
    Failed(Arc<IndexError>),
}

/// Notifications sent to subscribers
#[derive(Debug, Clone)]
pub enum IndexEvent {
    /// Percentage of the run's byte range scanned so far
    Progress(u8),
    Finished(IndexStatus),
}

/// What bringing an index up to date with its source requires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePlan {
    /// The source has not changed
    Unchanged,
    /// The source only grew
    Incremental,
    /// The source was truncated, replaced or rewritten in place
    Full,
    /// A run is already in flight
    Deferred,
}

/// Decide how to update `current` given the source's present state.
///
/// Shrinking or a new identity means rotation or truncation, so the old index
/// is discarded. Same size with a new modification time means the content was
/// rewritten in place, which also needs a full pass.
pub fn plan_update(current: &IndexedFile, metadata: &SourceMetadata) -> UpdatePlan {
    let Some(previous) = current.source_metadata() else {
        return UpdatePlan::Full;
    };

    if metadata.identity != previous.identity || metadata.size < current.indexed_size() {
        UpdatePlan::Full
    } else if metadata.size > current.indexed_size() {
        UpdatePlan::Incremental
    } else if metadata.modified != previous.modified {
        UpdatePlan::Full
    } else {
        UpdatePlan::Unchanged
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunKind {
    Full,
    Incremental,
}

struct Job {
    cancel: CancelToken,
    thread: JoinHandle<()>,
}

struct Shared {
    source: Arc<dyn ByteSource>,
    config: IndexConfig,
    current: RwLock<Arc<IndexedFile>>,
    last_generation: AtomicU64,
    status: Mutex<(WorkerState, Option<IndexStatus>)>,
    subscribers: Mutex<Vec<Sender<IndexEvent>>>,
    forced_encoding: Mutex<Option<Encoding>>,
}

/// Owner of one source's index lifecycle
pub struct IndexWorker {
    shared: Arc<Shared>,
    job: Mutex<Option<Job>>,
}

impl IndexWorker {
    /// A worker whose current snapshot is empty until the first run completes
    pub fn new(source: Arc<dyn ByteSource>, config: IndexConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                source,
                config,
                current: RwLock::new(Arc::new(IndexedFile::empty())),
                last_generation: AtomicU64::new(0),
                status: Mutex::new((WorkerState::Idle, None)),
                subscribers: Mutex::new(Vec::new()),
                forced_encoding: Mutex::new(None),
            }),
            job: Mutex::new(None),
        }
    }

    pub fn source(&self) -> &Arc<dyn ByteSource> {
        &self.shared.source
    }

    pub fn config(&self) -> &IndexConfig {
        &self.shared.config
    }

    /// The latest published snapshot
    pub fn snapshot(&self) -> Arc<IndexedFile> {
        self.shared.snapshot()
    }

    pub fn generation(&self) -> Generation {
        self.snapshot().generation()
    }

    /// The current snapshot, provided `held` is still its generation
    pub fn ensure_current(&self, held: Generation) -> Result<Arc<IndexedFile>, IndexError> {
        let current = self.snapshot();
        if current.generation() == held {
            Ok(current)
        } else {
            Err(IndexError::IndexStale {
                held,
                current: current.generation(),
            })
        }
    }

    /// Receive progress and completion events for every later run
    pub fn subscribe(&self) -> Receiver<IndexEvent> {
        let (tx, rx) = mpsc::channel();
        lock(&self.shared.subscribers).push(tx);
        rx
    }

    pub fn state(&self) -> WorkerState {
        lock(&self.shared.status).0
    }

    /// Terminal status of the most recent run
    pub fn last_status(&self) -> Option<IndexStatus> {
        lock(&self.shared.status).1.clone()
    }

    /// Use `encoding` instead of detecting one on the next full index
    pub fn set_forced_encoding(&self, encoding: Option<Encoding>) {
        *lock(&self.shared.forced_encoding) = encoding;
    }

    pub fn forced_encoding(&self) -> Option<Encoding> {
        *lock(&self.shared.forced_encoding)
    }

    /// Index the whole source from scratch
    pub fn start_indexing(&self) {
        self.launch(RunKind::Full);
    }

    /// Index only what was appended since the current snapshot.
    ///
    /// Falls back to a full index if the source was truncated or replaced.
    pub fn start_indexing_incremental(&self) {
        self.launch(RunKind::Incremental);
    }

    /// Start whatever run the source's current state calls for
    pub fn refresh(&self) -> Result<UpdatePlan, IndexError> {
        if self.state() == WorkerState::Indexing {
            return Ok(UpdatePlan::Deferred);
        }

        let metadata = self.shared.source.metadata()?;
        let plan = plan_update(&self.snapshot(), &metadata);
        match plan {
            UpdatePlan::Incremental => self.launch(RunKind::Incremental),
            UpdatePlan::Full => {
                tracing::info!(
                    path = %self.shared.source.path().display(),
                    size = metadata.size,
                    "source truncated or replaced, re-indexing"
                );
                self.launch(RunKind::Full);
            }
            UpdatePlan::Unchanged | UpdatePlan::Deferred => {}
        }
        Ok(plan)
    }

    /// Ask the in-flight run to stop; it ends with [`IndexStatus::Cancelled`]
    pub fn cancel(&self) {
        if let Some(job) = lock(&self.job).as_ref() {
            job.cancel.cancel();
        }
    }

    /// Block until the in-flight run (if any) has finished
    pub fn wait(&self) -> Option<IndexStatus> {
        let job = lock(&self.job).take();
        if let Some(job) = job {
            if job.thread.join().is_err() {
                tracing::error!("indexing thread panicked");
            }
        }
        self.last_status()
    }

    fn launch(&self, kind: RunKind) {
        let mut job = lock(&self.job);
        if let Some(previous) = job.take() {
            previous.cancel.cancel();
            if previous.thread.join().is_err() {
                tracing::error!("indexing thread panicked");
            }
        }

        lock(&self.shared.status).0 = WorkerState::Indexing;
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let shared = Arc::clone(&self.shared);
        let thread = thread::spawn(move || shared.run(kind, &token));
        *job = Some(Job { cancel, thread });
    }
}

impl Drop for IndexWorker {
    fn drop(&mut self) {
        self.cancel();
        self.wait();
    }
}

impl Shared {
    fn snapshot(&self) -> Arc<IndexedFile> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn run(&self, kind: RunKind, cancel: &CancelToken) {
        let previous = self.snapshot();
        let forced = *lock(&self.forced_encoding);
        let source = self.source.as_ref();
        let progress = |percent| self.broadcast(IndexEvent::Progress(percent));

        let plan = match kind {
            RunKind::Full => Ok(UpdatePlan::Full),
            RunKind::Incremental => source.metadata().map(|metadata| plan_update(&previous, &metadata)),
        };

        if let Ok(UpdatePlan::Unchanged) = plan {
            tracing::debug!(path = %source.path().display(), "source unchanged, nothing to index");
            self.finish(IndexStatus::Completed {
                generation: previous.generation(),
                lines: previous.line_count(),
            });
            return;
        }

        let result = plan.map(|plan| plan == UpdatePlan::Full).and_then(|full| {
            let outcome = if full {
                if kind == RunKind::Incremental {
                    tracing::info!(path = %source.path().display(), "cannot extend index, running full index");
                }
                index_full(source, &self.config, forced, cancel, progress)
            } else {
                index_incremental(&previous, source, &self.config, cancel, progress)
            };
            outcome.map(|outcome| (full, outcome))
        });

        let status = match result {
            Ok((_, Outcome::Cancelled)) => IndexStatus::Cancelled,
            Ok((_, Outcome::Completed(_))) if cancel.is_cancelled() => IndexStatus::Cancelled,
            Ok((full, Outcome::Completed(file))) => self.publish(file, full, &previous),
            Err(e) => {
                tracing::warn!(path = %source.path().display(), error = %e, "indexing failed");
                IndexStatus::Failed(Arc::new(e))
            }
        };
        self.finish(status);
    }

    fn publish(&self, mut file: IndexedFile, full: bool, previous: &IndexedFile) -> IndexStatus {
        let generation = Generation::new(self.last_generation.fetch_add(1, Ordering::SeqCst) + 1);
        file.generation = generation;
        file.lineage = if full { generation } else { previous.lineage() };
        let lines = file.line_count();

        tracing::info!(
            path = %self.source.path().display(),
            %generation,
            lines = lines.get(),
            bytes = file.indexed_size(),
            full,
            "index published"
        );
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(file);
        IndexStatus::Completed { generation, lines }
    }

    fn finish(&self, status: IndexStatus) {
        *lock(&self.status) = (WorkerState::Idle, Some(status.clone()));
        self.broadcast(IndexEvent::Finished(status));
    }

    fn broadcast(&self, event: IndexEvent) {
        lock(&self.subscribers).retain(|tx| tx.send(event.clone()).is_ok());
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

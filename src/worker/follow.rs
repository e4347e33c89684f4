//! Follow (tail) mode: keep an index in step with a growing file.
//!
//! A poller thread stats the source on a fixed interval and asks the worker
//! for whatever update the change calls for. Growth is indexed incrementally;
//! truncation or rotation triggers a full re-index.

use crate::worker::{IndexWorker, UpdatePlan};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Longest single sleep, bounding how long `stop` waits
const MAX_SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Handle to a running follow poller
pub struct FollowHandle {
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl FollowHandle {
    /// Start polling `worker`'s source every `interval`
    pub fn start(worker: Arc<IndexWorker>, interval: Duration) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let thread = thread::spawn(move || poll_loop(&worker, interval, &flag));
        Self {
            shutdown,
            thread: Some(thread),
        }
    }

    /// Signal the poller to stop and wait for it
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.load(Ordering::SeqCst)
            && self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for FollowHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn poll_loop(worker: &IndexWorker, interval: Duration, shutdown: &AtomicBool) {
    tracing::debug!(path = %worker.source().path().display(), ?interval, "follow started");

    while !shutdown.load(Ordering::SeqCst) {
        match worker.refresh() {
            Ok(UpdatePlan::Unchanged | UpdatePlan::Deferred) => {}
            Ok(plan) => tracing::debug!(?plan, "source changed"),
            // Transient while a file is being rotated; try again next tick
            Err(e) => tracing::warn!(error = %e, "follow poll failed"),
        }

        let deadline = Instant::now() + interval;
        while !shutdown.load(Ordering::SeqCst) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(MAX_SLEEP_SLICE));
        }
    }

    tracing::debug!("follow stopped");
}

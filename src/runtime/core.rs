//! Driver state machine run on the worker thread.
//!
//! Every method here runs on the driver's own thread. The reactor in
//! `driver.rs` turns fired events into calls on `SourceDriverCore`:
//!
//! - the immediate fetch and readiness events run `do_work`
//! - the reopen timer runs `update_watches`
//! - a wakeup runs `wakeup`, after applying a pending cursor change
//!
//! At most one of the immediate fetch, the reopen timer and the readiness
//! watch is armed at any time; the `Watch` value is the single source of
//! truth for which one.

use super::position::PositionState;
use super::source::ThreadedSource;
use super::watch::ReadinessWatch;
use crate::{LogMessage, ReadResult, SourceMetrics, SourceWorker};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// The event currently armed on the reactor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Watch {
    Idle,
    Immediate,
    Reopen(Instant),
    Readiness,
}

pub(crate) struct CoreSettings {
    pub(crate) name: String,
    pub(crate) fetch_limit: usize,
    pub(crate) time_reopen: Duration,
}

/// Owns the worker; the mutex only lends it to the readable probe
pub(crate) struct SourceDriverCore<W: SourceWorker> {
    name: String,
    fetch_limit: usize,
    time_reopen: Duration,
    worker: Arc<Mutex<W>>,
    source: Arc<ThreadedSource>,
    position: Option<PositionState<W>>,
    readiness: Option<Box<dyn ReadinessWatch>>,
    metrics: SourceMetrics,
    watch: Watch,
    watches_running: bool,
    suspended: bool,
    worker_opened: bool,
}

impl<W: SourceWorker> SourceDriverCore<W> {
    pub(crate) fn new(
        settings: CoreSettings,
        worker: Arc<Mutex<W>>,
        source: Arc<ThreadedSource>,
        position: Option<PositionState<W>>,
        readiness: Option<Box<dyn ReadinessWatch>>,
        metrics: SourceMetrics,
    ) -> Self {
        Self {
            name: settings.name,
            fetch_limit: settings.fetch_limit,
            time_reopen: settings.time_reopen,
            worker,
            source,
            position,
            readiness,
            metrics,
            watch: Watch::Idle,
            watches_running: false,
            suspended: false,
            worker_opened: false,
        }
    }

    pub(crate) fn watch(&self) -> Watch {
        self.watch
    }

    #[cfg(test)]
    pub(crate) fn is_suspended(&self) -> bool {
        self.suspended
    }

    #[cfg(test)]
    pub(crate) fn is_opened(&self) -> bool {
        self.worker_opened
    }

    /// Readability check handed to the readiness watch
    pub(crate) fn readable_probe(&self) -> impl Fn() -> bool + Send + Sync + 'static {
        let worker = Arc::clone(&self.worker);
        move || worker.lock().is_readable()
    }

    /// Wait on the installed readiness watch; never resolves without one
    pub(crate) async fn wait_readable(&mut self, probe: &(dyn Fn() -> bool + Send + Sync)) {
        match self.readiness.as_mut() {
            Some(readiness) => readiness.readable(probe).await,
            None => std::future::pending().await,
        }
    }

    pub(crate) fn thread_init(&mut self) {
        self.worker.lock().thread_init();
        self.start_watches();
    }

    pub(crate) fn shutdown(&mut self) {
        debug!(source = %self.name, "Shutting down this source!");
        self.stop_watches();
    }

    pub(crate) fn thread_deinit(&mut self) {
        self.close();
        self.worker.lock().thread_deinit();

        if let Some(position) = &self.position {
            if let Err(e) = position.persist().commit() {
                error!(source = %self.name, error = %e, "Failed to commit persisted positions");
            }
        }
    }

    /// Fetch a batch with the watches stopped, then re-arm them
    pub(crate) fn do_work(&mut self) {
        self.stop_watches();
        self.fetch_logs();
        self.start_watches();
    }

    pub(crate) fn wakeup(&mut self) {
        self.start_watches();
    }

    /// Reopen timer expired: re-evaluate what to wait for
    pub(crate) fn reopen_timer_expired(&mut self) {
        self.watch = Watch::Idle;
        self.update_watches();
    }

    /// Administrative reposition: close, overwrite the stored cursor, reopen
    ///
    /// Must be followed by a wakeup so the watches are re-armed.
    pub(crate) fn set_cursor(&mut self, cursor: &str) {
        if self.position.is_none() {
            warn!(source = %self.name, "Cursor change requested on a source without position tracking");
            return;
        }

        info!(source = %self.name, cursor = %cursor, "Moving source to a new cursor");
        self.close();
        if let Some(position) = self.position.as_mut() {
            position.overwrite_cursor(cursor, &self.name);
        }
        self.worker_opened = self.open();
    }

    pub(crate) fn stop_watches(&mut self) {
        self.watches_running = false;
        self.set_watch(Watch::Idle);
    }

    pub(crate) fn start_watches(&mut self) {
        self.watches_running = true;

        // a pending reopen keeps its interval until it fires
        if matches!(self.watch, Watch::Reopen(_)) && !self.worker_opened {
            return;
        }
        self.update_watches();
    }

    pub(crate) fn update_watches(&mut self) {
        assert!(self.watches_running, "watches updated while stopped");
        self.suspended = false;

        self.worker_opened = self.check_worker_opened();
        if !self.worker_opened {
            self.worker_opened = self.open();
        }
        if !self.worker_opened {
            // open() already armed the reopen timer
            return;
        }

        if !self.source.free_to_send() {
            // wait for message acknowledgement
            self.suspend();
            self.set_watch(Watch::Idle);
            return;
        }

        if self.is_readable() {
            self.set_watch(Watch::Immediate);
            return;
        }

        if self.readiness.is_some() {
            self.set_watch(Watch::Readiness);
        } else {
            self.arm_reopen_timer();
        }
    }

    /// Read until suspended or the batch limit is reached
    pub(crate) fn fetch_logs(&mut self) -> usize {
        let mut read_messages = 0;
        while !self.suspended && read_messages < self.fetch_limit {
            if !self.source.free_to_send() {
                self.suspend();
                break;
            }
            self.fetch_single();
            read_messages += 1;
        }
        self.metrics.record_batch_size(read_messages);
        read_messages
    }

    fn fetch_single(&mut self) {
        let mut msg = LogMessage::new_empty();

        let (result, bookmark) = {
            let mut worker = self.worker.lock();
            let result = worker.read_message(&mut msg);
            let bookmark = match (&self.position, result) {
                (Some(position), ReadResult::Success) => position.bookmark(&mut worker),
                _ => None,
            };
            (result, bookmark)
        };

        match result {
            ReadResult::Success => {
                debug!(source = %self.name, message = %msg.message(), "Incoming message");
                self.source.post(msg, bookmark);
                self.metrics.record_fetched();
                self.suspended = !self.source.free_to_send();
            }
            ReadResult::NothingToRead => {
                debug!(source = %self.name, "No more messages to read");
                self.suspend();
            }
            ReadResult::NotConnected => {
                error!(source = %self.name, "Read error, source not opened");
                self.metrics.record_read_error();
                self.close_and_suspend();
            }
        }
    }

    fn open(&mut self) -> bool {
        debug!(source = %self.name, "Open source");
        let mut worker = self.worker.lock();
        let opened = worker.open();

        if opened {
            debug!(source = %self.name, "Source opened");
            if let Some(position) = self.position.as_mut() {
                position.init(&mut worker, &self.name);
            }
        } else {
            drop(worker);
            self.arm_reopen_timer();
        }
        opened
    }

    fn close(&mut self) {
        self.worker_opened = false;
        debug!(source = %self.name, "Close source");
        self.worker.lock().close();
    }

    fn close_and_suspend(&mut self) {
        self.close();
        self.suspend();
        self.arm_reopen_timer();
    }

    fn suspend(&mut self) {
        self.suspended = true;
    }

    fn arm_reopen_timer(&mut self) {
        info!(
            source = %self.name,
            time_reopen = ?self.time_reopen,
            "Try to open source again after time reopen"
        );
        self.metrics.record_reopen();
        self.set_watch(Watch::Reopen(Instant::now() + self.time_reopen));
    }

    fn check_worker_opened(&self) -> bool {
        self.worker.lock().is_opened().unwrap_or(self.worker_opened)
    }

    fn is_readable(&self) -> bool {
        self.worker.lock().is_readable()
    }

    fn set_watch(&mut self, watch: Watch) {
        if let Some(readiness) = self.readiness.as_mut() {
            if self.watch == Watch::Readiness && watch != Watch::Readiness {
                readiness.stop_watches();
            }
            if watch == Watch::Readiness {
                readiness.update_watches();
            }
        }
        self.watch = watch;
    }
}

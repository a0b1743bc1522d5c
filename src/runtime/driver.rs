//! Threaded source driver: one OS thread with its own reactor per source.
//!
//! `SourceDriverBuilder` wires a worker, a pipeline and the optional
//! persistence and readiness pieces together and starts the thread.
//! `ThreadedSourceDriver` is the handle used by the rest of the process: it
//! wakes the driver up, moves its cursor and shuts it down.
//!
//! Only two signals cross into the worker thread: shutdown and wakeup. A
//! cursor change is parked in a slot and delivered with a wakeup.

use super::core::{CoreSettings, SourceDriverCore, Watch};
use super::position::{CursorOps, PositionState};
use super::source::ThreadedSource;
use super::watch::{FollowPoll, ReadinessWatch};
use crate::ack::{self, AckTracker};
use crate::config::DEFAULT_STATS_INSTANCE;
use crate::persist::PersistState;
use crate::{
    Pipeline, PositionTracking, SourceConfig, SourceError, SourceMetrics, SourceResult,
    SourceWorker,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Lifecycle of a driver's worker thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DriverState {
    Uninitialized = 0,
    Initializing = 1,
    Running = 2,
    ShuttingDown = 3,
    Terminated = 4,
}

impl DriverState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => DriverState::Uninitialized,
            1 => DriverState::Initializing,
            2 => DriverState::Running,
            3 => DriverState::ShuttingDown,
            _ => DriverState::Terminated,
        }
    }
}

/// Builder for a threaded source driver
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use threaded_source_core::{
///     LogMessage, Pipeline, ReadResult, SourceConfig, SourceDriverBuilder, SourceWorker,
///     TrackedMessage,
/// };
///
/// struct Empty;
///
/// impl SourceWorker for Empty {
///     fn open(&mut self) -> bool {
///         true
///     }
///
///     fn close(&mut self) {}
///
///     fn read_message(&mut self, _msg: &mut LogMessage) -> ReadResult {
///         ReadResult::NothingToRead
///     }
///
///     fn is_readable(&mut self) -> bool {
///         false
///     }
/// }
///
/// let pipeline: Arc<dyn Pipeline> = Arc::new(|msg: TrackedMessage| msg.ack());
/// let driver = SourceDriverBuilder::new(SourceConfig::new("empty"), pipeline)
///     .spawn(Empty)
///     .unwrap();
/// driver.stop();
/// ```
pub struct SourceDriverBuilder {
    config: SourceConfig,
    pipeline: Arc<dyn Pipeline>,
    persist: Option<Arc<PersistState>>,
    readiness: Option<Box<dyn ReadinessWatch>>,
    tracker: Option<Arc<dyn AckTracker>>,
}

impl SourceDriverBuilder {
    pub fn new(config: SourceConfig, pipeline: Arc<dyn Pipeline>) -> Self {
        Self {
            config,
            pipeline,
            persist: None,
            readiness: None,
            tracker: None,
        }
    }

    /// Persist store for position tracking, shared between drivers
    ///
    /// Takes precedence over `persist_file` in the configuration.
    pub fn persist_state(mut self, persist: Arc<PersistState>) -> Self {
        self.persist = Some(persist);
        self
    }

    /// Readiness watch used while the source has nothing to read
    ///
    /// Takes precedence over `follow_freq_ms` in the configuration.
    pub fn readiness_watch(mut self, readiness: Box<dyn ReadinessWatch>) -> Self {
        self.readiness = Some(readiness);
        self
    }

    /// Ack tracker; defaults to the one selected by `ack_tracking`
    pub fn ack_tracker(mut self, tracker: Arc<dyn AckTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Start a driver without position tracking
    pub fn spawn<W: SourceWorker>(self, worker: W) -> SourceResult<ThreadedSourceDriver> {
        self.config.validate()?;
        self.launch(worker, None)
    }

    /// Start a position-tracked driver
    ///
    /// Requires a persist store, supplied either through `persist_state` or
    /// through `persist_file` in the configuration.
    pub fn spawn_position_tracked<W>(mut self, worker: W) -> SourceResult<ThreadedSourceDriver>
    where
        W: SourceWorker + PositionTracking,
    {
        self.config.validate()?;

        let persist = match (self.persist.take(), &self.config.persist_file) {
            (Some(persist), _) => persist,
            (None, Some(path)) => Arc::new(PersistState::open(path)?),
            (None, None) => {
                return Err(SourceError::config(
                    "position tracking requires a persist state or persist_file",
                ))
            }
        };

        let persist_name = worker
            .persist_name()
            .unwrap_or_else(|| self.config.default_persist_name());
        let position = PositionState::new(CursorOps::new(), persist, persist_name);

        self.launch(worker, Some(position))
    }

    fn launch<W: SourceWorker>(
        self,
        worker: W,
        position: Option<PositionState<W>>,
    ) -> SourceResult<ThreadedSourceDriver> {
        init_tracing(&self.config);

        let stats_instance = worker
            .stats_instance()
            .unwrap_or_else(|| DEFAULT_STATS_INSTANCE.to_string());
        let persist_name = position.as_ref().map(|p| p.persist_name().to_string());

        info!(
            driver = %self.config.id,
            source = %stats_instance,
            position_tracked = position.is_some(),
            "Initializing threaded source driver"
        );

        let metrics = SourceMetrics::new(&stats_instance);
        let ack_handler = worker.ack_handler();
        let worker = Arc::new(Mutex::new(worker));
        let wakeup = Arc::new(Notify::new());
        let tracker = self
            .tracker
            .unwrap_or_else(|| ack::tracker_for(self.config.fetch.ack_tracking));
        let readiness = self.readiness.or_else(|| {
            self.config
                .fetch
                .follow_freq_ms
                .map(|ms| Box::new(FollowPoll::new(Duration::from_millis(ms))) as Box<dyn ReadinessWatch>)
        });

        let source = Arc::new(ThreadedSource::new(
            stats_instance.clone(),
            self.config.fetch.init_window_size,
            Arc::clone(&wakeup),
            tracker,
            self.pipeline,
            ack_handler,
            metrics.clone(),
        ));

        let core = SourceDriverCore::new(
            CoreSettings {
                name: stats_instance.clone(),
                fetch_limit: self.config.fetch.fetch_limit,
                time_reopen: self.config.reopen.time_reopen(),
            },
            worker,
            Arc::clone(&source),
            position,
            readiness,
            metrics,
        );

        let signals = Signals {
            shutdown: CancellationToken::new(),
            wakeup,
            pending_cursor: Arc::new(Mutex::new(None)),
            state: Arc::new(AtomicU8::new(DriverState::Uninitialized as u8)),
        };

        let thread_signals = signals.clone();
        let driver_id = self.config.id.clone();
        let thread = std::thread::Builder::new()
            .name(format!("source-{}", self.config.id))
            .spawn(move || worker_thread_main(driver_id, core, thread_signals))?;

        Ok(ThreadedSourceDriver {
            stats_instance,
            persist_name,
            source,
            signals,
            thread: Some(thread),
        })
    }
}

/// Initialize tracing from `RUST_LOG`, falling back to the configured level
pub fn init_tracing(config: &SourceConfig) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .ok(); // Ignore if already initialized
}

#[derive(Clone)]
struct Signals {
    shutdown: CancellationToken,
    wakeup: Arc<Notify>,
    pending_cursor: Arc<Mutex<Option<String>>>,
    state: Arc<AtomicU8>,
}

impl Signals {
    fn set_state(&self, state: DriverState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Handle to a running threaded source driver
///
/// Dropping the handle shuts the driver down and waits for its thread.
pub struct ThreadedSourceDriver {
    stats_instance: String,
    persist_name: Option<String>,
    source: Arc<ThreadedSource>,
    signals: Signals,
    thread: Option<JoinHandle<()>>,
}

impl ThreadedSourceDriver {
    /// Ask the driver to re-arm its watches; wakeups coalesce
    pub fn wakeup(&self) {
        self.signals.wakeup.notify_one();
    }

    /// Reposition a position-tracked driver
    ///
    /// The worker is closed, the stored cursor replaced and the worker opened
    /// again on the driver thread, which then seeks to `cursor`. Requests
    /// made before the driver picks them up replace each other.
    pub fn set_cursor(&self, cursor: impl Into<String>) {
        *self.signals.pending_cursor.lock() = Some(cursor.into());
        self.wakeup();
    }

    /// Signal the driver to stop; safe to call more than once
    pub fn shutdown(&self) {
        self.signals.shutdown.cancel();
    }

    /// Shut the driver down and wait for its thread to exit
    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    pub fn state(&self) -> DriverState {
        DriverState::from_u8(self.signals.state.load(Ordering::Acquire))
    }

    pub fn free_to_send(&self) -> bool {
        self.source.free_to_send()
    }

    /// Remaining window
    pub fn window(&self) -> isize {
        self.source.window()
    }

    /// Messages handed to the pipeline and not yet acknowledged
    pub fn pending_acks(&self) -> usize {
        self.source.pending_acks()
    }

    pub fn stats_instance(&self) -> &str {
        &self.stats_instance
    }

    /// Key of the position record, for position-tracked drivers
    pub fn persist_name(&self) -> Option<&str> {
        self.persist_name.as_deref()
    }

    fn shutdown_and_join(&mut self) {
        self.shutdown();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!(source = %self.stats_instance, "Worker thread panicked");
            }
        }
    }
}

impl Drop for ThreadedSourceDriver {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}

fn worker_thread_main<W: SourceWorker>(driver_id: String, core: SourceDriverCore<W>, signals: Signals) {
    signals.set_state(DriverState::Initializing);
    debug!(driver = %driver_id, "Worker thread started");

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(driver = %driver_id, error = %e, "Failed to build worker reactor");
            signals.set_state(DriverState::Terminated);
            return;
        }
    };

    runtime.block_on(run_reactor(core, &signals));

    signals.set_state(DriverState::Terminated);
    debug!(driver = %driver_id, "Worker thread finished");
}

enum Event {
    Shutdown,
    Wakeup,
    Work,
    ReopenTimer,
    Readable,
}

async fn run_reactor<W: SourceWorker>(mut core: SourceDriverCore<W>, signals: &Signals) {
    core.thread_init();
    signals.set_state(DriverState::Running);

    let probe = core.readable_probe();

    loop {
        let watch = core.watch();
        let reopen_at = match watch {
            Watch::Reopen(at) => at,
            _ => Instant::now(),
        };

        let event = tokio::select! {
            biased;

            _ = signals.shutdown.cancelled() => Event::Shutdown,
            _ = signals.wakeup.notified() => Event::Wakeup,
            _ = std::future::ready(()), if watch == Watch::Immediate => Event::Work,
            _ = tokio::time::sleep_until(reopen_at), if matches!(watch, Watch::Reopen(_)) => {
                Event::ReopenTimer
            }
            _ = core.wait_readable(&probe), if watch == Watch::Readiness => Event::Readable,
        };

        match event {
            Event::Shutdown => {
                signals.set_state(DriverState::ShuttingDown);
                core.shutdown();
                break;
            }
            Event::Wakeup => {
                let cursor = signals.pending_cursor.lock().take();
                if let Some(cursor) = cursor {
                    core.stop_watches();
                    core.set_cursor(&cursor);
                }
                core.wakeup();
            }
            Event::Work | Event::Readable => core.do_work(),
            Event::ReopenTimer => core.reopen_timer_expired(),
        }
    }

    core.thread_deinit();
}

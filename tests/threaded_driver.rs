//! Integration tests running drivers on their real worker thread.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};
use threaded_source_core::{
    DriverState, LogMessage, MessageAck, PersistState, Pipeline, PositionTracking, ReadResult,
    SourceConfig, SourceDriverBuilder, SourceResult, SourceWorker, ThreadedSourceDriver,
    TrackedMessage,
};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Shared {
    lines: Vec<String>,
    opens: usize,
    closes: usize,
    open_failures: usize,
    not_connected_at: Option<usize>,
    acked: usize,
}

/// Line-indexed backend; the cursor is the index of the next line
struct LinesWorker {
    shared: Arc<Mutex<Shared>>,
    next: usize,
}

impl LinesWorker {
    fn new(lines: usize) -> (Self, Arc<Mutex<Shared>>) {
        let shared = Arc::new(Mutex::new(Shared {
            lines: (0..lines).map(|i| format!("line {}", i)).collect(),
            ..Shared::default()
        }));
        let worker = Self {
            shared: Arc::clone(&shared),
            next: 0,
        };
        (worker, shared)
    }
}

impl SourceWorker for LinesWorker {
    fn open(&mut self) -> bool {
        let mut shared = self.shared.lock();
        shared.opens += 1;
        if shared.open_failures > 0 {
            shared.open_failures -= 1;
            return false;
        }
        true
    }

    fn close(&mut self) {
        self.shared.lock().closes += 1;
    }

    fn read_message(&mut self, msg: &mut LogMessage) -> ReadResult {
        let mut shared = self.shared.lock();
        if shared.not_connected_at == Some(self.next) {
            shared.not_connected_at = None;
            return ReadResult::NotConnected;
        }
        match shared.lines.get(self.next) {
            Some(line) => {
                msg.set_message(line.clone());
                self.next += 1;
                ReadResult::Success
            }
            None => ReadResult::NothingToRead,
        }
    }

    fn is_readable(&mut self) -> bool {
        self.next < self.shared.lock().lines.len()
    }

    fn ack_handler(&self) -> Option<Arc<dyn MessageAck>> {
        Some(Arc::new(LinesAck {
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct LinesAck {
    shared: Arc<Mutex<Shared>>,
}

impl MessageAck for LinesAck {
    fn ack(&self, _msg: &LogMessage) -> SourceResult<()> {
        self.shared.lock().acked += 1;
        Ok(())
    }
}

impl PositionTracking for LinesWorker {
    fn cursor(&mut self) -> String {
        self.next.to_string()
    }

    fn seek_to_cursor(&mut self, cursor: Option<&str>) -> bool {
        match cursor {
            None => {
                self.next = 0;
                true
            }
            Some(cursor) => match cursor.parse() {
                Ok(next) => {
                    self.next = next;
                    true
                }
                Err(_) => false,
            },
        }
    }
}

fn acking_pipeline() -> (Arc<dyn Pipeline>, Receiver<String>) {
    let (tx, rx) = mpsc::channel();
    let pipeline = Arc::new(move |msg: TrackedMessage| {
        let line = msg.message().to_string();
        msg.ack();
        tx.send(line).ok();
    });
    (pipeline, rx)
}

fn holding_pipeline() -> (Arc<dyn Pipeline>, Receiver<TrackedMessage>) {
    let (tx, rx) = mpsc::channel();
    let pipeline = Arc::new(move |msg: TrackedMessage| {
        tx.send(msg).ok();
    });
    (pipeline, rx)
}

fn recv_lines(rx: &Receiver<String>, n: usize) -> Vec<String> {
    (0..n)
        .map(|_| rx.recv_timeout(RECV_TIMEOUT).expect("message not delivered"))
        .collect()
}

fn expected(range: std::ops::Range<usize>) -> Vec<String> {
    range.map(|i| format!("line {}", i)).collect()
}

fn wait_for_state(driver: &ThreadedSourceDriver, state: DriverState) {
    let deadline = Instant::now() + RECV_TIMEOUT;
    while driver.state() != state {
        assert!(Instant::now() < deadline, "driver never reached {:?}", state);
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_fetches_all_messages_in_order() {
    let (worker, shared) = LinesWorker::new(25);
    let (pipeline, rx) = acking_pipeline();

    let driver = SourceDriverBuilder::new(SourceConfig::new("ordered"), pipeline)
        .spawn(worker)
        .unwrap();

    assert_eq!(recv_lines(&rx, 25), expected(0..25));
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    assert_eq!(driver.window(), 100);
    assert_eq!(driver.pending_acks(), 0);

    driver.stop();
    let shared = shared.lock();
    assert_eq!(shared.acked, 25);
    assert_eq!(shared.opens, 1);
    assert_eq!(shared.closes, 1);
}

#[test]
fn test_backpressure_holds_until_ack() {
    let (worker, _shared) = LinesWorker::new(10);
    let (pipeline, rx) = holding_pipeline();
    let mut config = SourceConfig::new("backpressure");
    config.fetch.init_window_size = 3;

    let driver = SourceDriverBuilder::new(config, pipeline).spawn(worker).unwrap();

    let mut in_flight: Vec<TrackedMessage> = (0..3)
        .map(|_| rx.recv_timeout(RECV_TIMEOUT).unwrap())
        .collect();
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    assert!(!driver.free_to_send());
    assert_eq!(driver.window(), 0);
    assert_eq!(driver.pending_acks(), 3);

    in_flight.remove(0).ack();
    let next = rx.recv_timeout(RECV_TIMEOUT).expect("driver did not resume after ack");
    assert_eq!(next.message(), "line 3");
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

    drop(next);
    drop(in_flight);
    driver.stop();
}

#[test]
fn test_resume_from_persist_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = SourceConfig::new("resume");
    config.persist_file = Some(dir.path().join("positions.json"));

    let (worker, _) = LinesWorker::new(10);
    let (pipeline, rx) = acking_pipeline();
    let driver = SourceDriverBuilder::new(config.clone(), pipeline)
        .spawn_position_tracked(worker)
        .unwrap();
    assert_eq!(driver.persist_name(), Some("default:resume:LogThreadedSource"));
    assert_eq!(recv_lines(&rx, 10), expected(0..10));
    driver.stop();

    let (worker, shared) = LinesWorker::new(15);
    let (pipeline, rx) = acking_pipeline();
    let driver = SourceDriverBuilder::new(config, pipeline)
        .spawn_position_tracked(worker)
        .unwrap();

    assert_eq!(recv_lines(&rx, 5), expected(10..15));
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    driver.stop();
    assert_eq!(shared.lock().acked, 5);
}

#[test]
fn test_set_cursor_rewinds_source() {
    let persist = Arc::new(PersistState::in_memory());
    let (worker, shared) = LinesWorker::new(6);
    let (pipeline, rx) = acking_pipeline();

    let driver = SourceDriverBuilder::new(SourceConfig::new("rewind"), pipeline)
        .persist_state(Arc::clone(&persist))
        .spawn_position_tracked(worker)
        .unwrap();
    assert_eq!(recv_lines(&rx, 6), expected(0..6));

    driver.set_cursor("2");
    assert_eq!(recv_lines(&rx, 4), expected(2..6));

    driver.stop();
    let shared = shared.lock();
    assert_eq!(shared.opens, 2);
    assert_eq!(shared.closes, 2);
}

#[test]
fn test_reopen_after_open_failure() {
    let (worker, shared) = LinesWorker::new(3);
    shared.lock().open_failures = 1;
    let (pipeline, rx) = acking_pipeline();
    let mut config = SourceConfig::new("flaky");
    config.reopen.time_reopen_secs = 1;

    let started = Instant::now();
    let driver = SourceDriverBuilder::new(config, pipeline).spawn(worker).unwrap();

    assert_eq!(recv_lines(&rx, 3), expected(0..3));
    assert!(started.elapsed() >= Duration::from_secs(1));
    driver.stop();
    assert_eq!(shared.lock().opens, 2);
}

#[test]
fn test_not_connected_reopens_and_continues() {
    let (worker, shared) = LinesWorker::new(5);
    shared.lock().not_connected_at = Some(2);
    let (pipeline, rx) = acking_pipeline();
    let mut config = SourceConfig::new("disconnect");
    config.reopen.time_reopen_secs = 1;

    let driver = SourceDriverBuilder::new(config, pipeline).spawn(worker).unwrap();

    assert_eq!(recv_lines(&rx, 2), expected(0..2));
    let resumed_from = Instant::now();
    assert_eq!(recv_lines(&rx, 3), expected(2..5));
    assert!(resumed_from.elapsed() >= Duration::from_millis(500));

    driver.stop();
    let shared = shared.lock();
    assert_eq!(shared.opens, 2);
    assert_eq!(shared.closes, 2);
}

#[test]
fn test_follow_poll_picks_up_new_lines() {
    let (worker, shared) = LinesWorker::new(2);
    let (pipeline, rx) = acking_pipeline();
    let mut config = SourceConfig::new("follow");
    config.fetch.follow_freq_ms = Some(20);

    let driver = SourceDriverBuilder::new(config, pipeline).spawn(worker).unwrap();
    assert_eq!(recv_lines(&rx, 2), expected(0..2));

    shared.lock().lines.push("line 2".to_string());
    assert_eq!(recv_lines(&rx, 1), expected(2..3));

    driver.stop();
}

#[test]
fn test_shutdown_is_idempotent() {
    let (worker, _) = LinesWorker::new(0);
    let (pipeline, _rx) = acking_pipeline();

    let driver = SourceDriverBuilder::new(SourceConfig::new("idle"), pipeline)
        .spawn(worker)
        .unwrap();
    wait_for_state(&driver, DriverState::Running);

    driver.shutdown();
    driver.shutdown();
    wait_for_state(&driver, DriverState::Terminated);
    driver.stop();
}

/// Backend whose reads after the first one take a long time
struct SlowWorker {
    reads: usize,
    read_delay: Duration,
    slow_read_started: Sender<()>,
    acked: Arc<AtomicUsize>,
}

struct CountingAck {
    acked: Arc<AtomicUsize>,
}

impl MessageAck for CountingAck {
    fn ack(&self, _msg: &LogMessage) -> SourceResult<()> {
        self.acked.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl SourceWorker for SlowWorker {
    fn open(&mut self) -> bool {
        true
    }

    fn close(&mut self) {}

    fn read_message(&mut self, msg: &mut LogMessage) -> ReadResult {
        self.reads += 1;
        match self.reads {
            1 => {}
            2 => {
                self.slow_read_started.send(()).ok();
                std::thread::sleep(self.read_delay);
            }
            _ => return ReadResult::NothingToRead,
        }
        msg.set_message(format!("slow {}", self.reads));
        ReadResult::Success
    }

    fn is_readable(&mut self) -> bool {
        false
    }

    fn ack_handler(&self) -> Option<Arc<dyn MessageAck>> {
        Some(Arc::new(CountingAck {
            acked: Arc::clone(&self.acked),
        }))
    }
}

#[test]
fn test_ack_during_slow_read_does_not_wait_for_worker() {
    let (slow_tx, slow_rx) = mpsc::channel();
    let acked = Arc::new(AtomicUsize::new(0));
    let worker = SlowWorker {
        reads: 0,
        read_delay: Duration::from_millis(800),
        slow_read_started: slow_tx,
        acked: Arc::clone(&acked),
    };
    let (pipeline, rx) = holding_pipeline();

    let driver = SourceDriverBuilder::new(SourceConfig::new("slow"), pipeline)
        .spawn(worker)
        .unwrap();

    let first = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    assert_eq!(first.message(), "slow 1");
    slow_rx.recv_timeout(RECV_TIMEOUT).unwrap();

    let ack_time = std::thread::spawn(move || {
        let started = Instant::now();
        first.ack();
        started.elapsed()
    })
    .join()
    .unwrap();

    assert!(
        ack_time < Duration::from_millis(300),
        "ack waited {:?} for the worker",
        ack_time
    );
    assert_eq!(acked.load(Ordering::SeqCst), 1);

    let second = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    assert_eq!(second.message(), "slow 2");
    second.ack();
    driver.stop();
    assert_eq!(acked.load(Ordering::SeqCst), 2);
}

//! Simple source example
//!
//! This example demonstrates a minimal source worker that generates test messages.
//! The pipeline prints every message and acknowledges it right away; a small
//! window makes the driver pause for acknowledgements every few messages.
//!
//! Usage:
//!   SOURCE_ID=simple-source \
//!   cargo run --example simple_source

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use threaded_source_core::{
    LogMessage, MessageAck, Pipeline, ReadResult, SourceConfig, SourceDriverBuilder,
    SourceResult, SourceWorker, TrackedMessage,
};

/// A simple source worker that generates test messages
struct SimpleSourceWorker {
    counter: u64,
    max_messages: u64,
}

impl SimpleSourceWorker {
    fn new(max_messages: u64) -> Self {
        Self {
            counter: 0,
            max_messages,
        }
    }
}

/// Prints acknowledgements; runs on the pipeline's thread
struct PrintAck;

impl MessageAck for PrintAck {
    fn ack(&self, msg: &LogMessage) -> SourceResult<()> {
        println!("Acknowledged: {}", msg.message());
        Ok(())
    }
}

impl SourceWorker for SimpleSourceWorker {
    fn open(&mut self) -> bool {
        println!("SimpleSourceWorker opened");
        println!("Will generate {} messages", self.max_messages);
        true
    }

    fn close(&mut self) {
        println!("SimpleSourceWorker closed");
        println!("Total messages generated: {}", self.counter);
    }

    fn read_message(&mut self, msg: &mut LogMessage) -> ReadResult {
        if self.counter >= self.max_messages {
            return ReadResult::NothingToRead;
        }
        self.counter += 1;

        msg.set_message(format!("Test message #{}", self.counter));
        msg.set_attribute("source", "simple-source-worker");
        msg.set_attribute("message_number", self.counter.to_string());
        ReadResult::Success
    }

    fn is_readable(&mut self) -> bool {
        self.counter < self.max_messages
    }

    fn ack_handler(&self) -> Option<Arc<dyn MessageAck>> {
        Some(Arc::new(PrintAck))
    }

    fn stats_instance(&self) -> Option<String> {
        Some("simple-source".to_string())
    }
}

fn main() -> SourceResult<()> {
    let mut config = SourceConfig::from_env().unwrap_or_else(|_| {
        println!("Using default configuration for testing");
        println!("To use custom settings, set SOURCE_ID and SOURCE_GROUP");
        println!();
        SourceConfig::new("simple-source")
    });
    config.fetch.init_window_size = 4;

    let max_messages = 20;
    let (done_tx, done_rx) = mpsc::channel();
    let pipeline: Arc<dyn Pipeline> = Arc::new(move |msg: TrackedMessage| {
        println!(
            "Received: {} (number {})",
            msg.message(),
            msg.attribute("message_number").unwrap_or("?")
        );
        msg.ack();
        done_tx.send(()).ok();
    });

    let driver = SourceDriverBuilder::new(config, pipeline).spawn(SimpleSourceWorker::new(max_messages))?;

    for _ in 0..max_messages {
        if done_rx.recv_timeout(Duration::from_secs(10)).is_err() {
            println!("Timed out waiting for messages");
            break;
        }
    }

    driver.stop();
    Ok(())
}

//! File follow source example
//!
//! Follows a growing text file line by line, like `tail -f`. The byte offset
//! after each line is the cursor: it is persisted once the line is
//! acknowledged, so a restarted follower continues where the previous one
//! stopped. New data is detected by polling the file size.
//!
//! Usage:
//!   cargo run --example file_follow -- /var/log/app.log [positions.json]
//!
//! `FOLLOW_SECONDS` (default 30) limits how long the example runs.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use threaded_source_core::{
    LogMessage, Pipeline, PositionTracking, ReadResult, SourceConfig, SourceDriverBuilder,
    SourceError, SourceResult, SourceWorker, TrackedMessage,
};

/// Follows one file; the cursor is the byte offset after the last line read
struct FileFollowWorker {
    path: PathBuf,
    reader: Option<BufReader<File>>,
    offset: u64,
}

impl FileFollowWorker {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            reader: None,
            offset: 0,
        }
    }

    fn file_len(&self) -> Option<u64> {
        std::fs::metadata(&self.path).ok().map(|m| m.len())
    }
}

impl SourceWorker for FileFollowWorker {
    fn open(&mut self) -> bool {
        match File::open(&self.path) {
            Ok(file) => {
                self.reader = Some(BufReader::new(file));
                true
            }
            Err(e) => {
                eprintln!("Cannot open {}: {}", self.path.display(), e);
                false
            }
        }
    }

    fn close(&mut self) {
        self.reader = None;
    }

    fn is_opened(&self) -> Option<bool> {
        Some(self.reader.is_some())
    }

    fn read_message(&mut self, msg: &mut LogMessage) -> ReadResult {
        let Some(reader) = self.reader.as_mut() else {
            return ReadResult::NotConnected;
        };

        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => ReadResult::NothingToRead,
            Ok(_) if !line.ends_with('\n') => {
                // partial line: wait for the writer to finish it
                match reader.seek(SeekFrom::Start(self.offset)) {
                    Ok(_) => ReadResult::NothingToRead,
                    Err(_) => ReadResult::NotConnected,
                }
            }
            Ok(n) => {
                self.offset += n as u64;
                msg.set_message(line.trim_end_matches(&['\r', '\n'][..]));
                msg.set_attribute("file", self.path.display().to_string());
                msg.set_attribute("offset", self.offset.to_string());
                ReadResult::Success
            }
            Err(_) => ReadResult::NotConnected,
        }
    }

    fn is_readable(&mut self) -> bool {
        self.file_len().is_some_and(|len| len > self.offset)
    }

    fn stats_instance(&self) -> Option<String> {
        Some(format!("file_follow,{}", self.path.display()))
    }
}

impl PositionTracking for FileFollowWorker {
    fn persist_name(&self) -> Option<String> {
        Some(format!("file_follow:{}", self.path.display()))
    }

    fn cursor(&mut self) -> String {
        self.offset.to_string()
    }

    fn seek_to_cursor(&mut self, cursor: Option<&str>) -> bool {
        let offset = match cursor {
            None => 0,
            Some(cursor) => match cursor.parse::<u64>() {
                Ok(offset) if self.file_len().is_some_and(|len| offset <= len) => offset,
                _ => return false,
            },
        };

        let Some(reader) = self.reader.as_mut() else {
            return false;
        };
        match reader.seek(SeekFrom::Start(offset)) {
            Ok(_) => {
                self.offset = offset;
                true
            }
            Err(_) => false,
        }
    }
}

fn main() -> SourceResult<()> {
    let mut args = std::env::args().skip(1);
    let path = args
        .next()
        .map(PathBuf::from)
        .ok_or_else(|| SourceError::config("usage: file_follow <file> [persist file]"))?;
    let persist_file = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("file_follow.positions.json"));
    let run_for = std::env::var("FOLLOW_SECONDS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(30);

    let mut config = SourceConfig::new("file_follow");
    config.reopen.time_reopen_secs = 5;
    config.fetch.follow_freq_ms = Some(500);
    config.persist_file = Some(persist_file);

    let pipeline: Arc<dyn Pipeline> = Arc::new(|msg: TrackedMessage| {
        println!(
            "[{}] {}",
            msg.attribute("offset").unwrap_or("?"),
            msg.message()
        );
        msg.ack();
    });

    let driver = SourceDriverBuilder::new(config, pipeline)
        .spawn_position_tracked(FileFollowWorker::new(path))?;
    println!(
        "Following as {} (position record {})",
        driver.stats_instance(),
        driver.persist_name().unwrap_or("-")
    );

    std::thread::sleep(Duration::from_secs(run_for));
    driver.stop();
    Ok(())
}

//! Speech delivery for the single-loop shape.
//!
//! The detection loop never blocks on playback: alerts go into an unbounded
//! FIFO channel and a background worker drains it, polling at a small fixed
//! interval so it can observe the stop flag. Synthesis failures are logged
//! and never reach the producer. Delivery is at-most-once; phrases still
//! queued at shutdown are discarded.

use anyhow::{anyhow, Result};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_RATE_WPM: u32 = 170;

/// External speech sink. Implementations may block while speaking.
pub trait SpeechSink: Send {
    fn speak(&mut self, text: &str) -> Result<()>;
}

/// Shells out to `espeak-ng`. Blocks until playback finishes.
pub struct EspeakSink {
    /// Speaking rate in words per minute.
    pub rate: u32,
}

impl EspeakSink {
    /// True when the `espeak-ng` binary is runnable on this host.
    pub fn available() -> bool {
        Command::new("espeak-ng")
            .arg("--version")
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false)
    }
}

impl Default for EspeakSink {
    fn default() -> Self {
        Self {
            rate: DEFAULT_RATE_WPM,
        }
    }
}

impl SpeechSink for EspeakSink {
    fn speak(&mut self, text: &str) -> Result<()> {
        let status = Command::new("espeak-ng")
            .arg("-s")
            .arg(self.rate.to_string())
            .arg(text)
            .status()
            .map_err(|e| anyhow!("failed to run espeak-ng: {}", e))?;
        if !status.success() {
            return Err(anyhow!("espeak-ng exited with {}", status));
        }
        Ok(())
    }
}

/// Logs phrases instead of playing them. Fallback when no synthesizer
/// exists on the host.
pub struct LogSink;

impl SpeechSink for LogSink {
    fn speak(&mut self, text: &str) -> Result<()> {
        log::info!("speaking: {}", text);
        Ok(())
    }
}

/// Unbounded FIFO of pending phrases with a dedicated consumer thread.
pub struct SpeechQueue {
    tx: Sender<String>,
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl SpeechQueue {
    pub fn spawn(sink: Box<dyn SpeechSink>) -> Self {
        let (tx, rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_worker = stop.clone();
        let join = std::thread::spawn(move || run_worker(rx, sink, stop_worker));
        Self {
            tx,
            stop,
            join: Some(join),
        }
    }

    /// Non-blocking enqueue. Silently dropped once the worker is gone.
    pub fn say(&self, text: impl Into<String>) {
        let _ = self.tx.send(text.into());
    }

    /// Signal the worker and wait for it up to a fixed bound. Undelivered
    /// phrases are discarded; a sink stuck mid-playback is detached rather
    /// than waited on forever.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            let deadline = Instant::now() + SHUTDOWN_TIMEOUT;
            while !join.is_finished() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(20));
            }
            if join.is_finished() {
                let _ = join.join();
            } else {
                log::warn!(
                    "speech worker did not stop within {:?}, detaching",
                    SHUTDOWN_TIMEOUT
                );
            }
        }
    }
}

fn run_worker(rx: Receiver<String>, mut sink: Box<dyn SpeechSink>, stop: Arc<AtomicBool>) {
    loop {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(text) => {
                if let Err(err) = sink.speak(&text) {
                    log::warn!("speech synthesis failed: {}", err);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSink {
        spoken: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl SpeechSink for RecordingSink {
        fn speak(&mut self, text: &str) -> Result<()> {
            self.spoken.lock().unwrap().push(text.to_string());
            if self.fail {
                return Err(anyhow!("synthesis broke"));
            }
            Ok(())
        }
    }

    #[test]
    fn phrases_are_delivered_in_order() {
        let spoken = Arc::new(Mutex::new(Vec::new()));
        let queue = SpeechQueue::spawn(Box::new(RecordingSink {
            spoken: spoken.clone(),
            fail: false,
        }));
        queue.say("Warning! person close in front");
        queue.say("Warning! car far away to the left");

        let deadline = Instant::now() + Duration::from_secs(2);
        while spoken.lock().unwrap().len() < 2 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        queue.stop();

        let spoken = spoken.lock().unwrap();
        assert_eq!(
            *spoken,
            vec![
                "Warning! person close in front".to_string(),
                "Warning! car far away to the left".to_string(),
            ]
        );
    }

    #[test]
    fn sink_failure_does_not_kill_the_worker() {
        let spoken = Arc::new(Mutex::new(Vec::new()));
        let queue = SpeechQueue::spawn(Box::new(RecordingSink {
            spoken: spoken.clone(),
            fail: true,
        }));
        queue.say("first");
        queue.say("second");

        let deadline = Instant::now() + Duration::from_secs(2);
        while spoken.lock().unwrap().len() < 2 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        queue.stop();
        assert_eq!(spoken.lock().unwrap().len(), 2);
    }

    #[test]
    fn stop_returns_within_the_bound() {
        let spoken = Arc::new(Mutex::new(Vec::new()));
        let queue = SpeechQueue::spawn(Box::new(RecordingSink {
            spoken,
            fail: false,
        }));
        let started = Instant::now();
        queue.stop();
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}

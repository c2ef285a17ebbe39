//! Console line listener
//!
//! Reads lines on a dedicated thread and forwards them over a channel. The
//! daemon treats them as triggers while idle and as spoken answers while a
//! workflow runs.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;

use tracing::{debug, info, warn};

/// Errors that can occur in the console listener
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("console listener is already running")]
    AlreadyRunning,

    #[error("failed to spawn listener thread: {0}")]
    ThreadSpawn(String),
}

/// Forwards input lines to a channel from a background thread
pub struct ConsoleListener {
    line_tx: Sender<String>,
    running: Arc<AtomicBool>,
}

impl ConsoleListener {
    /// Create a new console listener
    pub fn new(line_tx: Sender<String>) -> Self {
        Self {
            line_tx,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start reading standard input
    pub fn start(&self) -> Result<(), TriggerError> {
        self.start_with(std::io::BufReader::new(std::io::stdin()))
    }

    /// Start reading `reader` until EOF or [`stop`](Self::stop)
    ///
    /// A blocked read only notices `stop` once the next line arrives.
    pub fn start_with<R>(&self, reader: R) -> Result<(), TriggerError>
    where
        R: BufRead + Send + 'static,
    {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(TriggerError::AlreadyRunning);
        }

        let line_tx = self.line_tx.clone();
        let running = Arc::clone(&self.running);

        let spawned = thread::Builder::new()
            .name("console-listener".to_string())
            .spawn(move || {
                info!("console listener thread started");
                forward_lines(reader, &line_tx, &running);
                running.store(false, Ordering::SeqCst);
                info!("console listener thread stopped");
            });

        if let Err(e) = spawned {
            self.running.store(false, Ordering::SeqCst);
            return Err(TriggerError::ThreadSpawn(e.to_string()));
        }

        Ok(())
    }

    /// Stop the listener
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if the listener is currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

fn forward_lines<R: BufRead>(reader: R, line_tx: &Sender<String>, running: &AtomicBool) {
    for line in reader.lines() {
        if !running.load(Ordering::SeqCst) {
            break;
        }

        match line {
            Ok(line) => {
                debug!(len = line.len(), "console line");
                if line_tx.send(line).is_err() {
                    warn!("failed to forward console line - channel closed?");
                    break;
                }
            }
            Err(e) => {
                warn!(?e, "console read error");
                break;
            }
        }
    }
}

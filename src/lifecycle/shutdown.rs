//! Signal handling for graceful shutdown
//!
//! SIGINT/SIGTERM raise a shared flag. Running workflows see it at their
//! next state boundary and cancel; the trigger loop sees it and exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, info, warn};

/// Handles shutdown signals (SIGTERM, SIGINT)
#[derive(Clone)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// Create a new, untriggered shutdown signal
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The flag raised on shutdown, for use as a workflow cancel flag
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Listen for signals on a dedicated thread until one arrives
    pub fn install(&self) -> std::io::Result<thread::JoinHandle<()>> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        // Register inside the runtime so failures surface here, not on the thread.
        let (mut sigterm, mut sigint) = runtime.block_on(async {
            Ok::<_, std::io::Error>((
                signal(SignalKind::terminate())?,
                signal(SignalKind::interrupt())?,
            ))
        })?;

        let this = self.clone();
        thread::Builder::new()
            .name("shutdown-signal".to_string())
            .spawn(move || {
                runtime.block_on(async {
                    tokio::select! {
                        _ = sigterm.recv() => {
                            debug!("received SIGTERM");
                        }
                        _ = sigint.recv() => {
                            debug!("received SIGINT");
                        }
                    }
                });
                info!("shutdown requested");
                this.trigger();
            })
            .map_err(|e| {
                warn!(?e, "failed to spawn signal thread");
                e
            })
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

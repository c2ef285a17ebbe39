//! Unix domain socket capability server
//!
//! Reference implementation of the remote side of the protocol. Each client
//! connection gets its own task; requests on one connection are answered in
//! order.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::protocol::{read_frame, write_frame, Reply, Request};

/// Answers capability requests
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    async fn handle(&self, request: Request) -> Reply;
}

/// Capability server accepting client connections
pub struct CapabilityServer {
    path: PathBuf,
    listener: UnixListener,
    handler: Arc<dyn CapabilityHandler>,
    stop_tx: broadcast::Sender<()>,
}

impl CapabilityServer {
    /// Bind a new server at `socket_path`. Must be called inside a tokio runtime.
    pub fn bind(socket_path: &Path, handler: Arc<dyn CapabilityHandler>) -> Result<Self> {
        prepare_socket_path(socket_path)?;

        let listener = UnixListener::bind(socket_path)
            .with_context(|| format!("failed to bind {}", socket_path.display()))?;
        restrict_to_owner(socket_path)?;

        info!(socket = %socket_path.display(), "capability server listening");

        let (stop_tx, _) = broadcast::channel(1);
        Ok(Self {
            path: socket_path.to_path_buf(),
            listener,
            handler,
            stop_tx,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.path
    }

    /// Accept connections until [`shutdown`](Self::shutdown) is called
    pub async fn run(&self) -> Result<()> {
        let mut stop_rx = self.stop_tx.subscribe();

        loop {
            let stream = tokio::select! {
                _ = stop_rx.recv() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => stream,
                    Err(e) => {
                        error!(error = %e, "failed to accept capability client");
                        continue;
                    }
                },
            };

            debug!("capability client connected");
            let handler = Arc::clone(&self.handler);
            let mut stopped = self.stop_tx.subscribe();

            tokio::spawn(async move {
                tokio::select! {
                    served = serve(stream, handler) => {
                        if let Err(e) = served {
                            warn!(error = %e, "capability client dropped");
                        }
                    }
                    _ = stopped.recv() => debug!("closing capability client for shutdown"),
                }
            });
        }

        debug!("capability server accept loop finished");
        Ok(())
    }

    /// Stop accepting, close open connections and remove the socket file
    pub fn shutdown(&self) {
        let _ = self.stop_tx.send(());

        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(error = %e, "could not remove capability socket"),
        }

        info!("capability server stopped");
    }
}

/// Answer requests on one connection until the client hangs up
async fn serve(mut stream: UnixStream, handler: Arc<dyn CapabilityHandler>) -> Result<()> {
    while let Some(request) = next_request(&mut stream).await? {
        let capability = request.capability();
        let reply = handler.handle(request).await;
        debug!(capability, status = ?reply.status, "answered request");
        write_frame(&mut stream, &reply).await?;
    }

    debug!("capability client hung up");
    Ok(())
}

/// Read one request; a malformed frame gets an error reply and ends the
/// connection
async fn next_request(stream: &mut UnixStream) -> Result<Option<Request>> {
    match read_frame::<_, Request>(stream).await {
        Ok(request) => Ok(request),
        Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
            warn!(error = %e, "malformed capability request");
            let _ = write_frame(stream, &Reply::error("malformed request")).await;
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn prepare_socket_path(socket_path: &Path) -> Result<()> {
    if let Some(dir) = socket_path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    // A previous run may have left its socket behind.
    if socket_path.exists() {
        std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
    }
    Ok(())
}

#[cfg(unix)]
fn restrict_to_owner(socket_path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))
        .context("failed to restrict socket permissions")
}

#[cfg(not(unix))]
fn restrict_to_owner(_socket_path: &Path) -> Result<()> {
    Ok(())
}

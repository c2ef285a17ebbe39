//! Asynchronous capability client over a Unix domain socket

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UnixStream;
use tracing::{debug, info, warn};

use super::protocol::{read_frame, write_frame, Reply, Request};

/// Errors from the asynchronous client
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("client is not connected")]
    NotConnected,

    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server closed the connection")]
    Closed,

    #[error("{capability} call timed out after {timeout_ms}ms")]
    Timeout {
        capability: &'static str,
        timeout_ms: u64,
    },
}

/// Async-native remote client wrapped by the blocking facade
#[async_trait]
pub trait CapabilityClient: Send {
    /// Open the underlying connection
    async fn connect(&mut self) -> Result<(), ClientError>;

    /// Close the underlying connection; no-op when already closed
    async fn disconnect(&mut self);

    /// Issue one request and wait for its reply
    async fn call(&mut self, request: Request) -> Result<Reply, ClientError>;

    async fn recognize(&mut self, token: &str, image: Vec<u8>) -> Result<Reply, ClientError> {
        self.call(Request::Recognize {
            token: token.to_string(),
            image,
        })
        .await
    }

    async fn register(
        &mut self,
        token: &str,
        name: &str,
        image: Vec<u8>,
    ) -> Result<Reply, ClientError> {
        self.call(Request::Register {
            token: token.to_string(),
            name: name.to_string(),
            image,
        })
        .await
    }

    async fn delete(&mut self, token: &str, user_id: &str) -> Result<Reply, ClientError> {
        self.call(Request::Delete {
            token: token.to_string(),
            user_id: user_id.to_string(),
        })
        .await
    }

    async fn update(&mut self, token: &str, user_id: &str, name: &str) -> Result<Reply, ClientError> {
        self.call(Request::Update {
            token: token.to_string(),
            user_id: user_id.to_string(),
            name: name.to_string(),
        })
        .await
    }

    async fn list(&mut self, token: &str, limit: u32, offset: u32) -> Result<Reply, ClientError> {
        self.call(Request::List {
            token: token.to_string(),
            limit,
            offset,
        })
        .await
    }

    async fn health(&mut self) -> Result<Reply, ClientError> {
        self.call(Request::Health).await
    }
}

/// [`CapabilityClient`] speaking the length-prefixed JSON protocol
pub struct SocketClient {
    socket_path: PathBuf,
    stream: Option<UnixStream>,
    request_timeout: Option<Duration>,
}

impl SocketClient {
    /// Create a client for the server at `socket_path`; nothing is opened yet
    pub fn new(socket_path: &Path) -> Self {
        Self {
            socket_path: socket_path.to_owned(),
            stream: None,
            request_timeout: None,
        }
    }

    /// Bound every call to `timeout`
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn round_trip(stream: &mut UnixStream, request: &Request) -> Result<Reply, ClientError> {
        write_frame(stream, request).await?;
        read_frame(stream).await?.ok_or(ClientError::Closed)
    }
}

#[async_trait]
impl CapabilityClient for SocketClient {
    async fn connect(&mut self) -> Result<(), ClientError> {
        if self.stream.is_some() {
            return Ok(());
        }

        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|source| ClientError::Connect {
                path: self.socket_path.clone(),
                source,
            })?;

        info!(socket = %self.socket_path.display(), "connected to capability server");
        self.stream = Some(stream);
        Ok(())
    }

    async fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            info!(socket = %self.socket_path.display(), "disconnected from capability server");
        }
    }

    async fn call(&mut self, request: Request) -> Result<Reply, ClientError> {
        let stream = self.stream.as_mut().ok_or(ClientError::NotConnected)?;
        let capability = request.capability();
        debug!(capability, "sending request");

        let result = match self.request_timeout {
            Some(timeout) => tokio::time::timeout(timeout, Self::round_trip(stream, &request))
                .await
                .unwrap_or(Err(ClientError::Timeout {
                    capability,
                    timeout_ms: timeout.as_millis() as u64,
                })),
            None => Self::round_trip(stream, &request).await,
        };

        // A failed exchange leaves the stream mid-frame; drop it.
        if let Err(e) = &result {
            warn!(capability, error = %e, "request failed, dropping connection");
            self.stream = None;
        }

        result
    }
}

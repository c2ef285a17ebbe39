//! Blocking facade over the asynchronous capability client
//!
//! `connect` moves the client onto a dedicated worker thread that runs a
//! current-thread tokio runtime for the life of the session. Every public
//! method sends a command to that worker and blocks on a oneshot reply, so
//! callers never touch async code.
//!
//! The facade must not be used from inside an async runtime: it blocks the
//! calling thread.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::client::{CapabilityClient, ClientError};
use super::protocol::{Reply, Request};

/// Errors surfaced by the facade
#[derive(Debug, thiserror::Error)]
pub enum FacadeError {
    #[error("capability facade is not connected")]
    NotConnected,

    #[error("failed to connect to capability server")]
    Connect(#[source] ClientError),

    #[error("remote {capability} call failed")]
    Remote {
        capability: &'static str,
        #[source]
        source: ClientError,
    },

    #[error("facade worker thread is gone")]
    WorkerGone,

    #[error("failed to spawn facade worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

enum Command {
    Call {
        request: Request,
        reply: oneshot::Sender<Result<Reply, ClientError>>,
    },
    Shutdown,
}

/// Live connection: the worker's command queue and its thread handle.
/// The worker hands the client back when it exits.
struct FacadeSession {
    commands: mpsc::UnboundedSender<Command>,
    worker: thread::JoinHandle<Box<dyn CapabilityClient>>,
}

struct FacadeInner {
    /// Parked here while disconnected, owned by the worker while connected
    client: Option<Box<dyn CapabilityClient>>,
    session: Option<FacadeSession>,
}

/// Synchronous wrapper around a [`CapabilityClient`]
///
/// One instance per session. The internal lock is held for the duration of
/// each call, so at most one remote call is in flight per facade.
pub struct CapabilityFacade {
    inner: Mutex<FacadeInner>,
}

impl CapabilityFacade {
    /// Wrap `client`; no connection is made until [`connect`](Self::connect)
    pub fn new(client: impl CapabilityClient + 'static) -> Self {
        Self {
            inner: Mutex::new(FacadeInner {
                client: Some(Box::new(client)),
                session: None,
            }),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.lock().session.is_some()
    }

    /// Start the worker and connect the client; returns immediately if
    /// already connected
    pub fn connect(&self) -> Result<(), FacadeError> {
        let mut inner = self.lock();
        if inner.session.is_some() {
            debug!("facade already connected");
            return Ok(());
        }

        let client = inner.client.take().ok_or(FacadeError::WorkerGone)?;
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        let worker = thread::Builder::new()
            .name("capability-facade".to_string())
            .spawn(move || run_worker(client, cmd_rx, ready_tx))?;

        match ready_rx.blocking_recv() {
            Ok(Ok(())) => {
                info!("capability facade connected");
                inner.session = Some(FacadeSession {
                    commands: cmd_tx,
                    worker,
                });
                Ok(())
            }
            Ok(Err(e)) => {
                warn!(error = %e, "capability facade connect failed");
                inner.client = join_worker(worker);
                Err(FacadeError::Connect(e))
            }
            Err(_) => {
                error!("facade worker exited before reporting connect result");
                inner.client = join_worker(worker);
                Err(FacadeError::WorkerGone)
            }
        }
    }

    /// Close the connection and stop the worker; no-op when disconnected
    pub fn disconnect(&self) {
        let mut inner = self.lock();
        Self::teardown(&mut inner);
    }

    /// Connect and return a guard that disconnects when dropped
    pub fn session(&self) -> Result<FacadeGuard<'_>, FacadeError> {
        self.connect()?;
        Ok(FacadeGuard { facade: self })
    }

    pub fn recognize(&self, token: &str, image: Vec<u8>) -> Result<Reply, FacadeError> {
        self.call(Request::Recognize {
            token: token.to_string(),
            image,
        })
    }

    pub fn register(&self, token: &str, name: &str, image: Vec<u8>) -> Result<Reply, FacadeError> {
        self.call(Request::Register {
            token: token.to_string(),
            name: name.to_string(),
            image,
        })
    }

    pub fn update(&self, token: &str, user_id: &str, name: &str) -> Result<Reply, FacadeError> {
        self.call(Request::Update {
            token: token.to_string(),
            user_id: user_id.to_string(),
            name: name.to_string(),
        })
    }

    pub fn delete(&self, token: &str, user_id: &str) -> Result<Reply, FacadeError> {
        self.call(Request::Delete {
            token: token.to_string(),
            user_id: user_id.to_string(),
        })
    }

    pub fn list(&self, token: &str, limit: u32, offset: u32) -> Result<Reply, FacadeError> {
        self.call(Request::List {
            token: token.to_string(),
            limit,
            offset,
        })
    }

    pub fn health(&self) -> Result<Reply, FacadeError> {
        self.call(Request::Health)
    }

    /// Run one request on the worker and block until it resolves
    pub fn call(&self, request: Request) -> Result<Reply, FacadeError> {
        let mut inner = self.lock();
        let session = inner.session.as_ref().ok_or(FacadeError::NotConnected)?;

        let capability = request.capability();
        let started = Instant::now();
        let (reply_tx, reply_rx) = oneshot::channel();

        let sent = session.commands.send(Command::Call {
            request,
            reply: reply_tx,
        });

        let outcome = match sent {
            Ok(()) => reply_rx.blocking_recv().ok(),
            Err(_) => None,
        };

        match outcome {
            Some(Ok(reply)) => {
                debug!(
                    capability,
                    status = ?reply.status,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "remote call finished"
                );
                Ok(reply)
            }
            Some(Err(source)) => {
                warn!(capability, error = %source, "remote call failed");
                Err(FacadeError::Remote { capability, source })
            }
            None => {
                error!(capability, "facade worker died during call");
                Self::teardown(&mut inner);
                Err(FacadeError::WorkerGone)
            }
        }
    }

    fn teardown(inner: &mut FacadeInner) {
        let Some(session) = inner.session.take() else {
            return;
        };

        let _ = session.commands.send(Command::Shutdown);
        inner.client = join_worker(session.worker);
        info!("capability facade disconnected");
    }

    fn lock(&self) -> MutexGuard<'_, FacadeInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for CapabilityFacade {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        Self::teardown(inner);
    }
}

/// Scoped connection from [`CapabilityFacade::session`]
pub struct FacadeGuard<'a> {
    facade: &'a CapabilityFacade,
}

impl std::ops::Deref for FacadeGuard<'_> {
    type Target = CapabilityFacade;

    fn deref(&self) -> &Self::Target {
        self.facade
    }
}

impl Drop for FacadeGuard<'_> {
    fn drop(&mut self) {
        self.facade.disconnect();
    }
}

fn run_worker(
    mut client: Box<dyn CapabilityClient>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    ready: oneshot::Sender<Result<(), ClientError>>,
) -> Box<dyn CapabilityClient> {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            let _ = ready.send(Err(ClientError::Io(e)));
            return client;
        }
    };

    runtime.block_on(async move {
        if let Err(e) = client.connect().await {
            let _ = ready.send(Err(e));
            return client;
        }
        let _ = ready.send(Ok(()));
        debug!("facade worker running");

        while let Some(command) = commands.recv().await {
            match command {
                Command::Call { request, reply } => {
                    let result = client.call(request).await;
                    let _ = reply.send(result);
                }
                Command::Shutdown => break,
            }
        }

        client.disconnect().await;
        debug!("facade worker stopped");
        client
    })
}

fn join_worker(
    worker: thread::JoinHandle<Box<dyn CapabilityClient>>,
) -> Option<Box<dyn CapabilityClient>> {
    match worker.join() {
        Ok(client) => Some(client),
        Err(_) => {
            error!("facade worker panicked; client is lost");
            None
        }
    }
}

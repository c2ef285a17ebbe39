//! Remote capability access
//!
//! The assistant reaches the identity service through an async client. The
//! [`CapabilityFacade`] turns that client into plain blocking calls for the
//! single-threaded workflow code.

mod client;
mod directory;
mod facade;
mod protocol;
mod server;

pub use client::{CapabilityClient, ClientError, SocketClient};
pub use directory::MemoryDirectory;
pub use facade::{CapabilityFacade, FacadeError, FacadeGuard};
pub use protocol::{read_frame, write_frame, Reply, Request, Status, MAX_FRAME_LEN};
pub use server::{CapabilityHandler, CapabilityServer};

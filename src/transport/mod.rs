//! Transport layer for SMB session setup
//!
//! [`SmbTransport`] moves whole SMB messages over a byte stream.
//! [`SessionTransport`] is the narrower surface the authenticator drives: it
//! sends one SESSION_SETUP request and returns the correlated reply, and owns
//! the [`SessionState`] the negotiation commits into.

use crate::error::{Result, Status};
use crate::protocol::messages::{Smb2SessionSetupRequest, Smb2SessionSetupResponse};
use crate::protocol::SessionState;
use async_trait::async_trait;
use std::net::SocketAddr;

pub mod session;
pub mod tcp;

pub use session::Smb2SessionTransport;
pub use tcp::TcpTransport;

/// Trait for SMB message transports
#[async_trait]
pub trait SmbTransport: Send + Sync {
    /// Connect to a remote SMB server
    async fn connect(&mut self, addr: SocketAddr) -> Result<()>;

    /// Send one complete SMB message
    async fn send_message(&mut self, message: &[u8]) -> Result<()>;

    /// Receive one complete SMB message
    async fn receive_message(&mut self) -> Result<Vec<u8>>;

    /// Check if the transport is connected
    fn is_connected(&self) -> bool;

    /// Close the connection
    async fn close(&mut self) -> Result<()>;

    /// Get the local address
    fn local_addr(&self) -> Result<SocketAddr>;

    /// Get the remote address
    fn remote_addr(&self) -> Result<SocketAddr>;
}

/// Reply to one SESSION_SETUP request
#[derive(Debug, Clone)]
pub struct SessionSetupReply {
    /// Status from the SMB2 header
    pub status: Status,
    /// Session id assigned by the server
    pub session_id: u64,
    pub response: Smb2SessionSetupResponse,
    /// The raw reply when it was signed before any signing key was known.
    /// Its signature can only be checked once the negotiation yields a key.
    pub unverified: Option<Vec<u8>>,
}

/// Session-level transport used during authentication
#[async_trait]
pub trait SessionTransport: Send {
    /// Send a SESSION_SETUP request under `session_id` and wait for its reply.
    ///
    /// Statuses other than success and "more processing required" are
    /// returned as [`Error::StatusError`](crate::Error::StatusError).
    async fn send(
        &mut self,
        request: &Smb2SessionSetupRequest,
        session_id: u64,
    ) -> Result<SessionSetupReply>;

    /// Attach (or with `None`, detach) the key used to sign outgoing requests.
    fn set_signing_key(&mut self, key: Option<Vec<u8>>);

    fn session(&self) -> &SessionState;

    fn session_mut(&mut self) -> &mut SessionState;

    fn remote_addr(&self) -> Result<SocketAddr>;
}

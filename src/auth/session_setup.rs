//! One SMB2 SESSION_SETUP round-trip per security token

use crate::error::{AuthError, Error, NtStatus};
use crate::protocol::messages::{SessionFlags, Smb2SessionSetupRequest};
use crate::protocol::smb2_constants::{SecurityMode, Smb2Capabilities};
use crate::transport::SessionTransport;
use tracing::debug;

/// Result of one round-trip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeOutcome {
    /// Security blob from the response (may be empty)
    pub token: Vec<u8>,
    /// Session id the server assigned
    pub session_id: u64,
    pub status: NtStatus,
    pub session_flags: SessionFlags,
    /// Raw reply whose signature awaits a signing key
    pub unverified: Option<Vec<u8>>,
}

/// Sends SESSION_SETUP requests for one negotiation.
///
/// The server assigns the session id in its first reply; it is kept here
/// and echoed on later rounds, but only committed to the transport's
/// session state by the caller once negotiation succeeds.
#[derive(Debug, Clone)]
pub struct SessionSetupExchange {
    session_id: u64,
    rounds: usize,
    security_mode: SecurityMode,
    capabilities: Smb2Capabilities,
    previous_session_id: u64,
}

impl SessionSetupExchange {
    pub fn new() -> Self {
        Self {
            session_id: 0,
            rounds: 0,
            security_mode: SecurityMode::SIGNING_ENABLED,
            capabilities: Smb2Capabilities::DFS,
            previous_session_id: 0,
        }
    }

    pub fn with_security_mode(mut self, security_mode: SecurityMode) -> Self {
        self.security_mode = security_mode;
        self
    }

    pub fn with_capabilities(mut self, capabilities: Smb2Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Ask the server to drop an earlier session of this client (reconnect).
    pub fn with_previous_session_id(mut self, previous_session_id: u64) -> Self {
        self.previous_session_id = previous_session_id;
        self
    }

    /// Session id received so far, 0 before the first reply
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Number of requests sent
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Send `token` and wait for the matching reply.
    pub async fn exchange<S>(
        &mut self,
        transport: &mut S,
        token: Vec<u8>,
    ) -> Result<ExchangeOutcome, AuthError>
    where
        S: SessionTransport + ?Sized,
    {
        let request = Smb2SessionSetupRequest::new()
            .with_security_mode(self.security_mode)
            .with_capabilities(self.capabilities)
            .with_previous_session_id(self.previous_session_id)
            .with_security_blob(token);

        self.rounds += 1;
        debug!(
            "Session setup round {} ({} byte token)",
            self.rounds,
            request.security_blob.len()
        );
        let reply = transport.send(&request, self.session_id).await?;

        let status = match reply.status.known() {
            Some(status @ NtStatus::Success) | Some(status @ NtStatus::MoreProcessingRequired) => {
                status
            }
            _ => {
                return Err(AuthError::Transport(Error::StatusError {
                    command: "SESSION_SETUP",
                    status: reply.status,
                }))
            }
        };

        if reply.session_id != 0 {
            if self.session_id != 0 && self.session_id != reply.session_id {
                return Err(AuthError::Transport(Error::UnexpectedResponse(format!(
                    "session id changed from 0x{:016x} to 0x{:016x} during setup",
                    self.session_id, reply.session_id
                ))));
            }
            self.session_id = reply.session_id;
        }

        Ok(ExchangeOutcome {
            token: reply.response.security_blob,
            session_id: self.session_id,
            status,
            session_flags: reply.response.session_flags,
            unverified: reply.unverified,
        })
    }
}

impl Default for SessionSetupExchange {
    fn default() -> Self {
        Self::new()
    }
}

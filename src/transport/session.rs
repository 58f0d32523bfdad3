//! SMB2 session transport
//!
//! Builds SMB2 headers around SESSION_SETUP requests, signs them once a key
//! is attached, and matches each reply to its request by message id.

use super::{SessionSetupReply, SessionTransport, SmbTransport};
use crate::error::{Error, NtStatus, Result};
use crate::protocol::messages::{
    Smb2Header, Smb2SessionSetupRequest, Smb2SessionSetupResponse, SmbMessage,
};
use crate::protocol::signing;
use crate::protocol::smb2_constants::{Smb2Command, Smb2HeaderFlags};
use crate::protocol::SessionState;
use async_trait::async_trait;
use std::net::SocketAddr;
use tracing::{debug, trace, warn};

const STATUS_PENDING: u32 = 0x0000_0103;

/// Credits asked for on each request
const DEFAULT_CREDIT_REQUEST: u16 = 31;

/// [`SessionTransport`] over any [`SmbTransport`]
pub struct Smb2SessionTransport<T: SmbTransport> {
    inner: T,
    state: SessionState,
    next_message_id: u64,
}

impl<T: SmbTransport> Smb2SessionTransport<T> {
    /// Wrap a connected transport on which NEGOTIATE has already run
    /// (message id 0), so the first SESSION_SETUP uses message id 1.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            state: SessionState::new(),
            next_message_id: 1,
        }
    }

    fn encode_request(
        &mut self,
        request: &Smb2SessionSetupRequest,
        session_id: u64,
    ) -> Result<(u64, Vec<u8>)> {
        let message_id = self.next_message_id;

        let mut header = Smb2Header::new_with_command(Smb2Command::SessionSetup);
        header.message_id = message_id;
        header.session_id = session_id;
        header.credits = DEFAULT_CREDIT_REQUEST;
        header.credit_charge = 1;

        let mut message = header.serialize()?;
        message.extend_from_slice(&request.serialize()?);

        if let Some(key) = self.state.signing_key.as_deref() {
            signing::sign_message(key, &mut message)?;
        }

        self.next_message_id += 1;
        Ok((message_id, message))
    }

    /// Decode a reply to `message_id`; `Ok(None)` for an interim async reply.
    fn decode_reply(
        &mut self,
        message_id: u64,
        message: &[u8],
    ) -> Result<Option<SessionSetupReply>> {
        let header = Smb2Header::parse(message)?;

        if !header.is_response() {
            return Err(Error::UnexpectedResponse(
                "Received a request where a response was expected".to_string(),
            ));
        }
        if header.command != Smb2Command::SessionSetup {
            return Err(Error::UnexpectedResponse(format!(
                "Expected SESSION_SETUP response, got {}",
                header.command.name()
            )));
        }
        if header.message_id != message_id {
            return Err(Error::UnexpectedResponse(format!(
                "Response message id {} does not match request {}",
                header.message_id, message_id
            )));
        }

        if header.status == STATUS_PENDING
            && header.flags.contains(Smb2HeaderFlags::ASYNC_COMMAND)
        {
            trace!("Interim response for message {}", message_id);
            return Ok(None);
        }

        let mut unverified = None;
        if header.is_signed() {
            match self.state.signing_key.as_deref() {
                Some(key) => signing::verify_message(key, message)?,
                None => {
                    debug!("Signed response received before a signing key is known");
                    unverified = Some(message.to_vec());
                }
            }
        }

        let status = header.status();
        match status.known() {
            Some(NtStatus::Success) | Some(NtStatus::MoreProcessingRequired) => {}
            _ => {
                return Err(Error::StatusError {
                    command: Smb2Command::SessionSetup.name(),
                    status,
                })
            }
        }

        let response = Smb2SessionSetupResponse::parse(&message[Smb2Header::SIZE..])?;
        Ok(Some(SessionSetupReply {
            status,
            session_id: header.session_id,
            response,
            unverified,
        }))
    }
}

#[async_trait]
impl<T: SmbTransport> SessionTransport for Smb2SessionTransport<T> {
    async fn send(
        &mut self,
        request: &Smb2SessionSetupRequest,
        session_id: u64,
    ) -> Result<SessionSetupReply> {
        let (message_id, message) = self.encode_request(request, session_id)?;
        debug!(
            "SESSION_SETUP request: message_id={} session_id=0x{:016x} blob={} bytes",
            message_id,
            session_id,
            request.security_blob.len()
        );
        self.inner.send_message(&message).await?;

        loop {
            let bytes = self.inner.receive_message().await?;
            if let Some(reply) = self.decode_reply(message_id, &bytes)? {
                debug!(
                    "SESSION_SETUP response: status={} session_id=0x{:016x} blob={} bytes",
                    reply.status,
                    reply.session_id,
                    reply.response.security_blob.len()
                );
                return Ok(reply);
            }
        }
    }

    fn set_signing_key(&mut self, key: Option<Vec<u8>>) {
        if let Some(ref key) = key {
            if key.is_empty() {
                warn!("Ignoring empty signing key");
                return;
            }
        }
        self.state.signing_key = key;
    }

    fn session(&self) -> &SessionState {
        &self.state
    }

    fn session_mut(&mut self) -> &mut SessionState {
        &mut self.state
    }

    fn remote_addr(&self) -> Result<SocketAddr> {
        self.inner.remote_addr()
    }
}

//! Scripted mechanism, provider and transport for exercising the
//! authentication loop without a KDC or an SMB server.

use super::{Mechanism, MechanismProvider, MechanismRequest};
use crate::error::{Error, MechanismError, NtStatus, Result, Status};
use crate::protocol::messages::{SessionFlags, Smb2SessionSetupRequest, Smb2SessionSetupResponse};
use crate::protocol::smb2_constants::{SecurityMode, Smb2Capabilities};
use crate::protocol::SessionState;
use crate::transport::{SessionSetupReply, SessionTransport};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

pub(crate) const CLIENT_MIC: &[u8] = b"mic";

/// One scripted response of the mechanism to `init_sec_context`
#[derive(Debug, Clone)]
pub(crate) enum Step {
    /// Produce a token, stay incomplete
    Emit(Vec<u8>),
    /// Become established, optionally producing a final token
    Establish(Option<Vec<u8>>),
    Fail(String),
}

#[derive(Debug, Default)]
struct CallLogState {
    created: usize,
    disposals: usize,
    mutual_auth: Vec<bool>,
    inputs: Vec<Vec<u8>>,
    requests: Vec<MechanismRequest>,
}

/// Shared record of what the mechanisms were asked to do
#[derive(Debug, Clone, Default)]
pub(crate) struct CallLog(Arc<Mutex<CallLogState>>);

impl CallLog {
    pub fn created(&self) -> usize {
        self.0.lock().unwrap().created
    }

    pub fn disposals(&self) -> usize {
        self.0.lock().unwrap().disposals
    }

    pub fn mutual_auth_requests(&self) -> Vec<bool> {
        self.0.lock().unwrap().mutual_auth.clone()
    }

    pub fn inputs(&self) -> Vec<Vec<u8>> {
        self.0.lock().unwrap().inputs.clone()
    }

    pub fn requests(&self) -> Vec<MechanismRequest> {
        self.0.lock().unwrap().requests.clone()
    }
}

pub(crate) struct ScriptedMechanism {
    calls: CallLog,
    steps: VecDeque<Step>,
    established: bool,
    session_key: Option<Vec<u8>>,
    key_after_step: usize,
    steps_taken: usize,
    fail_mutual_auth: bool,
    fail_dispose: bool,
}

impl Mechanism for ScriptedMechanism {
    fn request_mutual_auth(&mut self, enabled: bool) -> std::result::Result<(), MechanismError> {
        self.calls.0.lock().unwrap().mutual_auth.push(enabled);
        if self.fail_mutual_auth {
            return Err(MechanismError::new("mutual authentication unavailable"));
        }
        Ok(())
    }

    fn init_sec_context(
        &mut self,
        input: &[u8],
    ) -> std::result::Result<Option<Vec<u8>>, MechanismError> {
        self.calls.0.lock().unwrap().inputs.push(input.to_vec());
        self.steps_taken += 1;
        match self.steps.pop_front() {
            Some(Step::Emit(token)) => Ok(Some(token)),
            Some(Step::Establish(token)) => {
                self.established = true;
                Ok(token)
            }
            Some(Step::Fail(message)) => Err(MechanismError::with_code(message, 0x25)),
            None => Err(MechanismError::new("unexpected token")),
        }
    }

    fn is_established(&self) -> bool {
        self.established
    }

    fn session_key(&self) -> Option<Vec<u8>> {
        if self.steps_taken >= self.key_after_step {
            self.session_key.clone()
        } else {
            None
        }
    }

    fn get_mic(&mut self, _message: &[u8]) -> std::result::Result<Option<Vec<u8>>, MechanismError> {
        Ok(Some(CLIENT_MIC.to_vec()))
    }

    fn verify_mic(
        &mut self,
        _message: &[u8],
        mic: &[u8],
    ) -> std::result::Result<(), MechanismError> {
        if mic == CLIENT_MIC {
            Ok(())
        } else {
            Err(MechanismError::new("mechListMIC mismatch"))
        }
    }

    fn dispose(&mut self) -> std::result::Result<(), MechanismError> {
        self.calls.0.lock().unwrap().disposals += 1;
        if self.fail_dispose {
            return Err(MechanismError::new("credential cache locked"));
        }
        Ok(())
    }
}

/// Provider handing out [`ScriptedMechanism`]s
pub(crate) struct ScriptedProvider {
    calls: CallLog,
    steps: Vec<Step>,
    fail_create: Option<String>,
    fail_mutual_auth: bool,
    fail_dispose: bool,
    session_key: Option<Vec<u8>>,
    key_after_step: usize,
}

impl ScriptedProvider {
    pub fn new(calls: CallLog, steps: Vec<Step>) -> Self {
        Self {
            calls,
            steps,
            fail_create: None,
            fail_mutual_auth: false,
            fail_dispose: false,
            session_key: None,
            key_after_step: 0,
        }
    }

    pub fn failing_create(mut self, message: &str) -> Self {
        self.fail_create = Some(message.to_string());
        self
    }

    pub fn failing_mutual_auth(mut self) -> Self {
        self.fail_mutual_auth = true;
        self
    }

    pub fn failing_dispose(mut self) -> Self {
        self.fail_dispose = true;
        self
    }

    /// Expose `key` once `steps` calls to `init_sec_context` have been made.
    pub fn with_session_key(mut self, key: Vec<u8>, steps: usize) -> Self {
        self.session_key = Some(key);
        self.key_after_step = steps;
        self
    }
}

impl MechanismProvider for ScriptedProvider {
    fn create(
        &self,
        request: &MechanismRequest,
    ) -> std::result::Result<Box<dyn Mechanism>, MechanismError> {
        self.calls.0.lock().unwrap().requests.push(request.clone());
        if let Some(ref message) = self.fail_create {
            return Err(MechanismError::new(message.clone()));
        }
        self.calls.0.lock().unwrap().created += 1;
        Ok(Box::new(ScriptedMechanism {
            calls: self.calls.clone(),
            steps: self.steps.iter().cloned().collect(),
            established: false,
            session_key: self.session_key.clone(),
            key_after_step: self.key_after_step,
            steps_taken: 0,
            fail_mutual_auth: self.fail_mutual_auth,
            fail_dispose: self.fail_dispose,
        }))
    }
}

/// Wraps scripted mechanisms so MIC handling falls back to the
/// [`Mechanism`] defaults.
pub(crate) struct NoMicProvider(pub ScriptedProvider);

struct NoMic(Box<dyn Mechanism>);

impl Mechanism for NoMic {
    fn request_mutual_auth(&mut self, enabled: bool) -> std::result::Result<(), MechanismError> {
        self.0.request_mutual_auth(enabled)
    }

    fn init_sec_context(
        &mut self,
        input: &[u8],
    ) -> std::result::Result<Option<Vec<u8>>, MechanismError> {
        self.0.init_sec_context(input)
    }

    fn is_established(&self) -> bool {
        self.0.is_established()
    }

    fn session_key(&self) -> Option<Vec<u8>> {
        self.0.session_key()
    }

    fn dispose(&mut self) -> std::result::Result<(), MechanismError> {
        self.0.dispose()
    }
}

impl MechanismProvider for NoMicProvider {
    fn create(
        &self,
        request: &MechanismRequest,
    ) -> std::result::Result<Box<dyn Mechanism>, MechanismError> {
        Ok(Box::new(NoMic(self.0.create(request)?)))
    }
}

/// What the authenticator handed to the transport for one round
#[derive(Debug, Clone)]
pub(crate) struct SentRequest {
    pub blob: Vec<u8>,
    pub session_id: u64,
    pub signing_key: Option<Vec<u8>>,
    pub security_mode: SecurityMode,
    pub capabilities: Smb2Capabilities,
    pub previous_session_id: u64,
}

/// Session transport answering from a queue of canned replies
pub(crate) struct ScriptedSessionTransport {
    replies: VecDeque<Result<SessionSetupReply>>,
    pub sent: Vec<SentRequest>,
    state: SessionState,
    addr: SocketAddr,
}

impl ScriptedSessionTransport {
    pub fn new(addr: &str) -> Self {
        Self {
            replies: VecDeque::new(),
            sent: Vec::new(),
            state: SessionState::new(),
            addr: addr.parse().unwrap(),
        }
    }

    pub fn reply(mut self, status: NtStatus, session_id: u64, blob: Vec<u8>) -> Self {
        self.replies.push_back(Ok(SessionSetupReply {
            status: Status(status.to_u32()),
            session_id,
            response: Smb2SessionSetupResponse::new()
                .with_security_blob(blob)
                .with_session_flags(SessionFlags::empty()),
            unverified: None,
        }));
        self
    }

    pub fn fail(mut self, error: Error) -> Self {
        self.replies.push_back(Err(error));
        self
    }

    pub fn exchanges(&self) -> usize {
        self.sent.len()
    }
}

#[async_trait]
impl SessionTransport for ScriptedSessionTransport {
    async fn send(
        &mut self,
        request: &Smb2SessionSetupRequest,
        session_id: u64,
    ) -> Result<SessionSetupReply> {
        self.sent.push(SentRequest {
            blob: request.security_blob.clone(),
            session_id,
            signing_key: self.state.signing_key.clone(),
            security_mode: request.security_mode,
            capabilities: request.capabilities,
            previous_session_id: request.previous_session_id,
        });
        self.replies.pop_front().unwrap_or(Err(Error::ConnectionClosed))
    }

    fn set_signing_key(&mut self, key: Option<Vec<u8>>) {
        self.state.signing_key = key;
    }

    fn session(&self) -> &SessionState {
        &self.state
    }

    fn session_mut(&mut self) -> &mut SessionState {
        &mut self.state
    }

    fn remote_addr(&self) -> Result<SocketAddr> {
        Ok(self.addr)
    }
}

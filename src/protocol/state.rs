//! Per-connection SMB2 session state

use std::fmt;

/// Session state owned by a session transport.
///
/// `session_id` and `established` are only written once a session setup
/// negotiation has completed. `signing_key` may be attached earlier, as soon
/// as the security mechanism exposes a key, so that the remaining rounds are
/// signed.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub session_id: u64,
    pub established: bool,
    pub signing_key: Option<Vec<u8>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed session setup.
    pub fn establish(&mut self, session_id: u64) {
        self.session_id = session_id;
        self.established = true;
    }

    pub fn is_signing(&self) -> bool {
        self.signing_key.is_some()
    }
}

// Keeps key material out of logs.
impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("session_id", &format_args!("0x{:016x}", self.session_id))
            .field("established", &self.established)
            .field(
                "signing_key",
                &self.signing_key.as_ref().map(|key| format!("<{} bytes>", key.len())),
            )
            .finish()
    }
}

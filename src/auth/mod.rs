//! Kerberos authentication for SMB session setup
//!
//! The pieces, leaves first:
//!
//! - [`Mechanism`] / [`MechanismProvider`]: the GSS-style security mechanism
//!   (Kerberos), supplied by the embedding application or by the `gssapi`
//!   feature.
//! - [`context::SecurityContext`]: one mechanism instance with an explicit
//!   dispose.
//! - [`spnego::SpnegoContext`]: the SPNEGO envelope around a security
//!   context.
//! - [`session_setup::SessionSetupExchange`]: one SESSION_SETUP round-trip
//!   per token.
//! - [`authenticator::Authenticator`]: drives the loop and commits the
//!   session.

pub mod authenticator;
pub mod context;
pub mod session_setup;
pub mod spnego;

#[cfg(feature = "gssapi")]
pub mod gssapi;

use crate::error::MechanismError;
use std::fmt;

pub use authenticator::{
    AuthOutcome, AuthState, Authenticator, AuthenticatorConfig, EmptyTokenPolicy,
};
pub use context::SecurityContext;
pub use session_setup::{ExchangeOutcome, SessionSetupExchange};
pub use spnego::SpnegoContext;

/// A multi-round security mechanism on the initiator side.
///
/// Calls are synchronous: token processing is local computation (ticket
/// lookup happens at creation or on the first step).
pub trait Mechanism: Send {
    /// Ask the peer to authenticate itself as well.
    fn request_mutual_auth(&mut self, enabled: bool) -> Result<(), MechanismError>;

    /// Consume the peer's last token (empty on the first call) and produce
    /// the next one, if any.
    fn init_sec_context(&mut self, input: &[u8]) -> Result<Option<Vec<u8>>, MechanismError>;

    fn is_established(&self) -> bool;

    /// Session key, once the mechanism has one
    fn session_key(&self) -> Option<Vec<u8>> {
        None
    }

    /// Integrity token over `message`, or `None` if the mechanism cannot
    /// produce one.
    fn get_mic(&mut self, _message: &[u8]) -> Result<Option<Vec<u8>>, MechanismError> {
        Ok(None)
    }

    /// Check the peer's integrity token over `message`. Mechanisms without
    /// MIC support cannot vouch for one and fail.
    fn verify_mic(&mut self, _message: &[u8], _mic: &[u8]) -> Result<(), MechanismError> {
        Err(MechanismError::new("mechanism cannot verify mechListMIC"))
    }

    /// Release credentials and context state. Called at most once.
    fn dispose(&mut self) -> Result<(), MechanismError>;
}

/// Parameters for creating one mechanism instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MechanismRequest {
    /// Host name (or textual address) of the server
    pub host: String,
    /// Service class, `cifs` for SMB
    pub service: String,
    /// Initiator principal; `None` selects the default credential
    pub credential: Option<String>,
    /// Requested credential lifetime in seconds
    pub identity_lifetime: Option<u32>,
    /// Requested context lifetime in seconds
    pub context_lifetime: Option<u32>,
}

impl MechanismRequest {
    /// Host-based service name, `service@host`
    pub fn service_principal(&self) -> String {
        format!("{}@{}", self.service, self.host)
    }
}

impl fmt::Display for MechanismRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.service_principal())?;
        if let Some(ref credential) = self.credential {
            write!(f, " as {}", credential)?;
        }
        Ok(())
    }
}

/// Creates mechanism instances, one per authentication attempt
pub trait MechanismProvider: Send + Sync {
    fn create(&self, request: &MechanismRequest) -> Result<Box<dyn Mechanism>, MechanismError>;
}

impl<F> MechanismProvider for F
where
    F: Fn(&MechanismRequest) -> Result<Box<dyn Mechanism>, MechanismError> + Send + Sync,
{
    fn create(&self, request: &MechanismRequest) -> Result<Box<dyn Mechanism>, MechanismError> {
        self(request)
    }
}

#[cfg(test)]
pub(crate) mod testing;

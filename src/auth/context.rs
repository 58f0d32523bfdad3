//! Security context: one mechanism instance with an explicit lifetime

use super::{Mechanism, MechanismProvider, MechanismRequest};
use crate::error::{AuthError, MechanismError};
use std::fmt;
use tracing::{debug, warn};

/// Exclusively owned mechanism context for one authentication attempt.
///
/// Created by [`SecurityContext::create`], released by
/// [`SecurityContext::dispose`]. A context dropped without being disposed
/// (an early return, a timeout, a cancelled task) is disposed on drop.
pub struct SecurityContext {
    mechanism: Option<Box<dyn Mechanism>>,
    target_host: String,
    service_principal: String,
    identity_lifetime: Option<u32>,
    context_lifetime: Option<u32>,
}

impl SecurityContext {
    /// Create a context for `service@host`, requesting mutual authentication.
    pub fn create(
        provider: &dyn MechanismProvider,
        host: &str,
        service: &str,
        credential: Option<&str>,
        identity_lifetime: Option<u32>,
        context_lifetime: Option<u32>,
    ) -> Result<Self, AuthError> {
        if service.is_empty() {
            return Err(AuthError::ContextCreation(MechanismError::new(
                "empty service principal",
            )));
        }
        if host.is_empty() {
            return Err(AuthError::ContextCreation(MechanismError::new(
                "empty target host",
            )));
        }

        let request = MechanismRequest {
            host: host.to_string(),
            service: service.to_string(),
            credential: credential.map(str::to_string),
            identity_lifetime,
            context_lifetime,
        };
        let service_principal = request.service_principal();
        debug!("Creating security context for {}", request);

        let mut mechanism = provider.create(&request).map_err(AuthError::ContextCreation)?;

        if let Err(e) = mechanism.request_mutual_auth(true) {
            if let Err(dispose_err) = mechanism.dispose() {
                warn!(
                    "Disposing {} after failed setup: {}",
                    service_principal, dispose_err
                );
            }
            return Err(AuthError::ContextCreation(e));
        }

        Ok(Self {
            mechanism: Some(mechanism),
            target_host: request.host,
            service_principal,
            identity_lifetime,
            context_lifetime,
        })
    }

    pub fn target_host(&self) -> &str {
        &self.target_host
    }

    /// `service@host`
    pub fn service_principal(&self) -> &str {
        &self.service_principal
    }

    pub fn identity_lifetime(&self) -> Option<u32> {
        self.identity_lifetime
    }

    pub fn context_lifetime(&self) -> Option<u32> {
        self.context_lifetime
    }

    pub fn mechanism(&self) -> Option<&dyn Mechanism> {
        self.mechanism.as_deref()
    }

    pub fn mechanism_mut(&mut self) -> Result<&mut dyn Mechanism, AuthError> {
        match self.mechanism.as_deref_mut() {
            Some(mechanism) => Ok(mechanism),
            None => Err(AuthError::negotiation("security context already disposed")),
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.mechanism.is_none()
    }

    /// Release the mechanism. Later calls do nothing.
    pub fn dispose(&mut self) -> Result<(), AuthError> {
        match self.mechanism.take() {
            Some(mut mechanism) => {
                debug!("Disposing security context for {}", self.service_principal);
                mechanism.dispose().map_err(AuthError::Disposal)
            }
            None => Ok(()),
        }
    }
}

impl Drop for SecurityContext {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            warn!("{}", e);
        }
    }
}

impl fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityContext")
            .field("service_principal", &self.service_principal)
            .field("identity_lifetime", &self.identity_lifetime)
            .field("context_lifetime", &self.context_lifetime)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

//! Kerberos session setup driver
//!
//! [`Authenticator::authenticate`] runs one attempt:
//!
//! 1. resolve the server's host name (falling back to its address),
//! 2. create a [`SecurityContext`] for `service@host`,
//! 3. wrap it in SPNEGO and exchange tokens over SESSION_SETUP until the
//!    negotiation is established,
//! 4. commit the session id to the transport's session state.
//!
//! The security context is disposed on every exit path.

use super::context::SecurityContext;
use super::session_setup::SessionSetupExchange;
use super::spnego::SpnegoContext;
use super::MechanismProvider;
use crate::error::AuthError;
use crate::protocol::messages::SessionFlags;
use crate::protocol::signing;
use crate::protocol::smb2_constants::{SecurityMode, Smb2Capabilities};
use crate::resolver::{self, HostResolver, NoReverseLookup};
use crate::transport::SessionTransport;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Service class used for SMB servers
pub const DEFAULT_SERVICE: &str = "cifs";

/// Reported when no domain is configured
pub const UNKNOWN_DOMAIN: &str = "?";

pub const DEFAULT_MAX_ROUNDS: usize = 10;

/// What to do when a step produces no token but the negotiation is not yet
/// established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyTokenPolicy {
    /// Fail the attempt
    #[default]
    Skip,
    /// Send a request with an empty security blob and keep going
    Exchange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatorConfig {
    /// Requested credential lifetime in seconds; mechanism default if unset
    pub identity_lifetime: Option<u32>,
    /// Requested context lifetime in seconds; mechanism default if unset
    pub context_lifetime: Option<u32>,
    pub service: String,
    /// Initiator principal; default credential if unset
    pub credential: Option<String>,
    pub domain: Option<String>,
    /// Upper bound on SESSION_SETUP round-trips; unbounded if unset
    pub max_rounds: Option<usize>,
    pub empty_token_policy: EmptyTokenPolicy,
    /// Deadline for a whole attempt
    pub timeout: Option<Duration>,
    /// SecurityMode advertised in each SESSION_SETUP request
    pub security_mode: SecurityMode,
    pub capabilities: Smb2Capabilities,
    /// Earlier session of this client for the server to drop on reconnect;
    /// 0 for none
    pub previous_session_id: u64,
}

impl Default for AuthenticatorConfig {
    fn default() -> Self {
        Self {
            identity_lifetime: None,
            context_lifetime: None,
            service: DEFAULT_SERVICE.to_string(),
            credential: None,
            domain: None,
            max_rounds: Some(DEFAULT_MAX_ROUNDS),
            empty_token_policy: EmptyTokenPolicy::Skip,
            timeout: None,
            security_mode: SecurityMode::SIGNING_ENABLED,
            capabilities: Smb2Capabilities::DFS,
            previous_session_id: 0,
        }
    }
}

/// Phase of an authentication attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Idle,
    ContextCreated,
    Negotiating,
    Established,
    Committed,
    Failed,
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthState::Idle => "idle",
            AuthState::ContextCreated => "context-created",
            AuthState::Negotiating => "negotiating",
            AuthState::Established => "established",
            AuthState::Committed => "committed",
            AuthState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Successful attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    pub state: AuthState,
    pub session_id: u64,
    pub rounds: usize,
    pub session_flags: SessionFlags,
    /// `service@host` the ticket was requested for
    pub service_principal: String,
    /// Whether a signing key was attached to the transport
    pub signing: bool,
}

/// Tracks and logs the phase of one attempt.
struct Attempt {
    state: AuthState,
}

impl Attempt {
    fn new() -> Self {
        Self {
            state: AuthState::Idle,
        }
    }

    fn advance(&mut self, next: AuthState) {
        debug!("Authentication {} -> {}", self.state, next);
        self.state = next;
    }

    fn fail(&mut self, error: &AuthError) {
        warn!("Authentication failed while {}: {}", self.state, error);
        self.state = AuthState::Failed;
    }
}

/// Authenticates SMB sessions with SPNEGO-wrapped Kerberos.
pub struct Authenticator {
    config: AuthenticatorConfig,
    provider: Arc<dyn MechanismProvider>,
    resolver: Arc<dyn HostResolver>,
}

impl Authenticator {
    pub fn new(provider: Arc<dyn MechanismProvider>) -> Self {
        Self::with_config(provider, AuthenticatorConfig::default())
    }

    pub fn with_config(provider: Arc<dyn MechanismProvider>, config: AuthenticatorConfig) -> Self {
        Self {
            config,
            provider,
            resolver: Arc::new(NoReverseLookup),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn HostResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn config(&self) -> &AuthenticatorConfig {
        &self.config
    }

    /// Configured domain, or `"?"` when none is set
    pub fn domain(&self) -> &str {
        self.config.domain.as_deref().unwrap_or(UNKNOWN_DOMAIN)
    }

    pub fn identity_lifetime(&self) -> Option<u32> {
        self.config.identity_lifetime
    }

    pub fn context_lifetime(&self) -> Option<u32> {
        self.config.context_lifetime
    }

    pub fn set_identity_lifetime(&mut self, seconds: Option<u32>) {
        self.config.identity_lifetime = seconds;
    }

    pub fn set_context_lifetime(&mut self, seconds: Option<u32>) {
        self.config.context_lifetime = seconds;
    }

    pub fn set_service(&mut self, service: impl Into<String>) {
        self.config.service = service.into();
    }

    pub fn set_credential(&mut self, credential: Option<String>) {
        self.config.credential = credential;
    }

    pub fn set_domain(&mut self, domain: Option<String>) {
        self.config.domain = domain;
    }

    pub fn set_max_rounds(&mut self, max_rounds: Option<usize>) {
        self.config.max_rounds = max_rounds;
    }

    pub fn set_empty_token_policy(&mut self, policy: EmptyTokenPolicy) {
        self.config.empty_token_policy = policy;
    }

    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.config.timeout = timeout;
    }

    /// Run one authentication attempt over `transport`, bounded by the
    /// configured timeout if there is one.
    pub async fn authenticate<S>(&self, transport: &mut S) -> Result<AuthOutcome, AuthError>
    where
        S: SessionTransport + ?Sized,
    {
        self.guarded(transport, self.config.timeout).await
    }

    /// Run one authentication attempt that must finish within `timeout`.
    pub async fn authenticate_with_timeout<S>(
        &self,
        transport: &mut S,
        timeout: Duration,
    ) -> Result<AuthOutcome, AuthError>
    where
        S: SessionTransport + ?Sized,
    {
        self.guarded(transport, Some(timeout)).await
    }

    async fn guarded<S>(
        &self,
        transport: &mut S,
        timeout: Option<Duration>,
    ) -> Result<AuthOutcome, AuthError>
    where
        S: SessionTransport + ?Sized,
    {
        let previous_key = transport.session().signing_key.clone();

        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, self.attempt(transport)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("Authentication timed out after {:?}", limit);
                    Err(AuthError::TimedOut(limit))
                }
            },
            None => self.attempt(transport).await,
        };

        if result.is_err() && transport.session().signing_key != previous_key {
            debug!("Detaching signing key from failed attempt");
            transport.set_signing_key(previous_key);
        }
        result
    }

    async fn attempt<S>(&self, transport: &mut S) -> Result<AuthOutcome, AuthError>
    where
        S: SessionTransport + ?Sized,
    {
        let mut attempt = Attempt::new();

        let peer = match transport.remote_addr() {
            Ok(addr) => addr,
            Err(e) => {
                let err = AuthError::Transport(e);
                attempt.fail(&err);
                return Err(err);
            }
        };
        let host = resolver::target_host(self.resolver.as_ref(), peer.ip()).await;

        let mut context = match SecurityContext::create(
            self.provider.as_ref(),
            &host,
            &self.config.service,
            self.config.credential.as_deref(),
            self.config.identity_lifetime,
            self.config.context_lifetime,
        ) {
            Ok(context) => context,
            Err(e) => {
                attempt.fail(&e);
                return Err(e);
            }
        };
        attempt.advance(AuthState::ContextCreated);

        let result = self.negotiate(&mut context, transport, &mut attempt).await;

        if let Err(e) = context.dispose() {
            warn!("{}", e);
        }

        match result {
            Ok(outcome) => {
                info!(
                    "Kerberos session 0x{:016x} established with {} after {} round(s)",
                    outcome.session_id, outcome.service_principal, outcome.rounds
                );
                Ok(outcome)
            }
            Err(e) => {
                attempt.fail(&e);
                Err(e)
            }
        }
    }

    async fn negotiate<S>(
        &self,
        context: &mut SecurityContext,
        transport: &mut S,
        attempt: &mut Attempt,
    ) -> Result<AuthOutcome, AuthError>
    where
        S: SessionTransport + ?Sized,
    {
        let service_principal = context.service_principal().to_string();
        let mut spnego = SpnegoContext::new(context);
        let mut exchange = SessionSetupExchange::new()
            .with_security_mode(self.config.security_mode)
            .with_capabilities(self.config.capabilities)
            .with_previous_session_id(self.config.previous_session_id);
        let mut session_flags = SessionFlags::empty();
        let mut unverified = None;
        let mut inbound: Vec<u8> = Vec::new();
        attempt.advance(AuthState::Negotiating);

        while !spnego.is_established() {
            let token = spnego.init_sec_context(&inbound, 0, inbound.len())?;
            attach_signing_key(&spnego, transport);

            let token = match token {
                Some(token) => token,
                None if spnego.is_established() => break,
                None => match self.config.empty_token_policy {
                    EmptyTokenPolicy::Skip => {
                        return Err(AuthError::negotiation(
                            "no token to send but negotiation is not established",
                        ))
                    }
                    EmptyTokenPolicy::Exchange => Vec::new(),
                },
            };

            if let Some(max) = self.config.max_rounds {
                if exchange.rounds() >= max {
                    return Err(AuthError::RoundLimitExceeded(max));
                }
            }

            let outcome = exchange.exchange(transport, token).await?;
            session_flags = outcome.session_flags;
            unverified = outcome.unverified;
            inbound = outcome.token;
        }

        // the key often arrives with the final token, after its reply was read
        attach_signing_key(&spnego, transport);
        if let Some(raw) = unverified {
            match transport.session().signing_key.as_deref() {
                Some(key) => signing::verify_message(key, &raw).map_err(AuthError::Transport)?,
                None => debug!("Final reply is signed but no signing key was negotiated"),
            }
        }
        attempt.advance(AuthState::Established);

        let session_id = exchange.session_id();
        transport.session_mut().establish(session_id);
        attempt.advance(AuthState::Committed);

        Ok(AuthOutcome {
            state: AuthState::Committed,
            session_id,
            rounds: exchange.rounds(),
            session_flags,
            service_principal,
            signing: transport.session().is_signing(),
        })
    }
}

/// Hand a newly available session key to the transport before the next send.
fn attach_signing_key<S>(spnego: &SpnegoContext<'_>, transport: &mut S)
where
    S: SessionTransport + ?Sized,
{
    if let Some(key) = spnego.session_key() {
        if transport.session().signing_key.as_ref() != Some(&key) {
            debug!("Attaching {} byte signing key", key.len());
            transport.set_signing_key(Some(key));
        }
    }
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

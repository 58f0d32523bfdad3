//! Error types for SMB session setup and Kerberos authentication

use std::convert::TryFrom;
use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type for SMB protocol and transport operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for SMB protocol and transport operations
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Protocol parsing error
    #[error("Protocol parsing error: {0}")]
    ParseError(String),

    /// Invalid SMB header
    #[error("Invalid SMB header: {0}")]
    InvalidHeader(String),

    /// Buffer too small
    #[error("Buffer too small: need {need} bytes, have {have}")]
    BufferTooSmall { need: usize, have: usize },

    /// Server answered a request with a failure status
    #[error("Server rejected {command}: {status}")]
    StatusError { command: &'static str, status: Status },

    /// Response did not match the request it answers
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Connection error
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Connection closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Signing error
    #[error("Message signing error: {0}")]
    SigningError(String),

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Host name resolution failed
    #[error("Name resolution failed: {0}")]
    Resolution(String),
}

/// Failure reported by a security mechanism (Kerberos, GSS-API, SPNEGO).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct MechanismError {
    /// Human readable description
    pub message: String,
    /// Mechanism specific status code, when the mechanism exposes one
    pub code: Option<u32>,
}

impl MechanismError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(message: impl Into<String>, code: u32) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
        }
    }
}

/// Failure of one authentication attempt.
///
/// The first four variants mirror the phases of an attempt; callers can
/// match on them for logging and telemetry. `Disposal` is produced by
/// [`SecurityContext::dispose`](crate::auth::context::SecurityContext::dispose)
/// but the authenticator only ever logs it.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No usable local credential or context could be produced
    #[error("Security context creation failed: {0}")]
    ContextCreation(#[source] MechanismError),

    /// The mechanism or the SPNEGO envelope rejected a token
    #[error("Security context negotiation failed: {0}")]
    Negotiation(#[source] MechanismError),

    /// Network or protocol failure during a session setup round-trip
    #[error("Session setup exchange failed: {0}")]
    Transport(#[source] Error),

    /// Releasing mechanism resources failed
    #[error("Security context disposal failed: {0}")]
    Disposal(#[source] MechanismError),

    /// The peer never reported completion within the configured bound
    #[error("Negotiation not established after {0} rounds")]
    RoundLimitExceeded(usize),

    /// The attempt did not finish within the configured timeout
    #[error("Authentication timed out after {0:?}")]
    TimedOut(Duration),
}

impl AuthError {
    pub(crate) fn negotiation(message: impl Into<String>) -> Self {
        AuthError::Negotiation(MechanismError::new(message))
    }

    /// Whether this failure happened before any token left the client.
    pub fn is_local(&self) -> bool {
        matches!(self, AuthError::ContextCreation(_))
    }
}

impl From<Error> for AuthError {
    fn from(err: Error) -> Self {
        AuthError::Transport(err)
    }
}

/// Raw NTSTATUS value as carried in the SMB2 header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(pub u32);

impl Status {
    pub fn known(self) -> Option<NtStatus> {
        NtStatus::try_from(self.0).ok()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.known() {
            Some(status) => write!(f, "{}", status),
            None => write!(f, "Unknown status (0x{:08X})", self.0),
        }
    }
}

/// SMB protocol status codes seen during session setup (subset of NTSTATUS)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum NtStatus {
    /// The operation completed successfully
    Success = 0x00000000,
    /// More processing required; another session setup round follows
    MoreProcessingRequired = 0xC0000016,
    /// The request is not supported
    NotSupported = 0xC00000BB,
    /// Access denied
    AccessDenied = 0xC0000022,
    /// The parameter is incorrect
    InvalidParameter = 0xC000000D,
    /// The user name or password is incorrect
    LogonFailure = 0xC000006D,
    /// Account is disabled
    AccountDisabled = 0xC0000072,
    /// Password has expired
    PasswordExpired = 0xC0000071,
    /// Time difference between client and server is too large
    TimeDifferenceAtDc = 0xC0000133,
    /// The session was deleted by the server
    UserSessionDeleted = 0xC0000203,
    /// The session has expired
    NetworkSessionExpired = 0xC000035C,
    /// Insufficient resources
    InsufficientResources = 0xC000009A,
    /// The request timed out
    IoTimeout = 0xC00000B5,
}

impl TryFrom<u32> for NtStatus {
    type Error = ();

    fn try_from(value: u32) -> std::result::Result<Self, Self::Error> {
        match value {
            0x00000000 => Ok(NtStatus::Success),
            0xC0000016 => Ok(NtStatus::MoreProcessingRequired),
            0xC00000BB => Ok(NtStatus::NotSupported),
            0xC0000022 => Ok(NtStatus::AccessDenied),
            0xC000000D => Ok(NtStatus::InvalidParameter),
            0xC000006D => Ok(NtStatus::LogonFailure),
            0xC0000072 => Ok(NtStatus::AccountDisabled),
            0xC0000071 => Ok(NtStatus::PasswordExpired),
            0xC0000133 => Ok(NtStatus::TimeDifferenceAtDc),
            0xC0000203 => Ok(NtStatus::UserSessionDeleted),
            0xC000035C => Ok(NtStatus::NetworkSessionExpired),
            0xC000009A => Ok(NtStatus::InsufficientResources),
            0xC00000B5 => Ok(NtStatus::IoTimeout),
            _ => Err(()),
        }
    }
}

impl NtStatus {
    /// Check if this is a success status
    pub fn is_success(self) -> bool {
        self == NtStatus::Success
    }

    /// Check if this is an error status
    pub fn is_error(self) -> bool {
        (self as u32) & 0xC0000000 == 0xC0000000
    }

    /// Raw NTSTATUS value
    pub fn to_u32(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for NtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            NtStatus::Success => "Success",
            NtStatus::MoreProcessingRequired => "More processing required",
            NtStatus::NotSupported => "Not supported",
            NtStatus::AccessDenied => "Access denied",
            NtStatus::InvalidParameter => "Invalid parameter",
            NtStatus::LogonFailure => "Logon failure",
            NtStatus::AccountDisabled => "Account disabled",
            NtStatus::PasswordExpired => "Password expired",
            NtStatus::TimeDifferenceAtDc => "Clock skew too great",
            NtStatus::UserSessionDeleted => "User session deleted",
            NtStatus::NetworkSessionExpired => "Network session expired",
            NtStatus::InsufficientResources => "Insufficient resources",
            NtStatus::IoTimeout => "I/O timeout",
        };
        write!(f, "{} (0x{:08X})", msg, *self as u32)
    }
}

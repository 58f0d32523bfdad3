//! Kerberos (SPNEGO) session setup for SMB2 clients
//!
//! Negotiates a Kerberos security context wrapped in SPNEGO with an SMB
//! server and drives SESSION_SETUP to an authenticated session. See
//! [`auth::Authenticator`] for the entry point.

#![allow(missing_docs)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod error;
pub mod netbios;
pub mod protocol;
pub mod resolver;
pub mod transport;

#[cfg(test)]
pub mod e2e_tests;

pub use auth::{AuthOutcome, Authenticator, AuthenticatorConfig, EmptyTokenPolicy};
pub use error::{AuthError, Error, MechanismError, Result};

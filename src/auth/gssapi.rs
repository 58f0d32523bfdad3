//! Kerberos mechanism backed by the system GSS-API library

use super::{Mechanism, MechanismProvider, MechanismRequest};
use crate::error::MechanismError;
use libgssapi::context::{ClientCtx, CtxFlags, SecurityContext as _};
use libgssapi::credential::{Cred, CredUsage};
use libgssapi::name::Name;
use libgssapi::oid::{OidSet, GSS_MECH_KRB5, GSS_NT_HOSTBASED_SERVICE, GSS_NT_KRB5_PRINCIPAL};
use std::time::Duration;
use tracing::debug;

fn gss_error(what: &str, err: libgssapi::error::Error) -> MechanismError {
    MechanismError::new(format!("{}: {}", what, err))
}

/// Creates [`GssapiMechanism`]s from the default credential cache, or from
/// the principal named in the request.
///
/// Limitations of this backend:
///
/// - The requested context lifetime is not enforced; the ticket lifetime
///   applies.
/// - No session key is exposed, so no signing key is ever attached to the
///   transport and SMB signing stays off for sessions it sets up.
/// - There is no mechListMIC support, so a server that sends one fails the
///   negotiation.
#[derive(Debug, Clone, Copy, Default)]
pub struct GssapiProvider;

impl GssapiProvider {
    pub fn new() -> Self {
        Self
    }
}

impl MechanismProvider for GssapiProvider {
    fn create(&self, request: &MechanismRequest) -> Result<Box<dyn Mechanism>, MechanismError> {
        let mut mechs = OidSet::new().map_err(|e| gss_error("OID set", e))?;
        mechs
            .add(&GSS_MECH_KRB5)
            .map_err(|e| gss_error("OID set", e))?;

        let lifetime = request.identity_lifetime.map(|s| Duration::from_secs(s as u64));
        let cred = match request.credential {
            Some(ref principal) => {
                let name = Name::new(principal.as_bytes(), Some(&GSS_NT_KRB5_PRINCIPAL))
                    .map_err(|e| gss_error("initiator name", e))?;
                Cred::acquire(Some(&name), lifetime, CredUsage::Initiate, Some(&mechs))
            }
            None => Cred::acquire(None, lifetime, CredUsage::Initiate, Some(&mechs)),
        }
        .map_err(|e| gss_error("acquiring credentials", e))?;

        let target = Name::new(
            request.service_principal().as_bytes(),
            Some(&GSS_NT_HOSTBASED_SERVICE),
        )
        .and_then(|name| name.canonicalize(Some(&GSS_MECH_KRB5)))
        .map_err(|e| gss_error("service principal", e))?;

        if let Some(seconds) = request.context_lifetime {
            debug!(
                "Context lifetime {}s is advisory; the ticket lifetime applies",
                seconds
            );
        }

        Ok(Box::new(GssapiMechanism {
            cred: Some(cred),
            target: Some(target),
            flags: CtxFlags::empty(),
            ctx: None,
        }))
    }
}

/// Initiator-side Kerberos context.
///
/// The GSS context is built on the first step so that flags requested after
/// creation still apply.
pub struct GssapiMechanism {
    cred: Option<Cred>,
    target: Option<Name>,
    flags: CtxFlags,
    ctx: Option<ClientCtx>,
}

impl Mechanism for GssapiMechanism {
    fn request_mutual_auth(&mut self, enabled: bool) -> Result<(), MechanismError> {
        if self.ctx.is_some() {
            return Err(MechanismError::new(
                "mutual authentication must be requested before the first token",
            ));
        }
        self.flags.set(CtxFlags::GSS_C_MUTUAL_FLAG, enabled);
        Ok(())
    }

    fn init_sec_context(&mut self, input: &[u8]) -> Result<Option<Vec<u8>>, MechanismError> {
        if self.ctx.is_none() {
            let target = self
                .target
                .take()
                .ok_or_else(|| MechanismError::new("context disposed"))?;
            self.ctx = Some(ClientCtx::new(
                self.cred.take(),
                target,
                self.flags,
                Some(&GSS_MECH_KRB5),
            ));
        }

        let ctx = self
            .ctx
            .as_mut()
            .ok_or_else(|| MechanismError::new("context disposed"))?;
        let input = if input.is_empty() { None } else { Some(input) };
        let output = ctx
            .step(input, None)
            .map_err(|e| gss_error("gss_init_sec_context", e))?;
        Ok(output.map(|buf| buf.to_vec()))
    }

    fn is_established(&self) -> bool {
        self.ctx.as_ref().map(|ctx| ctx.is_complete()).unwrap_or(false)
    }

    fn dispose(&mut self) -> Result<(), MechanismError> {
        self.ctx = None;
        self.cred = None;
        self.target = None;
        Ok(())
    }
}

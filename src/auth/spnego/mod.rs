//! SPNEGO (RFC 4178) negotiation around a Kerberos security context

pub mod token;

pub use self::token::{MechType, NegState, NegTokenInit, NegTokenResp};

use super::context::SecurityContext;
use crate::error::AuthError;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Progress {
    Initial,
    InProgress,
    Completed,
}

/// SPNEGO initiator bound to one [`SecurityContext`].
pub struct SpnegoContext<'a> {
    context: &'a mut SecurityContext,
    progress: Progress,
    selected_mech: Option<MechType>,
    /// DER MechTypeList sent in the initial token
    mech_type_list: Vec<u8>,
}

impl<'a> SpnegoContext<'a> {
    pub fn new(context: &'a mut SecurityContext) -> Self {
        Self {
            context,
            progress: Progress::Initial,
            selected_mech: None,
            mech_type_list: Vec::new(),
        }
    }

    /// Both the SPNEGO exchange and the wrapped mechanism are complete.
    pub fn is_established(&self) -> bool {
        self.progress == Progress::Completed && self.mechanism_established()
    }

    /// Mechanism the server selected, once known
    pub fn selected_mechanism(&self) -> Option<&MechType> {
        self.selected_mech.as_ref()
    }

    pub fn session_key(&self) -> Option<Vec<u8>> {
        self.context.mechanism().and_then(|m| m.session_key())
    }

    /// Advance by one step using `input[offset..offset + length]` from the
    /// server; returns the token to send, if any.
    pub fn init_sec_context(
        &mut self,
        input: &[u8],
        offset: usize,
        length: usize,
    ) -> Result<Option<Vec<u8>>, AuthError> {
        let token = offset
            .checked_add(length)
            .filter(|&end| end <= input.len())
            .map(|end| &input[offset..end])
            .ok_or_else(|| {
                AuthError::negotiation(format!(
                    "token range {}+{} outside {} byte buffer",
                    offset,
                    length,
                    input.len()
                ))
            })?;

        match self.progress {
            Progress::Initial => self.initial_token(token),
            Progress::InProgress if token.is_empty() => {
                if self.mechanism_established() {
                    self.progress = Progress::Completed;
                    Ok(None)
                } else {
                    Err(AuthError::negotiation(
                        "empty token from server before the mechanism completed",
                    ))
                }
            }
            Progress::InProgress => self.continue_with(token),
            Progress::Completed if token.is_empty() => Ok(None),
            Progress::Completed => Err(AuthError::negotiation(
                "token received after negotiation completed",
            )),
        }
    }

    fn mechanism_established(&self) -> bool {
        self.context
            .mechanism()
            .map(|m| m.is_established())
            .unwrap_or(false)
    }

    fn initial_token(&mut self, hint: &[u8]) -> Result<Option<Vec<u8>>, AuthError> {
        if !hint.is_empty() {
            trace!("Ignoring {} byte server hint", hint.len());
        }

        let mech_token = self
            .context
            .mechanism_mut()?
            .init_sec_context(&[])
            .map_err(AuthError::Negotiation)?
            .ok_or_else(|| AuthError::negotiation("mechanism produced no initial token"))?;

        let mech_types = token::proposed_mechanisms();
        self.mech_type_list =
            token::mech_type_list(&mech_types).map_err(AuthError::Negotiation)?;
        debug!(
            "SPNEGO init, proposing {:?}",
            mech_types.iter().map(token::dotted).collect::<Vec<_>>()
        );

        let init = NegTokenInit {
            mech_types,
            mech_token: Some(mech_token),
        }
        .encode()
        .map_err(AuthError::Negotiation)?;
        self.progress = Progress::InProgress;
        Ok(Some(init))
    }

    fn continue_with(&mut self, input: &[u8]) -> Result<Option<Vec<u8>>, AuthError> {
        let resp = NegTokenResp::decode(input).map_err(AuthError::Negotiation)?;
        trace!(
            "SPNEGO response: state={:?} mech={:?} token={} mic={}",
            resp.neg_state,
            resp.supported_mech.as_ref().map(token::dotted),
            resp.response_token.as_ref().map_or(0, Vec::len),
            resp.mech_list_mic.is_some()
        );

        match resp.neg_state {
            Some(NegState::Reject) => {
                return Err(AuthError::negotiation("server rejected the security context"))
            }
            Some(NegState::RequestMic) => debug!("Server requested a mechListMIC"),
            _ => {}
        }

        self.check_mechanism(resp.supported_mech.as_ref())?;
        let completed = matches!(resp.neg_state, Some(NegState::AcceptCompleted) | None);

        if self.mechanism_established() {
            // only the mechListMIC exchange is left
            self.verify_server_mic(resp.mech_list_mic.as_deref())?;
            if completed {
                self.progress = Progress::Completed;
                return Ok(None);
            }
            let mic = self.client_mic()?;
            return encode_resp(NegTokenResp {
                mech_list_mic: mic,
                ..Default::default()
            })
            .map(Some);
        }

        let response_token = resp
            .response_token
            .ok_or_else(|| AuthError::negotiation("server response carries no mechanism token"))?;
        let output = self
            .context
            .mechanism_mut()?
            .init_sec_context(&response_token)
            .map_err(AuthError::Negotiation)?;

        if !self.mechanism_established() {
            return output.map(wrap_mech_token).transpose();
        }

        self.verify_server_mic(resp.mech_list_mic.as_deref())?;
        if completed {
            self.progress = Progress::Completed;
            debug!("SPNEGO complete");
            return output.map(wrap_mech_token).transpose();
        }

        let mic = self.client_mic()?;
        if output.is_none() && mic.is_none() {
            return Ok(None);
        }
        encode_resp(NegTokenResp {
            response_token: output,
            mech_list_mic: mic,
            ..Default::default()
        })
        .map(Some)
    }

    fn check_mechanism(&mut self, offered: Option<&MechType>) -> Result<(), AuthError> {
        match (offered, &self.selected_mech) {
            (Some(mech), None) => {
                if !token::proposed_mechanisms().contains(mech) {
                    return Err(AuthError::negotiation(format!(
                        "server selected unsupported mechanism {}",
                        token::dotted(mech)
                    )));
                }
                debug!("Server selected {}", token::dotted(mech));
                self.selected_mech = Some(mech.clone());
            }
            (Some(mech), Some(selected)) if mech != selected => {
                return Err(AuthError::negotiation(format!(
                    "server switched mechanism from {} to {}",
                    token::dotted(selected),
                    token::dotted(mech)
                )));
            }
            (None, None) => self.selected_mech = Some(token::krb5()),
            _ => {}
        }
        Ok(())
    }

    /// A server mechListMIC must verify; mechanisms without MIC support
    /// reject it.
    fn verify_server_mic(&mut self, mic: Option<&[u8]>) -> Result<(), AuthError> {
        if let Some(mic) = mic {
            let list = self.mech_type_list.clone();
            self.context
                .mechanism_mut()?
                .verify_mic(&list, mic)
                .map_err(AuthError::Negotiation)?;
        }
        Ok(())
    }

    fn client_mic(&mut self) -> Result<Option<Vec<u8>>, AuthError> {
        let list = self.mech_type_list.clone();
        self.context
            .mechanism_mut()?
            .get_mic(&list)
            .map_err(AuthError::Negotiation)
    }
}

fn encode_resp(resp: NegTokenResp) -> Result<Vec<u8>, AuthError> {
    resp.encode().map_err(AuthError::Negotiation)
}

fn wrap_mech_token(token: Vec<u8>) -> Result<Vec<u8>, AuthError> {
    encode_resp(NegTokenResp {
        response_token: Some(token),
        ..Default::default()
    })
}

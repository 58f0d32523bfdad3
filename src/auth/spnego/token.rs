//! SPNEGO tokens (RFC 4178) over the GSS-API types of picky-krb

use crate::error::MechanismError;
use picky_asn1::wrapper::{
    ExplicitContextTag0, ExplicitContextTag1, ExplicitContextTag2, ExplicitContextTag3,
    ObjectIdentifierAsn1, OctetStringAsn1, Optional,
};
use picky_asn1_der::{Asn1DerError, Asn1RawDer};
use picky_asn1_x509::oids;
use picky_krb::gss_api::{
    ApplicationTag0, GssApiNegInit, MechTypeList, NegTokenTarg, NegTokenTarg1,
};
use std::convert::TryFrom;

pub use picky_krb::gss_api::MechType;

const TAG_ENUMERATED: u8 = 0x0A;

/// Kerberos 5, 1.2.840.113554.1.2.2
pub fn krb5() -> MechType {
    MechType::from(oids::krb5())
}

/// Microsoft's Kerberos 5 alias, 1.2.840.48018.1.2.2
pub fn ms_krb5() -> MechType {
    MechType::from(oids::ms_krb5())
}

/// Mechanisms proposed in the initial token, preferred first
pub fn proposed_mechanisms() -> Vec<MechType> {
    vec![krb5(), ms_krb5()]
}

/// Dotted-decimal form of a mechanism OID
pub fn dotted(mech: &MechType) -> String {
    Into::<String>::into(&mech.0)
}

/// DER MechTypeList, the input to mechListMIC
pub fn mech_type_list(mechs: &[MechType]) -> Result<Vec<u8>, MechanismError> {
    picky_asn1_der::to_vec(&MechTypeList::from(mechs.to_vec())).map_err(codec_error)
}

fn codec_error(e: Asn1DerError) -> MechanismError {
    MechanismError::new(format!("malformed SPNEGO token: {}", e))
}

/// negState of a NegTokenResp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NegState {
    AcceptCompleted = 0,
    AcceptIncomplete = 1,
    Reject = 2,
    RequestMic = 3,
}

impl TryFrom<u8> for NegState {
    type Error = MechanismError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(NegState::AcceptCompleted),
            1 => Ok(NegState::AcceptIncomplete),
            2 => Ok(NegState::Reject),
            3 => Ok(NegState::RequestMic),
            _ => Err(MechanismError::new(format!(
                "malformed SPNEGO token: unknown negState {}",
                value
            ))),
        }
    }
}

impl NegState {
    fn to_raw(self) -> Asn1RawDer {
        Asn1RawDer(vec![TAG_ENUMERATED, 0x01, self as u8])
    }

    fn from_raw(raw: &Asn1RawDer) -> Result<Self, MechanismError> {
        match raw.0.as_slice() {
            [TAG_ENUMERATED, 0x01, value] => NegState::try_from(*value),
            _ => Err(MechanismError::new("malformed SPNEGO token: bad negState")),
        }
    }
}

/// Initial SPNEGO token, GSS-API framed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegTokenInit {
    pub mech_types: Vec<MechType>,
    pub mech_token: Option<Vec<u8>>,
}

impl NegTokenInit {
    pub fn encode(&self) -> Result<Vec<u8>, MechanismError> {
        let init = picky_krb::gss_api::NegTokenInit {
            mech_types: Optional::from(Some(ExplicitContextTag0::from(MechTypeList::from(
                self.mech_types.clone(),
            )))),
            req_flags: Optional::from(None),
            mech_token: Optional::from(
                self.mech_token
                    .clone()
                    .map(|token| ExplicitContextTag2::from(OctetStringAsn1::from(token))),
            ),
            mech_list_mic: Optional::from(None),
        };
        let framed = ApplicationTag0(GssApiNegInit {
            oid: ObjectIdentifierAsn1::from(oids::spnego()),
            neg_token_init: ExplicitContextTag0::from(init),
        });
        picky_asn1_der::to_vec(&framed).map_err(codec_error)
    }

    pub fn decode(token: &[u8]) -> Result<Self, MechanismError> {
        let framed: ApplicationTag0<GssApiNegInit> =
            picky_asn1_der::from_bytes(token).map_err(codec_error)?;
        let GssApiNegInit {
            oid,
            neg_token_init,
        } = framed.0;

        if oid != ObjectIdentifierAsn1::from(oids::spnego()) {
            return Err(MechanismError::new(format!(
                "not a SPNEGO token ({})",
                Into::<String>::into(&oid.0)
            )));
        }

        let init = neg_token_init.0;
        Ok(Self {
            mech_types: init.mech_types.0.map(|list| list.0 .0).unwrap_or_default(),
            mech_token: init.mech_token.0.map(|token| token.0 .0),
        })
    }
}

/// Subsequent SPNEGO token
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NegTokenResp {
    pub neg_state: Option<NegState>,
    pub supported_mech: Option<MechType>,
    pub response_token: Option<Vec<u8>>,
    pub mech_list_mic: Option<Vec<u8>>,
}

impl NegTokenResp {
    pub fn encode(&self) -> Result<Vec<u8>, MechanismError> {
        let targ = NegTokenTarg {
            neg_result: Optional::from(
                self.neg_state
                    .map(|state| ExplicitContextTag0::from(state.to_raw())),
            ),
            supported_mech: Optional::from(
                self.supported_mech.clone().map(ExplicitContextTag1::from),
            ),
            response_token: Optional::from(
                self.response_token
                    .clone()
                    .map(|token| ExplicitContextTag2::from(OctetStringAsn1::from(token))),
            ),
            mech_list_mic: Optional::from(
                self.mech_list_mic
                    .clone()
                    .map(|mic| ExplicitContextTag3::from(OctetStringAsn1::from(mic))),
            ),
        };
        picky_asn1_der::to_vec(&ExplicitContextTag1::from(targ)).map_err(codec_error)
    }

    pub fn decode(token: &[u8]) -> Result<Self, MechanismError> {
        let targ: NegTokenTarg1 = picky_asn1_der::from_bytes(token).map_err(codec_error)?;
        let targ = targ.0;

        let neg_state = match targ.neg_result.0 {
            Some(raw) => Some(NegState::from_raw(&raw.0)?),
            None => None,
        };

        Ok(Self {
            neg_state,
            supported_mech: targ.supported_mech.0.map(|mech| mech.0),
            response_token: targ.response_token.0.map(|token| token.0 .0),
            mech_list_mic: targ.mech_list_mic.0.map(|mic| mic.0 .0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_token_is_gss_framed() {
        let init = NegTokenInit {
            mech_types: proposed_mechanisms(),
            mech_token: Some(b"ap-req".to_vec()),
        };
        let bytes = init.encode().unwrap();
        assert_eq!(bytes[0], 0x60);
        // SPNEGO OID right after the application tag
        assert_eq!(&bytes[2..10], &[0x06, 0x06, 0x2B, 0x06, 0x01, 0x05, 0x05, 0x02]);

        let decoded = NegTokenInit::decode(&bytes).unwrap();
        assert_eq!(decoded.mech_types, vec![krb5(), ms_krb5()]);
        assert_eq!(decoded.mech_token.as_deref(), Some(&b"ap-req"[..]));
    }

    #[test]
    fn test_mech_type_list_der() {
        let list = mech_type_list(&proposed_mechanisms()).unwrap();
        assert_eq!(list[0], 0x30);
        assert_eq!(list[1] as usize, list.len() - 2);
        assert_eq!(
            &list[2..13],
            &[0x06, 0x09, 0x2A, 0x86, 0x48, 0x86, 0xF7, 0x12, 0x01, 0x02, 0x02]
        );
    }

    #[test]
    fn test_resp_neg_state_encoding() {
        let bytes = NegTokenResp {
            neg_state: Some(NegState::AcceptIncomplete),
            ..Default::default()
        }
        .encode()
        .unwrap();
        assert_eq!(bytes, vec![0xA1, 0x07, 0x30, 0x05, 0xA0, 0x03, 0x0A, 0x01, 0x01]);

        let decoded = NegTokenResp::decode(&bytes).unwrap();
        assert_eq!(decoded.neg_state, Some(NegState::AcceptIncomplete));
        assert!(decoded.supported_mech.is_none());
    }

    #[test]
    fn test_resp_carries_mech_token_and_mic() {
        let resp = NegTokenResp {
            neg_state: Some(NegState::AcceptCompleted),
            supported_mech: Some(ms_krb5()),
            response_token: Some(b"ap-rep".to_vec()),
            mech_list_mic: Some(b"mic".to_vec()),
        };
        let decoded = NegTokenResp::decode(&resp.encode().unwrap()).unwrap();
        assert_eq!(decoded, resp);
        assert_eq!(dotted(&ms_krb5()), "1.2.840.48018.1.2.2");
    }

    #[test]
    fn test_unknown_neg_state_rejected() {
        let bytes = [0xA1, 0x07, 0x30, 0x05, 0xA0, 0x03, 0x0A, 0x01, 0x07];
        assert!(NegTokenResp::decode(&bytes).is_err());
    }

    #[test]
    fn test_resp_decode_rejects_garbage() {
        assert!(NegTokenResp::decode(&[0xA1, 0x03, 0x30, 0x05]).is_err());
        assert!(NegTokenResp::decode(b"NTLMSSP\0").is_err());
    }
}

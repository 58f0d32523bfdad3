//! Kerberos session setup against a scripted server

use super::loopback::{LoopbackTransport, ScriptedServer, ServerReply};
use crate::auth::spnego::token::krb5;
use crate::auth::spnego::{NegState, NegTokenInit, NegTokenResp};
use crate::auth::testing::{CallLog, ScriptedProvider, Step};
use crate::auth::Authenticator;
use crate::error::{AuthError, Error, NtStatus};
use crate::protocol::signing;
use crate::transport::{SessionTransport, Smb2SessionTransport, TcpTransport};
use std::sync::Arc;

const SESSION_ID: u64 = 0x0000_4000_0000_0021;

fn server_token(state: NegState, token: &[u8]) -> Vec<u8> {
    NegTokenResp {
        neg_state: Some(state),
        supported_mech: Some(krb5()),
        response_token: Some(token.to_vec()),
        mech_list_mic: None,
    }
    .encode()
    .unwrap()
}

fn two_round_steps() -> Vec<Step> {
    vec![
        Step::Emit(b"ap-req".to_vec()),
        Step::Emit(b"ap-req-2".to_vec()),
        Step::Establish(None),
    ]
}

#[tokio::test]
async fn test_kerberos_session_setup_over_tcp() {
    let (client, server) = LoopbackTransport::new().await.unwrap();
    let server = ScriptedServer::spawn(
        server,
        vec![
            ServerReply::new(
                NtStatus::MoreProcessingRequired.to_u32(),
                SESSION_ID,
                server_token(NegState::AcceptIncomplete, b"challenge"),
            ),
            ServerReply::new(
                NtStatus::Success.to_u32(),
                SESSION_ID,
                server_token(NegState::AcceptCompleted, b"ap-rep"),
            ),
        ],
    );

    let calls = CallLog::default();
    let auth = Authenticator::new(Arc::new(ScriptedProvider::new(
        calls.clone(),
        two_round_steps(),
    )));
    let mut transport = Smb2SessionTransport::new(TcpTransport::from_stream(client));

    let outcome = auth.authenticate(&mut transport).await.unwrap();
    assert_eq!(outcome.session_id, SESSION_ID);
    assert_eq!(outcome.rounds, 2);
    assert_eq!(outcome.service_principal, "cifs@127.0.0.1");
    assert!(transport.session().established);
    assert_eq!(transport.session().session_id, SESSION_ID);
    assert_eq!(calls.disposals(), 1);

    let received = server.await.unwrap().unwrap();
    assert_eq!(received.len(), 2);

    assert_eq!(received[0].header.message_id, 1);
    assert_eq!(received[0].header.session_id, 0);
    let init = NegTokenInit::decode(&received[0].request.security_blob).unwrap();
    assert_eq!(init.mech_token.as_deref(), Some(&b"ap-req"[..]));

    assert_eq!(received[1].header.message_id, 2);
    assert_eq!(received[1].header.session_id, SESSION_ID);
    let resp = NegTokenResp::decode(&received[1].request.security_blob).unwrap();
    assert_eq!(resp.response_token.as_deref(), Some(&b"ap-req-2"[..]));
}

#[tokio::test]
async fn test_rounds_after_key_are_signed() {
    let key = vec![0x6Bu8; 16];
    let (client, server) = LoopbackTransport::new().await.unwrap();
    let server = ScriptedServer::spawn(
        server,
        vec![
            ServerReply::new(
                NtStatus::MoreProcessingRequired.to_u32(),
                SESSION_ID,
                server_token(NegState::AcceptIncomplete, b"challenge"),
            ),
            ServerReply::new(
                NtStatus::Success.to_u32(),
                SESSION_ID,
                server_token(NegState::AcceptCompleted, b"ap-rep"),
            )
            .signed(key.clone()),
        ],
    );

    let calls = CallLog::default();
    let provider =
        ScriptedProvider::new(calls.clone(), two_round_steps()).with_session_key(key.clone(), 2);
    let auth = Authenticator::new(Arc::new(provider));
    let mut transport = Smb2SessionTransport::new(TcpTransport::from_stream(client));

    let outcome = auth.authenticate(&mut transport).await.unwrap();
    assert!(outcome.signing);

    let received = server.await.unwrap().unwrap();
    assert!(!received[0].header.is_signed());
    assert!(received[1].header.is_signed());
    signing::verify_message(&key, &received[1].raw).unwrap();
}

async fn run_with_final_key(
    signed_with: Vec<u8>,
    key: Vec<u8>,
) -> (Result<u64, AuthError>, bool) {
    let (client, server) = LoopbackTransport::new().await.unwrap();
    let server = ScriptedServer::spawn(
        server,
        vec![
            ServerReply::new(
                NtStatus::MoreProcessingRequired.to_u32(),
                SESSION_ID,
                server_token(NegState::AcceptIncomplete, b"challenge"),
            ),
            ServerReply::new(
                NtStatus::Success.to_u32(),
                SESSION_ID,
                server_token(NegState::AcceptCompleted, b"ap-rep"),
            )
            .signed(signed_with),
        ],
    );

    // the key only exists once the mechanism has consumed the final token
    let calls = CallLog::default();
    let provider =
        ScriptedProvider::new(calls.clone(), two_round_steps()).with_session_key(key, 3);
    let auth = Authenticator::new(Arc::new(provider));
    let mut transport = Smb2SessionTransport::new(TcpTransport::from_stream(client));

    let result = auth
        .authenticate(&mut transport)
        .await
        .map(|outcome| outcome.session_id);
    server.await.unwrap().unwrap();
    assert_eq!(calls.disposals(), 1);
    (result, transport.session().established)
}

#[tokio::test]
async fn test_final_reply_checked_with_late_key() {
    let key = vec![0x6Bu8; 16];
    let (result, established) = run_with_final_key(key.clone(), key).await;
    assert_eq!(result.unwrap(), SESSION_ID);
    assert!(established);
}

#[tokio::test]
async fn test_final_reply_with_bad_signature_fails() {
    let (result, established) = run_with_final_key(vec![0x01u8; 16], vec![0x6Bu8; 16]).await;
    assert!(matches!(
        result,
        Err(AuthError::Transport(Error::SigningError(_)))
    ));
    assert!(!established);
}

#[tokio::test]
async fn test_logon_failure_from_server() {
    let (client, server) = LoopbackTransport::new().await.unwrap();
    let server = ScriptedServer::spawn(
        server,
        vec![ServerReply::new(
            NtStatus::LogonFailure.to_u32(),
            0,
            Vec::new(),
        )],
    );

    let calls = CallLog::default();
    let auth = Authenticator::new(Arc::new(ScriptedProvider::new(
        calls.clone(),
        two_round_steps(),
    )));
    let mut transport = Smb2SessionTransport::new(TcpTransport::from_stream(client));

    let err = auth.authenticate(&mut transport).await.unwrap_err();
    match err {
        AuthError::Transport(Error::StatusError { status, .. }) => {
            assert_eq!(status.known(), Some(NtStatus::LogonFailure))
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(!transport.session().established);
    assert_eq!(transport.session().session_id, 0);
    assert_eq!(calls.disposals(), 1);
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_server_hangs_up_mid_negotiation() {
    let (client, server) = LoopbackTransport::new().await.unwrap();
    let server = ScriptedServer::spawn(
        server,
        vec![ServerReply::new(
            NtStatus::MoreProcessingRequired.to_u32(),
            SESSION_ID,
            server_token(NegState::AcceptIncomplete, b"challenge"),
        )],
    );

    let calls = CallLog::default();
    let auth = Authenticator::new(Arc::new(ScriptedProvider::new(
        calls.clone(),
        two_round_steps(),
    )));
    let mut transport = Smb2SessionTransport::new(TcpTransport::from_stream(client));

    let err = auth.authenticate(&mut transport).await.unwrap_err();
    assert!(matches!(err, AuthError::Transport(_)));
    assert!(!transport.session().established);
    assert_eq!(calls.disposals(), 1);
    assert_eq!(server.await.unwrap().unwrap().len(), 1);
}

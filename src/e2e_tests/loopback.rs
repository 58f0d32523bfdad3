//! Loopback connection and a scripted SMB2 server for session setup tests

use crate::error::Result;
use crate::protocol::messages::{
    SessionFlags, Smb2Header, Smb2SessionSetupRequest, Smb2SessionSetupResponse, SmbMessage,
};
use crate::protocol::signing;
use crate::protocol::smb2_constants::{Smb2Command, Smb2HeaderFlags};
use crate::transport::{SmbTransport, TcpTransport};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub struct LoopbackTransport;

impl LoopbackTransport {
    /// Create a connected (client, server) stream pair on localhost
    pub async fn new() -> Result<(TcpStream, TcpStream)> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let client_future = TcpStream::connect(addr);
        let server_future = async { listener.accept().await.map(|(stream, _)| stream) };

        let (client_stream, server_stream) = tokio::try_join!(client_future, server_future)?;

        Ok((client_stream, server_stream))
    }
}

/// One canned SESSION_SETUP answer
#[derive(Debug, Clone)]
pub struct ServerReply {
    pub status: u32,
    pub session_id: u64,
    pub blob: Vec<u8>,
    pub session_flags: SessionFlags,
    /// Sign the reply with this key
    pub sign_with: Option<Vec<u8>>,
}

impl ServerReply {
    pub fn new(status: u32, session_id: u64, blob: Vec<u8>) -> Self {
        Self {
            status,
            session_id,
            blob,
            session_flags: SessionFlags::empty(),
            sign_with: None,
        }
    }

    pub fn signed(mut self, key: Vec<u8>) -> Self {
        self.sign_with = Some(key);
        self
    }
}

/// A request as the server saw it
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub header: Smb2Header,
    pub request: Smb2SessionSetupRequest,
    pub raw: Vec<u8>,
}

/// Answers SESSION_SETUP requests from a fixed script, then hangs up.
pub struct ScriptedServer;

impl ScriptedServer {
    pub fn spawn(
        stream: TcpStream,
        replies: Vec<ServerReply>,
    ) -> JoinHandle<Result<Vec<ReceivedRequest>>> {
        tokio::spawn(async move {
            let mut transport = TcpTransport::from_stream(stream);
            let mut received = Vec::new();

            for reply in replies {
                let raw = transport.receive_message().await?;
                let header = Smb2Header::parse(&raw)?;
                let request = Smb2SessionSetupRequest::parse(&raw[Smb2Header::SIZE..])?;

                let mut response_header = Smb2Header::new_with_command(Smb2Command::SessionSetup);
                response_header.flags = Smb2HeaderFlags::SERVER_TO_REDIR;
                response_header.message_id = header.message_id;
                response_header.session_id = reply.session_id;
                response_header.status = reply.status;
                response_header.credits = header.credits;

                let mut message = response_header.serialize()?;
                message.extend_from_slice(
                    &Smb2SessionSetupResponse::new()
                        .with_security_blob(reply.blob.clone())
                        .with_session_flags(reply.session_flags)
                        .serialize()?,
                );
                if let Some(ref key) = reply.sign_with {
                    signing::sign_message(key, &mut message)?;
                }

                received.push(ReceivedRequest {
                    header,
                    request,
                    raw,
                });
                transport.send_message(&message).await?;
            }

            transport.close().await?;
            Ok(received)
        })
    }
}

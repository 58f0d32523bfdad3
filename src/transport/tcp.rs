//! TCP transport implementation for SMB

use super::SmbTransport;
use crate::error::{Error, Result};
use crate::netbios::{decode_frame, encode_session_message};
use crate::protocol::NetBiosMessageType;
use async_trait::async_trait;
use bytes::BytesMut;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

/// TCP transport with NetBIOS session framing
pub struct TcpTransport {
    stream: Option<TcpStream>,
    read_buffer: BytesMut,
    local_addr: Option<SocketAddr>,
    remote_addr: Option<SocketAddr>,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self {
            stream: None,
            read_buffer: BytesMut::with_capacity(65536),
            local_addr: None,
            remote_addr: None,
        }
    }

    /// Create a TCP transport from an existing stream
    pub fn from_stream(stream: TcpStream) -> Self {
        let local_addr = stream.local_addr().ok();
        let remote_addr = stream.peer_addr().ok();

        Self {
            stream: Some(stream),
            read_buffer: BytesMut::with_capacity(65536),
            local_addr,
            remote_addr,
        }
    }

    /// Read more data from the stream into the buffer
    async fn read_more(&mut self) -> Result<usize> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| Error::ConnectionError("Not connected".to_string()))?;

        let n = stream.read_buf(&mut self.read_buffer).await?;
        if n == 0 {
            return Err(Error::ConnectionClosed);
        }
        Ok(n)
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SmbTransport for TcpTransport {
    async fn connect(&mut self, addr: SocketAddr) -> Result<()> {
        let stream = TcpStream::connect(addr).await?;
        self.local_addr = Some(stream.local_addr()?);
        self.remote_addr = Some(stream.peer_addr()?);
        self.stream = Some(stream);
        self.read_buffer.clear();
        debug!("Connected to {}", addr);
        Ok(())
    }

    async fn send_message(&mut self, message: &[u8]) -> Result<()> {
        let framed = encode_session_message(message)?;
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| Error::ConnectionError("Not connected".to_string()))?;
        stream.write_all(&framed).await?;
        stream.flush().await?;
        trace!("Sent {} byte message", message.len());
        Ok(())
    }

    async fn receive_message(&mut self) -> Result<Vec<u8>> {
        loop {
            match decode_frame(&mut self.read_buffer)? {
                Some((NetBiosMessageType::SessionMessage, payload)) => {
                    trace!("Received {} byte message", payload.len());
                    return Ok(payload.to_vec());
                }
                Some((NetBiosMessageType::Keepalive, _)) => {
                    trace!("Skipping NetBIOS keepalive");
                }
                Some((other, _)) => {
                    return Err(Error::Protocol(format!(
                        "Unexpected NetBIOS message type: {:?}",
                        other
                    )));
                }
                None => {
                    self.read_more().await?;
                }
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await?;
        }
        self.local_addr = None;
        self.remote_addr = None;
        self.read_buffer.clear();
        Ok(())
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        self.local_addr
            .ok_or_else(|| Error::ConnectionError("Not connected".to_string()))
    }

    fn remote_addr(&self) -> Result<SocketAddr> {
        self.remote_addr
            .ok_or_else(|| Error::ConnectionError("Not connected".to_string()))
    }
}

//! NetBIOS over TCP (NBT) session framing
//!
//! SMB2 over port 445 still prefixes every message with the 4-byte NetBIOS
//! Session Service header defined in RFC 1002.

use crate::error::{Error, Result};
use crate::protocol::NetBiosMessageType;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::convert::TryFrom;

/// NetBIOS Session Service header (4 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetBiosHeader {
    /// Message type
    pub message_type: NetBiosMessageType,
    /// Length of the message payload (17 bits max)
    pub length: u32,
}

impl NetBiosHeader {
    /// Maximum payload length (17 bits)
    pub const MAX_LENGTH: u32 = 0x1FFFF;

    /// Header size in bytes
    pub const SIZE: usize = 4;

    pub fn new(message_type: NetBiosMessageType, length: u32) -> Result<Self> {
        if length > Self::MAX_LENGTH {
            return Err(Error::InvalidParameter(format!(
                "NetBIOS length {} exceeds maximum {}",
                length,
                Self::MAX_LENGTH
            )));
        }
        Ok(Self {
            message_type,
            length,
        })
    }

    pub fn session_message(length: u32) -> Result<Self> {
        Self::new(NetBiosMessageType::SessionMessage, length)
    }

    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(Error::BufferTooSmall {
                need: Self::SIZE,
                have: buf.len(),
            });
        }

        let message_type = NetBiosMessageType::try_from(buf[0])?;

        // Length is in the lower 17 bits of bytes 1-3
        let length = ((buf[1] as u32) << 16) | ((buf[2] as u32) << 8) | (buf[3] as u32);

        Ok(Self {
            message_type,
            length: length & Self::MAX_LENGTH,
        })
    }

    pub fn to_bytes(&self) -> [u8; 4] {
        [
            self.message_type as u8,
            ((self.length >> 16) & 0x01) as u8,
            ((self.length >> 8) & 0xFF) as u8,
            (self.length & 0xFF) as u8,
        ]
    }
}

/// Wrap an SMB message in a NetBIOS session message.
pub fn encode_session_message(payload: &[u8]) -> Result<Bytes> {
    let length = u32::try_from(payload.len()).map_err(|_| {
        Error::InvalidParameter(format!("Message of {} bytes is too large", payload.len()))
    })?;
    let header = NetBiosHeader::session_message(length)?;

    let mut buf = BytesMut::with_capacity(NetBiosHeader::SIZE + payload.len());
    buf.put_slice(&header.to_bytes());
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Take one complete frame off the front of `buf`.
///
/// Returns `Ok(None)` while the buffer holds only part of a frame; the
/// partial data is left in place.
pub fn decode_frame(buf: &mut BytesMut) -> Result<Option<(NetBiosMessageType, Bytes)>> {
    if buf.len() < NetBiosHeader::SIZE {
        return Ok(None);
    }

    let header = NetBiosHeader::parse(buf)?;
    let total = NetBiosHeader::SIZE + header.length as usize;
    if buf.len() < total {
        return Ok(None);
    }

    buf.advance(NetBiosHeader::SIZE);
    let payload = buf.split_to(header.length as usize).freeze();
    Ok(Some((header.message_type, payload)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_netbios_header_parse() {
        let bytes = [0x00, 0x00, 0x12, 0x34];
        let header = NetBiosHeader::parse(&bytes).unwrap();
        assert_eq!(header.message_type, NetBiosMessageType::SessionMessage);
        assert_eq!(header.length, 0x1234);
    }

    #[test]
    fn test_netbios_header_max_length() {
        let header = NetBiosHeader::session_message(0x1FFFF).unwrap();
        assert_eq!(header.to_bytes(), [0x00, 0x01, 0xFF, 0xFF]);
        assert!(NetBiosHeader::session_message(0x20000).is_err());
    }

    #[test]
    fn test_encode_session_message() {
        let framed = encode_session_message(&[1, 2, 3]).unwrap();
        assert_eq!(&framed[..], &[0x00, 0x00, 0x00, 0x03, 1, 2, 3]);
    }

    #[test]
    fn test_decode_partial_then_complete() {
        let mut buf = BytesMut::from(&[0x00, 0x00, 0x00, 0x03, 0xAA][..]);
        assert!(decode_frame(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 5);

        buf.put_slice(&[0xBB, 0xCC, 0x85, 0x00]);
        let (kind, payload) = decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(kind, NetBiosMessageType::SessionMessage);
        assert_eq!(&payload[..], &[0xAA, 0xBB, 0xCC]);

        // the trailing keepalive is still incomplete
        assert!(decode_frame(&mut buf).unwrap().is_none());
        buf.put_slice(&[0x00, 0x00]);
        let (kind, payload) = decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(kind, NetBiosMessageType::Keepalive);
        assert!(payload.is_empty());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_invalid_type() {
        let mut buf = BytesMut::from(&[0x42, 0x00, 0x00, 0x00][..]);
        assert!(decode_frame(&mut buf).is_err());
    }
}

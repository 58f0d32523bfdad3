//! SMB2 Session Setup messages

use super::common::SmbMessage;
use crate::error::{Error, Result};
use crate::protocol::smb2_constants::{
    protocol_offsets, structure_size, SecurityMode, SessionSetupFlags, Smb2Capabilities,
    SMB2_HEADER_SIZE,
};
use bitflags::bitflags;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Write};

/// SMB2 SessionSetup Request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2SessionSetupRequest {
    pub structure_size: u16,
    pub flags: SessionSetupFlags,
    pub security_mode: SecurityMode,
    pub capabilities: Smb2Capabilities,
    pub channel: u32,
    pub security_buffer_offset: u16,
    pub security_buffer_length: u16,
    pub previous_session_id: u64,
    pub security_blob: Vec<u8>,
}

impl Smb2SessionSetupRequest {
    pub fn new() -> Self {
        Self {
            structure_size: structure_size::SESSION_SETUP_REQUEST,
            flags: SessionSetupFlags::empty(),
            security_mode: SecurityMode::SIGNING_ENABLED,
            capabilities: Smb2Capabilities::DFS,
            channel: 0,
            security_buffer_offset: 0,
            security_buffer_length: 0,
            previous_session_id: 0,
            security_blob: Vec::new(),
        }
    }

    pub fn with_security_blob(mut self, blob: Vec<u8>) -> Self {
        self.security_buffer_length = blob.len() as u16;
        self.security_blob = blob;
        self
    }

    pub fn with_security_mode(mut self, security_mode: SecurityMode) -> Self {
        self.security_mode = security_mode;
        self
    }

    pub fn with_capabilities(mut self, capabilities: Smb2Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_previous_session_id(mut self, previous_session_id: u64) -> Self {
        self.previous_session_id = previous_session_id;
        self
    }
}

impl Default for Smb2SessionSetupRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract a security buffer addressed relative to the start of the SMB2 header
/// from a message body that starts right after the header.
fn security_buffer(body: &[u8], offset: u16, length: u16) -> Result<Vec<u8>> {
    if length == 0 || offset == 0 {
        return Ok(Vec::new());
    }

    let offset_in_body = (offset as usize)
        .checked_sub(SMB2_HEADER_SIZE)
        .ok_or_else(|| Error::ParseError("Security buffer offset inside header".into()))?;

    if offset_in_body >= body.len() {
        return Err(Error::ParseError("Invalid security buffer offset".into()));
    }
    if offset_in_body + length as usize > body.len() {
        return Err(Error::ParseError(
            "Security buffer extends beyond message".into(),
        ));
    }
    Ok(body[offset_in_body..offset_in_body + length as usize].to_vec())
}

impl SmbMessage for Smb2SessionSetupRequest {
    fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < 24 {
            return Err(Error::ParseError("SessionSetup request too short".into()));
        }

        let mut cursor = io::Cursor::new(buf);
        let structure_size = cursor.read_u16::<LittleEndian>()?;

        if structure_size != structure_size::SESSION_SETUP_REQUEST {
            return Err(Error::ParseError(format!(
                "Invalid SessionSetup request structure size: {}",
                structure_size
            )));
        }

        let flags = SessionSetupFlags::from_bits_truncate(cursor.read_u8()?);
        let security_mode = SecurityMode::from_bits_truncate(cursor.read_u8()? as u16);
        let capabilities = Smb2Capabilities::from_bits_truncate(cursor.read_u32::<LittleEndian>()?);
        let channel = cursor.read_u32::<LittleEndian>()?;
        let security_buffer_offset = cursor.read_u16::<LittleEndian>()?;
        let security_buffer_length = cursor.read_u16::<LittleEndian>()?;
        let previous_session_id = cursor.read_u64::<LittleEndian>()?;

        let security_blob = security_buffer(buf, security_buffer_offset, security_buffer_length)?;

        Ok(Self {
            structure_size,
            flags,
            security_mode,
            capabilities,
            channel,
            security_buffer_offset,
            security_buffer_length,
            previous_session_id,
            security_blob,
        })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.size());
        buf.write_u16::<LittleEndian>(self.structure_size)?;
        buf.write_u8(self.flags.bits())?;
        buf.write_u8(self.security_mode.bits() as u8)?;
        buf.write_u32::<LittleEndian>(self.capabilities.bits())?;
        buf.write_u32::<LittleEndian>(self.channel)?;

        let security_buffer_offset = if !self.security_blob.is_empty() {
            protocol_offsets::SESSION_SETUP_REQUEST_SECURITY_OFFSET
        } else {
            0
        };
        let security_buffer_length = u16::try_from(self.security_blob.len()).map_err(|_| {
            Error::InvalidParameter(format!(
                "Security blob of {} bytes does not fit a session setup request",
                self.security_blob.len()
            ))
        })?;

        buf.write_u16::<LittleEndian>(security_buffer_offset)?;
        buf.write_u16::<LittleEndian>(security_buffer_length)?;
        buf.write_u64::<LittleEndian>(self.previous_session_id)?;

        if !self.security_blob.is_empty() {
            buf.write_all(&self.security_blob)?;
        }

        Ok(buf)
    }

    fn size(&self) -> usize {
        24 + self.security_blob.len()
    }
}

/// SMB2 SessionSetup Response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2SessionSetupResponse {
    pub structure_size: u16,
    pub session_flags: SessionFlags,
    pub security_buffer_offset: u16,
    pub security_buffer_length: u16,
    pub security_blob: Vec<u8>,
}

impl Smb2SessionSetupResponse {
    pub fn new() -> Self {
        Self {
            structure_size: structure_size::SESSION_SETUP_RESPONSE,
            session_flags: SessionFlags::empty(),
            security_buffer_offset: 0,
            security_buffer_length: 0,
            security_blob: Vec::new(),
        }
    }

    pub fn with_security_blob(mut self, blob: Vec<u8>) -> Self {
        self.security_buffer_length = blob.len() as u16;
        self.security_blob = blob;
        self
    }

    pub fn with_session_flags(mut self, session_flags: SessionFlags) -> Self {
        self.session_flags = session_flags;
        self
    }
}

impl Default for Smb2SessionSetupResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl SmbMessage for Smb2SessionSetupResponse {
    fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < 8 {
            return Err(Error::ParseError("SessionSetup response too short".into()));
        }

        let mut cursor = io::Cursor::new(buf);
        let structure_size = cursor.read_u16::<LittleEndian>()?;

        if structure_size != structure_size::SESSION_SETUP_RESPONSE {
            return Err(Error::ParseError(format!(
                "Invalid SessionSetup response structure size: {}",
                structure_size
            )));
        }

        let session_flags = SessionFlags::from_bits_truncate(cursor.read_u16::<LittleEndian>()?);
        let security_buffer_offset = cursor.read_u16::<LittleEndian>()?;
        let security_buffer_length = cursor.read_u16::<LittleEndian>()?;

        let security_blob = security_buffer(buf, security_buffer_offset, security_buffer_length)?;

        Ok(Self {
            structure_size,
            session_flags,
            security_buffer_offset,
            security_buffer_length,
            security_blob,
        })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.size());
        buf.write_u16::<LittleEndian>(self.structure_size)?;
        buf.write_u16::<LittleEndian>(self.session_flags.bits())?;

        let security_buffer_offset = if !self.security_blob.is_empty() {
            protocol_offsets::SESSION_SETUP_SECURITY_OFFSET
        } else {
            0
        };

        let security_buffer_length = u16::try_from(self.security_blob.len()).map_err(|_| {
            Error::InvalidParameter(format!(
                "Security blob of {} bytes does not fit a session setup response",
                self.security_blob.len()
            ))
        })?;

        buf.write_u16::<LittleEndian>(security_buffer_offset)?;
        buf.write_u16::<LittleEndian>(security_buffer_length)?;

        if !self.security_blob.is_empty() {
            buf.write_all(&self.security_blob)?;
        }

        Ok(buf)
    }

    fn size(&self) -> usize {
        8 + self.security_blob.len()
    }
}

bitflags! {
    /// SMB2 session flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SessionFlags: u16 {
        const IS_GUEST = 0x0001;
        const IS_NULL = 0x0002;
        const ENCRYPT_DATA = 0x0004;
    }
}

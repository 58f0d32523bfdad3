//! SMB2/3 protocol constants used by session setup

use bitflags::bitflags;
use std::convert::TryFrom;

/// SMB2 magic as bytes
pub const SMB2_MAGIC: [u8; 4] = [0xFE, b'S', b'M', b'B'];

/// SMB2 magic as u32
pub const SMB2_MAGIC_U32: u32 = 0x424D53FE;

/// SMB2 header size
pub const SMB2_HEADER_SIZE: usize = 64;

/// Size of the signature field in the SMB2 header
pub const SMB2_SIGNATURE_SIZE: usize = 16;

/// Offset of the signature field inside the SMB2 header
pub const SMB2_SIGNATURE_OFFSET: usize = 48;

/// SMB2 protocol layout constants
pub mod protocol_offsets {
    /// Security buffer offset in SessionSetup request (header + fixed request part)
    pub const SESSION_SETUP_REQUEST_SECURITY_OFFSET: u16 = 88;
    /// Security buffer offset in SessionSetup response (header + fixed response part)
    pub const SESSION_SETUP_SECURITY_OFFSET: u16 = 72;
}

/// Structure sizes for SMB2 messages
pub mod structure_size {
    pub const HEADER: u16 = 64;
    pub const SESSION_SETUP_REQUEST: u16 = 25;
    pub const SESSION_SETUP_RESPONSE: u16 = 9;
}

/// SMB2 commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Smb2Command {
    Negotiate = 0x00,
    SessionSetup = 0x01,
    Logoff = 0x02,
    TreeConnect = 0x03,
    TreeDisconnect = 0x04,
    Create = 0x05,
    Close = 0x06,
    Flush = 0x07,
    Read = 0x08,
    Write = 0x09,
    Lock = 0x0A,
    Ioctl = 0x0B,
    Cancel = 0x0C,
    KeepAlive = 0x0D,
    QueryDirectory = 0x0E,
    Notify = 0x0F,
    GetInfo = 0x10,
    SetInfo = 0x11,
    Break = 0x12,
}

impl TryFrom<u16> for Smb2Command {
    type Error = crate::Error;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::Negotiate),
            0x01 => Ok(Self::SessionSetup),
            0x02 => Ok(Self::Logoff),
            0x03 => Ok(Self::TreeConnect),
            0x04 => Ok(Self::TreeDisconnect),
            0x05 => Ok(Self::Create),
            0x06 => Ok(Self::Close),
            0x07 => Ok(Self::Flush),
            0x08 => Ok(Self::Read),
            0x09 => Ok(Self::Write),
            0x0A => Ok(Self::Lock),
            0x0B => Ok(Self::Ioctl),
            0x0C => Ok(Self::Cancel),
            0x0D => Ok(Self::KeepAlive),
            0x0E => Ok(Self::QueryDirectory),
            0x0F => Ok(Self::Notify),
            0x10 => Ok(Self::GetInfo),
            0x11 => Ok(Self::SetInfo),
            0x12 => Ok(Self::Break),
            _ => Err(crate::Error::ParseError(format!(
                "Invalid SMB2 command: 0x{:04x}",
                value
            ))),
        }
    }
}

impl Smb2Command {
    pub fn name(self) -> &'static str {
        match self {
            Self::Negotiate => "NEGOTIATE",
            Self::SessionSetup => "SESSION_SETUP",
            Self::Logoff => "LOGOFF",
            Self::TreeConnect => "TREE_CONNECT",
            Self::TreeDisconnect => "TREE_DISCONNECT",
            Self::Create => "CREATE",
            Self::Close => "CLOSE",
            Self::Flush => "FLUSH",
            Self::Read => "READ",
            Self::Write => "WRITE",
            Self::Lock => "LOCK",
            Self::Ioctl => "IOCTL",
            Self::Cancel => "CANCEL",
            Self::KeepAlive => "ECHO",
            Self::QueryDirectory => "QUERY_DIRECTORY",
            Self::Notify => "CHANGE_NOTIFY",
            Self::GetInfo => "QUERY_INFO",
            Self::SetInfo => "SET_INFO",
            Self::Break => "OPLOCK_BREAK",
        }
    }
}

bitflags! {
    /// SMB2 header flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Smb2HeaderFlags: u32 {
        const SERVER_TO_REDIR = 0x00000001;
        const ASYNC_COMMAND = 0x00000002;
        const RELATED_OPERATIONS = 0x00000004;
        const SIGNED = 0x00000008;
        const DFS_OPERATIONS = 0x10000000;
        const REPLAY_OPERATION = 0x20000000;
    }
}

bitflags! {
    /// SMB2 security mode
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SecurityMode: u16 {
        const SIGNING_ENABLED = 0x0001;
        const SIGNING_REQUIRED = 0x0002;
    }
}

bitflags! {
    /// SMB2 capabilities
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Smb2Capabilities: u32 {
        const DFS = 0x00000001;
        const LEASING = 0x00000002;
        const LARGE_MTU = 0x00000004;
        const MULTI_CHANNEL = 0x00000008;
        const PERSISTENT_HANDLES = 0x00000010;
        const DIRECTORY_LEASING = 0x00000020;
        const ENCRYPTION = 0x00000040;
    }
}

bitflags! {
    /// SMB2 SessionSetup request flags (SMB 3.x)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SessionSetupFlags: u8 {
        const BINDING = 0x01;
    }
}

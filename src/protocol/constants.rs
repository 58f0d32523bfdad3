//! Protocol constants for NetBIOS and general SMB

use std::convert::TryFrom;

/// NetBIOS header size
pub const NBT_HDR_SIZE: usize = 4;

/// NetBIOS message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NetBiosMessageType {
    SessionMessage = 0x00,
    SessionRequest = 0x81,
    PositiveResponse = 0x82,
    NegativeResponse = 0x83,
    RetargetResponse = 0x84,
    Keepalive = 0x85,
}

impl TryFrom<u8> for NetBiosMessageType {
    type Error = crate::error::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(NetBiosMessageType::SessionMessage),
            0x81 => Ok(NetBiosMessageType::SessionRequest),
            0x82 => Ok(NetBiosMessageType::PositiveResponse),
            0x83 => Ok(NetBiosMessageType::NegativeResponse),
            0x84 => Ok(NetBiosMessageType::RetargetResponse),
            0x85 => Ok(NetBiosMessageType::Keepalive),
            _ => Err(crate::error::Error::Protocol(format!(
                "Invalid NetBIOS message type: 0x{:02x}",
                value
            ))),
        }
    }
}

/// SMB1 header and negotiation values needed for Kerberos session setup.
///
/// An SMB1 client must advertise extended security in both the FLAGS2
/// header field and the CAPABILITIES field of its negotiate and session
/// setup requests before a SPNEGO blob is accepted. These values are set by
/// the embedding application's message layer.
pub mod smb1 {
    use bitflags::bitflags;

    bitflags! {
        /// SMB1 header FLAGS2 field
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct Flags2: u16 {
            const LONG_NAMES = 0x0001;
            const EAS = 0x0002;
            const SECURITY_SIGNATURE = 0x0004;
            const IS_LONG_NAME = 0x0040;
            const EXTENDED_SECURITY = 0x0800;
            const DFS = 0x1000;
            const PAGING_IO = 0x2000;
            const NT_STATUS = 0x4000;
            const UNICODE = 0x8000;
        }
    }

    bitflags! {
        /// SMB1 CAPABILITIES field
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct Capabilities: u32 {
            const RAW_MODE = 0x00000001;
            const MPX_MODE = 0x00000002;
            const UNICODE = 0x00000004;
            const LARGE_FILES = 0x00000008;
            const NT_SMBS = 0x00000010;
            const RPC_REMOTE_APIS = 0x00000020;
            const STATUS32 = 0x00000040;
            const LEVEL_II_OPLOCKS = 0x00000080;
            const LOCK_AND_READ = 0x00000100;
            const NT_FIND = 0x00000200;
            const DFS = 0x00001000;
            const LARGE_READX = 0x00004000;
            const LARGE_WRITEX = 0x00008000;
            const EXTENDED_SECURITY = 0x80000000;
        }
    }

    /// FLAGS2 value enabling Kerberos (extended security) session setup
    pub const KERBEROS_FLAGS2: u16 = 0xD805;

    /// CAPABILITIES value enabling Kerberos (extended security) session setup
    pub const KERBEROS_CAPABILITIES: u32 = 0x800000D4;

    /// Decomposed form of [`KERBEROS_FLAGS2`]
    pub fn kerberos_flags2() -> Flags2 {
        Flags2::UNICODE
            | Flags2::NT_STATUS
            | Flags2::DFS
            | Flags2::EXTENDED_SECURITY
            | Flags2::SECURITY_SIGNATURE
            | Flags2::LONG_NAMES
    }

    /// Decomposed form of [`KERBEROS_CAPABILITIES`]
    pub fn kerberos_capabilities() -> Capabilities {
        Capabilities::EXTENDED_SECURITY
            | Capabilities::LEVEL_II_OPLOCKS
            | Capabilities::STATUS32
            | Capabilities::NT_SMBS
            | Capabilities::UNICODE
    }
}

//! SMB2 protocol messages

pub mod common;
pub mod session;

pub use common::{Smb2Header, SmbMessage};
pub use session::{SessionFlags, Smb2SessionSetupRequest, Smb2SessionSetupResponse};

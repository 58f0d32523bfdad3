//! SMB protocol definitions needed for session setup

pub mod constants;
pub mod messages;
pub mod signing;
pub mod smb2_constants;
pub mod state;

pub use constants::NetBiosMessageType;
pub use state::SessionState;

//! End-to-end tests over a real loopback TCP connection

pub mod loopback;
pub mod session_setup;

pub use loopback::{LoopbackTransport, ScriptedServer, ServerReply};

//! Bootloader protocol implementation.

pub mod status;
pub mod transfer;

// Re-export common types
pub use status::{ProtocolState, StatusCheck, StatusMonitor};
pub use transfer::{FrameSender, UNLOCK_COMMAND};

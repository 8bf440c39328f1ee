//! Firmware image decoding.

pub mod hex;

// Re-export common types
pub use hex::{FIRMWARE_BUFFER_SIZE, FirmwareFrame, FrameReader};

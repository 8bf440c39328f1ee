//! Error types for mxtflash.

use std::io;
use thiserror::Error;

/// Result type for mxtflash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for mxtflash operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (firmware file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Byte-level transport failure. Never retried by the protocol layers.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The bootloader reported a status that does not match the protocol
    /// step in progress.
    #[error("Invalid bootloader mode state {status:#04x}")]
    UnexpectedState {
        /// Raw status byte as read from the device.
        status: u8,
    },

    /// The bootloader rejected a frame's CRC.
    #[error("Bootloader reports frame CRC failure")]
    FrameCrcFailed,

    /// A frame could not be delivered after the retry allowance.
    #[error("Failure sending frame {frame}")]
    FrameTransferFailed {
        /// 1-based index of the failed frame.
        frame: usize,
        /// The verify failure that exhausted the retry.
        #[source]
        source: Box<Error>,
    },

    /// A frame's declared length exceeds the firmware buffer.
    #[error("Frame too big: {size} bytes")]
    FrameTooLarge {
        /// Total frame size including header and CRC bytes.
        size: usize,
    },

    /// The firmware image ended mid-frame or contained a malformed hex pair.
    #[error("Unexpected end of firmware file")]
    TruncatedImage,

    /// The unlock handshake found no bootloader at the active address.
    #[error("Bootloader not found")]
    BootloaderNotFound,

    /// An application-mode address with no known bootloader mapping.
    #[error("No bootloader address for application address {address:#04x}")]
    UnsupportedAddress {
        /// The unmapped application-mode address.
        address: u8,
    },

    /// The chip did not come back in application mode after flashing.
    #[error("Chip did not reset")]
    ChipDidNotReset,

    /// Post-flash firmware version differs from the requested one.
    #[error("Version mismatch: expected {expected}, detected {actual}")]
    VersionMismatch {
        /// Version string the flash was meant to produce.
        expected: String,
        /// Version string the chip reports.
        actual: String,
    },

    /// Device collaborator failure (discovery, info block retrieval).
    #[error("Device error: {0}")]
    Device(String),
}

impl Error {
    /// Exit status for the failure category (always negative).
    ///
    /// The flashing entry point reports 0 on success; these codes cover
    /// every failure path so callers can exit without inspecting the error.
    pub fn exit_status(&self) -> i32 {
        match self {
            Self::Io(_) | Self::Transport(_) => -1,
            Self::UnexpectedState { .. } => -2,
            Self::BootloaderNotFound | Self::UnsupportedAddress { .. } => -3,
            Self::FrameCrcFailed | Self::FrameTransferFailed { .. } => -4,
            Self::FrameTooLarge { .. } | Self::TruncatedImage => -5,
            Self::ChipDidNotReset | Self::VersionMismatch { .. } => -6,
            Self::Device(_) => -7,
        }
    }
}

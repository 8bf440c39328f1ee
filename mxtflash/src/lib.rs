//! # mxtflash
//!
//! A library for reflashing maXTouch touch-controller firmware.
//!
//! The crate implements the vendor bootloader protocol that these chips
//! expose over I2C or USB:
//!
//! - Hex firmware image decoding into length-prefixed frames
//! - Bootloader status polling and unlock handshake
//! - Frame-by-frame transfer with CRC verification and bounded retry
//! - Application/bootloader address-mode transitions with post-flash
//!   version verification
//!
//! Byte-level transports and device discovery are supplied by the caller
//! through the [`Transport`] and [`DeviceControl`] traits; the protocol
//! engine itself is platform-neutral.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mxtflash::{DeviceControl, FlashOutcome, Transport, flash_firmware};
//!
//! fn reflash<T, D>(transport: &mut T, device: &mut D) -> mxtflash::Result<()>
//! where
//!     T: Transport,
//!     D: DeviceControl,
//! {
//!     match flash_firmware(transport, device, "firmware.enc", Some("2.0.AB"), None)? {
//!         FlashOutcome::AlreadyUpToDate { version } => {
//!             println!("already running {version}");
//!         }
//!         FlashOutcome::Flashed { version } => {
//!             println!("flashed, chip reports {version:?}");
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! A flash in progress cannot be cancelled: the session runs to
//! completion or fatal failure. Interrupting it leaves the chip in an
//! undefined bootloader state.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chip;
pub mod device;
pub mod error;
pub mod image;
pub mod protocol;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use {
    chip::bootloader_address,
    device::{DeviceControl, DeviceHandle},
    error::{Error, Result},
    image::{FIRMWARE_BUFFER_SIZE, FirmwareFrame, FrameReader},
    protocol::{
        ProtocolState, StatusCheck, StatusMonitor,
        transfer::{FrameSender, RESET_SETTLE, UNLOCK_COMMAND},
    },
    session::{BusLocation, FlashOutcome, FlashSession, flash_firmware},
    transport::{READY_SETTLE, Transport},
};

//! Device discovery and information collaborators.
//!
//! Scanning the system for a touch controller, reading its info block,
//! and commanding an application-mode reset all live outside the flashing
//! engine. The [`DeviceControl`] trait is the seam those collaborators
//! plug in through; the session orchestrator drives it around the raw
//! frame transfer.

use crate::error::Result;

/// Result of scanning for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceHandle {
    /// Device found running its application firmware.
    AppMode {
        /// Bus adapter the device sits on.
        adapter: u32,
        /// Application-mode bus address.
        address: u8,
    },
    /// Device found already sitting in bootloader mode.
    ///
    /// No application address exists in this case, so post-flash
    /// verification is impossible.
    Bootloader,
}

/// Device-level operations consumed by the session orchestrator.
///
/// Implementations wrap whatever discovery and info-block machinery the
/// platform provides (sysfs attributes, i2c-dev probing, USB descriptors).
pub trait DeviceControl {
    /// Locate a touch controller on the system.
    fn scan(&mut self) -> Result<DeviceHandle>;

    /// Read and cache the chip's info block.
    ///
    /// Must succeed before [`family_id`](Self::family_id) or
    /// [`firmware_version`](Self::firmware_version) return anything
    /// meaningful.
    fn read_info_block(&mut self) -> Result<()>;

    /// Firmware version string, e.g. `"1.1.AB"`.
    fn firmware_version(&mut self) -> Result<String>;

    /// Chip family id from the info block, `None` until one has been read.
    fn family_id(&self) -> Option<u8>;

    /// Command the chip to reset into bootloader mode.
    fn reset_to_bootloader(&mut self) -> Result<()>;
}

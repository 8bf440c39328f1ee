//! End-to-end flash session orchestration.
//!
//! A session owns one complete flash operation: find the chip, decide how
//! it is addressed, move it into bootloader mode, push the image through
//! the frame transfer engine, and bring it back up in application mode
//! for verification. The transport's active address belongs to the
//! session for its whole duration; nothing else may switch it.
//!
//! There is no cancellation and no partial-flash resume. Interrupting a
//! session mid-transfer leaves the chip in an undefined bootloader state.

use std::path::Path;
use std::thread;
use std::time::Duration;

use log::{debug, error, info};

use crate::chip::bootloader_address;
use crate::device::{DeviceControl, DeviceHandle};
use crate::error::{Error, Result};
use crate::image::{FirmwareFrame, FrameReader};
use crate::protocol::transfer::{FrameSender, RESET_SETTLE};
use crate::transport::Transport;

/// An explicit bus adapter/address pair, bypassing discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusLocation {
    /// Bus adapter number.
    pub adapter: u32,
    /// Bus address; either mode, resolved against the address table.
    pub address: u8,
}

/// Successful result of a flash session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlashOutcome {
    /// The image was transferred.
    ///
    /// `version` is the firmware version read back afterwards, or `None`
    /// for a pure bootloader-mode flash where no application address
    /// exists to verify against.
    Flashed {
        /// Post-flash firmware version, when obtainable.
        version: Option<String>,
    },
    /// The chip already runs the requested version; nothing was sent.
    AlreadyUpToDate {
        /// The version the chip reported.
        version: String,
    },
}

/// How the target chip is reachable, resolved during the locate step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    /// Discovery found the device already in bootloader mode.
    DiscoveredBootloader,
    /// An explicit address with no application-mode mapping; assumed to
    /// be a bootloader address.
    ExplicitBootloader { adapter: u32, address: u8 },
    /// Application firmware answering at this address.
    Application { adapter: u32, address: u8 },
}

/// One firmware flash operation against one device.
pub struct FlashSession<'a, T: Transport, D: DeviceControl> {
    transport: &'a mut T,
    device: &'a mut D,
    reset_settle: Duration,
}

impl<'a, T: Transport, D: DeviceControl> FlashSession<'a, T, D> {
    /// Create a session over the given collaborators.
    pub fn new(transport: &'a mut T, device: &'a mut D) -> Self {
        Self {
            transport,
            device,
            reset_settle: RESET_SETTLE,
        }
    }

    /// Override the reset settle time used around mode transitions.
    #[must_use]
    pub fn with_reset_settle(mut self, settle: Duration) -> Self {
        self.reset_settle = settle;
        self
    }

    /// Flash `image` onto the device.
    ///
    /// With a `target_version`, the session is idempotent: a chip already
    /// reporting that version is left untouched, and after a transfer the
    /// version is read back and must match exactly. Without one, no
    /// version checking happens at either end.
    ///
    /// `location` skips discovery and uses the given adapter/address; an
    /// address outside the application-mode table is taken to be a
    /// bootloader address (the chip is assumed to already sit in
    /// bootloader mode there).
    pub fn flash<P: AsRef<Path>>(
        &mut self,
        image: P,
        target_version: Option<&str>,
        location: Option<BusLocation>,
    ) -> Result<FlashOutcome> {
        let image = image.as_ref();
        info!("Opening firmware file {}", image.display());
        let frames = FrameReader::from_file(image)?;

        match self.locate(location)? {
            Placement::DiscoveredBootloader => {
                self.transfer(frames)?;
                info!("Sent all firmware frames");
                Ok(FlashOutcome::Flashed { version: None })
            }
            Placement::ExplicitBootloader { adapter, address } => {
                debug!("bootloader_address:{address:02X}");
                self.transport.set_active_address(adapter, address)?;
                self.transfer(frames)?;
                info!("Sent all firmware frames");
                Ok(FlashOutcome::Flashed { version: None })
            }
            Placement::Application { adapter, address } => {
                self.flash_application(frames, target_version, adapter, address)
            }
        }
    }

    /// Resolve where the chip is and which mode it is addressed in.
    fn locate(&mut self, location: Option<BusLocation>) -> Result<Placement> {
        if let Some(BusLocation { adapter, address }) = location {
            // Before the info block is read the family is unknown and the
            // classic offsets apply.
            if bootloader_address(address, self.device.family_id()).is_none() {
                info!("Trying bootloader at {address:#04x}");
                return Ok(Placement::ExplicitBootloader { adapter, address });
            }

            self.transport.set_active_address(adapter, address)?;
            return Ok(Placement::Application { adapter, address });
        }

        match self.device.scan()? {
            DeviceHandle::AppMode { adapter, address } => {
                info!("Chip detected");
                self.transport.set_active_address(adapter, address)?;
                Ok(Placement::Application { adapter, address })
            }
            DeviceHandle::Bootloader => {
                info!("Device already in bootloader mode");
                Ok(Placement::DiscoveredBootloader)
            }
        }
    }

    /// The application-mode path: preflight, reset into the bootloader,
    /// transfer, reset back, verify.
    fn flash_application<I>(
        &mut self,
        frames: I,
        target_version: Option<&str>,
        adapter: u32,
        app_address: u8,
    ) -> Result<FlashOutcome>
    where
        I: IntoIterator<Item = Result<FirmwareFrame>>,
    {
        self.device.read_info_block()?;
        let current = self.device.firmware_version()?;
        info!("Current firmware version: {current}");

        if let Some(target) = target_version {
            if current == target {
                info!("Version already {current}, nothing to do");
                return Ok(FlashOutcome::AlreadyUpToDate { version: current });
            }
        }

        self.device.reset_to_bootloader()?;
        thread::sleep(self.reset_settle);

        // The info block is known by now, so the family-specific offset
        // applies.
        let bootloader = bootloader_address(app_address, self.device.family_id())
            .ok_or(Error::UnsupportedAddress {
                address: app_address,
            })?;

        debug!("appmode_address:{app_address:02X}");
        debug!("bootloader_address:{bootloader:02X}");

        self.transport.set_active_address(adapter, bootloader)?;
        self.transfer(frames)?;

        // The chip should have rebooted into application mode.
        self.transport.set_active_address(adapter, app_address)?;
        if self.device.read_info_block().is_err() {
            error!("FAILURE - chip did not reset");
            return Err(Error::ChipDidNotReset);
        }

        let version = self.device.firmware_version()?;
        match target_version {
            None => {
                info!("SUCCESS - version is {version}");
                Ok(FlashOutcome::Flashed {
                    version: Some(version),
                })
            }
            Some(target) if version == target => {
                info!("SUCCESS - version {version} verified");
                Ok(FlashOutcome::Flashed {
                    version: Some(version),
                })
            }
            Some(target) => {
                error!("FAILURE - detected version is {version}");
                Err(Error::VersionMismatch {
                    expected: target.to_string(),
                    actual: version,
                })
            }
        }
    }

    fn transfer<I>(&mut self, frames: I) -> Result<()>
    where
        I: IntoIterator<Item = Result<FirmwareFrame>>,
    {
        FrameSender::new(&mut *self.transport)
            .with_reset_settle(self.reset_settle)
            .send_firmware(frames)
    }
}

/// Flash `image` onto a device, the whole operation in one call.
///
/// This is the operation entry point: callers hand in their transport and
/// device collaborators and get back the [`FlashOutcome`], or an
/// [`Error`] whose [`exit_status`](Error::exit_status) gives the negative
/// failure-category code.
pub fn flash_firmware<T, D, P>(
    transport: &mut T,
    device: &mut D,
    image: P,
    target_version: Option<&str>,
    location: Option<BusLocation>,
) -> Result<FlashOutcome>
where
    T: Transport,
    D: DeviceControl,
    P: AsRef<Path>,
{
    FlashSession::new(transport, device).flash(image, target_version, location)
}

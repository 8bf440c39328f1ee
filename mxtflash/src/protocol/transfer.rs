//! Frame-by-frame firmware transfer.
//!
//! Once the chip sits at its bootloader address the transfer is a strict
//! lockstep dialogue: unlock, then for every frame wait for the chip to
//! ask for data, write the frame, and wait for its CRC verdict:
//!
//! ```text
//!   host                         chip
//!    |  <------- 0xC0 -------     |   waiting for unlock
//!    |  ---- 0xDC 0xAA ------>    |   unlock command
//!    |  <------- 0x80 -------     |   waiting for frame data
//!    |  ------- frame ------->    |
//!    |  <------- 0x02 -------     |   CRC check in progress
//!    |  <------- 0x04 -------     |   CRC pass, next frame
//!    |          ...               |
//! ```
//!
//! A frame whose CRC fails is resent once from the cached bytes; a second
//! failure aborts the whole transfer. There is no resume: a failed flash
//! starts over from frame one.

use std::thread;
use std::time::Duration;

use log::{debug, error, info, trace};

use crate::error::{Error, Result};
use crate::image::FirmwareFrame;
use crate::protocol::status::{ProtocolState, StatusCheck, StatusMonitor};
use crate::transport::Transport;

/// Bootloader unlock command, least-significant byte first.
pub const UNLOCK_COMMAND: [u8; 2] = [0xDC, 0xAA];

/// Settle time for the chip to reboot after the last frame.
pub const RESET_SETTLE: Duration = Duration::from_secs(2);

/// Every how many frames a progress line is logged at info level.
const FRAME_LOG_INTERVAL: usize = 20;

/// Drives the unlock handshake and the per-frame transfer loop.
pub struct FrameSender<'a, T: Transport> {
    transport: &'a mut T,
    monitor: StatusMonitor,
    reset_settle: Duration,
}

impl<'a, T: Transport> FrameSender<'a, T> {
    /// Create a sender over an already-addressed transport.
    pub fn new(transport: &'a mut T) -> Self {
        Self {
            transport,
            monitor: StatusMonitor::new(),
            reset_settle: RESET_SETTLE,
        }
    }

    /// Override the post-transfer reboot settle time.
    #[must_use]
    pub fn with_reset_settle(mut self, settle: Duration) -> Self {
        self.reset_settle = settle;
        self
    }

    /// The status monitor, with whatever bootloader identification the
    /// transfer has gathered so far.
    pub fn monitor(&self) -> &StatusMonitor {
        &self.monitor
    }

    /// Unlock the bootloader and send every frame of the image.
    ///
    /// Image decoding errors surface through the iterator and abort the
    /// transfer before the offending frame reaches the transport. After
    /// the last frame the chip is given the reset settle time to reboot
    /// into application mode.
    pub fn send_firmware<I>(&mut self, frames: I) -> Result<()>
    where
        I: IntoIterator<Item = Result<FirmwareFrame>>,
    {
        self.unlock()?;

        info!("Sending frames...");

        let mut index = 0;
        for frame in frames {
            let frame = frame?;
            index += 1;
            self.send_frame(index, &frame)?;
        }

        info!("Sent {index} frames");

        thread::sleep(self.reset_settle);
        Ok(())
    }

    /// Step 1 of the transfer: get the bootloader ready for frame data.
    fn unlock(&mut self) -> Result<()> {
        match self
            .monitor
            .check(self.transport, ProtocolState::WaitingBootloadCmd)
        {
            Ok(StatusCheck::Ready) => {
                info!("Unlocking bootloader");
                self.transport.write(&UNLOCK_COMMAND)?;
                debug!("Bootloader unlocked");
                Ok(())
            }
            Ok(StatusCheck::AlreadyUnlocked) => {
                info!("Bootloader found");
                Ok(())
            }
            Err(e) => {
                error!("Bootloader not found: {e}");
                Err(Error::BootloaderNotFound)
            }
        }
    }

    /// Deliver one frame, resending it once on a CRC failure.
    fn send_frame(&mut self, index: usize, frame: &FirmwareFrame) -> Result<()> {
        let mut retried = false;

        loop {
            if let Err(e) = self
                .monitor
                .check(self.transport, ProtocolState::WaitingFrameData)
            {
                error!("Unexpected bootloader state before frame {index}");
                return Err(e);
            }

            self.transport.write(frame.bytes())?;

            trace!("Checking CRC");
            match self
                .monitor
                .check(self.transport, ProtocolState::FrameCrcPass)
            {
                Ok(_) => {
                    debug!("CRC pass");
                    if index % FRAME_LOG_INTERVAL == 0 {
                        info!("Frame {index}: Sent {} bytes", frame.len());
                    } else {
                        trace!("Frame {index}: Sent {} bytes", frame.len());
                    }
                    return Ok(());
                }
                Err(Error::FrameCrcFailed) if !retried => {
                    retried = true;
                    error!("Frame {index}: CRC fail, retry 1");
                }
                Err(e) => {
                    error!("Failure sending frame {index} - aborting");
                    return Err(Error::FrameTransferFailed {
                        frame: index,
                        source: Box::new(e),
                    });
                }
            }
        }
    }
}

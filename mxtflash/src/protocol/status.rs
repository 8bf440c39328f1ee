//! Bootloader status polling and interpretation.
//!
//! In bootloader mode the chip answers every read with a single status
//! byte. The two high bits select the mode states; the low six bits carry
//! a bootloader-ID field that is only meaningful while the bootloader is
//! waiting for the unlock command:
//!
//! ```text
//!  7   6   5   4   3   2   1   0
//! +---+---+---+---+---+---+---+---+
//! | state |   bootloader ID field |     0xC0 waiting for unlock
//! +---+---+---+---+---+---+---+---+     0x80 waiting for frame data
//!                                       0x40 application CRC failed
//! ```
//!
//! The frame CRC outcomes (`0x02` check in progress, `0x03` fail, `0x04`
//! pass) use the whole byte instead. Newer bootloaders flag an extended-ID
//! mode in the ID field and report an extra ID + version byte pair on the
//! first status read that follows.

use log::{error, info, trace, warn};

use crate::error::{Error, Result};
use crate::transport::Transport;

/// Status high bits: bootloader waits for the unlock command.
pub const WAITING_BOOTLOAD_CMD: u8 = 0xC0;

/// Status high bits: bootloader waits for frame data.
pub const WAITING_FRAME_DATA: u8 = 0x80;

/// Status high bits: application firmware failed its CRC.
pub const APP_CRC_FAIL: u8 = 0x40;

/// Full-byte status: frame CRC check in progress.
pub const FRAME_CRC_CHECK: u8 = 0x02;

/// Full-byte status: frame CRC failed.
pub const FRAME_CRC_FAIL: u8 = 0x03;

/// Full-byte status: frame CRC passed.
pub const FRAME_CRC_PASS: u8 = 0x04;

/// Mask for the bootloader-ID field (low six bits).
pub const BOOT_STATUS_MASK: u8 = 0x3F;

/// ID-field bit flagging extended-ID mode.
pub const EXTENDED_ID_FLAG: u8 = 0x20;

/// Plain bootloader ID occupies the low five ID-field bits.
pub const BOOTLOADER_ID_MASK: u8 = 0x1F;

/// Bootloader protocol state as reported by the status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    /// Waiting for the unlock command.
    WaitingBootloadCmd,
    /// Waiting for the next firmware frame.
    WaitingFrameData,
    /// CRC check of the last frame in progress.
    FrameCrcCheck,
    /// Last frame's CRC passed.
    FrameCrcPass,
    /// Last frame's CRC failed.
    FrameCrcFail,
    /// Application firmware failed its CRC.
    AppCrcFail,
}

impl ProtocolState {
    /// Classify a raw status byte.
    ///
    /// The full-byte CRC outcomes take precedence; everything else is
    /// classified by its two high bits. Returns `None` for byte values the
    /// protocol never produces.
    pub fn from_status(status: u8) -> Option<Self> {
        match status {
            FRAME_CRC_CHECK => Some(Self::FrameCrcCheck),
            FRAME_CRC_FAIL => Some(Self::FrameCrcFail),
            FRAME_CRC_PASS => Some(Self::FrameCrcPass),
            _ => match status & !BOOT_STATUS_MASK {
                WAITING_BOOTLOAD_CMD => Some(Self::WaitingBootloadCmd),
                WAITING_FRAME_DATA => Some(Self::WaitingFrameData),
                APP_CRC_FAIL => Some(Self::AppCrcFail),
                _ => None,
            },
        }
    }
}

/// Distinguished non-error outcomes of a status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCheck {
    /// The chip reported the expected state.
    Ready,
    /// Expected `WaitingBootloadCmd` but the bootloader is already
    /// unlocked; the unlock command must be skipped.
    AlreadyUnlocked,
}

/// Polls the chip's status byte and validates it against the protocol
/// step in progress.
///
/// The monitor also tracks the bootloader identification handshake:
/// whether version info has been obtained and whether the chip uses the
/// extended-ID encoding that changes the status read size.
#[derive(Debug, Default)]
pub struct StatusMonitor {
    have_bootloader_version: bool,
    extended_id_mode: bool,
    bootloader_id: Option<u8>,
    bootloader_version: Option<u8>,
}

impl StatusMonitor {
    /// Create a monitor with no bootloader identification yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the chip reported the extended-ID flag.
    pub fn extended_id_mode(&self) -> bool {
        self.extended_id_mode
    }

    /// Bootloader ID once it has been read.
    pub fn bootloader_id(&self) -> Option<u8> {
        self.bootloader_id
    }

    /// Bootloader version byte (extended-ID chips only).
    pub fn bootloader_version(&self) -> Option<u8> {
        self.bootloader_version
    }

    /// Read the status byte until it resolves against `expected`.
    ///
    /// Benign transient states re-poll in place: an application CRC
    /// failure while waiting to unlock, a stale CRC PASS left over from
    /// the previous frame, and a CRC check still in progress. Everything
    /// else resolves to `Ready`, `AlreadyUnlocked`, or an error. Transport
    /// failures propagate immediately; retry policy lives with the caller.
    pub fn check<T: Transport>(
        &mut self,
        transport: &mut T,
        expected: ProtocolState,
    ) -> Result<StatusCheck> {
        loop {
            // The first poll of the handshake races the chip's own reset;
            // every later poll waits for the ready signal.
            if expected != ProtocolState::WaitingBootloadCmd {
                if let Err(e) = transport.wait_for_ready() {
                    warn!("Timed out awaiting ready signal: {e}");
                }
            }

            let status = self.read_status(transport, expected)?;
            trace!("Bootloader status {status:02X}");

            match expected {
                ProtocolState::WaitingBootloadCmd => {
                    let id_field = status & BOOT_STATUS_MASK;
                    match status & !BOOT_STATUS_MASK {
                        APP_CRC_FAIL => {
                            info!("Bootloader reports APP CRC failure");
                        }
                        WAITING_FRAME_DATA => {
                            info!("Bootloader already unlocked");
                            return Ok(StatusCheck::AlreadyUnlocked);
                        }
                        WAITING_BOOTLOAD_CMD => {
                            self.note_bootloader_id(id_field);
                            return Ok(StatusCheck::Ready);
                        }
                        _ => return Err(Error::UnexpectedState { status }),
                    }
                }
                ProtocolState::WaitingFrameData => {
                    if status == FRAME_CRC_PASS {
                        info!("Bootloader still giving CRC PASS");
                    } else if status & !BOOT_STATUS_MASK == WAITING_FRAME_DATA {
                        return Ok(StatusCheck::Ready);
                    } else {
                        return Err(Error::UnexpectedState { status });
                    }
                }
                ProtocolState::FrameCrcPass => match status {
                    FRAME_CRC_CHECK => {}
                    FRAME_CRC_FAIL => {
                        error!("Bootloader reports FRAME_CRC_FAIL");
                        return Err(Error::FrameCrcFailed);
                    }
                    FRAME_CRC_PASS => return Ok(StatusCheck::Ready),
                    _ => return Err(Error::UnexpectedState { status }),
                },
                // The transfer sequence only ever expects the three states
                // above; anything else cannot match.
                _ => return Err(Error::UnexpectedState { status }),
            }
        }
    }

    /// One status read: a single byte, or the 3-byte block when the
    /// extended-ID version info is still outstanding.
    fn read_status<T: Transport>(
        &mut self,
        transport: &mut T,
        expected: ProtocolState,
    ) -> Result<u8> {
        if !self.have_bootloader_version
            && self.extended_id_mode
            && expected == ProtocolState::WaitingFrameData
        {
            info!("Attempting to retrieve bootloader version");
            let mut buf = [0u8; 3];
            transport.read_exact(&mut buf)?;
            let [status, id, version] = buf;

            info!("Bootloader ID:{id} Version:{version}");
            self.bootloader_id = Some(id);
            self.bootloader_version = Some(version);
            self.have_bootloader_version = true;

            Ok(status)
        } else {
            let mut buf = [0u8; 1];
            transport.read_exact(&mut buf)?;
            Ok(buf[0])
        }
    }

    /// Decode the ID field from the first successful unlock-state read.
    fn note_bootloader_id(&mut self, id_field: u8) {
        if self.have_bootloader_version {
            return;
        }

        if id_field & EXTENDED_ID_FLAG != 0 {
            info!("Bootloader using extended ID mode");
            self.extended_id_mode = true;
        } else {
            let id = id_field & BOOTLOADER_ID_MASK;
            info!("Bootloader ID:{id}");
            self.bootloader_id = Some(id);
            self.have_bootloader_version = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::ScriptedTransport;

    #[test]
    fn test_from_status_classification() {
        assert_eq!(
            ProtocolState::from_status(0xC0),
            Some(ProtocolState::WaitingBootloadCmd)
        );
        // ID field bits do not change the state.
        assert_eq!(
            ProtocolState::from_status(0xE4),
            Some(ProtocolState::WaitingBootloadCmd)
        );
        assert_eq!(
            ProtocolState::from_status(0x80),
            Some(ProtocolState::WaitingFrameData)
        );
        assert_eq!(
            ProtocolState::from_status(0x40),
            Some(ProtocolState::AppCrcFail)
        );
        assert_eq!(
            ProtocolState::from_status(0x02),
            Some(ProtocolState::FrameCrcCheck)
        );
        assert_eq!(
            ProtocolState::from_status(0x03),
            Some(ProtocolState::FrameCrcFail)
        );
        assert_eq!(
            ProtocolState::from_status(0x04),
            Some(ProtocolState::FrameCrcPass)
        );
        assert_eq!(ProtocolState::from_status(0x1F), None);
    }

    #[test]
    fn test_unlock_state_skips_ready_wait() {
        let mut transport = ScriptedTransport::new();
        transport.queue_status(0xC4);

        let mut monitor = StatusMonitor::new();
        let outcome = monitor
            .check(&mut transport, ProtocolState::WaitingBootloadCmd)
            .unwrap();

        assert_eq!(outcome, StatusCheck::Ready);
        assert_eq!(transport.ready_waits, 0);
    }

    #[test]
    fn test_frame_states_use_ready_wait() {
        let mut transport = ScriptedTransport::new();
        transport.queue_status(0x80);

        let mut monitor = StatusMonitor::new();
        monitor
            .check(&mut transport, ProtocolState::WaitingFrameData)
            .unwrap();

        assert_eq!(transport.ready_waits, 1);
    }

    #[test]
    fn test_app_crc_fail_repolls_until_unlock_state() {
        let mut transport = ScriptedTransport::new();
        transport.queue_status(0x40);
        transport.queue_status(0x40);
        transport.queue_status(0xC1);

        let mut monitor = StatusMonitor::new();
        let outcome = monitor
            .check(&mut transport, ProtocolState::WaitingBootloadCmd)
            .unwrap();

        assert_eq!(outcome, StatusCheck::Ready);
        assert!(transport.reads.is_empty());
    }

    #[test]
    fn test_already_unlocked_is_not_an_error() {
        let mut transport = ScriptedTransport::new();
        transport.queue_status(0x80);

        let mut monitor = StatusMonitor::new();
        let outcome = monitor
            .check(&mut transport, ProtocolState::WaitingBootloadCmd)
            .unwrap();

        assert_eq!(outcome, StatusCheck::AlreadyUnlocked);
        // No successful unlock-state read happened, so no ID was decoded.
        assert_eq!(monitor.bootloader_id(), None);
    }

    #[test]
    fn test_plain_bootloader_id_recorded() {
        let mut transport = ScriptedTransport::new();
        transport.queue_status(0xC4);

        let mut monitor = StatusMonitor::new();
        monitor
            .check(&mut transport, ProtocolState::WaitingBootloadCmd)
            .unwrap();

        assert_eq!(monitor.bootloader_id(), Some(0x04));
        assert!(!monitor.extended_id_mode());

        // Version info is settled: the next frame-data check reads one byte.
        transport.queue_status(0x80);
        monitor
            .check(&mut transport, ProtocolState::WaitingFrameData)
            .unwrap();
        assert!(transport.reads.is_empty());
    }

    #[test]
    fn test_extended_id_triggers_three_byte_read() {
        let mut transport = ScriptedTransport::new();
        // ID field 0x24 has the extended-ID flag bit set.
        transport.queue_status(0xC0 | 0x24);

        let mut monitor = StatusMonitor::new();
        monitor
            .check(&mut transport, ProtocolState::WaitingBootloadCmd)
            .unwrap();
        assert!(monitor.extended_id_mode());
        assert_eq!(monitor.bootloader_version(), None);

        // Next frame-data poll fetches status + ID + version in one read.
        transport.queue_read(&[0x80, 0x24, 0x01]);
        monitor
            .check(&mut transport, ProtocolState::WaitingFrameData)
            .unwrap();

        assert_eq!(monitor.bootloader_id(), Some(0x24));
        assert_eq!(monitor.bootloader_version(), Some(0x01));

        // Version info obtained: subsequent polls are single-byte again.
        transport.queue_status(0x80);
        monitor
            .check(&mut transport, ProtocolState::WaitingFrameData)
            .unwrap();
        assert!(transport.reads.is_empty());
    }

    #[test]
    fn test_stale_crc_pass_repolls() {
        let mut transport = ScriptedTransport::new();
        transport.queue_status(0x04);
        transport.queue_status(0x80);

        let mut monitor = StatusMonitor::new();
        let outcome = monitor
            .check(&mut transport, ProtocolState::WaitingFrameData)
            .unwrap();

        assert_eq!(outcome, StatusCheck::Ready);
        assert_eq!(transport.ready_waits, 2);
    }

    #[test]
    fn test_crc_check_in_progress_repolls() {
        let mut transport = ScriptedTransport::new();
        transport.queue_status(0x02);
        transport.queue_status(0x04);

        let mut monitor = StatusMonitor::new();
        let outcome = monitor
            .check(&mut transport, ProtocolState::FrameCrcPass)
            .unwrap();

        assert_eq!(outcome, StatusCheck::Ready);
    }

    #[test]
    fn test_crc_fail_is_reported() {
        let mut transport = ScriptedTransport::new();
        transport.queue_status(0x03);

        let mut monitor = StatusMonitor::new();
        let err = monitor
            .check(&mut transport, ProtocolState::FrameCrcPass)
            .unwrap_err();

        assert!(matches!(err, Error::FrameCrcFailed));
    }

    #[test]
    fn test_mismatch_carries_observed_status() {
        let mut transport = ScriptedTransport::new();
        transport.queue_status(0xC0);

        let mut monitor = StatusMonitor::new();
        let err = monitor
            .check(&mut transport, ProtocolState::WaitingFrameData)
            .unwrap_err();

        assert!(matches!(err, Error::UnexpectedState { status: 0xC0 }));
    }

    #[test]
    fn test_transport_failure_propagates() {
        // Empty script: the read itself fails.
        let mut transport = ScriptedTransport::new();

        let mut monitor = StatusMonitor::new();
        let err = monitor
            .check(&mut transport, ProtocolState::FrameCrcPass)
            .unwrap_err();

        assert!(matches!(err, Error::Transport(_)));
    }
}

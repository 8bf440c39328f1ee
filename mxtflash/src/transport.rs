//! Transport abstraction for byte-level device access.
//!
//! The flashing engine is transport-agnostic: I2C character devices, USB
//! HID bridges, and test doubles all plug in through the [`Transport`]
//! trait. The protocol layers only ever issue blocking reads and writes
//! against whichever bus address is currently active.
//!
//! ```text
//! +--------------------+
//! |  Protocol Layer    |
//! | (status, transfer) |
//! +---------+----------+
//!           |
//!           v
//! +---------+----------+
//! |  Transport Trait   |
//! +---------+----------+
//!           |
//!           v
//! +---------+----------+
//! | i2c-dev / USB / .. |
//! +--------------------+
//! ```

use std::thread;
use std::time::Duration;

use crate::error::Result;

/// Settle time used when the transport has no hardware ready line.
pub const READY_SETTLE: Duration = Duration::from_millis(50);

/// Blocking byte-level access to the device at the active bus address.
///
/// Implementations are expected to be synchronous: every call completes or
/// fails before returning, and the flashing session is the sole user of
/// the transport for its whole duration.
pub trait Transport {
    /// Read exactly `buf.len()` bytes from the active address.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Write all of `buf` to the active address.
    fn write(&mut self, buf: &[u8]) -> Result<()>;

    /// Make `address` on `adapter` the active bus address.
    ///
    /// Subsequent reads and writes go to this address until the next
    /// switch. Switching addresses is how the session moves between
    /// application mode and bootloader mode.
    fn set_active_address(&mut self, adapter: u32, address: u8) -> Result<()>;

    /// Block until the device signals it is ready for a status read.
    ///
    /// Transports with a hardware change line (the USB backend polls CHG)
    /// override this. The default stands in with a fixed settle sleep.
    fn wait_for_ready(&mut self) -> Result<()> {
        thread::sleep(READY_SETTLE);
        Ok(())
    }
}

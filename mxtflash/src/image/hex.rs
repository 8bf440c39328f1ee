//! Hex-encoded firmware image format.
//!
//! maXTouch firmware ships as plain ASCII text, two hex digits per byte
//! with no separators. The byte stream is a back-to-back sequence of
//! frames, each carrying its own length header and trailing CRC:
//!
//! ```text
//! +----------+----------+-  ...  -+-----------+
//! |  len hi  |  len lo  | payload |  CRC (2)  |
//! +----------+----------+-  ...  -+-----------+
//! |<-- 2 bytes (BE) --->|<----- len bytes ---->|
//! ```
//!
//! The length header counts the bytes that follow it, so a whole frame is
//! `len + 2` bytes — and all of it, header included, goes out on the wire
//! verbatim. The stream has no frame count and no terminator: it simply
//! ends at a frame boundary.

use byteorder::{BigEndian, ByteOrder};
use log::trace;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use crate::error::{Error, Result};

/// Largest frame the bootloader accepts, header and CRC included.
pub const FIRMWARE_BUFFER_SIZE: usize = 1024;

/// One decoded firmware frame, ready to write to the transport.
///
/// Holds the full on-wire byte sequence: length header, payload, and CRC.
/// Frames are immutable once decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareFrame {
    data: Vec<u8>,
}

impl FirmwareFrame {
    /// The bytes to write to the device, header included.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Total frame size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the frame is empty (never true for decoded frames).
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The length value declared in the frame header.
    pub fn declared_len(&self) -> u16 {
        BigEndian::read_u16(&self.data[..2])
    }
}

/// Lazy decoder for the hex firmware stream.
///
/// Frames are produced strictly in order as they are pulled; the reader is
/// forward-only and cannot be rewound. Construct one per flash attempt.
pub struct FrameReader<R: Read> {
    reader: R,
}

impl FrameReader<BufReader<File>> {
    /// Open a firmware image file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: Read> FrameReader<R> {
    /// Wrap an already-open byte source.
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Decode one hex digit pair into a byte.
    ///
    /// `Ok(None)` means the stream ended cleanly before the pair started.
    /// A pair cut in half, or one that is not two hex digits, is a
    /// truncated image.
    fn read_hex_pair(&mut self) -> Result<Option<u8>> {
        let mut pair = [0u8; 2];
        let mut filled = 0;

        while filled < 2 {
            match self.reader.read(&mut pair[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => return Err(Error::TruncatedImage),
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(Error::Io(e)),
            }
        }

        let digits = std::str::from_utf8(&pair).map_err(|_| Error::TruncatedImage)?;
        u8::from_str_radix(digits, 16)
            .map(Some)
            .map_err(|_| Error::TruncatedImage)
    }

    /// A hex pair that must be present; EOF here is mid-frame.
    fn expect_hex_pair(&mut self) -> Result<u8> {
        self.read_hex_pair()?.ok_or(Error::TruncatedImage)
    }

    /// Decode the next frame, or `None` at a clean end of image.
    pub fn next_frame(&mut self) -> Result<Option<FirmwareFrame>> {
        let Some(len_hi) = self.read_hex_pair()? else {
            return Ok(None);
        };
        let len_lo = self.expect_hex_pair()?;

        // Header value plus the trailing CRC pair gives the wire size.
        let declared = usize::from(BigEndian::read_u16(&[len_hi, len_lo]));
        let frame_size = declared + 2;

        if frame_size > FIRMWARE_BUFFER_SIZE {
            return Err(Error::FrameTooLarge { size: frame_size });
        }

        let mut data = Vec::with_capacity(frame_size);
        data.push(len_hi);
        data.push(len_lo);
        for _ in 2..frame_size {
            data.push(self.expect_hex_pair()?);
        }

        trace!("Decoded frame: {frame_size} bytes");
        Ok(Some(FirmwareFrame { data }))
    }
}

impl<R: Read> Iterator for FrameReader<R> {
    type Item = Result<FirmwareFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame().transpose()
    }
}

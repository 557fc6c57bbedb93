//! Frame encoding and decoding for the master modem link.
//!
//! The controller reaches the mesh through a master modem on a serial link.
//! Each frame carries one addressed message:
//!
//! ```text
//! ┌──────────┬──────────────┬──────────────┬─────────────────┐
//! │  0x3c    │  size (LE)   │ address      │    message      │
//! │  1 byte  │   2 bytes    │ 8 bytes      │ size - 8 bytes  │
//! └──────────┴──────────────┴──────────────┴─────────────────┘
//! ```
//!
//! The size field covers the address plus the message.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::FrameError;
use crate::types::{ADDRESS_LEN, DeviceAddress};

/// Frame header byte.
pub const FRAME_HEADER: u8 = 0x3c;

/// Maximum frame payload size (address plus message). Mesh messages are
/// short; anything larger is a corrupt length field.
pub const MAX_FRAME_SIZE: usize = 512;

/// Minimum frame size (header + 2-byte length).
pub const MIN_FRAME_SIZE: usize = 3;

/// Encodes an addressed message into a framed wire message.
///
/// # Panics
///
/// Panics if address plus message exceed `MAX_FRAME_SIZE`.
#[must_use]
pub fn encode(address: &DeviceAddress, message: &[u8]) -> Bytes {
    let payload_len = ADDRESS_LEN + message.len();
    assert!(
        payload_len <= MAX_FRAME_SIZE,
        "payload exceeds maximum frame size"
    );

    let mut buf = BytesMut::with_capacity(MIN_FRAME_SIZE + payload_len);
    buf.put_u8(FRAME_HEADER);
    buf.put_u16_le(u16::try_from(payload_len).expect("length checked above"));
    buf.put_slice(address.as_bytes());
    buf.put_slice(message);
    buf.freeze()
}

/// An inbound frame: the sending device's address plus its message bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    /// Address of the device that sent the frame.
    pub address: DeviceAddress,
    /// Message payload, starting with the envelope byte.
    pub message: Bytes,
}

/// Frame decoder that handles partial data.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    /// Creates a new frame decoder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
        }
    }

    /// Feeds data into the decoder.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next complete frame.
    ///
    /// Returns `Ok(Some(frame))` if a complete frame was decoded,
    /// `Ok(None)` if more data is needed, or an error if the frame is
    /// invalid. After an error the offending frame is discarded and
    /// decoding can continue with the next one.
    ///
    /// # Errors
    ///
    /// Returns a `FrameError` if the claimed size exceeds the maximum or
    /// the payload is too short to hold a device address.
    pub fn decode(&mut self) -> Result<Option<InboundFrame>, FrameError> {
        if self.buffer.len() < MIN_FRAME_SIZE {
            return Ok(None);
        }

        // Read length (little-endian u16) from bytes 1-2. The header byte
        // is not validated; the modem occasionally substitutes it.
        let length = u16::from_le_bytes([self.buffer[1], self.buffer[2]]) as usize;

        if length > MAX_FRAME_SIZE {
            // Corrupt length field; drop buffered bytes to resync on the
            // next frame header.
            self.buffer.clear();
            return Err(FrameError::TooLarge {
                size: length,
                max: MAX_FRAME_SIZE,
            });
        }

        let total_frame_size = MIN_FRAME_SIZE + length;

        if self.buffer.len() < total_frame_size {
            return Ok(None);
        }

        self.buffer.advance(MIN_FRAME_SIZE);
        let mut payload = self.buffer.split_to(length).freeze();

        if payload.len() < ADDRESS_LEN {
            return Err(FrameError::MissingAddress { got: payload.len() });
        }

        let address = DeviceAddress::from_bytes(&payload.split_to(ADDRESS_LEN));
        Ok(Some(InboundFrame {
            address,
            message: payload,
        }))
    }

    /// Returns the number of bytes currently buffered.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

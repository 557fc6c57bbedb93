//! Message envelope: the type/command byte at the start of every payload.
//!
//! The first payload byte packs the message type into bits 6..7 and the
//! command opcode into bits 0..5:
//!
//! ```text
//! ┌───────────────┬──────────────────────┐
//! │  type (2 bit) │   command (6 bit)    │
//! │   bits 6..7   │      bits 0..5       │
//! └───────────────┴──────────────────────┘
//! ```

use crate::protocol::command::Command;

/// Mask for the message type bits.
pub const TYPE_MASK: u8 = 0b1100_0000;

/// Mask for the command opcode bits.
pub const COMMAND_MASK: u8 = 0b0011_1111;

/// Message types (2 bits). Value 1 is unassigned on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// A request sent to a device.
    Request = 0,
    /// A response from a device to a prior request.
    Response = 2,
    /// An unsolicited notification pushed by a device.
    Notify = 3,
}

impl MessageType {
    /// Extracts the message type from a raw envelope byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match (byte & TYPE_MASK) >> 6 {
            0 => Some(Self::Request),
            2 => Some(Self::Response),
            3 => Some(Self::Notify),
            _ => None,
        }
    }
}

/// A decoded envelope byte: message type plus command opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    /// Message type from bits 6..7.
    pub message_type: MessageType,
    /// Command opcode from bits 0..5.
    pub command: Command,
}

impl Envelope {
    /// Creates a request envelope for a command.
    #[must_use]
    pub const fn request(command: Command) -> Self {
        Self {
            message_type: MessageType::Request,
            command,
        }
    }

    /// Parses an envelope from a raw byte.
    ///
    /// Returns `None` if the type bits or the opcode are unassigned.
    #[must_use]
    pub const fn parse(byte: u8) -> Option<Self> {
        let Some(message_type) = MessageType::from_byte(byte) else {
            return None;
        };
        let Some(command) = Command::from_byte(byte & COMMAND_MASK) else {
            return None;
        };
        Some(Self {
            message_type,
            command,
        })
    }

    /// Encodes the envelope to its wire byte.
    #[must_use]
    pub const fn encode(self) -> u8 {
        ((self.message_type as u8) << 6) | (self.command as u8)
    }
}

/// The registration acknowledgment byte: `Response | AddListener`.
///
/// This is the one response code that looks the same for every device type
/// and is consumed by the connection engine instead of the device handler.
#[must_use]
pub const fn registration_ack() -> u8 {
    ((MessageType::Response as u8) << 6) | (Command::AddListener as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_bit_values() {
        assert_eq!((MessageType::Request as u8) << 6, 0x00);
        assert_eq!((MessageType::Response as u8) << 6, 0x80);
        assert_eq!((MessageType::Notify as u8) << 6, 0xC0);
    }

    #[test]
    fn test_registration_ack_byte() {
        assert_eq!(registration_ack(), 0x81);
    }

    #[test]
    fn test_request_encodes_bare_opcode() {
        assert_eq!(Envelope::request(Command::AddListener).encode(), 0x01);
        assert_eq!(Envelope::request(Command::SwitchWrite).encode(), 0x05);
    }

    #[test]
    fn test_parse_round_trip() {
        let env = Envelope::parse(0xC6).unwrap();
        assert_eq!(env.message_type, MessageType::Notify);
        assert_eq!(env.command, Command::SwitchRead);
        assert_eq!(env.encode(), 0xC6);
    }

    #[test]
    fn test_parse_rejects_unassigned() {
        // Type bits 01 are unassigned.
        assert_eq!(Envelope::parse(0x41), None);
        // Opcode 15 is unassigned.
        assert_eq!(Envelope::parse(0x8F), None);
    }

    #[test]
    fn test_command_mask_strips_type_bits() {
        assert_eq!(0xC6 & COMMAND_MASK, 0x06);
        assert_eq!(0x81 & COMMAND_MASK, 0x01);
    }
}

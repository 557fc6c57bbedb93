//! Protocol definitions for homemesh communication.
//!
//! This module contains the low-level protocol types:
//! - Frame encoding/decoding for the master modem link
//! - The message envelope (type bits + command opcode)
//! - The command opcode registry

pub mod command;
pub mod envelope;
pub mod frame;

pub use command::{Command, DumpSelector, SensorKind, WriteMode};
pub use envelope::{COMMAND_MASK, Envelope, MessageType, TYPE_MASK, registration_ack};
pub use frame::{FRAME_HEADER, FrameDecoder, InboundFrame, MAX_FRAME_SIZE, encode as encode_frame};

//! Error types for the homemesh library.

use thiserror::Error;

/// The main error type for homemesh operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Serial port error.
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame encoding/decoding error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Invalid device address.
    #[error("invalid device address: {reason}")]
    InvalidAddress { reason: String },

    /// A device with this address is already registered.
    #[error("device already registered: {address}")]
    DuplicateAddress { address: String },

    /// Transport is not connected.
    #[error("not connected")]
    NotConnected,

    /// Outbound channel to the link writer is closed.
    #[error("link channel closed")]
    ChannelClosed,
}

/// Frame-specific errors.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Frame too short to contain header, length and address.
    #[error("frame too short: need at least {need} bytes, got {got}")]
    TooShort { need: usize, got: usize },

    /// Frame payload exceeds maximum size.
    #[error("frame too large: {size} bytes exceeds maximum {max}")]
    TooLarge { size: usize, max: usize },

    /// Frame payload does not contain a full device address.
    #[error("frame missing device address: payload is {got} bytes")]
    MissingAddress { got: usize },
}

/// Result type alias for homemesh operations.
pub type Result<T> = std::result::Result<T, Error>;

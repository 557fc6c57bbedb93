//! Device behaviors.
//!
//! A behavior implements the device-type-specific logic on top of the two
//! callbacks the core exposes: the connection-changed notification and the
//! inbound message stream. Behaviors compose a [`ConnectionState`] value
//! and delegate to it; the connection engine itself is identical across
//! device types.

pub mod dimmer;
pub mod switch;

use crate::connection::ConnectionState;

/// Consumer of inbound device messages.
///
/// The registry strips the envelope type bits before delivery, so the
/// first byte of `message` is the bare command opcode.
pub trait DeviceHandler: Send + Sync {
    /// Handles a response or notification from the device.
    fn message_received(&self, message: &[u8]);
}

/// Capability interface for behaviors that own a connection machine.
pub trait Connectable {
    /// The connection machine for this device.
    fn connection(&self) -> &ConnectionState;

    /// Starts connecting to the device.
    fn connect(&self) {
        self.connection().connect();
    }

    /// Stops the connection.
    fn disconnect(&self) {
        self.connection().disconnect();
    }

    /// Returns true if the registration lease is active.
    fn is_connected(&self) -> bool {
        self.connection().is_connected()
    }
}

pub use dimmer::{DimmerDevice, RgbDimmerDevice};
pub use switch::SwitchDevice;

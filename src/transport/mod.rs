//! Transport layer for reaching mesh devices.
//!
//! A transport delivers addressed command frames to devices and surfaces
//! inbound frames through a single receive callback. Delivery is best
//! effort: there is no confirmation and no ordering guarantee across
//! devices. The connection engine copes with loss through its registration
//! timeout, so `send` must never block the caller.

pub mod serial;

use bytes::Bytes;

use crate::error::Result;
use crate::types::DeviceAddress;

/// Callback invoked for every inbound frame, registered once globally.
pub type ReceiveCallback = std::sync::Arc<dyn Fn(DeviceAddress, Bytes) + Send + Sync>;

/// Trait for transport implementations.
pub trait Transport: Send + Sync {
    /// Queues a message for delivery to the addressed device.
    ///
    /// Returns immediately; delivery is best effort.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport is not running. Callers that treat
    /// sends as fire-and-forget may log and ignore it — the registration
    /// timeout recovers on their behalf.
    fn send(&self, address: &DeviceAddress, message: Bytes) -> Result<()>;
}

pub use serial::SerialTransport;

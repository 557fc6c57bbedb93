//! Device registry and inbound frame routing.
//!
//! The registry owns the address-to-device map and demultiplexes inbound
//! transport frames. Registration acknowledgments are intercepted here and
//! fed to the device's connection machine; everything else goes to the
//! device's own message handler with the envelope type bits stripped.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use bytes::{Bytes, BytesMut};

use crate::connection::ConnectionState;
use crate::devices::DeviceHandler;
use crate::error::{Error, Result};
use crate::protocol::{COMMAND_MASK, MessageType, registration_ack};
use crate::types::DeviceAddress;

/// A registered device: its connection machine plus its message handler.
pub struct DeviceEntry {
    connection: ConnectionState,
    handler: Arc<dyn DeviceHandler>,
}

impl DeviceEntry {
    /// Creates an entry from a connection machine and a handler.
    #[must_use]
    pub fn new(connection: ConnectionState, handler: Arc<dyn DeviceHandler>) -> Self {
        Self {
            connection,
            handler,
        }
    }

    /// The device address.
    #[must_use]
    pub fn address(&self) -> &DeviceAddress {
        self.connection.address()
    }

    /// The device's connection machine.
    #[must_use]
    pub const fn connection(&self) -> &ConnectionState {
        &self.connection
    }
}

/// Address-to-device map with inbound routing.
///
/// Lookups vastly outnumber insertions, so the map sits behind a
/// read-write lock: routing takes the read side, add/remove the write
/// side. A router never observes a half-applied update.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: RwLock<HashMap<DeviceAddress, Arc<DeviceEntry>>>,
}

impl DeviceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a device.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateAddress` if a device with the same address is
    /// already registered.
    pub fn insert(&self, entry: Arc<DeviceEntry>) -> Result<()> {
        let mut devices = self.devices.write().expect("registry lock");
        let address = *entry.address();
        if devices.contains_key(&address) {
            return Err(Error::DuplicateAddress {
                address: address.to_hex(),
            });
        }
        devices.insert(address, entry);
        Ok(())
    }

    /// Removes and returns the device at `address`.
    pub fn remove(&self, address: &DeviceAddress) -> Option<Arc<DeviceEntry>> {
        self.devices
            .write()
            .expect("registry lock")
            .remove(address)
    }

    /// Looks up the device at `address`.
    #[must_use]
    pub fn get(&self, address: &DeviceAddress) -> Option<Arc<DeviceEntry>> {
        self.devices
            .read()
            .expect("registry lock")
            .get(address)
            .cloned()
    }

    /// Returns a snapshot of all registered devices.
    #[must_use]
    pub fn devices(&self) -> Vec<Arc<DeviceEntry>> {
        self.devices
            .read()
            .expect("registry lock")
            .values()
            .cloned()
            .collect()
    }

    /// Number of registered devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.read().expect("registry lock").len()
    }

    /// Returns true if no devices are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Routes an inbound frame to the addressed device.
    ///
    /// The registration ack (`Response|AddListener`) is checked first: it
    /// is the one response code that looks the same for every device type
    /// and must reach the connection machine, never the device handler.
    /// Other `Response`/`Notify` messages are delivered to the handler
    /// with the type bits stripped from the first byte. Inbound `Request`
    /// frames are not expected and are dropped, as are frames from
    /// unregistered addresses.
    pub fn route(&self, address: DeviceAddress, message: &Bytes) {
        let Some(entry) = self.get(&address) else {
            // Stale or unknown device; the database and the mesh can
            // disagree transiently.
            tracing::debug!("dropping frame from unknown device {}", address);
            return;
        };

        let Some(&envelope) = message.first() else {
            tracing::debug!("dropping empty frame from device {}", address);
            return;
        };

        if envelope == registration_ack() {
            entry.connection().connect_response();
            return;
        }

        match MessageType::from_byte(envelope) {
            Some(MessageType::Response | MessageType::Notify) => {
                let mut stripped = BytesMut::from(message.as_ref());
                stripped[0] = envelope & COMMAND_MASK;
                entry.handler.message_received(&stripped);
            }
            _ => {
                tracing::debug!(
                    "ignoring inbound frame type 0x{envelope:02x} from device {}",
                    address
                );
            }
        }
    }
}

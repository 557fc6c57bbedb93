//! Controller wiring: transport, registry and per-device machines.
//!
//! The [`Controller`] owns the shared pieces — transport, scheduler, jitter
//! source and timing configuration — and hands each registered device its
//! own [`ConnectionState`] built from them. Dependencies are passed in
//! explicitly; nothing is looked up from global state.

use std::sync::Arc;

use crate::connection::{ConnectConfig, ConnectionState};
use crate::devices::DeviceHandler;
use crate::error::Result;
use crate::registry::{DeviceEntry, DeviceRegistry};
use crate::scheduler::{JitterSource, RandomJitter, Scheduler, TokioScheduler};
use crate::transport::serial::SerialConfig;
use crate::transport::{ReceiveCallback, SerialTransport, Transport};
use crate::types::DeviceAddress;

/// Central coordinator for a mesh of devices.
pub struct Controller {
    config: ConnectConfig,
    scheduler: Arc<dyn Scheduler>,
    jitter: Arc<dyn JitterSource>,
    transport: Arc<dyn Transport>,
    registry: Arc<DeviceRegistry>,
    serial: Option<Arc<SerialTransport>>,
}

impl Controller {
    /// Creates a controller over an already-running transport.
    ///
    /// Wire inbound frames to [`Controller::receive_callback`]. Uses the
    /// tokio scheduler, random jitter and default timing.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            config: ConnectConfig::default(),
            scheduler: Arc::new(TokioScheduler::new()),
            jitter: Arc::new(RandomJitter::new()),
            transport,
            registry: Arc::new(DeviceRegistry::new()),
            serial: None,
        }
    }

    /// Creates a controller attached to the master modem on a serial port.
    ///
    /// Opens the port and starts routing inbound frames immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the serial port cannot be opened.
    pub async fn serial(config: SerialConfig) -> Result<Self> {
        let serial = Arc::new(SerialTransport::new(config));
        let mut controller = Self::new(Arc::clone(&serial) as Arc<dyn Transport>);
        serial.start(controller.receive_callback()).await?;
        controller.serial = Some(serial);
        Ok(controller)
    }

    /// Replaces the connection timing configuration.
    #[must_use]
    pub const fn with_config(mut self, config: ConnectConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the timer scheduler.
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Replaces the jitter source.
    #[must_use]
    pub fn with_jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = jitter;
        self
    }

    /// Returns the callback that routes inbound frames.
    ///
    /// Register it once with the transport delivering mesh frames.
    #[must_use]
    pub fn receive_callback(&self) -> ReceiveCallback {
        let registry = Arc::clone(&self.registry);
        Arc::new(move |address, message| {
            registry.route(address, &message);
        })
    }

    /// The transport shared by all devices.
    #[must_use]
    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    /// Builds a connection machine for `address` from the controller's
    /// shared scheduler, jitter source and timing configuration.
    #[must_use]
    pub fn new_connection(&self, address: DeviceAddress) -> ConnectionState {
        ConnectionState::new(
            address,
            self.config,
            Arc::clone(&self.transport),
            Arc::clone(&self.scheduler),
            Arc::clone(&self.jitter),
        )
    }

    /// Registers a device built around `connection`.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateAddress` if the address is already registered.
    pub fn add_device(
        &self,
        connection: ConnectionState,
        handler: Arc<dyn DeviceHandler>,
    ) -> Result<Arc<DeviceEntry>> {
        let entry = Arc::new(DeviceEntry::new(connection, handler));
        self.registry.insert(Arc::clone(&entry))?;
        tracing::debug!("registered device {}", entry.address());
        Ok(entry)
    }

    /// Removes a device, disconnecting it first.
    pub fn remove_device(&self, address: &DeviceAddress) -> Option<Arc<DeviceEntry>> {
        let entry = self.registry.remove(address)?;
        entry.connection().disconnect();
        tracing::debug!("removed device {}", address);
        Some(entry)
    }

    /// Looks up a registered device.
    #[must_use]
    pub fn device(&self, address: &DeviceAddress) -> Option<Arc<DeviceEntry>> {
        self.registry.get(address)
    }

    /// The device registry.
    #[must_use]
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Starts connecting every registered device.
    ///
    /// Used after a bulk load at startup; first-attempt jitter spreads the
    /// resulting registration burst.
    pub fn connect_all(&self) {
        for entry in self.registry.devices() {
            entry.connection().connect();
        }
    }

    /// Disconnects every device and stops an owned serial transport.
    pub fn shutdown(&self) {
        for entry in self.registry.devices() {
            entry.connection().disconnect();
        }
        if let Some(serial) = &self.serial {
            serial.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use bytes::Bytes;

    use crate::connection::State;
    use crate::scheduler::testing::{ManualScheduler, SequenceJitter};
    use crate::transport::testing::RecordingTransport;

    use super::*;

    #[derive(Default)]
    struct RecordingHandler {
        received: Mutex<Vec<Vec<u8>>>,
    }

    impl DeviceHandler for RecordingHandler {
        fn message_received(&self, message: &[u8]) {
            self.received.lock().unwrap().push(message.to_vec());
        }
    }

    fn addr(last: u8) -> DeviceAddress {
        DeviceAddress::from_bytes(&[0, 0, 0, 0, 0, 0, 0, last])
    }

    fn controller() -> (Arc<ManualScheduler>, Arc<RecordingTransport>, Controller) {
        let scheduler = Arc::new(ManualScheduler::new());
        let transport = Arc::new(RecordingTransport::new());
        let controller = Controller::new(Arc::clone(&transport) as Arc<dyn Transport>)
            .with_scheduler(Arc::clone(&scheduler) as Arc<dyn Scheduler>)
            .with_jitter(Arc::new(SequenceJitter::new([])));
        (scheduler, transport, controller)
    }

    #[test]
    fn test_inbound_frames_reach_the_device_handler() {
        let (_scheduler, _transport, controller) = controller();
        let handler = Arc::new(RecordingHandler::default());
        let connection = controller.new_connection(addr(1));
        controller
            .add_device(connection, Arc::clone(&handler) as Arc<dyn DeviceHandler>)
            .unwrap();

        let route = controller.receive_callback();
        route(addr(1), Bytes::from_static(&[0xC6, 0x00, 0x01]));
        route(addr(2), Bytes::from_static(&[0xC6, 0x00, 0x01]));

        assert_eq!(*handler.received.lock().unwrap(), vec![vec![0x06, 0x00, 0x01]]);
    }

    #[test]
    fn test_duplicate_device_is_rejected() {
        let (_scheduler, _transport, controller) = controller();
        let handler = Arc::new(RecordingHandler::default());

        let first = controller.new_connection(addr(1));
        controller
            .add_device(first, Arc::clone(&handler) as Arc<dyn DeviceHandler>)
            .unwrap();

        let second = controller.new_connection(addr(1));
        assert!(
            controller
                .add_device(second, Arc::clone(&handler) as Arc<dyn DeviceHandler>)
                .is_err()
        );
    }

    #[test]
    fn test_connect_all_registers_every_device() {
        let (scheduler, transport, controller) = controller();
        let handler = Arc::new(RecordingHandler::default());
        for last in 1..=3 {
            let connection = controller.new_connection(addr(last));
            controller
                .add_device(connection, Arc::clone(&handler) as Arc<dyn DeviceHandler>)
                .unwrap();
        }

        controller.connect_all();
        scheduler.advance(Duration::from_secs(5));

        assert_eq!(transport.sent_count(), 3);
        for entry in controller.registry().devices() {
            assert_eq!(entry.connection().state(), State::AwaitingConnection);
        }
    }

    #[test]
    fn test_remove_device_disconnects_it() {
        let (scheduler, transport, controller) = controller();
        let handler = Arc::new(RecordingHandler::default());
        let connection = controller.new_connection(addr(1));
        controller
            .add_device(connection, Arc::clone(&handler) as Arc<dyn DeviceHandler>)
            .unwrap();

        controller.connect_all();
        let entry = controller.remove_device(&addr(1)).unwrap();

        assert_eq!(entry.connection().state(), State::Disconnected);
        assert!(controller.device(&addr(1)).is_none());
        scheduler.advance(Duration::from_secs(60 * 60));
        assert_eq!(transport.sent_count(), 0);
    }

    #[test]
    fn test_shutdown_disconnects_all_devices() {
        let (scheduler, transport, controller) = controller();
        let handler = Arc::new(RecordingHandler::default());
        for last in 1..=2 {
            let connection = controller.new_connection(addr(last));
            controller
                .add_device(connection, Arc::clone(&handler) as Arc<dyn DeviceHandler>)
                .unwrap();
        }
        controller.connect_all();

        controller.shutdown();

        scheduler.advance(Duration::from_secs(60 * 60));
        assert_eq!(transport.sent_count(), 0);
        for entry in controller.registry().devices() {
            assert_eq!(entry.connection().state(), State::Disconnected);
        }
    }
}

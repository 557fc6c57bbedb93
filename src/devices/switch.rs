//! Multi-channel switch device.

use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::connection::ConnectionState;
use crate::devices::{Connectable, DeviceHandler};
use crate::error::Result;
use crate::protocol::{Command, Envelope, WriteMode};
use crate::transport::Transport;

/// Switch output on.
pub const ON: u8 = 1;

/// Switch output off.
pub const OFF: u8 = 0;

/// Callback invoked when a switch output reported a new state.
pub type SwitchChangedFn = Arc<dyn Fn(u8, u8) + Send + Sync>;

/// A device with one or more switched outputs (relays).
///
/// The controller tracks the last known output states and updates them from
/// `SwitchRead` notifications pushed by the device.
pub struct SwitchDevice {
    connection: ConnectionState,
    transport: Arc<dyn Transport>,
    states: Mutex<Vec<u8>>,
    change_listeners: Mutex<Vec<SwitchChangedFn>>,
}

impl SwitchDevice {
    /// Creates a switch device with `num_switches` outputs, all off.
    #[must_use]
    pub fn new(
        connection: ConnectionState,
        transport: Arc<dyn Transport>,
        num_switches: usize,
    ) -> Self {
        Self {
            connection,
            transport,
            states: Mutex::new(vec![OFF; num_switches]),
            change_listeners: Mutex::new(Vec::new()),
        }
    }

    /// Number of outputs on this device.
    #[must_use]
    pub fn num_switches(&self) -> usize {
        self.states.lock().expect("states lock").len()
    }

    /// Returns true if output `switch` is on, per the last known state.
    #[must_use]
    pub fn is_on(&self, switch: u8) -> bool {
        self.states
            .lock()
            .expect("states lock")
            .get(usize::from(switch))
            .copied()
            == Some(ON)
    }

    /// Toggles output `switch` on the device.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport is not running.
    pub fn toggle(&self, switch: u8) -> Result<()> {
        let state = {
            let mut states = self.states.lock().expect("states lock");
            let state = &mut states[usize::from(switch)];
            *state = if *state == ON { OFF } else { ON };
            *state
        };
        tracing::debug!(
            "switch {}: toggling output {} (now {})",
            self.connection.address(),
            switch,
            state
        );
        self.send(&[
            Envelope::request(Command::SwitchWrite).encode(),
            switch,
            WriteMode::Toggle.into(),
        ])
    }

    /// Sets output `switch` to on or off.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport is not running.
    pub fn set(&self, switch: u8, on: bool) -> Result<()> {
        let state = if on { ON } else { OFF };
        self.states.lock().expect("states lock")[usize::from(switch)] = state;
        self.send(&[
            Envelope::request(Command::SwitchWrite).encode(),
            switch,
            WriteMode::Absolute.into(),
            state,
        ])
    }

    /// Requests the current state of every output from the device.
    ///
    /// Responses arrive as `SwitchRead` messages and update the tracked
    /// states.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport is not running.
    pub fn refresh(&self) -> Result<()> {
        let num = self.num_switches();
        for switch in 0..num {
            self.send(&[
                Envelope::request(Command::SwitchRead).encode(),
                switch as u8,
            ])?;
        }
        Ok(())
    }

    /// Registers a callback for reported output changes.
    pub fn when_changed(&self, listener: impl Fn(u8, u8) + Send + Sync + 'static) {
        self.change_listeners
            .lock()
            .expect("listeners lock")
            .push(Arc::new(listener));
    }

    fn send(&self, message: &[u8]) -> Result<()> {
        self.transport
            .send(self.connection.address(), Bytes::copy_from_slice(message))
    }

    fn notify_changed(&self, switch: u8, state: u8) {
        let listeners: Vec<SwitchChangedFn> = {
            let listeners = self.change_listeners.lock().expect("listeners lock");
            listeners.iter().map(Arc::clone).collect()
        };
        for listener in &listeners {
            listener(switch, state);
        }
    }
}

impl Connectable for SwitchDevice {
    fn connection(&self) -> &ConnectionState {
        &self.connection
    }
}

impl DeviceHandler for SwitchDevice {
    fn message_received(&self, message: &[u8]) {
        let &[command, switch, state, ..] = message else {
            return;
        };
        if command != u8::from(Command::SwitchRead) {
            return;
        }
        {
            let mut states = self.states.lock().expect("states lock");
            let Some(slot) = states.get_mut(usize::from(switch)) else {
                tracing::warn!(
                    "switch {}: report for unknown output {}",
                    self.connection.address(),
                    switch
                );
                return;
            };
            *slot = state;
        }
        self.notify_changed(switch, state);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::connection::ConnectConfig;
    use crate::scheduler::Scheduler;
    use crate::scheduler::testing::{ManualScheduler, SequenceJitter};
    use crate::transport::testing::RecordingTransport;
    use crate::types::DeviceAddress;

    use super::*;

    fn device() -> (Arc<RecordingTransport>, SwitchDevice) {
        let transport = Arc::new(RecordingTransport::new());
        let connection = ConnectionState::new(
            DeviceAddress::from_bytes(&[0, 0, 0, 0, 0, 0, 0, 1]),
            ConnectConfig::default(),
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::new(ManualScheduler::new()) as Arc<dyn Scheduler>,
            Arc::new(SequenceJitter::new([])),
        );
        let switch = SwitchDevice::new(connection, Arc::clone(&transport) as Arc<dyn Transport>, 4);
        (transport, switch)
    }

    #[test]
    fn test_toggle_sends_toggle_write() {
        let (transport, switch) = device();
        switch.toggle(2).unwrap();

        assert_eq!(transport.sent()[0].1.as_ref(), &[0x05, 0x02, 0x06]);
        assert!(switch.is_on(2));
        switch.toggle(2).unwrap();
        assert!(!switch.is_on(2));
    }

    #[test]
    fn test_set_sends_absolute_write() {
        let (transport, switch) = device();
        switch.set(1, true).unwrap();

        assert_eq!(transport.sent()[0].1.as_ref(), &[0x05, 0x01, 0x01, 0x01]);
        assert!(switch.is_on(1));
    }

    #[test]
    fn test_refresh_reads_every_output() {
        let (transport, switch) = device();
        switch.refresh().unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 4);
        for (i, (_, message)) in sent.iter().enumerate() {
            assert_eq!(message.as_ref(), &[0x06, i as u8]);
        }
    }

    #[test]
    fn test_switch_read_updates_state_and_notifies() {
        let (_transport, switch) = device();
        let notified = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&notified);
        switch.when_changed(move |output, state| {
            assert_eq!(output, 3);
            assert_eq!(state, ON);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        switch.message_received(&[0x06, 0x03, 0x01]);

        assert!(switch.is_on(3));
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unrelated_message_is_ignored() {
        let (_transport, switch) = device();
        switch.message_received(&[0x07, 0x00, 0x01]);
        switch.message_received(&[0x06]);
        assert!(!switch.is_on(0));
    }

    #[test]
    fn test_report_for_unknown_output_is_ignored() {
        let (_transport, switch) = device();
        switch.message_received(&[0x06, 0x09, 0x01]);
        assert!(!switch.is_on(9));
    }
}

//! Dimmer devices: single-channel PWM and RGB variants.

use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::connection::ConnectionState;
use crate::devices::{Connectable, DeviceHandler};
use crate::error::Result;
use crate::protocol::{Command, Envelope, WriteMode};
use crate::transport::Transport;

/// Callback invoked when a dimmer reported a new value.
pub type DimmerChangedFn = Arc<dyn Fn() + Send + Sync>;

/// A single-channel dimmer driving one PWM output.
pub struct DimmerDevice {
    connection: ConnectionState,
    transport: Arc<dyn Transport>,
    value: Mutex<u8>,
    change_listeners: Mutex<Vec<DimmerChangedFn>>,
}

impl DimmerDevice {
    /// Creates a dimmer device with the output assumed dark.
    #[must_use]
    pub fn new(connection: ConnectionState, transport: Arc<dyn Transport>) -> Self {
        Self {
            connection,
            transport,
            value: Mutex::new(0),
            change_listeners: Mutex::new(Vec::new()),
        }
    }

    /// Last known output value.
    #[must_use]
    pub fn value(&self) -> u8 {
        *self.value.lock().expect("value lock")
    }

    /// Sets the output value.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport is not running.
    pub fn set_value(&self, value: u8) -> Result<()> {
        *self.value.lock().expect("value lock") = value;
        self.send(&[
            Envelope::request(Command::PwmWrite).encode(),
            0,
            WriteMode::Absolute.into(),
            value,
        ])
    }

    /// Requests the current output value from the device.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport is not running.
    pub fn refresh(&self) -> Result<()> {
        self.send(&[Envelope::request(Command::PwmRead).encode(), 0])
    }

    /// Registers a callback for reported value changes.
    pub fn when_changed(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.change_listeners
            .lock()
            .expect("listeners lock")
            .push(Arc::new(listener));
    }

    fn send(&self, message: &[u8]) -> Result<()> {
        self.transport
            .send(self.connection.address(), Bytes::copy_from_slice(message))
    }

    fn notify_changed(&self) {
        let listeners: Vec<DimmerChangedFn> = {
            let listeners = self.change_listeners.lock().expect("listeners lock");
            listeners.iter().map(Arc::clone).collect()
        };
        for listener in &listeners {
            listener();
        }
    }
}

impl Connectable for DimmerDevice {
    fn connection(&self) -> &ConnectionState {
        &self.connection
    }
}

impl DeviceHandler for DimmerDevice {
    fn message_received(&self, message: &[u8]) {
        let &[command, _channel, value, ..] = message else {
            return;
        };
        if command != u8::from(Command::PwmRead) {
            return;
        }
        *self.value.lock().expect("value lock") = value;
        self.notify_changed();
    }
}

/// A three-channel RGB dimmer.
pub struct RgbDimmerDevice {
    connection: ConnectionState,
    transport: Arc<dyn Transport>,
    rgb: Mutex<[u8; 3]>,
    change_listeners: Mutex<Vec<DimmerChangedFn>>,
}

impl RgbDimmerDevice {
    /// Creates an RGB dimmer device with all channels assumed dark.
    #[must_use]
    pub fn new(connection: ConnectionState, transport: Arc<dyn Transport>) -> Self {
        Self {
            connection,
            transport,
            rgb: Mutex::new([0, 0, 0]),
            change_listeners: Mutex::new(Vec::new()),
        }
    }

    /// Last known color.
    #[must_use]
    pub fn rgb(&self) -> [u8; 3] {
        *self.rgb.lock().expect("rgb lock")
    }

    /// Sets the color. Skips the send if the color is unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport is not running.
    pub fn set_rgb(&self, rgb: [u8; 3]) -> Result<()> {
        {
            let mut current = self.rgb.lock().expect("rgb lock");
            if *current == rgb {
                return Ok(());
            }
            *current = rgb;
        }
        self.send(&[
            Envelope::request(Command::RgbWrite).encode(),
            0,
            WriteMode::Absolute.into(),
            rgb[0],
            rgb[1],
            rgb[2],
        ])
    }

    /// Registers a callback for reported color changes.
    pub fn when_changed(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.change_listeners
            .lock()
            .expect("listeners lock")
            .push(Arc::new(listener));
    }

    fn send(&self, message: &[u8]) -> Result<()> {
        self.transport
            .send(self.connection.address(), Bytes::copy_from_slice(message))
    }

    fn notify_changed(&self) {
        let listeners: Vec<DimmerChangedFn> = {
            let listeners = self.change_listeners.lock().expect("listeners lock");
            listeners.iter().map(Arc::clone).collect()
        };
        for listener in &listeners {
            listener();
        }
    }
}

impl Connectable for RgbDimmerDevice {
    fn connection(&self) -> &ConnectionState {
        &self.connection
    }
}

impl DeviceHandler for RgbDimmerDevice {
    fn message_received(&self, message: &[u8]) {
        let &[command, _channel, red, green, blue, ..] = message else {
            return;
        };
        if command != u8::from(Command::RgbRead) {
            return;
        }
        *self.rgb.lock().expect("rgb lock") = [red, green, blue];
        self.notify_changed();
    }
}

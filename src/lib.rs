//! # homemesh
//!
//! A Rust controller library for wireless home-automation mesh devices.
//!
//! Mesh devices (switches, dimmers, sensors) are battery powered and
//! reachable only over a lossy half-duplex radio link, so the controller
//! registers itself as a listener on each device and keeps that
//! registration alive as a renewable lease. This library provides the
//! per-device connection engine that manages registration, keep-alive
//! leasing, timeout detection and exponential-backoff reconnection, plus
//! the routing and transport plumbing around it.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use homemesh::devices::Connectable;
//! use homemesh::{Controller, DeviceAddress, SerialConfig, SwitchDevice};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), homemesh::Error> {
//!     // Attach to the radio master modem
//!     let controller = Controller::serial(SerialConfig::new("/dev/ttyUSB0")).await?;
//!
//!     // Register a 4-channel switch device
//!     let address = DeviceAddress::from_hex("0013a200408b636e").expect("valid address");
//!     let connection = controller.new_connection(address);
//!     let switch = Arc::new(SwitchDevice::new(
//!         connection.clone(),
//!         controller.transport(),
//!         4,
//!     ));
//!     controller.add_device(connection, switch.clone())?;
//!
//!     // Start the registration handshake and watch the connection
//!     switch.connection().on_connection_changed(|address, connected| {
//!         println!("device {address}: connected = {connected}");
//!     });
//!     switch.connect();
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`connection`] - Per-device connection state machine (the core)
//! - [`registry`] - Address-to-device map and inbound frame routing
//! - [`protocol`] - Wire protocol (framing, envelope bits, command opcodes)
//! - [`transport`] - Transport seam and the serial master modem link
//! - [`scheduler`] - Timer and jitter seams, injectable for tests
//! - [`devices`] - Device behaviors composing the connection engine
//! - [`controller`] - Wiring that ties the above together

pub mod connection;
pub mod controller;
pub mod devices;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod scheduler;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use connection::{ConnectConfig, ConnectionState, State};
pub use controller::Controller;
pub use devices::{Connectable, DeviceHandler, DimmerDevice, RgbDimmerDevice, SwitchDevice};
pub use error::{Error, FrameError, Result};
pub use protocol::{Command, Envelope, MessageType, WriteMode};
pub use registry::{DeviceEntry, DeviceRegistry};
pub use scheduler::{JitterSource, RandomJitter, Scheduler, TimerHandle, TokioScheduler};
pub use transport::{SerialTransport, Transport, serial::SerialConfig};
pub use types::DeviceAddress;

//! Serial transport to the radio master modem.
//!
//! The master modem bridges the controller onto the wireless mesh. It is
//! attached over USB/serial and speaks the framing from
//! [`crate::protocol::frame`]: each frame carries one addressed message in
//! either direction.

use std::io;
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use crate::error::{Error, Result};
use crate::protocol::{FrameDecoder, encode_frame};
use crate::transport::{ReceiveCallback, Transport};
use crate::types::DeviceAddress;

/// Default baud rate for the master modem.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default settle delay after opening the port.
pub const DEFAULT_CONNECTION_DELAY: Duration = Duration::from_millis(300);

/// Configuration for the serial modem link.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Serial port path (e.g., "/dev/ttyUSB0" or "COM3").
    pub port: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Delay after opening the port before traffic starts.
    pub connection_delay: Duration,
}

impl SerialConfig {
    /// Creates a new serial configuration with default settings.
    #[must_use]
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            connection_delay: DEFAULT_CONNECTION_DELAY,
        }
    }

    /// Sets the baud rate.
    #[must_use]
    pub const fn baud_rate(mut self, rate: u32) -> Self {
        self.baud_rate = rate;
        self
    }

    /// Sets the settle delay.
    #[must_use]
    pub const fn connection_delay(mut self, delay: Duration) -> Self {
        self.connection_delay = delay;
        self
    }
}

/// Serial transport to the master modem.
///
/// Outbound messages are queued to a writer task, so [`Transport::send`]
/// never blocks frame routing or timer callbacks. Inbound bytes are decoded
/// by a reader task and handed to the receive callback one frame at a time.
pub struct SerialTransport {
    config: SerialConfig,
    outbound: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    read_task: Mutex<Option<JoinHandle<()>>>,
    write_task: Mutex<Option<JoinHandle<()>>>,
}

impl SerialTransport {
    /// Creates a new serial transport with the given configuration.
    #[must_use]
    pub fn new(config: SerialConfig) -> Self {
        Self {
            config,
            outbound: Mutex::new(None),
            read_task: Mutex::new(None),
            write_task: Mutex::new(None),
        }
    }

    /// Creates a new serial transport for the given port with default settings.
    #[must_use]
    pub fn with_port(port: impl Into<String>) -> Self {
        Self::new(SerialConfig::new(port))
    }

    /// Opens the port and starts the reader and writer tasks.
    ///
    /// `on_receive` is invoked for every decoded inbound frame; register it
    /// once, before any device traffic is expected.
    ///
    /// # Errors
    ///
    /// Returns an error if the serial port cannot be opened.
    pub async fn start(&self, on_receive: ReceiveCallback) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        tracing::info!("connecting to master modem: {}", self.config.port);

        let stream = tokio_serial::new(&self.config.port, self.config.baud_rate)
            .open_native_async()
            .map_err(Error::Serial)?;

        // Let the modem settle before traffic starts.
        tokio::time::sleep(self.config.connection_delay).await;

        let (reader, writer) = tokio::io::split(stream);

        let (tx, rx) = mpsc::unbounded_channel();
        *self.outbound.lock().expect("outbound lock") = Some(tx);

        *self.write_task.lock().expect("write task lock") =
            Some(tokio::spawn(run_write_loop(writer, rx)));
        *self.read_task.lock().expect("read task lock") =
            Some(tokio::spawn(async move {
                if let Err(e) = run_read_loop(reader, on_receive).await {
                    tracing::error!("modem read loop error: {}", e);
                }
            }));

        tracing::info!("connected to master modem");
        Ok(())
    }

    /// Stops the reader and writer tasks and closes the port.
    pub fn stop(&self) {
        self.outbound.lock().expect("outbound lock").take();
        if let Some(task) = self.read_task.lock().expect("read task lock").take() {
            task.abort();
        }
        if let Some(task) = self.write_task.lock().expect("write task lock").take() {
            task.abort();
        }
    }

    /// Returns true if the transport has been started.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.outbound.lock().expect("outbound lock").is_some()
    }
}

impl Transport for SerialTransport {
    fn send(&self, address: &DeviceAddress, message: Bytes) -> Result<()> {
        let outbound = self.outbound.lock().expect("outbound lock");
        let tx = outbound.as_ref().ok_or(Error::NotConnected)?;
        let frame = encode_frame(address, &message);
        tracing::trace!("queueing frame for {}: {} bytes", address, frame.len());
        tx.send(frame).map_err(|_| Error::ChannelClosed)
    }
}

/// Drains the outbound queue onto the serial port.
///
/// Write failures are logged and the frame dropped; the registration
/// timeout on the affected device recovers from the loss.
async fn run_write_loop(
    mut writer: WriteHalf<SerialStream>,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = writer.write_all(&frame).await {
            tracing::warn!("modem write error: {}", e);
            continue;
        }
        if let Err(e) = writer.flush().await {
            tracing::warn!("modem flush error: {}", e);
        }
    }
    tracing::debug!("outbound queue closed");
}

/// Reads modem bytes, decodes frames and hands them to the receive callback.
async fn run_read_loop(
    mut reader: ReadHalf<SerialStream>,
    on_receive: ReceiveCallback,
) -> Result<()> {
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 1024];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                tracing::debug!("serial port closed");
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "serial port closed",
                )));
            }
            Ok(n) => n,
            Err(e) => {
                tracing::error!("serial read error: {}", e);
                return Err(Error::Io(e));
            }
        };

        tracing::trace!("received {} bytes", n);
        decoder.feed(&buf[..n]);

        // Process all complete frames
        loop {
            match decoder.decode() {
                Ok(Some(frame)) => {
                    tracing::trace!(
                        "frame from {}: {} bytes",
                        frame.address,
                        frame.message.len()
                    );
                    on_receive(frame.address, frame.message);
                }
                Ok(None) => break, // Need more data
                Err(e) => {
                    tracing::warn!("frame decode error: {}", e);
                    // Continue processing - the decoder discards the bad frame
                }
            }
        }
    }
}

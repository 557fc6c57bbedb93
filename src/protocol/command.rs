//! Command opcodes for the homemesh wire protocol.
//!
//! Commands occupy the low 6 bits of the first message byte; the high 2 bits
//! carry the message type (see [`crate::protocol::envelope`]). The opcode
//! table is a fixed wire contract shared with the device firmware — new
//! commands must be added here, not invented ad hoc.

/// Command opcodes exchanged with devices (6 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Reset the device.
    Reset = 0,
    /// Register this controller as a notification listener.
    AddListener = 1,
    /// Remove this controller from the device's listener table.
    RemoveListener = 2,
    /// Write a stored device program.
    ProgramWrite = 3,
    /// Read a stored device program.
    ProgramRead = 4,
    /// Write a switch output.
    SwitchWrite = 5,
    /// Read a switch output.
    SwitchRead = 6,
    /// Read a sensor value.
    SensorRead = 7,
    /// Write a servo position.
    ServoWrite = 8,
    /// Read a servo position.
    ServoRead = 9,
    /// Write a PWM channel.
    PwmWrite = 10,
    /// Read a PWM channel.
    PwmRead = 11,
    /// Write an RGB value.
    RgbWrite = 12,
    /// Read an RGB value.
    RgbRead = 13,
    /// Dump internal device state.
    Dump = 14,
}

impl Command {
    /// Attempts to parse a command from a 6-bit opcode.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Reset),
            1 => Some(Self::AddListener),
            2 => Some(Self::RemoveListener),
            3 => Some(Self::ProgramWrite),
            4 => Some(Self::ProgramRead),
            5 => Some(Self::SwitchWrite),
            6 => Some(Self::SwitchRead),
            7 => Some(Self::SensorRead),
            8 => Some(Self::ServoWrite),
            9 => Some(Self::ServoRead),
            10 => Some(Self::PwmWrite),
            11 => Some(Self::PwmRead),
            12 => Some(Self::RgbWrite),
            13 => Some(Self::RgbRead),
            14 => Some(Self::Dump),
            _ => None,
        }
    }
}

impl From<Command> for u8 {
    fn from(cmd: Command) -> Self {
        cmd as Self
    }
}

/// Write modes for value-carrying write commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum WriteMode {
    /// Restore the device default value.
    #[default]
    Default = 0,
    /// Set the value as given.
    Absolute = 1,
    /// Increment by the given amount.
    Increment = 2,
    /// Increment by the device default step.
    IncrementDefault = 3,
    /// Decrement by the given amount.
    Decrement = 4,
    /// Decrement by the device default step.
    DecrementDefault = 5,
    /// Toggle between on and off.
    Toggle = 6,
}

impl From<WriteMode> for u8 {
    fn from(mode: WriteMode) -> Self {
        mode as Self
    }
}

/// Sensor kinds for `SensorRead` requests and notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SensorKind {
    /// Temperature sensor.
    Temperature = 0,
    /// Brightness sensor.
    Brightness = 1,
    /// Servo position feedback.
    Servo = 2,
    /// Power consumption meter.
    PowerConsumption = 3,
    /// All sensors at once.
    All = 255,
}

impl From<SensorKind> for u8 {
    fn from(kind: SensorKind) -> Self {
        kind as Self
    }
}

/// Selectors for the `Dump` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DumpSelector {
    /// Firmware version.
    Version = 0,
    /// Registered listener table.
    Listener = 1,
}

impl From<DumpSelector> for u8 {
    fn from(sel: DumpSelector) -> Self {
        sel as Self
    }
}

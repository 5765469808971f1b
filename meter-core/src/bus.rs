//! Capability interfaces for the node's external buses.
//!
//! The metering pipeline never touches peripherals directly. Register access
//! to the coulomb counter, the fixed-length ADC transfer, the sense-chip enable
//! line, and the two suspension primitives (timed delay and level wait) are all
//! expressed as traits here. Firmware backs them with Embassy drivers; host
//! tests and the emulator back them with simulated chips.

use core::fmt;
use core::time::Duration;

/// Default timeout applied to every bus transaction.
pub const DEFAULT_BUS_TIMEOUT: Duration = Duration::from_millis(10);

/// Number of bytes clocked out of the ADC per sample.
pub const SAMPLE_LEN: usize = 2;

/// Logic level of a digital line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    /// Returns the opposite level.
    #[must_use]
    pub const fn flipped(self) -> Self {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }

    #[must_use]
    pub const fn is_high(self) -> bool {
        matches!(self, Level::High)
    }
}

impl From<bool> for Level {
    fn from(value: bool) -> Self {
        if value { Level::High } else { Level::Low }
    }
}

/// Transport failure reported by a bus implementation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BusError {
    /// Target did not acknowledge the address or data byte.
    Nack,
    /// Transaction did not complete within the request timeout.
    Timeout,
    /// Lost arbitration on a shared bus.
    Arbitration,
    /// The bus has not been opened yet.
    Unavailable,
    /// Any other driver-reported failure.
    Other,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusError::Nack => f.write_str("no acknowledge"),
            BusError::Timeout => f.write_str("bus timeout"),
            BusError::Arbitration => f.write_str("arbitration lost"),
            BusError::Unavailable => f.write_str("bus not open"),
            BusError::Other => f.write_str("bus error"),
        }
    }
}

/// Single-byte register read request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RegisterRead {
    pub address: u8,
    pub register: u8,
    pub timeout: Duration,
}

impl RegisterRead {
    #[must_use]
    pub const fn new(address: u8, register: u8) -> Self {
        Self {
            address,
            register,
            timeout: DEFAULT_BUS_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Single-byte register write request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RegisterWrite {
    pub address: u8,
    pub register: u8,
    pub value: u8,
    pub timeout: Duration,
}

impl RegisterWrite {
    #[must_use]
    pub const fn new(address: u8, register: u8, value: u8) -> Self {
        Self {
            address,
            register,
            value,
            timeout: DEFAULT_BUS_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Fixed-length receive transfer from the ADC.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AdcTransfer {
    pub timeout: Duration,
}

impl AdcTransfer {
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Whether a transfer that took `elapsed` missed this request's deadline.
    #[must_use]
    pub fn overran(&self, elapsed: Duration) -> bool {
        elapsed > self.timeout
    }
}

impl Default for AdcTransfer {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_TIMEOUT)
    }
}

/// Direction of a general-purpose pin.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    Input,
    Output,
}

/// Internal pull resistor selection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Pull {
    None,
    Up,
    Down,
}

/// Pin configuration request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PinConfig {
    pub direction: Direction,
    pub pull: Pull,
    /// Level driven immediately after switching to output.
    pub initial: Level,
}

impl PinConfig {
    #[must_use]
    pub const fn output(initial: Level) -> Self {
        Self {
            direction: Direction::Output,
            pull: Pull::None,
            initial,
        }
    }
}

/// Byte-wide register access on the charge-accounting chip.
pub trait RegisterBus {
    fn read(&mut self, request: RegisterRead) -> Result<u8, BusError>;

    fn write(&mut self, request: RegisterWrite) -> Result<(), BusError>;
}

impl<T> RegisterBus for &mut T
where
    T: RegisterBus + ?Sized,
{
    fn read(&mut self, request: RegisterRead) -> Result<u8, BusError> {
        (**self).read(request)
    }

    fn write(&mut self, request: RegisterWrite) -> Result<(), BusError> {
        (**self).write(request)
    }
}

/// Fixed-length transfer on the ADC bus.
///
/// On failure the contents of `rx` are unspecified; callers keep whatever is
/// left in the buffer.
pub trait SampleBus {
    fn transfer(&mut self, request: AdcTransfer, rx: &mut [u8; SAMPLE_LEN])
    -> Result<(), BusError>;
}

/// Output line gating power to the sense chip.
pub trait EnableLine {
    fn configure(&mut self, config: PinConfig) -> Result<(), BusError>;

    fn set_level(&mut self, level: Level) -> Result<(), BusError>;
}

/// Cooperative timed suspension.
#[allow(async_fn_in_trait)]
pub trait Delay {
    async fn delay(&mut self, duration: Duration);
}

/// Fixed-rate wake-ups. Each deadline is one `period` after the previous
/// deadline, not after the caller resumed, so late wakes do not accumulate.
#[allow(async_fn_in_trait)]
pub trait Cadence {
    async fn wait_next(&mut self, period: Duration);
}

/// Cooperative wait on an input line reaching a level.
#[allow(async_fn_in_trait)]
pub trait LevelWait {
    async fn wait_for_level(&mut self, level: Level);
}

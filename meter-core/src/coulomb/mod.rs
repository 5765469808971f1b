//! Coulomb-counter driver.
//!
//! The counter exposes five byte-wide registers:
//!
//! | Register | Role |
//! |---|---|
//! | A | prescaler / configuration |
//! | B | alarm level |
//! | C | accumulated charge count |
//! | D | alarm source bitmask (read-only) |
//! | E | alarm control |
//!
//! Detection of a new alarm requires the two discrete register-E writes issued
//! by [`CoulombCounter::arm`] after every consumed alarm. Skipping them leaves
//! the alarm latched and charge accounting stalls.

pub mod alarm;

use core::fmt;

use crate::bus::{BusError, RegisterBus, RegisterRead, RegisterWrite};
use crate::config::CounterConfig;

/// Default 7-bit bus address of the counter.
pub const COUNTER_ADDRESS: u8 = 0x64;

/// Largest prescaler exponent accepted by register A.
pub const MAX_PRESCALER: u8 = 0x0F;

/// Register-D bit: charge count reached the alarm level.
pub const ALARM_TRIP: u8 = 0x04;
/// Register-D bit: the accumulated charge count overflowed.
pub const ALARM_COUNT_OVERFLOW: u8 = 0x02;
/// Register-D bit: the ACON counter overflowed.
pub const ALARM_ACON_OVERFLOW: u8 = 0x01;

/// Register-E bit 0 value that clears a pending alarm.
pub const ALARM_CLEAR: u8 = 0x01;
/// Register-E bit 0 value that prepares detection of the next alarm.
pub const ALARM_PREPARE: u8 = 0x00;
/// Register-E bit 1: route the ripple counter to the IRQ pin.
pub const RIPPLE_OUTPUT: u8 = 0x02;

/// Register map of the counter.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Register {
    A = 0x01,
    B = 0x02,
    C = 0x03,
    D = 0x04,
    E = 0x05,
}

impl Register {
    pub const ALL: [Register; 5] = [
        Register::A,
        Register::B,
        Register::C,
        Register::D,
        Register::E,
    ];

    #[must_use]
    pub const fn address(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn letter(self) -> char {
        match self {
            Register::A => 'A',
            Register::B => 'B',
            Register::C => 'C',
            Register::D => 'D',
            Register::E => 'E',
        }
    }

    /// Looks a register up by its letter, ignoring case.
    #[must_use]
    pub fn from_letter(letter: char) -> Option<Self> {
        let upper = letter.to_ascii_uppercase();
        Self::ALL.into_iter().find(|reg| reg.letter() == upper)
    }

    /// Register D is the only one the chip refuses to accept writes for.
    #[must_use]
    pub const fn is_writable(self) -> bool {
        !matches!(self, Register::D)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Overflow conditions reported through register D.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OverflowKind {
    ChargeCount,
    Acon,
}

impl OverflowKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            OverflowKind::ChargeCount => "CC overflow",
            OverflowKind::Acon => "ACON overflow",
        }
    }
}

/// Receives the side effects of consumed alarms.
pub trait ChargeSink {
    /// One confirmed trip, worth one charge LSB.
    fn record_trip(&mut self);

    fn record_overflow(&mut self, kind: OverflowKind);
}

impl<T> ChargeSink for &mut T
where
    T: ChargeSink + ?Sized,
{
    fn record_trip(&mut self) {
        (**self).record_trip();
    }

    fn record_overflow(&mut self, kind: OverflowKind) {
        (**self).record_overflow(kind);
    }
}

/// Result of a single alarm poll.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AlarmReport {
    /// The charge count reached the alarm level; one LSB was accounted.
    Tripped,
    /// The chip's accumulated count overflowed; totals are no longer exact.
    CountOverflow,
    /// Secondary ACON overflow indicator.
    AconOverflow,
    NoAlarm,
}

impl AlarmReport {
    /// `true` when the report consumed a latched alarm that must be re-armed.
    #[must_use]
    pub const fn needs_rearm(self) -> bool {
        !matches!(self, AlarmReport::NoAlarm)
    }
}

/// Driver lifecycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DriverState {
    Uninitialized,
    Configured,
    Armed,
    AlarmPending,
}

/// Errors raised by the driver.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DriverError {
    Bus(BusError),
    InvalidPrescaler(u8),
    InvalidAlarmLevel,
    /// `configure` has not completed.
    NotConfigured,
    /// A consumed alarm has not been re-armed.
    NotArmed,
}

impl From<BusError> for DriverError {
    fn from(error: BusError) -> Self {
        Self::Bus(error)
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::Bus(err) => write!(f, "bus failure: {err}"),
            DriverError::InvalidPrescaler(value) => {
                write!(f, "prescaler {value:#04x} exceeds {MAX_PRESCALER:#04x}")
            }
            DriverError::InvalidAlarmLevel => f.write_str("alarm level must be non-zero"),
            DriverError::NotConfigured => f.write_str("counter not configured"),
            DriverError::NotArmed => f.write_str("alarm pending re-arm"),
        }
    }
}

/// Register-level driver for the coulomb counter.
pub struct CoulombCounter<B> {
    bus: B,
    config: CounterConfig,
    state: DriverState,
    last_count: u8,
}

impl<B> CoulombCounter<B>
where
    B: RegisterBus,
{
    #[must_use]
    pub const fn new(bus: B, config: CounterConfig) -> Self {
        Self {
            bus,
            config,
            state: DriverState::Uninitialized,
            last_count: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> DriverState {
        self.state
    }

    #[must_use]
    pub fn config(&self) -> &CounterConfig {
        &self.config
    }

    /// Register-C value observed by the most recent poll.
    #[must_use]
    pub fn last_count(&self) -> u8 {
        self.last_count
    }

    #[must_use]
    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Writes the prescaler, clears the accumulated count, and sets the alarm
    /// level. Detection stays disabled until [`Self::arm`].
    pub fn configure(&mut self, prescaler: u8, alarm_level: u8) -> Result<(), DriverError> {
        if prescaler > MAX_PRESCALER {
            return Err(DriverError::InvalidPrescaler(prescaler));
        }
        if alarm_level == 0 {
            return Err(DriverError::InvalidAlarmLevel);
        }

        self.config.prescaler = prescaler;
        self.config.alarm_level = alarm_level;
        self.state = DriverState::Uninitialized;

        self.write(Register::A, prescaler)?;
        self.write(Register::C, 0)?;
        self.write(Register::B, alarm_level)?;

        self.state = DriverState::Configured;
        Ok(())
    }

    /// Configures using the stored [`CounterConfig`].
    pub fn configure_default(&mut self) -> Result<(), DriverError> {
        self.configure(self.config.prescaler, self.config.alarm_level)
    }

    /// Clears any pending alarm and prepares the next one.
    ///
    /// Always two transactions; the chip latches on each register-E write.
    pub fn arm(&mut self) -> Result<(), DriverError> {
        if self.state == DriverState::Uninitialized {
            return Err(DriverError::NotConfigured);
        }

        let ripple = if self.config.ripple_output {
            RIPPLE_OUTPUT
        } else {
            0
        };

        self.write(Register::E, ALARM_CLEAR | ripple)?;
        self.write(Register::E, ALARM_PREPARE | ripple)?;

        self.state = DriverState::Armed;
        Ok(())
    }

    /// Reads registers C and D and accounts any latched alarm into `sink`.
    ///
    /// A trip takes precedence over overflow bits raised alongside it; every
    /// overflow bit is still latched into the sink.
    pub fn poll_alarm<S>(&mut self, sink: &mut S) -> Result<AlarmReport, DriverError>
    where
        S: ChargeSink + ?Sized,
    {
        match self.state {
            DriverState::Uninitialized => return Err(DriverError::NotConfigured),
            DriverState::Configured | DriverState::AlarmPending => {
                return Err(DriverError::NotArmed);
            }
            DriverState::Armed => {}
        }

        self.last_count = self.read(Register::C)?;
        let source = self.read(Register::D)?;

        if source & ALARM_COUNT_OVERFLOW != 0 {
            sink.record_overflow(OverflowKind::ChargeCount);
        }
        if source & ALARM_ACON_OVERFLOW != 0 {
            sink.record_overflow(OverflowKind::Acon);
        }

        let report = if source & ALARM_TRIP != 0 {
            self.write(Register::C, 0)?;
            self.write(Register::B, self.config.alarm_level)?;
            sink.record_trip();
            AlarmReport::Tripped
        } else if source & ALARM_COUNT_OVERFLOW != 0 {
            AlarmReport::CountOverflow
        } else if source & ALARM_ACON_OVERFLOW != 0 {
            AlarmReport::AconOverflow
        } else {
            AlarmReport::NoAlarm
        };

        if report.needs_rearm() {
            self.state = DriverState::AlarmPending;
        }

        Ok(report)
    }

    /// Raw register read for bench access.
    pub fn read(&mut self, register: Register) -> Result<u8, BusError> {
        let request = RegisterRead::new(self.config.bus_address, register.address())
            .with_timeout(self.config.bus_timeout);
        self.bus.read(request)
    }

    fn write(&mut self, register: Register, value: u8) -> Result<(), BusError> {
        let request = RegisterWrite::new(self.config.bus_address, register.address(), value)
            .with_timeout(self.config.bus_timeout);
        self.bus.write(request)
    }
}

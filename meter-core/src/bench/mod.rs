//! Bench console for direct coulomb-counter register access.
//!
//! The executor shares its [`RegisterBus`] with the driver. Implementations
//! hand out the bus under a lock, so console and driver transactions never
//! interleave.

pub mod grammar;
pub mod status;

use core::fmt;
use core::time::Duration;

use crate::bus::{BusError, DEFAULT_BUS_TIMEOUT, RegisterBus, RegisterRead, RegisterWrite};
use crate::coulomb::{COUNTER_ADDRESS, Register};

pub use grammar::{BenchCommand, ParseError};

/// Help lines printed by the `help` command.
pub const HELP_TOPICS: &[(&str, &str)] = &[
    ("regget", "regget <C|D>              - read a counter register"),
    ("regset", "regset <A|B|C|E> <value>  - write a counter register"),
    ("status", "status                    - show pipeline counters"),
    ("help", "help                      - list commands"),
];

/// Successful console results.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BenchOutcome {
    Read { register: Register, value: u8 },
    Written { register: Register, value: u8 },
    /// Caller renders its own status snapshot.
    Status,
    Help,
}

impl fmt::Display for BenchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BenchOutcome::Read { register, value } => {
                write!(f, "reg {register} = {value:#04x} ({value})")
            }
            BenchOutcome::Written { register, value } => {
                write!(f, "reg {register} <- {value:#04x}")
            }
            BenchOutcome::Status => f.write_str("status"),
            BenchOutcome::Help => {
                for (index, (_, line)) in HELP_TOPICS.iter().enumerate() {
                    if index > 0 {
                        f.write_str("\n")?;
                    }
                    f.write_str(line)?;
                }
                Ok(())
            }
        }
    }
}

/// Console failures.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BenchError {
    Parse(ParseError),
    NotReadable(Register),
    NotWritable(Register),
    /// The driver has not opened the bus yet.
    BusUnavailable,
    Bus(BusError),
}

impl From<ParseError> for BenchError {
    fn from(error: ParseError) -> Self {
        Self::Parse(error)
    }
}

impl From<BusError> for BenchError {
    fn from(error: BusError) -> Self {
        match error {
            BusError::Unavailable => Self::BusUnavailable,
            other => Self::Bus(other),
        }
    }
}

impl fmt::Display for BenchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BenchError::Parse(err) => write!(f, "error: {err}"),
            BenchError::NotReadable(register) => write!(f, "error: reg {register} not readable"),
            BenchError::NotWritable(register) => write!(f, "error: reg {register} not writable"),
            BenchError::BusUnavailable => f.write_str("error: i2c not open"),
            BenchError::Bus(err) => write!(f, "error: {err}"),
        }
    }
}

/// Registers the console may read.
const READABLE: [Register; 2] = [Register::C, Register::D];

/// Parses and executes console lines against the counter.
pub struct BenchExecutor<R> {
    bus: R,
    address: u8,
    timeout: Duration,
}

impl<R> BenchExecutor<R> {
    pub const fn new(bus: R) -> Self {
        Self {
            bus,
            address: COUNTER_ADDRESS,
            timeout: DEFAULT_BUS_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    pub fn bus(&self) -> &R {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut R {
        &mut self.bus
    }
}

impl<R> BenchExecutor<R>
where
    R: RegisterBus,
{
    pub fn execute(&mut self, line: &str) -> Result<BenchOutcome, BenchError> {
        let command = grammar::parse(line)?;
        self.dispatch(command)
    }

    pub fn dispatch(&mut self, command: BenchCommand) -> Result<BenchOutcome, BenchError> {
        match command {
            BenchCommand::RegGet(register) => {
                if !READABLE.contains(&register) {
                    return Err(BenchError::NotReadable(register));
                }
                let request = RegisterRead::new(self.address, register.address())
                    .with_timeout(self.timeout);
                let value = self.bus.read(request)?;
                Ok(BenchOutcome::Read { register, value })
            }
            BenchCommand::RegSet(register, value) => {
                if !register.is_writable() {
                    return Err(BenchError::NotWritable(register));
                }
                let request = RegisterWrite::new(self.address, register.address(), value)
                    .with_timeout(self.timeout);
                self.bus.write(request)?;
                Ok(BenchOutcome::Written { register, value })
            }
            BenchCommand::Status => Ok(BenchOutcome::Status),
            BenchCommand::Help => Ok(BenchOutcome::Help),
        }
    }
}

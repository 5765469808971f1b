//! Ownership of the sense-chip enable line.
//!
//! The sampler powers the chip up, the reporter powers it down. Power-up waits
//! on the token that power-down posts, so the line alternates strictly
//! high/low across cycles even when the reporter lags behind.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use meter_core::bus::{BusError, EnableLine, Level, PinConfig};

use super::Token;
use crate::status;

pub struct SenseSupply<'a, M: RawMutex, E> {
    line: Mutex<M, RefCell<E>>,
    released: &'a Token<M>,
}

impl<'a, M: RawMutex, E: EnableLine> SenseSupply<'a, M, E> {
    pub const fn new(line: E, released: &'a Token<M>) -> Self {
        Self {
            line: Mutex::new(RefCell::new(line)),
            released,
        }
    }

    /// Drives the line as an output, asserted.
    pub fn init(&self) -> Result<(), BusError> {
        self.with_line(|line| line.configure(PinConfig::output(Level::High)))?;
        status::set_supply_powered(true);
        Ok(())
    }

    /// Waits for the previous cycle's power-down, then asserts the line.
    pub async fn power_up(&self) -> Result<(), BusError> {
        self.released.wait().await;
        self.drive(Level::High)
    }

    /// De-asserts the line and hands the supply to the next power-up.
    ///
    /// The token is posted even when the GPIO write fails so the sampler
    /// cannot stall on a missed hand-off.
    pub fn power_down(&self) -> Result<(), BusError> {
        let result = self.drive(Level::Low);
        self.released.signal(());
        result
    }

    fn drive(&self, level: Level) -> Result<(), BusError> {
        self.with_line(|line| line.set_level(level))?;
        status::set_supply_powered(level.is_high());
        Ok(())
    }

    fn with_line<R>(&self, f: impl FnOnce(&mut E) -> R) -> R {
        self.line.lock(|line| f(&mut line.borrow_mut()))
    }
}

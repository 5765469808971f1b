//! Register-level model of the coulomb counter.
//!
//! Echoes written register state, latches alarm-source bits on demand, and
//! clears them when register E is written with the clear bit set. The host
//! emulator runs against it, and so do the driver tests.

use heapless::Vec;

use crate::bus::{BusError, RegisterBus, RegisterRead, RegisterWrite};
use crate::coulomb::{ALARM_CLEAR, ALARM_TRIP, COUNTER_ADDRESS, Register};

/// Number of register writes retained for inspection.
pub const WRITE_LOG_DEPTH: usize = 32;

#[derive(Clone, Debug)]
pub struct SimulatedCounterChip {
    address: u8,
    registers: [u8; 6],
    writes: Vec<(u8, u8), WRITE_LOG_DEPTH>,
    pending_failure: Option<BusError>,
    transactions: u32,
}

impl SimulatedCounterChip {
    #[must_use]
    pub const fn new() -> Self {
        Self::with_address(COUNTER_ADDRESS)
    }

    #[must_use]
    pub const fn with_address(address: u8) -> Self {
        Self {
            address,
            registers: [0; 6],
            writes: Vec::new(),
            pending_failure: None,
            transactions: 0,
        }
    }

    /// Charge count reached the alarm level: C takes the level and D latches
    /// the trip bit.
    pub fn trip(&mut self) {
        self.registers[Register::C.address() as usize] = self.register(Register::B);
        self.raise(ALARM_TRIP);
    }

    /// Latches arbitrary alarm-source bits into register D.
    pub fn raise(&mut self, bits: u8) {
        self.registers[Register::D.address() as usize] |= bits;
    }

    /// Makes the next transaction fail with `error`.
    pub fn fail_next(&mut self, error: BusError) {
        self.pending_failure = Some(error);
    }

    #[must_use]
    pub fn register(&self, register: Register) -> u8 {
        self.registers[register.address() as usize]
    }

    /// Register writes observed since the last [`Self::clear_log`], oldest
    /// first. Writes beyond [`WRITE_LOG_DEPTH`] are not retained.
    #[must_use]
    pub fn writes(&self) -> &[(u8, u8)] {
        &self.writes
    }

    pub fn clear_log(&mut self) {
        self.writes.clear();
    }

    #[must_use]
    pub fn transactions(&self) -> u32 {
        self.transactions
    }

    fn begin(&mut self, address: u8, register: u8) -> Result<usize, BusError> {
        self.transactions = self.transactions.wrapping_add(1);
        if let Some(error) = self.pending_failure.take() {
            return Err(error);
        }
        if address != self.address {
            return Err(BusError::Nack);
        }
        let index = usize::from(register);
        if index == 0 || index >= self.registers.len() {
            return Err(BusError::Nack);
        }
        Ok(index)
    }
}

impl Default for SimulatedCounterChip {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterBus for SimulatedCounterChip {
    fn read(&mut self, request: RegisterRead) -> Result<u8, BusError> {
        let index = self.begin(request.address, request.register)?;
        Ok(self.registers[index])
    }

    fn write(&mut self, request: RegisterWrite) -> Result<(), BusError> {
        let index = self.begin(request.address, request.register)?;
        let _ = self.writes.push((request.register, request.value));

        if index == Register::D.address() as usize {
            return Ok(());
        }

        self.registers[index] = request.value;
        if index == Register::E.address() as usize && request.value & ALARM_CLEAR != 0 {
            self.registers[Register::D.address() as usize] = 0;
        }
        Ok(())
    }
}

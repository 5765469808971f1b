//! Shared measurement record with per-field writers.
//!
//! The record lives in a single cell behind a blocking mutex. Only one
//! [`SampleWriter`] and one [`ChargeWriter`] are ever handed out, so each field
//! keeps exactly one writer; readers copy the whole record inside the same
//! brief exclusive section and never observe a half-written update.

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use meter_core::coulomb::{ChargeSink, OverflowKind};
use meter_core::record::{ChargeTally, MeasurementRecord};
use portable_atomic::{AtomicBool, Ordering};

pub struct SharedRecord<M: RawMutex> {
    cell: Mutex<M, Cell<MeasurementRecord>>,
    writers_taken: AtomicBool,
}

impl<M: RawMutex> SharedRecord<M> {
    /// Zero-initialised record.
    pub const fn new() -> Self {
        Self {
            cell: Mutex::new(Cell::new(MeasurementRecord::new())),
            writers_taken: AtomicBool::new(false),
        }
    }

    /// Hands out the two field writers. Returns `None` after the first call.
    pub fn writers(&self) -> Option<(SampleWriter<'_, M>, ChargeWriter<'_, M>)> {
        if self.writers_taken.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some((SampleWriter { record: self }, ChargeWriter { record: self }))
    }

    pub fn reader(&self) -> RecordReader<'_, M> {
        RecordReader { record: self }
    }

    fn update(&self, apply: impl FnOnce(&mut MeasurementRecord)) {
        self.cell.lock(|cell| {
            let mut record = cell.get();
            apply(&mut record);
            cell.set(record);
        });
    }
}

impl<M: RawMutex> Default for SharedRecord<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Sole writer of `current_sample`.
pub struct SampleWriter<'a, M: RawMutex> {
    record: &'a SharedRecord<M>,
}

impl<M: RawMutex> SampleWriter<'_, M> {
    pub fn write(&mut self, sample: i16) {
        self.record.update(|record| record.current_sample = sample);
    }
}

/// Sole writer of the charge tally.
pub struct ChargeWriter<'a, M: RawMutex> {
    record: &'a SharedRecord<M>,
}

impl<M: RawMutex> ChargeSink for ChargeWriter<'_, M> {
    fn record_trip(&mut self) {
        self.record.update(|record| record.charge.increment());
    }

    fn record_overflow(&mut self, kind: OverflowKind) {
        self.record.update(|record| record.charge.note_overflow(kind));
    }
}

pub struct RecordReader<'a, M: RawMutex> {
    record: &'a SharedRecord<M>,
}

impl<M: RawMutex> Clone for RecordReader<'_, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M: RawMutex> Copy for RecordReader<'_, M> {}

impl<M: RawMutex> RecordReader<'_, M> {
    pub fn snapshot(&self) -> MeasurementRecord {
        self.record.cell.lock(Cell::get)
    }

    pub fn charge(&self) -> ChargeTally {
        self.snapshot().charge
    }
}

//! Measurement record shared between the sampler, the charge-alarm handler,
//! and the reporter.
//!
//! Each field has exactly one writer. The record itself is a plain `Copy`
//! value; the firmware decides how snapshots are taken.

use crate::coulomb::{ChargeSink, OverflowKind};

/// Sticky accounting flags carried next to the trip count.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ChargeFlags {
    /// The one-byte wire field has pinned at its maximum.
    pub saturated: bool,
    /// The chip reported a charge-count overflow at least once.
    pub count_overflow: bool,
    /// The chip reported an ACON overflow at least once.
    pub acon_overflow: bool,
}

/// Cumulative charge accounting.
///
/// Trips are counted in a `u32`; the wire field is derived from it and
/// saturates rather than wrapping.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ChargeTally {
    pub trips: u32,
    pub flags: ChargeFlags,
}

impl ChargeTally {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            trips: 0,
            flags: ChargeFlags {
                saturated: false,
                count_overflow: false,
                acon_overflow: false,
            },
        }
    }

    /// Adds one charge LSB.
    pub fn increment(&mut self) {
        self.trips = self.trips.saturating_add(1);
        if self.trips > u32::from(u8::MAX) {
            self.flags.saturated = true;
        }
    }

    pub fn note_overflow(&mut self, kind: OverflowKind) {
        match kind {
            OverflowKind::ChargeCount => self.flags.count_overflow = true,
            OverflowKind::Acon => self.flags.acon_overflow = true,
        }
    }

    /// One-byte count as carried on the wire.
    #[must_use]
    pub fn wire_count(&self) -> u8 {
        u8::try_from(self.trips).unwrap_or(u8::MAX)
    }
}

impl ChargeSink for ChargeTally {
    fn record_trip(&mut self) {
        self.increment();
    }

    fn record_overflow(&mut self, kind: OverflowKind) {
        self.note_overflow(kind);
    }
}

/// Latest sample paired with the latest charge tally.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MeasurementRecord {
    /// Raw ADC code, written only by the sampler.
    pub current_sample: i16,
    /// Charge accounting, written only by the alarm handler.
    pub charge: ChargeTally,
}

impl MeasurementRecord {
    /// Zero-initialised record.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            current_sample: 0,
            charge: ChargeTally::new(),
        }
    }

    #[must_use]
    pub fn cumulative_charge(&self) -> u8 {
        self.charge.wire_count()
    }
}

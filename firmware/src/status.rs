//! Shared status storage for the firmware target.
//!
//! Lightweight atomics track pipeline progress and tolerated faults so the
//! bench console can surface a `StatusSnapshot` without touching the
//! measurement record's writers.

use meter_core::bench::status::StatusSnapshot;
use meter_core::record::ChargeTally;
use portable_atomic::{AtomicBool, AtomicI16, AtomicU32, Ordering};

/// Completed sample cycles.
static CYCLES: AtomicU32 = AtomicU32::new(0);
/// ADC transfers that failed and left stale buffer contents.
static SAMPLE_FAILURES: AtomicU32 = AtomicU32::new(0);
/// Reports the transport refused.
static SEND_FAILURES: AtomicU32 = AtomicU32::new(0);
/// Clock ticks dropped because the release token was still set.
static TICKS_COALESCED: AtomicU32 = AtomicU32::new(0);
static LAST_SAMPLE: AtomicI16 = AtomicI16::new(0);
/// Sense-chip enable line state; the line boots asserted.
static SUPPLY_POWERED: AtomicBool = AtomicBool::new(true);
static SERVICES_READY: AtomicBool = AtomicBool::new(false);

pub fn record_cycle(sample: i16) {
    CYCLES.fetch_add(1, Ordering::Relaxed);
    LAST_SAMPLE.store(sample, Ordering::Relaxed);
}

pub fn record_sample_failure() {
    SAMPLE_FAILURES.fetch_add(1, Ordering::Relaxed);
}

pub fn record_send_failure() {
    SEND_FAILURES.fetch_add(1, Ordering::Relaxed);
}

pub fn record_tick_coalesced() {
    TICKS_COALESCED.fetch_add(1, Ordering::Relaxed);
}

pub fn set_supply_powered(powered: bool) {
    SUPPLY_POWERED.store(powered, Ordering::Relaxed);
}

pub fn set_services_ready(ready: bool) {
    SERVICES_READY.store(ready, Ordering::Relaxed);
}

/// Builds a [`StatusSnapshot`] from the stored counters and the caller's view
/// of the charge tally.
pub fn snapshot(charge: ChargeTally) -> StatusSnapshot {
    StatusSnapshot {
        cycles: CYCLES.load(Ordering::Relaxed),
        sample_failures: SAMPLE_FAILURES.load(Ordering::Relaxed),
        send_failures: SEND_FAILURES.load(Ordering::Relaxed),
        ticks_coalesced: TICKS_COALESCED.load(Ordering::Relaxed),
        last_sample: LAST_SAMPLE.load(Ordering::Relaxed),
        charge,
        supply_powered: SUPPLY_POWERED.load(Ordering::Relaxed),
        services_ready: SERVICES_READY.load(Ordering::Relaxed),
    }
}

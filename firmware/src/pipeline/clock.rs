//! Periodic release of the sampler.

use core::time::Duration;

use embassy_sync::blocking_mutex::raw::RawMutex;
use meter_core::bus::Cadence;
use portable_atomic::{AtomicBool, AtomicU32, Ordering};

use super::Token;
use crate::status;

/// Outcome of one clock expiry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Tick {
    /// The sampler was released.
    Released,
    /// The previous release had not been consumed; this tick was absorbed.
    Coalesced,
    /// The clock is cancelled and released nothing.
    Cancelled,
}

/// Fixed-period timer releasing one sample per expiry.
///
/// The release token never holds more than one unit. `cancel` and `restart`
/// may be called from any task.
pub struct SampleClock<'a, M: RawMutex> {
    release: &'a Token<M>,
    period_ms: AtomicU32,
    running: AtomicBool,
}

impl<'a, M: RawMutex> SampleClock<'a, M> {
    pub const fn new(release: &'a Token<M>, period: Duration) -> Self {
        Self {
            release,
            period_ms: AtomicU32::new(period_millis(period)),
            running: AtomicBool::new(true),
        }
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(u64::from(self.period_ms.load(Ordering::Relaxed)))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stops further releases and withdraws an unconsumed one. A sample that
    /// already took its token runs to completion.
    pub fn cancel(&self) {
        self.running.store(false, Ordering::Release);
        self.release.reset();
    }

    /// Resumes releases with a new period, effective from the next expiry.
    pub fn restart(&self, period: Duration) {
        self.period_ms.store(period_millis(period), Ordering::Relaxed);
        self.running.store(true, Ordering::Release);
    }

    /// Handles one expiry.
    pub fn tick(&self) -> Tick {
        if !self.is_running() {
            return Tick::Cancelled;
        }
        if self.release.signaled() {
            status::record_tick_coalesced();
            return Tick::Coalesced;
        }
        self.release.signal(());
        Tick::Released
    }

    pub async fn run<C: Cadence>(&self, cadence: &mut C) -> ! {
        loop {
            cadence.wait_next(self.period()).await;
            if self.tick() == Tick::Coalesced {
                log_tick_coalesced();
            }
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn period_millis(period: Duration) -> u32 {
    let millis = period.as_millis();
    if millis > u32::MAX as u128 {
        u32::MAX
    } else {
        millis as u32
    }
}

#[cfg(target_os = "none")]
fn log_tick_coalesced() {
    defmt::debug!("clock: sampler still busy, tick absorbed");
}

#[cfg(not(target_os = "none"))]
fn log_tick_coalesced() {}

//! Alarm-source strategies for the charge-alarm task.
//!
//! Both strategies only decide *when* the driver should look at the chip;
//! [`super::CoulombCounter::poll_alarm`] and [`super::CoulombCounter::arm`]
//! carry the register protocol either way.

use core::time::Duration;

use crate::bus::{Delay, Level, LevelWait};
use crate::config::AlarmMode;

/// Why the alarm task woke up.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Wake {
    /// Fixed-cadence poll; the chip may or may not hold an alarm.
    Poll,
    /// The IRQ line asserted; an alarm is expected.
    Edge,
}

/// Suspends the alarm task until the chip is worth inspecting.
#[allow(async_fn_in_trait)]
pub trait AlarmSource {
    async fn next_alarm(&mut self) -> Wake;
}

/// Wakes every `interval`.
pub struct Polled<D> {
    delay: D,
    interval: Duration,
}

impl<D> Polled<D>
where
    D: Delay,
{
    pub const fn new(delay: D, interval: Duration) -> Self {
        Self { delay, interval }
    }
}

impl<D> AlarmSource for Polled<D>
where
    D: Delay,
{
    async fn next_alarm(&mut self) -> Wake {
        self.delay.delay(self.interval).await;
        Wake::Poll
    }
}

/// Waits on the level-sensitive IRQ line.
///
/// The line stays at a level until the chip is serviced, so the wait is
/// re-armed on the opposite level after each wake. Only the wake that moves
/// the watched level to high follows an asserted (active-low) IRQ.
pub struct EdgeNotified<P> {
    line: P,
    active: Level,
}

impl<P> EdgeNotified<P>
where
    P: LevelWait,
{
    pub const fn new(line: P) -> Self {
        Self {
            line,
            active: Level::Low,
        }
    }

    /// Level the next wait will watch for.
    pub fn active_level(&self) -> Level {
        self.active
    }
}

impl<P> AlarmSource for EdgeNotified<P>
where
    P: LevelWait,
{
    async fn next_alarm(&mut self) -> Wake {
        loop {
            self.line.wait_for_level(self.active).await;
            self.active = self.active.flipped();
            if self.active.is_high() {
                return Wake::Edge;
            }
        }
    }
}

/// Strategy chosen from [`AlarmMode`] at startup.
pub enum SelectedAlarmSource<D, P> {
    Polled(Polled<D>),
    EdgeNotified(EdgeNotified<P>),
}

impl<D, P> SelectedAlarmSource<D, P>
where
    D: Delay,
    P: LevelWait,
{
    pub fn from_mode(mode: AlarmMode, delay: D, line: P) -> Self {
        match mode {
            AlarmMode::Polled { interval } => Self::Polled(Polled::new(delay, interval)),
            AlarmMode::EdgeNotified => Self::EdgeNotified(EdgeNotified::new(line)),
        }
    }
}

impl<D, P> AlarmSource for SelectedAlarmSource<D, P>
where
    D: Delay,
    P: LevelWait,
{
    async fn next_alarm(&mut self) -> Wake {
        match self {
            Self::Polled(source) => source.next_alarm().await,
            Self::EdgeNotified(source) => source.next_alarm().await,
        }
    }
}

//! Charge-alarm handling.
//!
//! Startup configuration failures are fatal once the retry budget is spent.
//! In the steady state a failed poll or re-arm is logged and retried on the
//! next wake.

use meter_core::bus::RegisterBus;
use meter_core::coulomb::alarm::{AlarmSource, Wake};
use meter_core::coulomb::{
    AlarmReport, ChargeSink, CoulombCounter, DriverError, DriverState, OverflowKind,
};

/// Configures and arms the counter, retrying up to `attempts` times.
pub fn initialize<B>(counter: &mut CoulombCounter<B>, attempts: u8) -> Result<(), DriverError>
where
    B: RegisterBus,
{
    let mut last = DriverError::NotConfigured;
    for attempt in 1..=attempts.max(1) {
        match counter.configure_default().and_then(|()| counter.arm()) {
            Ok(()) => {
                log_configured(counter.config().prescaler, counter.config().alarm_level);
                return Ok(());
            }
            Err(err) => {
                log_init_failed(attempt, attempts, err);
                last = err;
            }
        }
    }
    Err(last)
}

pub struct ChargeMonitor<B, S, K> {
    counter: CoulombCounter<B>,
    source: S,
    sink: K,
}

impl<B, S, K> ChargeMonitor<B, S, K>
where
    B: RegisterBus,
    S: AlarmSource,
    K: ChargeSink,
{
    /// `counter` must already be configured.
    pub fn new(counter: CoulombCounter<B>, source: S, sink: K) -> Self {
        Self {
            counter,
            source,
            sink,
        }
    }

    /// Waits for the next wake and services the chip once.
    pub async fn step(&mut self) -> Result<AlarmReport, DriverError> {
        let wake = self.source.next_alarm().await;
        self.service(wake)
    }

    /// Services the chip for a wake that has already happened.
    pub fn service(&mut self, wake: Wake) -> Result<AlarmReport, DriverError> {
        if self.counter.state() != DriverState::Armed {
            self.counter.arm()?;
        }

        let report = self.counter.poll_alarm(&mut self.sink)?;
        match report {
            AlarmReport::Tripped => log_trip(self.counter.last_count()),
            AlarmReport::CountOverflow => log_overflow(OverflowKind::ChargeCount),
            AlarmReport::AconOverflow => log_overflow(OverflowKind::Acon),
            AlarmReport::NoAlarm => {}
        }

        if report.needs_rearm() || wake == Wake::Edge {
            self.counter.arm()?;
        }
        Ok(report)
    }

    pub async fn run(&mut self) -> ! {
        loop {
            if let Err(err) = self.step().await {
                log_service_failed(err);
            }
        }
    }

    pub fn counter_mut(&mut self) -> &mut CoulombCounter<B> {
        &mut self.counter
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }
}

#[cfg(target_os = "none")]
fn log_configured(prescaler: u8, alarm_level: u8) {
    defmt::info!(
        "charge: counter configured prescaler={=u8:#x} alarm_level={=u8}",
        prescaler,
        alarm_level
    );
}

#[cfg(not(target_os = "none"))]
fn log_configured(_: u8, _: u8) {}

#[cfg(target_os = "none")]
fn log_init_failed(attempt: u8, budget: u8, err: DriverError) {
    defmt::error!(
        "charge: counter init failed (attempt {} of {}): {}",
        attempt,
        budget,
        defmt::Display2Format(&err)
    );
}

#[cfg(not(target_os = "none"))]
fn log_init_failed(attempt: u8, budget: u8, err: DriverError) {
    println!("charge: counter init failed (attempt {attempt} of {budget}): {err}");
}

#[cfg(target_os = "none")]
fn log_trip(count: u8) {
    defmt::debug!("charge: trip accounted (C={=u8})", count);
}

#[cfg(not(target_os = "none"))]
fn log_trip(_: u8) {}

#[cfg(target_os = "none")]
fn log_overflow(kind: OverflowKind) {
    defmt::warn!("charge: ERROR {} has occurred", kind.label());
}

#[cfg(not(target_os = "none"))]
fn log_overflow(kind: OverflowKind) {
    println!("charge: ERROR {} has occurred", kind.label());
}

#[cfg(target_os = "none")]
fn log_service_failed(err: DriverError) {
    defmt::warn!("charge: alarm service failed ({})", defmt::Display2Format(&err));
}

#[cfg(not(target_os = "none"))]
fn log_service_failed(err: DriverError) {
    println!("charge: alarm service failed ({err})");
}

#[cfg(test)]
mod tests {
    use super::*;
    use meter_core::bus::BusError;
    use meter_core::config::CounterConfig;
    use meter_core::coulomb::{ALARM_ACON_OVERFLOW, Register};
    use meter_core::record::ChargeTally;
    use meter_core::sim::SimulatedCounterChip;

    struct NeverWakes;

    impl AlarmSource for NeverWakes {
        async fn next_alarm(&mut self) -> Wake {
            core::future::pending().await
        }
    }

    fn monitor() -> ChargeMonitor<SimulatedCounterChip, NeverWakes, ChargeTally> {
        let mut counter =
            CoulombCounter::new(SimulatedCounterChip::new(), CounterConfig::default());
        initialize(&mut counter, 1).unwrap();
        ChargeMonitor::new(counter, NeverWakes, ChargeTally::new())
    }

    #[test]
    fn initialize_retries_within_budget() {
        let mut counter =
            CoulombCounter::new(SimulatedCounterChip::new(), CounterConfig::default());
        counter.bus_mut().fail_next(BusError::Nack);

        assert_eq!(initialize(&mut counter, 2), Ok(()));
        assert_eq!(counter.state(), DriverState::Armed);
    }

    #[test]
    fn initialize_gives_up_after_budget() {
        let mut counter =
            CoulombCounter::new(SimulatedCounterChip::new(), CounterConfig::default());
        counter.bus_mut().fail_next(BusError::Nack);

        assert_eq!(
            initialize(&mut counter, 1),
            Err(DriverError::Bus(BusError::Nack))
        );
    }

    #[test]
    fn polled_trip_is_counted_and_rearmed() {
        let mut monitor = monitor();
        monitor.counter_mut().bus_mut().trip();

        assert_eq!(monitor.service(Wake::Poll), Ok(AlarmReport::Tripped));
        assert_eq!(monitor.counter_mut().state(), DriverState::Armed);
        assert_eq!(monitor.counter_mut().bus_mut().register(Register::D), 0);
        assert_eq!(monitor.service(Wake::Poll), Ok(AlarmReport::NoAlarm));
        assert_eq!(monitor.sink().trips, 1);
    }

    #[test]
    fn quiet_poll_issues_no_register_e_writes() {
        let mut monitor = monitor();
        monitor.counter_mut().bus_mut().clear_log();

        assert_eq!(monitor.service(Wake::Poll), Ok(AlarmReport::NoAlarm));
        assert!(monitor.counter_mut().bus_mut().writes().is_empty());
    }

    #[test]
    fn edge_wake_always_rearms() {
        let mut monitor = monitor();
        monitor.counter_mut().bus_mut().clear_log();

        assert_eq!(monitor.service(Wake::Edge), Ok(AlarmReport::NoAlarm));
        let e_writes = monitor
            .counter_mut()
            .bus_mut()
            .writes()
            .iter()
            .filter(|(register, _)| *register == Register::E.address())
            .count();
        assert_eq!(e_writes, 2);
    }

    #[test]
    fn pending_alarm_is_rearmed_before_next_poll() {
        let mut monitor = monitor();
        let mut stray = ChargeTally::new();
        monitor.counter_mut().bus_mut().trip();
        monitor.counter_mut().poll_alarm(&mut stray).unwrap();
        assert_eq!(monitor.counter_mut().state(), DriverState::AlarmPending);

        assert_eq!(monitor.service(Wake::Poll), Ok(AlarmReport::NoAlarm));
        assert_eq!(monitor.counter_mut().state(), DriverState::Armed);
        assert_eq!(monitor.sink().trips, 0);
    }

    #[test]
    fn bus_failure_is_surfaced_and_next_wake_recovers() {
        let mut monitor = monitor();
        monitor.counter_mut().bus_mut().fail_next(BusError::Timeout);
        assert_eq!(
            monitor.service(Wake::Poll),
            Err(DriverError::Bus(BusError::Timeout))
        );

        monitor.counter_mut().bus_mut().raise(ALARM_ACON_OVERFLOW);
        assert_eq!(monitor.service(Wake::Poll), Ok(AlarmReport::AconOverflow));
        assert!(monitor.sink().flags.acon_overflow);

        monitor.counter_mut().bus_mut().trip();
        assert_eq!(monitor.service(Wake::Poll), Ok(AlarmReport::Tripped));
        assert_eq!(monitor.sink().trips, 1);
    }
}

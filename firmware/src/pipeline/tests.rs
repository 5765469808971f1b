use core::task::Poll;
use core::time::Duration;

use embassy_futures::join::join;
use embassy_futures::{block_on, poll_once};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use heapless::Vec;
use meter_core::bus::{AdcTransfer, Delay, Level};
use meter_core::config::{AlarmMode, CounterConfig};
use meter_core::coulomb::alarm::SelectedAlarmSource;
use meter_core::coulomb::{ALARM_COUNT_OVERFLOW, AlarmReport, ChargeSink, CoulombCounter};
use meter_core::payload::SendEnvelope;
use meter_core::sim::SimulatedCounterChip;

use super::PipelineSignals;
use super::charge::{ChargeMonitor, initialize};
use super::clock::{SampleClock, Tick};
use super::reporter::ReportSender;
use super::sampler::PowerGatedSampler;
use super::supply::SenseSupply;
use super::testing::{
    Event, EventLog, InstantLine, RecordingDelay, RecordingLine, RecordingTransport, ScriptedAdc,
    line_levels, sent,
};
use crate::record::SharedRecord;

const PERIOD: Duration = Duration::from_millis(1_000);
const SETTLE: Duration = Duration::from_millis(450);

type Signals = PipelineSignals<NoopRawMutex>;
type Supply<'a> = SenseSupply<'a, NoopRawMutex, RecordingLine<'a>>;

fn sampler<'a>(
    signals: &'a Signals,
    supply: &'a Supply<'a>,
    record: &'a SharedRecord<NoopRawMutex>,
    log: &'a EventLog,
    script: &[Option<[u8; 2]>],
) -> PowerGatedSampler<'a, NoopRawMutex, RecordingLine<'a>, ScriptedAdc<'a>, RecordingDelay<'a>> {
    let (writer, _) = record.writers().unwrap();
    PowerGatedSampler::new(
        &signals.sample_release,
        &signals.report_ready,
        supply,
        writer,
        ScriptedAdc::new(log, script),
        RecordingDelay::new(log),
        SETTLE,
        AdcTransfer::default(),
    )
}

fn reporter<'a>(
    signals: &'a Signals,
    supply: &'a Supply<'a>,
    record: &'a SharedRecord<NoopRawMutex>,
    log: &'a EventLog,
    refuse: &'a [usize],
) -> ReportSender<'a, NoopRawMutex, RecordingLine<'a>, RecordingTransport<'a>> {
    ReportSender::new(
        &signals.report_ready,
        &signals.services_ready,
        supply,
        record.reader(),
        RecordingTransport::new(log, refuse),
        SendEnvelope::default(),
    )
}

#[test]
fn end_to_end_sample_reaches_wire_unswapped() {
    let log = EventLog::new(Vec::new());
    let signals = Signals::new();
    let record = SharedRecord::<NoopRawMutex>::new();
    let supply = Supply::new(RecordingLine::new(&log), &signals.supply_released);
    supply.init().unwrap();
    signals.prime();
    signals.services_ready.signal(());

    let mut sampler = sampler(&signals, &supply, &record, &log, &[Some([0x12, 0x34])]);
    let mut reporter = reporter(&signals, &supply, &record, &log, &[]);

    // Primed report goes out first with the zeroed record.
    block_on(reporter.run_once()).unwrap();
    assert_eq!(block_on(sampler.run_cycle()), 0x1234);

    let payload = block_on(reporter.run_once()).unwrap();
    assert_eq!(payload.sample, 0x1234);
    assert_eq!(payload.charge, 0);
    assert_eq!(sent(&log).as_slice(), &[[0, 0, 0], [0x12, 0x34, 0]]);
    assert!(log.borrow().contains(&Event::Delay(SETTLE)));
}

#[test]
fn report_carries_charge_held_at_read_time() {
    let log = EventLog::new(Vec::new());
    let signals = Signals::new();
    let record = SharedRecord::<NoopRawMutex>::new();
    let supply = Supply::new(RecordingLine::new(&log), &signals.supply_released);
    signals.prime();
    signals.services_ready.signal(());

    let (mut sample_writer, mut charge_writer) = record.writers().unwrap();
    let mut reporter = reporter(&signals, &supply, &record, &log, &[]);

    sample_writer.write(-5);
    for _ in 0..200 {
        charge_writer.record_trip();
    }

    let payload = block_on(reporter.run_once()).unwrap();
    assert_eq!(payload.sample, -5);
    assert_eq!(payload.charge, 200);
    assert_eq!(sent(&log).as_slice(), &[[0xFF, 0xFB, 200]]);
}

#[test]
fn enable_line_strictly_alternates_and_reads_precede_power_down() {
    const CYCLES: usize = 6;

    let log = EventLog::new(Vec::new());
    let signals = Signals::new();
    let record = SharedRecord::<NoopRawMutex>::new();
    let supply = Supply::new(RecordingLine::new(&log), &signals.supply_released);
    let clock = SampleClock::new(&signals.sample_release, PERIOD);
    supply.init().unwrap();
    signals.prime();
    signals.services_ready.signal(());

    let mut sampler = sampler(&signals, &supply, &record, &log, &[]);
    let mut reporter = reporter(&signals, &supply, &record, &log, &[]);

    let sampling = async {
        for _ in 0..CYCLES {
            clock.tick();
            sampler.run_cycle().await;
        }
    };
    let reporting = async {
        for _ in 0..=CYCLES {
            let _ = reporter.run_once().await;
        }
    };
    block_on(join(sampling, reporting));

    let levels = line_levels(&log);
    assert_eq!(levels.len(), 2 * CYCLES + 1);
    for (index, level) in levels.iter().enumerate() {
        let expected = if index % 2 == 0 { Level::Low } else { Level::High };
        assert_eq!(*level, expected, "transition {index}");
    }

    // Between every power-up and the following power-down: settle, then read.
    let events = log.borrow();
    let mut powered = false;
    let mut settled = false;
    let mut read = false;
    for event in events.iter() {
        match event {
            Event::Line(Level::High) => {
                powered = true;
                settled = false;
                read = false;
            }
            Event::Delay(duration) if powered => {
                assert_eq!(*duration, SETTLE);
                assert!(!read, "settle after read");
                settled = true;
            }
            Event::Read { .. } => {
                assert!(powered && settled, "read before settle");
                read = true;
            }
            Event::Line(Level::Low) if powered => {
                assert!(read, "power-down before read completed");
                powered = false;
            }
            _ => {}
        }
    }
    assert_eq!(sent(&log).len(), CYCLES + 1);
}

#[test]
fn failed_transfer_does_not_stall_following_cycles() {
    const FURTHER: usize = 5;

    let log = EventLog::new(Vec::new());
    let signals = Signals::new();
    let record = SharedRecord::<NoopRawMutex>::new();
    let supply = Supply::new(RecordingLine::new(&log), &signals.supply_released);
    let clock = SampleClock::new(&signals.sample_release, PERIOD);
    signals.prime();
    signals.services_ready.signal(());

    let script = [
        Some([0x01, 0x00]),
        None,
        Some([0x02, 0x00]),
        Some([0x03, 0x00]),
        Some([0x04, 0x00]),
        Some([0x05, 0x00]),
        Some([0x06, 0x00]),
    ];
    let mut sampler = sampler(&signals, &supply, &record, &log, &script);
    let mut reporter = reporter(&signals, &supply, &record, &log, &[]);

    let mut samples: Vec<i16, 8> = Vec::new();
    block_on(reporter.run_once()).unwrap();
    for _ in 0..(2 + FURTHER) {
        clock.tick();
        samples.push(block_on(sampler.run_cycle())).unwrap();
        block_on(reporter.run_once()).unwrap();
    }

    // The failed read re-publishes the stale buffer.
    assert_eq!(
        samples.as_slice(),
        &[0x0100, 0x0100, 0x0200, 0x0300, 0x0400, 0x0500, 0x0600]
    );
    assert_eq!(sent(&log).len(), 2 + FURTHER + 1);
    assert!(crate::status::snapshot(record.reader().charge()).sample_failures >= 1);
}

#[test]
fn refused_send_is_dropped_and_next_cycle_sends_fresh_record() {
    let log = EventLog::new(Vec::new());
    let signals = Signals::new();
    let record = SharedRecord::<NoopRawMutex>::new();
    let supply = Supply::new(RecordingLine::new(&log), &signals.supply_released);
    signals.prime();
    signals.services_ready.signal(());

    let mut sampler = sampler(
        &signals,
        &supply,
        &record,
        &log,
        &[Some([0x00, 0x10]), Some([0x00, 0x20])],
    );
    let mut reporter = reporter(&signals, &supply, &record, &log, &[1]);

    block_on(reporter.run_once()).unwrap();
    block_on(sampler.run_cycle());
    assert!(block_on(reporter.run_once()).is_err());

    signals.sample_release.signal(());
    block_on(sampler.run_cycle());
    block_on(reporter.run_once()).unwrap();

    assert_eq!(sent(&log).as_slice(), &[[0, 0, 0], [0x00, 0x20, 0]]);
    assert!(log.borrow().contains(&Event::SendRefused));
}

#[test]
fn reporter_waits_for_network_services_once() {
    let log = EventLog::new(Vec::new());
    let signals = Signals::new();
    let record = SharedRecord::<NoopRawMutex>::new();
    let supply = Supply::new(RecordingLine::new(&log), &signals.supply_released);
    signals.prime();

    let mut reporter = reporter(&signals, &supply, &record, &log, &[]);

    assert!(matches!(poll_once(reporter.run_once()), Poll::Pending));
    assert!(line_levels(&log).is_empty());

    signals.services_ready.signal(());
    block_on(reporter.run_once()).unwrap();
    assert_eq!(line_levels(&log).as_slice(), &[Level::Low]);

    // The gate is not consulted again.
    assert!(!signals.services_ready.signaled());
    signals.report_ready.signal(());
    block_on(reporter.run_once()).unwrap();
    assert_eq!(sent(&log).len(), 2);
}

#[test]
fn sampler_waits_for_clock_release() {
    let log = EventLog::new(Vec::new());
    let signals = Signals::new();
    let record = SharedRecord::<NoopRawMutex>::new();
    let supply = Supply::new(RecordingLine::new(&log), &signals.supply_released);
    let clock = SampleClock::new(&signals.sample_release, PERIOD);

    let mut sampler = sampler(&signals, &supply, &record, &log, &[Some([0, 1])]);

    assert!(matches!(poll_once(sampler.sample()), Poll::Pending));
    assert!(log.borrow().is_empty());

    assert_eq!(clock.tick(), Tick::Released);
    signals.supply_released.signal(());
    assert_eq!(block_on(sampler.sample()), 1);
    assert_eq!(
        log.borrow().as_slice(),
        &[
            Event::Line(Level::High),
            Event::Delay(SETTLE),
            Event::Read { ok: true }
        ]
    );
}

/// Settle wait that cancels the clock while the sample is in flight.
struct CancelDuringSettle<'a> {
    clock: &'a SampleClock<'a, NoopRawMutex>,
    log: &'a EventLog,
}

impl Delay for CancelDuringSettle<'_> {
    async fn delay(&mut self, duration: Duration) {
        self.clock.cancel();
        self.log.borrow_mut().push(Event::Delay(duration)).unwrap();
    }
}

#[test]
fn cancel_mid_sample_finishes_cycle_and_withholds_next_release() {
    let log = EventLog::new(Vec::new());
    let signals = Signals::new();
    let record = SharedRecord::<NoopRawMutex>::new();
    let supply = Supply::new(RecordingLine::new(&log), &signals.supply_released);
    let clock = SampleClock::new(&signals.sample_release, PERIOD);
    signals.prime();
    signals.services_ready.signal(());

    let (writer, _) = record.writers().unwrap();
    let mut sampler = PowerGatedSampler::new(
        &signals.sample_release,
        &signals.report_ready,
        &supply,
        writer,
        ScriptedAdc::new(&log, &[Some([0x0A, 0x0B])]),
        CancelDuringSettle {
            clock: &clock,
            log: &log,
        },
        SETTLE,
        AdcTransfer::default(),
    );
    let mut reporter = reporter(&signals, &supply, &record, &log, &[]);

    block_on(reporter.run_once()).unwrap();
    assert_eq!(block_on(sampler.run_cycle()), 0x0A0B);
    assert!(!clock.is_running());

    let payload = block_on(reporter.run_once()).unwrap();
    assert_eq!(payload.sample, 0x0A0B);
    assert_eq!(sent(&log).as_slice(), &[[0, 0, 0], [0x0A, 0x0B, 0]]);

    // The cancel landed after the release was taken and before the read.
    let events = log.borrow().clone();
    let settle = events
        .iter()
        .position(|event| *event == Event::Delay(SETTLE))
        .unwrap();
    assert_eq!(events[settle + 1], Event::Read { ok: true });

    assert_eq!(clock.tick(), Tick::Cancelled);
    assert!(poll_once(sampler.sample()).is_pending());
    assert_eq!(sent(&log).len(), 2);

    clock.restart(PERIOD);
    assert_eq!(clock.tick(), Tick::Released);
    assert_eq!(block_on(sampler.run_cycle()), 0);
}

#[test]
fn alarm_trips_reach_the_report_through_the_record() {
    const POLL: Duration = Duration::from_millis(250);

    for mode in [AlarmMode::Polled { interval: POLL }, AlarmMode::EdgeNotified] {
        let log = EventLog::new(Vec::new());
        let signals = Signals::new();
        let record = SharedRecord::<NoopRawMutex>::new();
        let supply = Supply::new(RecordingLine::new(&log), &signals.supply_released);
        signals.prime();
        signals.services_ready.signal(());

        let mut counter =
            CoulombCounter::new(SimulatedCounterChip::new(), CounterConfig::default());
        initialize(&mut counter, 1).unwrap();
        let (_, charge_writer) = record.writers().unwrap();
        let source = SelectedAlarmSource::from_mode(mode, RecordingDelay::new(&log), InstantLine);
        let mut monitor = ChargeMonitor::new(counter, source, charge_writer);

        for _ in 0..3 {
            monitor.counter_mut().bus_mut().trip();
            assert_eq!(block_on(monitor.step()), Ok(AlarmReport::Tripped));
        }
        assert_eq!(block_on(monitor.step()), Ok(AlarmReport::NoAlarm));
        monitor
            .counter_mut()
            .bus_mut()
            .raise(ALARM_COUNT_OVERFLOW);
        assert_eq!(block_on(monitor.step()), Ok(AlarmReport::CountOverflow));

        let mut reporter = reporter(&signals, &supply, &record, &log, &[]);
        let payload = block_on(reporter.run_once()).unwrap();
        assert_eq!(payload.charge, 3, "{mode:?}");
        assert_eq!(sent(&log).as_slice(), &[[0, 0, 3]]);
        assert!(record.reader().charge().flags.count_overflow);

        let polls = log
            .borrow()
            .iter()
            .filter(|event| **event == Event::Delay(POLL))
            .count();
        let expected = if matches!(mode, AlarmMode::Polled { .. }) { 5 } else { 0 };
        assert_eq!(polls, expected, "{mode:?}");
    }
}

//! Instrumented doubles for the pipeline's hardware seams.

use core::cell::RefCell;
use core::time::Duration;

use heapless::Vec;
use meter_core::bus::{
    AdcTransfer, BusError, Delay, EnableLine, Level, LevelWait, PinConfig, SAMPLE_LEN, SampleBus,
};

use super::reporter::{ReportTransport, SendError};

pub const EVENT_DEPTH: usize = 256;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Event {
    Configured(Level),
    Line(Level),
    Delay(Duration),
    Read { ok: bool },
    Sent([u8; 3]),
    SendRefused,
}

pub type EventLog = RefCell<Vec<Event, EVENT_DEPTH>>;

fn push(log: &EventLog, event: Event) {
    log.borrow_mut().push(event).unwrap();
}

pub struct RecordingLine<'a> {
    log: &'a EventLog,
}

impl<'a> RecordingLine<'a> {
    pub fn new(log: &'a EventLog) -> Self {
        Self { log }
    }
}

impl EnableLine for RecordingLine<'_> {
    fn configure(&mut self, config: PinConfig) -> Result<(), BusError> {
        push(self.log, Event::Configured(config.initial));
        Ok(())
    }

    fn set_level(&mut self, level: Level) -> Result<(), BusError> {
        push(self.log, Event::Line(level));
        Ok(())
    }
}

pub struct RecordingDelay<'a> {
    log: &'a EventLog,
}

impl<'a> RecordingDelay<'a> {
    pub fn new(log: &'a EventLog) -> Self {
        Self { log }
    }
}

impl Delay for RecordingDelay<'_> {
    async fn delay(&mut self, duration: Duration) {
        push(self.log, Event::Delay(duration));
    }
}

/// IRQ line that is already at whatever level is awaited.
pub struct InstantLine;

impl LevelWait for InstantLine {
    async fn wait_for_level(&mut self, _level: Level) {}
}

/// ADC returning scripted readings; a `None` entry fails that transfer and
/// leaves the buffer untouched.
pub struct ScriptedAdc<'a> {
    log: &'a EventLog,
    script: Vec<Option<[u8; SAMPLE_LEN]>, 32>,
    next: usize,
}

impl<'a> ScriptedAdc<'a> {
    pub fn new(log: &'a EventLog, script: &[Option<[u8; SAMPLE_LEN]>]) -> Self {
        Self {
            log,
            script: Vec::from_slice(script).unwrap(),
            next: 0,
        }
    }
}

impl SampleBus for ScriptedAdc<'_> {
    fn transfer(
        &mut self,
        _request: AdcTransfer,
        rx: &mut [u8; SAMPLE_LEN],
    ) -> Result<(), BusError> {
        let entry = self.script.get(self.next).copied().unwrap_or(Some([0, 0]));
        self.next += 1;
        push(self.log, Event::Read { ok: entry.is_some() });
        match entry {
            Some(bytes) => {
                *rx = bytes;
                Ok(())
            }
            None => Err(BusError::Timeout),
        }
    }
}

/// Transport that records payload bytes and refuses the sends listed in
/// `refuse` (zero-based send index).
pub struct RecordingTransport<'a> {
    log: &'a EventLog,
    refuse: &'a [usize],
    sends: usize,
}

impl<'a> RecordingTransport<'a> {
    pub fn new(log: &'a EventLog, refuse: &'a [usize]) -> Self {
        Self {
            log,
            refuse,
            sends: 0,
        }
    }
}

impl ReportTransport for RecordingTransport<'_> {
    async fn send(&mut self, frame: &[u8]) -> Result<(), SendError> {
        let index = self.sends;
        self.sends += 1;
        if self.refuse.contains(&index) {
            push(self.log, Event::SendRefused);
            return Err(SendError::Rejected(0x05));
        }

        let mut payload = [0u8; 3];
        payload.copy_from_slice(&frame[frame.len() - 3..]);
        push(self.log, Event::Sent(payload));
        Ok(())
    }
}

/// Enable-line levels in the order they were driven.
pub fn line_levels(log: &EventLog) -> Vec<Level, EVENT_DEPTH> {
    log.borrow()
        .iter()
        .filter_map(|event| match event {
            Event::Line(level) => Some(*level),
            _ => None,
        })
        .collect()
}

/// Payloads delivered to the transport.
pub fn sent(log: &EventLog) -> Vec<[u8; 3], EVENT_DEPTH> {
    log.borrow()
        .iter()
        .filter_map(|event| match event {
            Event::Sent(payload) => Some(*payload),
            _ => None,
        })
        .collect()
}

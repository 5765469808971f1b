//! Line-oriented bench console.
//!
//! Bytes arrive one at a time from the console UART. A carriage return or line
//! feed submits the buffered line to the [`BenchExecutor`]; backspace edits the
//! buffer. Every submitted line yields exactly one reply.

use core::fmt::Write as _;
use core::str;

use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::{String, Vec};
use meter_core::bench::{BenchExecutor, BenchOutcome};
use meter_core::bus::RegisterBus;

use crate::record::RecordReader;
use crate::status;

/// Maximum number of bytes accepted on a single line (excluding terminator).
pub const MAX_LINE_LEN: usize = 96;

pub const REPLY_CAPACITY: usize = 320;

pub type Reply = String<REPLY_CAPACITY>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConsoleError {
    /// The submitted line was not valid UTF-8.
    InvalidUtf8,
    /// Input exceeded [`MAX_LINE_LEN`]; the partial line was discarded.
    LineOverflow,
}

pub struct ConsoleSession<'a, M: RawMutex, R> {
    executor: BenchExecutor<R>,
    reader: RecordReader<'a, M>,
    buffer: Vec<u8, MAX_LINE_LEN>,
}

impl<'a, M, R> ConsoleSession<'a, M, R>
where
    M: RawMutex,
    R: RegisterBus,
{
    pub fn new(executor: BenchExecutor<R>, reader: RecordReader<'a, M>) -> Self {
        Self {
            executor,
            reader,
            buffer: Vec::new(),
        }
    }

    /// Feeds one byte. Returns the reply once a non-empty line completes.
    pub fn ingest(&mut self, byte: u8) -> Result<Option<Reply>, ConsoleError> {
        match byte {
            b'\r' | b'\n' => self.process_line(),
            0x08 | 0x7f => {
                self.buffer.pop();
                Ok(None)
            }
            value => {
                if self.buffer.push(value).is_err() {
                    self.buffer.clear();
                    return Err(ConsoleError::LineOverflow);
                }
                Ok(None)
            }
        }
    }

    pub fn executor_mut(&mut self) -> &mut BenchExecutor<R> {
        &mut self.executor
    }

    fn process_line(&mut self) -> Result<Option<Reply>, ConsoleError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        let line = match str::from_utf8(self.buffer.as_slice()) {
            Ok(line) => line,
            Err(_) => {
                self.buffer.clear();
                return Err(ConsoleError::InvalidUtf8);
            }
        };

        let mut reply = Reply::new();
        // Replies are truncated at capacity.
        let _ = match self.executor.execute(line) {
            Ok(BenchOutcome::Status) => {
                write!(reply, "{}", status::snapshot(self.reader.charge()))
            }
            Ok(outcome) => write!(reply, "{outcome}"),
            Err(err) => write!(reply, "{err}"),
        };
        self.buffer.clear();
        Ok(Some(reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use meter_core::coulomb::{ChargeSink, Register};
    use meter_core::sim::SimulatedCounterChip;

    use crate::bus::SharedRegisterBus;
    use crate::record::SharedRecord;

    fn feed<M: RawMutex, R: RegisterBus>(
        session: &mut ConsoleSession<'_, M, R>,
        input: &[u8],
    ) -> Option<Reply> {
        let mut last = None;
        for byte in input {
            if let Some(reply) = session.ingest(*byte).unwrap() {
                last = Some(reply);
            }
        }
        last
    }

    #[test]
    fn register_commands_round_trip_through_the_chip() {
        let record = SharedRecord::<NoopRawMutex>::new();
        let mut session = ConsoleSession::new(
            BenchExecutor::new(SimulatedCounterChip::new()),
            record.reader(),
        );

        let reply = feed(&mut session, b"regset c 0x2a\r").unwrap();
        assert_eq!(reply.as_str(), "reg C <- 0x2a");
        let reply = feed(&mut session, b"regget C\n").unwrap();
        assert_eq!(reply.as_str(), "reg C = 0x2a (42)");
        assert_eq!(
            session.executor_mut().bus().register(Register::C),
            0x2A
        );
    }

    #[test]
    fn status_renders_current_charge() {
        let record = SharedRecord::<NoopRawMutex>::new();
        let (_, mut charge) = record.writers().unwrap();
        charge.record_trip();
        charge.record_trip();
        let mut session = ConsoleSession::new(
            BenchExecutor::new(SimulatedCounterChip::new()),
            record.reader(),
        );

        let reply = feed(&mut session, b"status\n").unwrap();
        assert!(reply.contains("charge=2 trips=2"));
    }

    #[test]
    fn closed_bus_is_reported() {
        let shared = SharedRegisterBus::<NoopRawMutex, SimulatedCounterChip>::new();
        let record = SharedRecord::<NoopRawMutex>::new();
        let mut session = ConsoleSession::new(BenchExecutor::new(shared.handle()), record.reader());

        let reply = feed(&mut session, b"regget D\n").unwrap();
        assert_eq!(reply.as_str(), "error: i2c not open");
    }

    #[test]
    fn backspace_edits_and_blank_lines_are_silent() {
        let record = SharedRecord::<NoopRawMutex>::new();
        let mut session = ConsoleSession::new(
            BenchExecutor::new(SimulatedCounterChip::new()),
            record.reader(),
        );

        assert!(feed(&mut session, b"\r\n").is_none());
        let reply = feed(&mut session, b"helpx\x7f\n").unwrap();
        assert!(reply.starts_with("regget"));
    }

    #[test]
    fn overflow_discards_the_line() {
        let record = SharedRecord::<NoopRawMutex>::new();
        let mut session = ConsoleSession::new(
            BenchExecutor::new(SimulatedCounterChip::new()),
            record.reader(),
        );

        for _ in 0..MAX_LINE_LEN {
            assert_eq!(session.ingest(b'a'), Ok(None));
        }
        assert_eq!(session.ingest(b'b'), Err(ConsoleError::LineOverflow));

        let reply = feed(&mut session, b"help\n").unwrap();
        assert!(reply.starts_with("regget"));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let record = SharedRecord::<NoopRawMutex>::new();
        let mut session = ConsoleSession::new(
            BenchExecutor::new(SimulatedCounterChip::new()),
            record.reader(),
        );

        assert_eq!(session.ingest(0xFF), Ok(None));
        assert_eq!(session.ingest(b'\n'), Err(ConsoleError::InvalidUtf8));
        assert!(feed(&mut session, b"\n").is_none());
    }
}

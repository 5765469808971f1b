use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant as HostInstant};

use meter_core::bench::{BenchError, BenchExecutor, BenchOutcome, HELP_TOPICS as BENCH_TOPICS};
use meter_core::config::CounterConfig;
use meter_core::coulomb::{
    ALARM_ACON_OVERFLOW, ALARM_COUNT_OVERFLOW, AlarmReport, CoulombCounter, DriverError,
    DriverState, Register,
};
use meter_core::payload::convert::{charge_percent, current_amps};
use meter_core::payload::{PAYLOAD_LEN, ReportPayload};
use meter_core::record::ChargeTally;
use meter_core::sim::SimulatedCounterChip;

/// Commands handled by the emulator itself rather than the bench executor.
pub const EMULATOR_TOPICS: &[(&str, &str)] = &[
    ("trip", "trip [count]              - latch the alarm and service it"),
    ("raise", "raise <cc|acon>           - latch an overflow bit and service it"),
    ("poll", "poll                      - service the alarm once"),
    ("decode", "decode <hex6> [scale]     - convert a received payload"),
];

const MAX_TRIPS_PER_COMMAND: u32 = 10_000;

pub struct Session {
    counter: CoulombCounter<SimulatedCounterChip>,
    tally: ChargeTally,
    transcript: Option<TranscriptLogger>,
    started_at: HostInstant,
}

impl Session {
    /// Starts a session with a configured, armed counter.
    pub fn new(transcript: Option<&Path>) -> io::Result<Self> {
        let transcript = transcript.map(TranscriptLogger::new).transpose()?;
        let mut counter =
            CoulombCounter::new(SimulatedCounterChip::new(), CounterConfig::default());
        counter
            .configure_default()
            .and_then(|()| counter.arm())
            .map_err(driver_io_error)?;

        Ok(Self {
            counter,
            tally: ChargeTally::new(),
            transcript,
            started_at: HostInstant::now(),
        })
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let elapsed = self.started_at.elapsed();
        self.log(elapsed, Entry::Command(trimmed))?;

        let mut words = trimmed.split_whitespace();
        let keyword = words.next().unwrap_or_default().to_ascii_lowercase();
        let args: Vec<&str> = words.collect();

        let lines = match keyword.as_str() {
            "trip" => self.handle_trip(&args),
            "raise" => self.handle_raise(&args),
            "poll" => vec![self.service()],
            "decode" => match parse_decode_args(&args) {
                Ok((payload, scale)) => {
                    self.log(elapsed, Entry::Payload(&payload))?;
                    decoded_lines(&payload, scale)
                }
                Err(message) => vec![message],
            },
            _ => self.handle_bench(trimmed),
        };

        for line in &lines {
            self.log(elapsed, Entry::Reply(line))?;
        }
        Ok(lines)
    }

    fn log(&mut self, elapsed: Duration, entry: Entry<'_>) -> io::Result<()> {
        match self.transcript.as_mut() {
            Some(transcript) => transcript.append(elapsed, entry),
            None => Ok(()),
        }
    }

    fn handle_bench(&mut self, line: &str) -> Vec<String> {
        let mut executor = BenchExecutor::new(self.counter.bus_mut());
        match executor.execute(line) {
            Ok(BenchOutcome::Status) => self.status_lines(),
            Ok(BenchOutcome::Help) => help_lines(),
            Ok(outcome) => vec![outcome.to_string()],
            Err(err @ BenchError::Parse(_)) => vec![err.to_string(), "type `help`".to_string()],
            Err(err) => vec![err.to_string()],
        }
    }

    fn handle_trip(&mut self, args: &[&str]) -> Vec<String> {
        let count = match args.first() {
            None => 1,
            Some(value) => match value.parse::<u32>() {
                Ok(count) if (1..=MAX_TRIPS_PER_COMMAND).contains(&count) => count,
                _ => {
                    return vec![format!(
                        "error: trip count must be 1..={MAX_TRIPS_PER_COMMAND}"
                    )];
                }
            },
        };

        let mut lines = Vec::new();
        for _ in 0..count {
            self.counter.bus_mut().trip();
            let line = self.service();
            if count == 1 || line.starts_with("error") {
                lines.push(line);
            }
        }
        lines.push(format!(
            "charge={} trips={}",
            self.tally.wire_count(),
            self.tally.trips
        ));
        lines
    }

    fn handle_raise(&mut self, args: &[&str]) -> Vec<String> {
        let bits = match args.first().map(|arg| arg.to_ascii_lowercase()) {
            Some(kind) if kind == "cc" => ALARM_COUNT_OVERFLOW,
            Some(kind) if kind == "acon" => ALARM_ACON_OVERFLOW,
            _ => return vec!["error: expected `cc` or `acon`".to_string()],
        };
        self.counter.bus_mut().raise(bits);
        vec![self.service()]
    }

    /// Polls the counter once and re-arms it when the alarm was handled.
    fn service(&mut self) -> String {
        if self.counter.state() != DriverState::Armed {
            if let Err(err) = self.counter.arm() {
                return format!("error: re-arm failed: {err}");
            }
        }

        let report = match self.counter.poll_alarm(&mut self.tally) {
            Ok(report) => report,
            Err(err) => return format!("error: poll failed: {err}"),
        };

        if report.needs_rearm() {
            if let Err(err) = self.counter.arm() {
                return format!("error: re-arm failed: {err}");
            }
        }

        match report {
            AlarmReport::Tripped => format!("tripped at C={}", self.counter.last_count()),
            AlarmReport::CountOverflow => "ERROR CC overflow has occurred".to_string(),
            AlarmReport::AconOverflow => "ERROR ACON overflow has occurred".to_string(),
            AlarmReport::NoAlarm => "no alarm".to_string(),
        }
    }

    fn status_lines(&self) -> Vec<String> {
        let chip = self.counter.bus();
        let mut flags = Vec::new();
        if self.tally.flags.saturated {
            flags.push("saturated");
        }
        if self.tally.flags.count_overflow {
            flags.push("cc-overflow");
        }
        if self.tally.flags.acon_overflow {
            flags.push("acon-overflow");
        }

        vec![
            format!("driver={:?}", self.counter.state()),
            format!(
                "A={:#04x} B={} C={} D={:#04x} E={:#04x}",
                chip.register(Register::A),
                chip.register(Register::B),
                chip.register(Register::C),
                chip.register(Register::D),
                chip.register(Register::E),
            ),
            format!(
                "charge={} ({:.1}% of battery) trips={} flags=[{}]",
                self.tally.wire_count(),
                charge_percent(self.tally.wire_count()),
                self.tally.trips,
                flags.join(",")
            ),
        ]
    }
}

fn parse_decode_args(args: &[&str]) -> Result<(ReportPayload, f32), String> {
    let hex = args
        .first()
        .ok_or_else(|| "error: expected payload hex".to_string())?;
    let scale = match args.get(1) {
        None => 1.0,
        Some(value) => value
            .parse::<f32>()
            .map_err(|_| "error: invalid scale".to_string())?,
    };

    let bytes =
        parse_hex(hex).ok_or_else(|| format!("error: expected {PAYLOAD_LEN} hex bytes"))?;
    let payload = ReportPayload::decode(&bytes).map_err(|err| format!("error: {err}"))?;
    Ok((payload, scale))
}

fn decoded_lines(payload: &ReportPayload, scale: f32) -> Vec<String> {
    vec![
        format!(
            "sample={:#06x} ({}) current={:.4} A",
            payload.raw_sample(),
            payload.sample,
            current_amps(payload.raw_sample(), scale)
        ),
        format!(
            "charge={} ({:.1}% of battery)",
            payload.charge,
            charge_percent(payload.charge)
        ),
    ]
}

fn parse_hex(text: &str) -> Option<Vec<u8>> {
    let digits: Vec<u8> = text
        .trim_start_matches("0x")
        .bytes()
        .filter(|b| *b != b':' && *b != b'-')
        .collect();
    if digits.len() % 2 != 0 || !digits.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    digits
        .chunks_exact(2)
        .map(|pair| Some((hex_nibble(pair[0])? << 4) | hex_nibble(pair[1])?))
        .collect()
}

fn hex_nibble(digit: u8) -> Option<u8> {
    char::from(digit)
        .to_digit(16)
        .and_then(|value| u8::try_from(value).ok())
}

fn help_lines() -> Vec<String> {
    let mut lines = vec!["Available commands:".to_string()];
    for (_, detail) in BENCH_TOPICS.iter().chain(EMULATOR_TOPICS) {
        lines.push(format!("  {detail}"));
    }
    lines.push("  exit | quit               - end the session".to_string());
    lines
}

fn driver_io_error(err: DriverError) -> io::Error {
    io::Error::other(err.to_string())
}

/// One transcript record.
enum Entry<'a> {
    Command(&'a str),
    Reply(&'a str),
    /// A payload accepted by `decode`, logged as its wire bytes and fields.
    Payload(&'a ReportPayload),
}

/// Append-only session log; one line per entry, flushed as it is written.
struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut writer = BufWriter::new(file);
        writeln!(writer, "# meter-emulator transcript (ms since start, kind, text)")?;
        writer.flush()?;
        Ok(Self { writer })
    }

    fn append(&mut self, elapsed: Duration, entry: Entry<'_>) -> io::Result<()> {
        write!(self.writer, "{:>8} ", elapsed.as_millis())?;
        match entry {
            Entry::Command(text) => writeln!(self.writer, "cmd     {text}")?,
            Entry::Reply(text) => writeln!(self.writer, "reply   {text}")?,
            Entry::Payload(payload) => {
                let [high, low, charge] = payload.encode();
                writeln!(
                    self.writer,
                    "payload {high:02x}{low:02x}{charge:02x} sample={} charge={}",
                    payload.sample, payload.charge
                )?;
            }
        }
        self.writer.flush()
    }
}

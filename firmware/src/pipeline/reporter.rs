//! Report assembly and hand-off to the network transport.

use core::fmt;

use embassy_sync::blocking_mutex::raw::RawMutex;
use meter_core::bus::{BusError, EnableLine};
use meter_core::payload::{ReportPayload, SendEnvelope, encode_frame};

use super::Token;
use super::supply::SenseSupply;
use crate::record::RecordReader;
use crate::status;

/// Failure reported by the network transport.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SendError {
    /// The network layer refused the packet with the given code.
    Rejected(u8),
    /// The link to the radio failed.
    Link(BusError),
    /// The transport had no buffer space.
    Busy,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Rejected(code) => write!(f, "rejected by network (code {code})"),
            SendError::Link(err) => write!(f, "link failure: {err}"),
            SendError::Busy => f.write_str("transport busy"),
        }
    }
}

/// Outbound path for framed reports.
#[allow(async_fn_in_trait)]
pub trait ReportTransport {
    async fn send(&mut self, frame: &[u8]) -> Result<(), SendError>;
}

pub struct ReportSender<'a, M: RawMutex, E, T> {
    report_ready: &'a Token<M>,
    services_ready: &'a Token<M>,
    supply: &'a SenseSupply<'a, M, E>,
    reader: RecordReader<'a, M>,
    transport: T,
    envelope: SendEnvelope,
    services_granted: bool,
}

impl<'a, M, E, T> ReportSender<'a, M, E, T>
where
    M: RawMutex,
    E: EnableLine,
    T: ReportTransport,
{
    pub fn new(
        report_ready: &'a Token<M>,
        services_ready: &'a Token<M>,
        supply: &'a SenseSupply<'a, M, E>,
        reader: RecordReader<'a, M>,
        transport: T,
        envelope: SendEnvelope,
    ) -> Self {
        Self {
            report_ready,
            services_ready,
            supply,
            reader,
            transport,
            envelope,
            services_granted: false,
        }
    }

    /// One-time wait for the network bootstrap. Later calls return at once.
    pub async fn await_services(&mut self) {
        if self.services_granted {
            return;
        }
        self.services_ready.wait().await;
        self.services_granted = true;
        status::set_services_ready(true);
        log_services_granted();
    }

    /// Waits for a finished sample, powers the sense chip down, and sends the
    /// current record. A refused send is logged and dropped.
    pub async fn run_once(&mut self) -> Result<ReportPayload, SendError> {
        self.await_services().await;
        self.report_ready.wait().await;

        if let Err(err) = self.supply.power_down() {
            log_power_down_failed(err);
        }

        let payload = ReportPayload::from_record(&self.reader.snapshot());
        let frame = encode_frame(&self.envelope, &payload);

        match self.transport.send(&frame).await {
            Ok(()) => Ok(payload),
            Err(err) => {
                status::record_send_failure();
                log_send_failed(err);
                Err(err)
            }
        }
    }

    pub async fn run(&mut self) -> ! {
        loop {
            let _ = self.run_once().await;
        }
    }
}

#[cfg(target_os = "none")]
fn log_services_granted() {
    defmt::info!("reporter: network services granted");
}

#[cfg(not(target_os = "none"))]
fn log_services_granted() {}

#[cfg(target_os = "none")]
fn log_send_failed(err: SendError) {
    defmt::warn!("reporter: send failed ({})", defmt::Display2Format(&err));
}

#[cfg(not(target_os = "none"))]
fn log_send_failed(err: SendError) {
    println!("reporter: send failed ({err})");
}

#[cfg(target_os = "none")]
fn log_power_down_failed(err: BusError) {
    defmt::warn!("reporter: enable line write failed ({})", defmt::Display2Format(&err));
}

#[cfg(not(target_os = "none"))]
fn log_power_down_failed(err: BusError) {
    println!("reporter: enable line write failed ({err})");
}

//! Power-gated ADC sampling.
//!
//! One cycle: wait for the clock's release, power the sense chip, wait out
//! its settle window, clock two bytes out of the ADC, publish the sample, and
//! release the reporter. Power-down belongs to the reporter.
//!
//! A failed transfer is logged and the receive buffer is used as-is; the
//! pipeline never stalls on a single bad read.

use core::time::Duration;

use embassy_sync::blocking_mutex::raw::RawMutex;
use meter_core::bus::{AdcTransfer, BusError, Delay, EnableLine, SAMPLE_LEN, SampleBus};

use super::Token;
use super::supply::SenseSupply;
use crate::record::SampleWriter;
use crate::status;

pub struct PowerGatedSampler<'a, M: RawMutex, E, B, D> {
    release: &'a Token<M>,
    report_ready: &'a Token<M>,
    supply: &'a SenseSupply<'a, M, E>,
    writer: SampleWriter<'a, M>,
    bus: B,
    delay: D,
    settle: Duration,
    transfer: AdcTransfer,
    rx: [u8; SAMPLE_LEN],
}

impl<'a, M, E, B, D> PowerGatedSampler<'a, M, E, B, D>
where
    M: RawMutex,
    E: EnableLine,
    B: SampleBus,
    D: Delay,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        release: &'a Token<M>,
        report_ready: &'a Token<M>,
        supply: &'a SenseSupply<'a, M, E>,
        writer: SampleWriter<'a, M>,
        bus: B,
        delay: D,
        settle: Duration,
        transfer: AdcTransfer,
    ) -> Self {
        Self {
            release,
            report_ready,
            supply,
            writer,
            bus,
            delay,
            settle,
            transfer,
            rx: [0; SAMPLE_LEN],
        }
    }

    /// Waits for a release and takes one reading.
    ///
    /// The two bytes are interpreted most significant first, exactly as the
    /// converter shifts them out.
    pub async fn sample(&mut self) -> i16 {
        self.release.wait().await;

        if let Err(err) = self.supply.power_up().await {
            log_power_failed(err);
        }
        self.delay.delay(self.settle).await;

        if let Err(err) = self.bus.transfer(self.transfer, &mut self.rx) {
            status::record_sample_failure();
            log_sample_failed(err);
        }

        i16::from_be_bytes(self.rx)
    }

    /// Runs one full cycle and returns the published sample.
    pub async fn run_cycle(&mut self) -> i16 {
        let sample = self.sample().await;
        self.writer.write(sample);
        status::record_cycle(sample);
        log_sample(sample);
        self.report_ready.signal(());
        sample
    }

    pub async fn run(&mut self) -> ! {
        loop {
            self.run_cycle().await;
        }
    }
}

#[cfg(target_os = "none")]
fn log_sample(sample: i16) {
    defmt::debug!("sampler: raw={=u16:#x}", u16::from_be_bytes(sample.to_be_bytes()));
}

#[cfg(not(target_os = "none"))]
fn log_sample(_: i16) {}

#[cfg(target_os = "none")]
fn log_sample_failed(err: BusError) {
    defmt::warn!("sampler: ADC transfer failed ({})", defmt::Display2Format(&err));
}

#[cfg(not(target_os = "none"))]
fn log_sample_failed(err: BusError) {
    println!("sampler: ADC transfer failed ({err})");
}

#[cfg(target_os = "none")]
fn log_power_failed(err: BusError) {
    defmt::warn!("sampler: enable line write failed ({})", defmt::Display2Format(&err));
}

#[cfg(not(target_os = "none"))]
fn log_power_failed(err: BusError) {
    println!("sampler: enable line write failed ({err})");
}

//! Sample, charge, and report pipeline.
//!
//! Tokens are `Signal<M, ()>`: a signal holds at most one pending unit, so a
//! second `signal` before the waiter runs is absorbed rather than queued.
//!
//! ```text
//! SampleClock --sample_release--> PowerGatedSampler --report_ready--> ReportSender
//!                                        ^                                 |
//!                                        +--------supply_released----------+
//! ```

pub mod charge;
pub mod clock;
pub mod reporter;
pub mod sampler;
pub mod supply;

#[cfg(not(target_os = "none"))]
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
#[cfg(target_os = "none")]
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

/// Tasks run on both the thread-mode and the interrupt executor.
#[cfg(target_os = "none")]
pub type PipelineMutex = CriticalSectionRawMutex;
#[cfg(not(target_os = "none"))]
pub type PipelineMutex = NoopRawMutex;

pub type Token<M> = Signal<M, ()>;

/// Every synchronisation point binding the pipeline stages together.
pub struct PipelineSignals<M: RawMutex> {
    /// Clock -> sampler.
    pub sample_release: Token<M>,
    /// Sampler -> reporter.
    pub report_ready: Token<M>,
    /// Reporter power-down -> next sampler power-up.
    pub supply_released: Token<M>,
    /// Network bootstrap -> reporter, signalled once.
    pub services_ready: Token<M>,
}

impl<M: RawMutex> PipelineSignals<M> {
    pub const fn new() -> Self {
        Self {
            sample_release: Signal::new(),
            report_ready: Signal::new(),
            supply_released: Signal::new(),
            services_ready: Signal::new(),
        }
    }

    /// Starts the node ready to sample and ready to report.
    ///
    /// The supply token stays clear: the enable line boots asserted and the
    /// first report's power-down hands it to the sampler.
    pub fn prime(&self) {
        self.sample_release.signal(());
        self.report_ready.signal(());
    }
}

impl<M: RawMutex> Default for PipelineSignals<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod testing;

#[cfg(test)]
mod tests;

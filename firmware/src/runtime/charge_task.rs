use meter_core::coulomb::CoulombCounter;

use super::{AlarmLine, CounterHandle};
use crate::pipeline::PipelineMutex;
use crate::pipeline::charge::ChargeMonitor;
use crate::record::ChargeWriter;

/// Runs on the interrupt executor so alarm service preempts sampling.
#[embassy_executor::task]
pub async fn run(
    counter: CoulombCounter<CounterHandle>,
    source: AlarmLine,
    sink: ChargeWriter<'static, PipelineMutex>,
) -> ! {
    let mut monitor = ChargeMonitor::new(counter, source, sink);
    monitor.run().await
}

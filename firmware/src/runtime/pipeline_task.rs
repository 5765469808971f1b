use super::CLOCK;
use crate::hw::{
    EmbassyDelay, GpioEnableLine, SpiSampleBus, TickerCadence, UartReportTransport,
};
use crate::pipeline::PipelineMutex;
use crate::pipeline::reporter::ReportSender;
use crate::pipeline::sampler::PowerGatedSampler;

type Sampler = PowerGatedSampler<
    'static,
    PipelineMutex,
    GpioEnableLine<'static>,
    SpiSampleBus<'static>,
    EmbassyDelay,
>;
type Reporter =
    ReportSender<'static, PipelineMutex, GpioEnableLine<'static>, UartReportTransport<'static>>;

#[embassy_executor::task]
pub async fn clock() -> ! {
    CLOCK.run(&mut TickerCadence::default()).await
}

#[embassy_executor::task]
pub async fn sampler(mut sampler: Sampler) -> ! {
    sampler.run().await
}

#[embassy_executor::task]
pub async fn reporter(mut reporter: Reporter) -> ! {
    reporter.run().await
}

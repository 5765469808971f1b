use defmt_rtt as _;
use embassy_executor::{InterruptExecutor, Spawner};
use embassy_stm32 as hal;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::{Flex, Level as HalLevel, Output, Pull, Speed};
use embassy_stm32::i2c::{self, I2c};
use embassy_stm32::interrupt::{InterruptExt, Priority};
use embassy_stm32::spi::{self, Spi};
use embassy_stm32::time::Hertz;
use embassy_stm32::usart::{BufferedUart, Config as UartConfig, DataBits, Parity, StopBits};
use embassy_time::Timer;
use meter_core::bus::AdcTransfer;
use meter_core::config::{DEFAULT_SAMPLE_PERIOD, MeterConfig};
use meter_core::coulomb::CoulombCounter;
use meter_core::coulomb::alarm::SelectedAlarmSource;
use static_cell::StaticCell;

use crate::bus::{SharedBusHandle, SharedRegisterBus};
use crate::hw::{
    EmbassyDelay, ExtiLevelWait, GpioEnableLine, I2cRegisterBus, SpiSampleBus,
    UartReportTransport,
};
use crate::pipeline::clock::SampleClock;
use crate::pipeline::reporter::ReportSender;
use crate::pipeline::sampler::PowerGatedSampler;
use crate::pipeline::supply::SenseSupply;
use crate::pipeline::{PipelineMutex, PipelineSignals, charge};
use crate::record::SharedRecord;

mod charge_task;
#[cfg(feature = "bench-console")]
mod console_task;
mod link_task;
mod pipeline_task;

const METER_CONFIG: MeterConfig = MeterConfig::new();

const COUNTER_I2C_HZ: u32 = 184_000;
const ADC_SPI_HZ: u32 = 1_000_000;
const RADIO_UART_BAUD: u32 = 115_200;
const RADIO_UART_BUFFER_SIZE: usize = 64;

type Supply = SenseSupply<'static, PipelineMutex, GpioEnableLine<'static>>;
pub(super) type CounterBus = SharedRegisterBus<PipelineMutex, I2cRegisterBus<'static>>;
pub(super) type CounterHandle = SharedBusHandle<'static, PipelineMutex, I2cRegisterBus<'static>>;
pub(super) type AlarmLine = SelectedAlarmSource<EmbassyDelay, ExtiLevelWait<'static>>;

pub(super) static SIGNALS: PipelineSignals<PipelineMutex> = PipelineSignals::new();
pub(super) static RECORD: SharedRecord<PipelineMutex> = SharedRecord::new();
pub(super) static COUNTER_BUS: CounterBus = SharedRegisterBus::new();
pub(super) static CLOCK: SampleClock<'static, PipelineMutex> =
    SampleClock::new(&SIGNALS.sample_release, DEFAULT_SAMPLE_PERIOD);
static SUPPLY: StaticCell<Supply> = StaticCell::new();

static mut RADIO_TX_BUFFER: [u8; RADIO_UART_BUFFER_SIZE] = [0; RADIO_UART_BUFFER_SIZE];
static mut RADIO_RX_BUFFER: [u8; RADIO_UART_BUFFER_SIZE] = [0; RADIO_UART_BUFFER_SIZE];

/// Charge-alarm handling.
static EXECUTOR_HIGH: InterruptExecutor = InterruptExecutor::new();
/// Sample clock and sampler; the reporter stays in thread mode below both.
static EXECUTOR_SAMPLE: InterruptExecutor = InterruptExecutor::new();

#[hal::interrupt]
unsafe fn USB_UCPD1_2() {
    unsafe { EXECUTOR_HIGH.on_interrupt() }
}

#[hal::interrupt]
unsafe fn TIM14() {
    unsafe { EXECUTOR_SAMPLE.on_interrupt() }
}

embassy_stm32::bind_interrupts!(struct RadioIrqs {
    USART3_4_5_6_LPUART1 => embassy_stm32::usart::BufferedInterruptHandler<hal::peripherals::USART5>;
});

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let p = hal::init(hal::Config::default());
    let config = METER_CONFIG;
    config.validate().expect("invalid meter configuration");

    Timer::after_millis(duration_millis(config.startup_holdoff)).await;
    defmt::info!("meter: starting");

    let supply: &'static Supply = SUPPLY.init(SenseSupply::new(
        GpioEnableLine::new(Flex::new(p.PA0)),
        &SIGNALS.supply_released,
    ));
    if supply.init().is_err() {
        defmt::warn!("meter: enable line configuration failed");
    }
    SIGNALS.prime();
    CLOCK.restart(config.sample_period);

    let mut i2c_config = i2c::Config::default();
    i2c_config.frequency = Hertz(COUNTER_I2C_HZ);
    i2c_config.timeout =
        embassy_time::Duration::from_millis(duration_millis(config.counter.bus_timeout));
    let i2c = I2c::new_blocking(p.I2C1, p.PB6, p.PB7, i2c_config);
    COUNTER_BUS.open(I2cRegisterBus::new(i2c));

    let mut counter = CoulombCounter::new(COUNTER_BUS.handle(), config.counter);
    charge::initialize(&mut counter, config.init_attempts)
        .expect("coulomb counter initialisation failed");

    let (sample_writer, charge_writer) = RECORD.writers().expect("record writers already taken");

    let alarm_source = SelectedAlarmSource::from_mode(
        config.alarm_mode,
        EmbassyDelay,
        ExtiLevelWait::new(ExtiInput::new(p.PA1, p.EXTI1, Pull::Up)),
    );

    interrupt_priorities();
    let high_spawner = EXECUTOR_HIGH.start(hal::interrupt::USB_UCPD1_2);
    high_spawner
        .spawn(charge_task::run(counter, alarm_source, charge_writer))
        .expect("failed to spawn charge task");

    let mut spi_config = spi::Config::default();
    spi_config.frequency = Hertz(ADC_SPI_HZ);
    let adc = SpiSampleBus::new(
        Spi::new_blocking_rxonly(p.SPI1, p.PA5, p.PA6, spi_config),
        Output::new(p.PA4, HalLevel::High, Speed::Low),
    );
    let sampler = PowerGatedSampler::new(
        &SIGNALS.sample_release,
        &SIGNALS.report_ready,
        supply,
        sample_writer,
        adc,
        EmbassyDelay,
        config.settle_time,
        AdcTransfer::new(config.adc.timeout),
    );

    let mut uart_config = UartConfig::default();
    uart_config.baudrate = RADIO_UART_BAUD;
    uart_config.data_bits = DataBits::DataBits8;
    uart_config.stop_bits = StopBits::STOP1;
    uart_config.parity = Parity::ParityNone;
    let radio = unsafe {
        BufferedUart::new(
            p.USART5,
            p.PB1,
            p.PB0,
            &mut RADIO_TX_BUFFER,
            &mut RADIO_RX_BUFFER,
            RadioIrqs,
            uart_config,
        )
        .expect("failed to initialize radio UART")
    };
    let (radio_tx, _radio_rx) = radio.split();
    let reporter = ReportSender::new(
        &SIGNALS.report_ready,
        &SIGNALS.services_ready,
        supply,
        RECORD.reader(),
        UartReportTransport::new(radio_tx),
        config.envelope,
    );

    let sample_spawner = EXECUTOR_SAMPLE.start(hal::interrupt::TIM14);
    sample_spawner
        .spawn(pipeline_task::clock())
        .expect("failed to spawn clock task");
    sample_spawner
        .spawn(pipeline_task::sampler(sampler))
        .expect("failed to spawn sampler task");
    spawner
        .spawn(pipeline_task::reporter(reporter))
        .expect("failed to spawn report task");
    spawner
        .spawn(link_task::run(ExtiLevelWait::new(ExtiInput::new(
            p.PA8,
            p.EXTI8,
            Pull::Down,
        ))))
        .expect("failed to spawn link task");

    #[cfg(feature = "bench-console")]
    spawner
        .spawn(console_task::run(p.USART2, p.PA3, p.PA2))
        .expect("failed to spawn console task");

    core::future::pending::<()>().await;
}

/// Alarm above sampling above reporting. Lower numbers preempt higher ones;
/// thread mode sits beneath every interrupt.
fn interrupt_priorities() {
    hal::interrupt::USB_UCPD1_2.set_priority(Priority::P2);
    hal::interrupt::TIM14.set_priority(Priority::P3);
}

fn duration_millis(duration: core::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

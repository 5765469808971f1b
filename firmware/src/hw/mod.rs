//! STM32G0 implementations of the meter's hardware seams.
//!
//! The blocking I2C driver takes its timeout from the `Config` built with
//! `CounterConfig::bus_timeout` when the bus is opened. The SPI driver has no
//! timeout of its own, so an ADC transfer that overruns its request deadline
//! is reported as [`BusError::Timeout`].

use core::time::Duration;

use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::{Flex, Output, Pull as HalPull, Speed};
use embassy_stm32::i2c::{self, I2c};
use embassy_stm32::mode::Blocking;
use embassy_stm32::spi::Spi;
use embassy_stm32::usart::BufferedUartTx;
use embassy_time::{Instant, Ticker, Timer};
use embedded_io_async::Write;
use meter_core::bus::{
    AdcTransfer, BusError, Cadence, Delay, Direction, EnableLine, Level, LevelWait, PinConfig,
    Pull, RegisterBus, RegisterRead, RegisterWrite, SAMPLE_LEN, SampleBus,
};

use crate::pipeline::reporter::{ReportTransport, SendError};

/// Coulomb-counter register access over blocking I2C.
pub struct I2cRegisterBus<'d> {
    i2c: I2c<'d, Blocking>,
}

impl<'d> I2cRegisterBus<'d> {
    pub fn new(i2c: I2c<'d, Blocking>) -> Self {
        Self { i2c }
    }
}

impl RegisterBus for I2cRegisterBus<'_> {
    fn read(&mut self, request: RegisterRead) -> Result<u8, BusError> {
        let mut value = [0u8; 1];
        self.i2c
            .blocking_write_read(request.address, &[request.register], &mut value)
            .map_err(map_i2c_error)?;
        Ok(value[0])
    }

    fn write(&mut self, request: RegisterWrite) -> Result<(), BusError> {
        self.i2c
            .blocking_write(request.address, &[request.register, request.value])
            .map_err(map_i2c_error)
    }
}

fn map_i2c_error(error: i2c::Error) -> BusError {
    match error {
        i2c::Error::Nack => BusError::Nack,
        i2c::Error::Timeout => BusError::Timeout,
        i2c::Error::Arbitration => BusError::Arbitration,
        _ => BusError::Other,
    }
}

/// Sense ADC on SPI: chip select low, clock out the conversion, release.
pub struct SpiSampleBus<'d> {
    spi: Spi<'d, Blocking>,
    cs: Output<'d>,
}

impl<'d> SpiSampleBus<'d> {
    pub fn new(spi: Spi<'d, Blocking>, cs: Output<'d>) -> Self {
        Self { spi, cs }
    }
}

impl SampleBus for SpiSampleBus<'_> {
    fn transfer(
        &mut self,
        request: AdcTransfer,
        rx: &mut [u8; SAMPLE_LEN],
    ) -> Result<(), BusError> {
        let started = Instant::now();
        self.cs.set_low();
        let result = self.spi.blocking_read(rx.as_mut_slice());
        self.cs.set_high();
        result.map_err(|_| BusError::Other)?;

        if request.overran(Duration::from_micros(started.elapsed().as_micros())) {
            return Err(BusError::Timeout);
        }
        Ok(())
    }
}

/// Push-pull GPIO driving the sense-chip enable.
pub struct GpioEnableLine<'d> {
    pin: Flex<'d>,
}

impl<'d> GpioEnableLine<'d> {
    pub fn new(pin: Flex<'d>) -> Self {
        Self { pin }
    }
}

impl EnableLine for GpioEnableLine<'_> {
    fn configure(&mut self, config: PinConfig) -> Result<(), BusError> {
        match config.direction {
            Direction::Output => {
                self.set_level(config.initial)?;
                self.pin.set_as_output(Speed::Low);
            }
            Direction::Input => self.pin.set_as_input(hal_pull(config.pull)),
        }
        Ok(())
    }

    fn set_level(&mut self, level: Level) -> Result<(), BusError> {
        if level.is_high() {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
        Ok(())
    }
}

fn hal_pull(pull: Pull) -> HalPull {
    match pull {
        Pull::None => HalPull::None,
        Pull::Up => HalPull::Up,
        Pull::Down => HalPull::Down,
    }
}

/// EXTI-backed level wait, used for the alarm line and the radio-ready pin.
pub struct ExtiLevelWait<'d> {
    input: ExtiInput<'d>,
}

impl<'d> ExtiLevelWait<'d> {
    pub fn new(input: ExtiInput<'d>) -> Self {
        Self { input }
    }
}

impl LevelWait for ExtiLevelWait<'_> {
    async fn wait_for_level(&mut self, level: Level) {
        match level {
            Level::High => self.input.wait_for_high().await,
            Level::Low => self.input.wait_for_low().await,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct EmbassyDelay;

impl Delay for EmbassyDelay {
    async fn delay(&mut self, duration: Duration) {
        Timer::after(embassy_time::Duration::from_micros(duration_micros(duration))).await;
    }
}

/// `Ticker`-backed cadence, rebuilt whenever the requested period changes.
#[derive(Default)]
pub struct TickerCadence {
    period: Duration,
    ticker: Option<Ticker>,
}

impl Cadence for TickerCadence {
    async fn wait_next(&mut self, period: Duration) {
        if self.ticker.is_none() || self.period != period {
            self.period = period;
            self.ticker = Some(Ticker::every(embassy_time::Duration::from_micros(
                duration_micros(period),
            )));
        }
        if let Some(ticker) = self.ticker.as_mut() {
            ticker.next().await;
        }
    }
}

fn duration_micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

/// Framed reports written to the radio UART.
pub struct UartReportTransport<'d> {
    tx: BufferedUartTx<'d>,
}

impl<'d> UartReportTransport<'d> {
    pub fn new(tx: BufferedUartTx<'d>) -> Self {
        Self { tx }
    }
}

impl ReportTransport for UartReportTransport<'_> {
    async fn send(&mut self, frame: &[u8]) -> Result<(), SendError> {
        self.tx
            .write_all(frame)
            .await
            .map_err(|_| SendError::Link(BusError::Other))?;
        self.tx
            .flush()
            .await
            .map_err(|_| SendError::Link(BusError::Other))
    }
}

use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_stm32::usart::{BufferedUart, Config as UartConfig};
use embassy_time::{Duration, Timer};
use embedded_io_async::{Read, Write};
use meter_core::bench::BenchExecutor;

use super::{COUNTER_BUS, RECORD};
use crate::console::{ConsoleError, ConsoleSession};

const CONSOLE_BAUD: u32 = 115_200;
const CONSOLE_BUFFER_SIZE: usize = 128;

static mut CONSOLE_TX_BUFFER: [u8; CONSOLE_BUFFER_SIZE] = [0; CONSOLE_BUFFER_SIZE];
static mut CONSOLE_RX_BUFFER: [u8; CONSOLE_BUFFER_SIZE] = [0; CONSOLE_BUFFER_SIZE];

embassy_stm32::bind_interrupts!(struct ConsoleIrqs {
    USART2_LPUART2 => embassy_stm32::usart::BufferedInterruptHandler<hal::peripherals::USART2>;
});

#[embassy_executor::task]
pub async fn run(
    usart: Peri<'static, hal::peripherals::USART2>,
    rx_pin: Peri<'static, hal::peripherals::PA3>,
    tx_pin: Peri<'static, hal::peripherals::PA2>,
) -> ! {
    let mut config = UartConfig::default();
    config.baudrate = CONSOLE_BAUD;

    let uart = unsafe {
        BufferedUart::new(
            usart,
            rx_pin,
            tx_pin,
            &mut CONSOLE_TX_BUFFER,
            &mut CONSOLE_RX_BUFFER,
            ConsoleIrqs,
            config,
        )
        .expect("failed to initialize console UART")
    };
    let (mut tx, mut rx) = uart.split();

    let mut session = ConsoleSession::new(BenchExecutor::new(COUNTER_BUS.handle()), RECORD.reader());
    let mut ingress = [0u8; 16];

    loop {
        let count = match rx.read(&mut ingress).await {
            Ok(count) => count,
            Err(_) => {
                defmt::warn!("console: UART read error");
                Timer::after(Duration::from_millis(5)).await;
                continue;
            }
        };

        for byte in &ingress[..count] {
            let reply = match session.ingest(*byte) {
                Ok(Some(reply)) => reply,
                Ok(None) => continue,
                Err(ConsoleError::LineOverflow) => {
                    let _ = tx.write_all(b"error: line too long\r\n").await;
                    continue;
                }
                Err(ConsoleError::InvalidUtf8) => {
                    let _ = tx.write_all(b"error: invalid input\r\n").await;
                    continue;
                }
            };

            for line in reply.split('\n') {
                if tx.write_all(line.as_bytes()).await.is_err()
                    || tx.write_all(b"\r\n").await.is_err()
                {
                    defmt::warn!("console: UART write error");
                    break;
                }
            }
        }
    }
}

use core::panic::PanicInfo;

/// Core cycles spent letting RTT drain the panic message before the reset.
const LOG_DRAIN_CYCLES: u32 = 8_000_000;

/// Logs the fault and resets the node; startup then reconfigures the counter
/// and the pipeline from scratch.
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    defmt::error!("meter: fatal fault: {}", defmt::Display2Format(info));
    cortex_m::asm::delay(LOG_DRAIN_CYCLES);
    cortex_m::peripheral::SCB::sys_reset()
}

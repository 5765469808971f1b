use meter_core::bus::{Level, LevelWait};

use super::SIGNALS;
use crate::hw::ExtiLevelWait;

/// Releases the reporter once the radio asserts its ready line.
#[embassy_executor::task]
pub async fn run(mut ready: ExtiLevelWait<'static>) {
    ready.wait_for_level(Level::High).await;
    defmt::info!("link: network services available");
    SIGNALS.services_ready.signal(());
}

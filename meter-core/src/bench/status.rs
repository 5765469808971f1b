//! Pipeline status snapshot shown by the `status` command.

use core::fmt;

use crate::record::ChargeTally;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StatusSnapshot {
    /// Completed sample cycles.
    pub cycles: u32,
    pub sample_failures: u32,
    pub send_failures: u32,
    /// Clock ticks that found the release token already set.
    pub ticks_coalesced: u32,
    pub last_sample: i16,
    pub charge: ChargeTally,
    pub supply_powered: bool,
    pub services_ready: bool,
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "cycles={} sample_failures={} send_failures={} coalesced={}",
            self.cycles, self.sample_failures, self.send_failures, self.ticks_coalesced
        )?;
        write!(
            f,
            "sample={:#06x} charge={} trips={}",
            self.last_sample,
            self.charge.wire_count(),
            self.charge.trips
        )?;
        if self.charge.flags.saturated {
            f.write_str(" saturated")?;
        }
        if self.charge.flags.count_overflow {
            f.write_str(" cc-overflow")?;
        }
        if self.charge.flags.acon_overflow {
            f.write_str(" acon-overflow")?;
        }
        write!(
            f,
            "\nsupply={} services={}",
            if self.supply_powered { "on" } else { "off" },
            if self.services_ready { "ready" } else { "waiting" }
        )
    }
}

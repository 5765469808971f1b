//! Receive-side conversions from raw report fields to engineering units.

/// ADC full-scale span in volts.
pub const FULL_SCALE: f32 = 2.1;

const HALF_SCALE: f32 = FULL_SCALE / 2.0;
const NUM_COUNTS: f32 = 65_535.0;

/// Fraction of the reference battery consumed per charge count, as 1/N.
pub const COUNTS_PER_BATTERY: f32 = 180.0;

/// Converts a raw (unsigned) sample into amps.
///
/// `scale` is 1.0 for the stock 10 mOhm sense resistor. The converter is
/// bipolar, so the result spans `±1.05 * scale`.
#[must_use]
pub fn current_amps(raw: u16, scale: f32) -> f32 {
    (f32::from(raw) * (FULL_SCALE / NUM_COUNTS) - HALF_SCALE) * scale
}

/// Converts a charge count into percent of battery consumed.
#[must_use]
pub fn charge_percent(count: u8) -> f32 {
    f32::from(count) / COUNTS_PER_BATTERY * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn midscale_reads_as_zero_current() {
        assert!(close(current_amps(0, 1.0), -1.05));
        assert!(close(current_amps(u16::MAX, 1.0), 1.05));
        assert!(current_amps(32_768, 1.0).abs() < 1e-3);
    }

    #[test]
    fn scale_multiplies_result() {
        assert!(close(current_amps(u16::MAX, 2.0), 2.1));
    }

    #[test]
    fn charge_counts_map_to_battery_percent() {
        assert!(close(charge_percent(0), 0.0));
        assert!(close(charge_percent(180), 100.0));
        assert!(close(charge_percent(9), 5.0));
    }
}

//! Startup configuration for the metering pipeline.
//!
//! Every value is fixed once the node boots. Defaults reproduce the reference
//! board: one sample per second, a 450 ms settle window for the sense chip,
//! and the coulomb counter at address `0x64` with prescaler `0x09` and an
//! alarm level of one count.

use core::fmt;
use core::time::Duration;

use crate::bus::DEFAULT_BUS_TIMEOUT;
use crate::coulomb::{COUNTER_ADDRESS, MAX_PRESCALER};
use crate::payload::SendEnvelope;

/// Default sample clock period.
pub const DEFAULT_SAMPLE_PERIOD: Duration = Duration::from_millis(1_000);
/// Default settle window after powering the sense chip.
pub const DEFAULT_SETTLE_TIME: Duration = Duration::from_millis(450);
/// Default delay before any task touches hardware.
pub const DEFAULT_STARTUP_HOLDOFF: Duration = Duration::from_millis(1_000);
/// Default cadence for polled alarm detection.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1_000);

/// Coulomb-counter settings.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CounterConfig {
    pub bus_address: u8,
    /// Register-A prescaler exponent (4 bits).
    pub prescaler: u8,
    /// Register-B alarm level in charge counts.
    pub alarm_level: u8,
    /// Route the ripple counter to the IRQ pin (register E bit 1).
    pub ripple_output: bool,
    pub bus_timeout: Duration,
}

impl CounterConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bus_address: COUNTER_ADDRESS,
            prescaler: 0x09,
            alarm_level: 0x01,
            ripple_output: true,
            bus_timeout: DEFAULT_BUS_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_prescaler(mut self, prescaler: u8) -> Self {
        self.prescaler = prescaler;
        self
    }

    #[must_use]
    pub const fn with_alarm_level(mut self, alarm_level: u8) -> Self {
        self.alarm_level = alarm_level;
        self
    }

    #[must_use]
    pub const fn with_ripple_output(mut self, enabled: bool) -> Self {
        self.ripple_output = enabled;
        self
    }
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// How the charge-alarm task learns about a latched alarm.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AlarmMode {
    /// Poll register D at a fixed cadence.
    Polled { interval: Duration },
    /// Wait on the IRQ line, alternating the active level each wake.
    EdgeNotified,
}

impl Default for AlarmMode {
    fn default() -> Self {
        Self::Polled {
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// ADC transfer settings.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AdcConfig {
    pub timeout: Duration,
}

impl Default for AdcConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_BUS_TIMEOUT,
        }
    }
}

/// Rejected configuration values.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConfigError {
    PrescalerOutOfRange(u8),
    ZeroAlarmLevel,
    ZeroSamplePeriod,
    ZeroInitAttempts,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::PrescalerOutOfRange(value) => {
                write!(f, "prescaler {value:#04x} exceeds {MAX_PRESCALER:#04x}")
            }
            ConfigError::ZeroAlarmLevel => f.write_str("alarm level must be non-zero"),
            ConfigError::ZeroSamplePeriod => f.write_str("sample period must be non-zero"),
            ConfigError::ZeroInitAttempts => f.write_str("at least one init attempt required"),
        }
    }
}

/// Complete pipeline configuration.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MeterConfig {
    pub sample_period: Duration,
    pub settle_time: Duration,
    pub startup_holdoff: Duration,
    /// Attempts at configuring and arming the counter before giving up.
    pub init_attempts: u8,
    pub counter: CounterConfig,
    pub alarm_mode: AlarmMode,
    pub adc: AdcConfig,
    pub envelope: SendEnvelope,
}

impl MeterConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sample_period: DEFAULT_SAMPLE_PERIOD,
            settle_time: DEFAULT_SETTLE_TIME,
            startup_holdoff: DEFAULT_STARTUP_HOLDOFF,
            init_attempts: 1,
            counter: CounterConfig::new(),
            alarm_mode: AlarmMode::Polled {
                interval: DEFAULT_POLL_INTERVAL,
            },
            adc: AdcConfig {
                timeout: DEFAULT_BUS_TIMEOUT,
            },
            envelope: SendEnvelope::new(),
        }
    }

    #[must_use]
    pub const fn with_sample_period(mut self, period: Duration) -> Self {
        self.sample_period = period;
        self
    }

    #[must_use]
    pub const fn with_settle_time(mut self, settle: Duration) -> Self {
        self.settle_time = settle;
        self
    }

    #[must_use]
    pub const fn with_alarm_mode(mut self, mode: AlarmMode) -> Self {
        self.alarm_mode = mode;
        self
    }

    #[must_use]
    pub const fn with_counter(mut self, counter: CounterConfig) -> Self {
        self.counter = counter;
        self
    }

    #[must_use]
    pub const fn with_init_attempts(mut self, attempts: u8) -> Self {
        self.init_attempts = attempts;
        self
    }

    /// Checks the values the hardware cannot accept.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.counter.prescaler > MAX_PRESCALER {
            return Err(ConfigError::PrescalerOutOfRange(self.counter.prescaler));
        }
        if self.counter.alarm_level == 0 {
            return Err(ConfigError::ZeroAlarmLevel);
        }
        if self.sample_period.is_zero() {
            return Err(ConfigError::ZeroSamplePeriod);
        }
        if self.init_attempts == 0 {
            return Err(ConfigError::ZeroInitAttempts);
        }
        Ok(())
    }
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_board() {
        let config = MeterConfig::default();
        assert_eq!(config.sample_period, Duration::from_millis(1_000));
        assert_eq!(config.settle_time, Duration::from_millis(450));
        assert_eq!(config.counter.bus_address, 0x64);
        assert_eq!(config.counter.prescaler, 0x09);
        assert_eq!(config.counter.alarm_level, 0x01);
        assert!(matches!(config.alarm_mode, AlarmMode::Polled { .. }));
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let config =
            MeterConfig::new().with_counter(CounterConfig::new().with_prescaler(0x1F));
        assert_eq!(
            config.validate(),
            Err(ConfigError::PrescalerOutOfRange(0x1F))
        );

        let config = MeterConfig::new().with_sample_period(Duration::ZERO);
        assert_eq!(config.validate(), Err(ConfigError::ZeroSamplePeriod));

        let config =
            MeterConfig::new().with_counter(CounterConfig::new().with_alarm_level(0));
        assert_eq!(config.validate(), Err(ConfigError::ZeroAlarmLevel));

        let config = MeterConfig::new().with_init_attempts(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroInitAttempts));
    }
}

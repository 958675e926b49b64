//! Timing and retry configuration

use crate::error::ObdError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry count and per-attempt timeout for one class of command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandPolicy {
    /// Additional attempts after the first one
    pub retries: u32,
    /// Timeout for each attempt (not cumulative)
    pub timeout_ms: u64,
}

impl CommandPolicy {
    pub const fn new(retries: u32, timeout_ms: u64) -> Self {
        Self {
            retries,
            timeout_ms,
        }
    }

    /// Total number of writes the dispatcher may issue
    pub fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Same retry count with a caller-supplied timeout
    pub fn with_timeout_ms(self, timeout_ms: u64) -> Self {
        Self { timeout_ms, ..self }
    }
}

/// Client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObdConfig {
    /// Policy for plain Mode 01 reads and setup commands
    pub default_command: CommandPolicy,
    /// `AT` wake/health probe
    pub health_probe: CommandPolicy,
    /// Pause after the health probe before reading voltage (milliseconds)
    pub voltage_settle_ms: u64,
    /// `AT RV` battery voltage read
    pub voltage_command: CommandPolicy,
    /// Mode 03 / Mode 04 trouble code commands
    pub dtc_command: CommandPolicy,
    /// Lower bound of a plausible battery reading (volts)
    pub voltage_min: f64,
    /// Upper bound of a plausible battery reading (volts)
    pub voltage_max: f64,
}

impl Default for ObdConfig {
    fn default() -> Self {
        Self {
            default_command: CommandPolicy::new(2, 4000),
            health_probe: CommandPolicy::new(1, 2000),
            voltage_settle_ms: 500,
            voltage_command: CommandPolicy::new(3, 8000),
            dtc_command: CommandPolicy::new(3, 5000),
            voltage_min: 8.0,
            voltage_max: 16.0,
        }
    }
}

impl ObdConfig {
    /// Check that every timeout is usable and the voltage window is ordered
    pub fn validate(&self) -> Result<(), ObdError> {
        let policies = [
            ("default_command", self.default_command),
            ("health_probe", self.health_probe),
            ("voltage_command", self.voltage_command),
            ("dtc_command", self.dtc_command),
        ];
        for (name, policy) in policies {
            if policy.timeout_ms == 0 {
                return Err(ObdError::Config(format!("{name}.timeout_ms must be > 0")));
            }
        }

        if !(self.voltage_min < self.voltage_max) {
            return Err(ObdError::Config(format!(
                "voltage range [{}, {}] is empty",
                self.voltage_min, self.voltage_max
            )));
        }

        Ok(())
    }

    pub fn voltage_settle(&self) -> Duration {
        Duration::from_millis(self.voltage_settle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policies() {
        let config = ObdConfig::default();
        assert_eq!(config.default_command.attempts(), 3);
        assert_eq!(config.health_probe.timeout(), Duration::from_secs(2));
        assert_eq!(config.voltage_command, CommandPolicy::new(3, 8000));
        assert_eq!(config.dtc_command, CommandPolicy::new(3, 5000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = ObdConfig {
            dtc_command: CommandPolicy::new(3, 0),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ObdError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_inverted_voltage_range() {
        let config = ObdConfig {
            voltage_min: 16.0,
            voltage_max: 8.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_custom_timeout_keeps_retries() {
        let policy = CommandPolicy::new(3, 5000).with_timeout_ms(12_000);
        assert_eq!(policy.retries, 3);
        assert_eq!(policy.timeout_ms, 12_000);
    }
}

//! Probe settings
//!
//! Layered as built-in defaults, then an optional TOML file, then `OBD_*`
//! environment variables (nested keys joined with `__`, e.g.
//! `OBD_OBD__VOLTAGE_SETTLE_MS=800`).

use anyhow::{Context, Result};
use obd_protocol::ObdConfig;
use obd_scheduler::PollerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    /// Serial device of the adapter
    pub port: String,
    pub baud_rate: u32,
    /// Protocol timing
    pub obd: ObdConfig,
    /// Live data polling
    pub poller: PollerConfig,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            port: "/dev/rfcomm0".to_string(),
            baud_rate: 38400,
            obd: ObdConfig::default(),
            poller: PollerConfig::default(),
        }
    }
}

/// Load settings, reading `path` when given
pub fn load_settings(path: Option<&Path>) -> Result<ProbeSettings> {
    let mut builder = config::Config::builder().add_source(
        config::Config::try_from(&ProbeSettings::default())
            .context("Failed to encode default settings")?,
    );

    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path));
    }

    let settings: ProbeSettings = builder
        .add_source(
            config::Environment::with_prefix("OBD")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to read settings")?
        .try_deserialize()
        .context("Invalid settings")?;

    settings.obd.validate()?;
    Ok(settings)
}

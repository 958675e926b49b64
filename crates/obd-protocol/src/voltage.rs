//! Battery voltage read (`AT RV`)

use crate::client::ObdClient;
use crate::response::{self, ERROR, NO_DATA};
use regex::Regex;

impl ObdClient {
    /// Read the battery voltage measured at the OBD-II connector
    ///
    /// Wakes the adapter with a health probe first (the result is only
    /// logged), waits for it to settle, then sends `AT RV`. Returns the
    /// voltage text as the adapter printed it, without the unit, e.g.
    /// `"12.6"`. Readings outside the plausible battery window are logged
    /// and still returned.
    pub async fn fetch_voltage(&self) -> Option<String> {
        if !self.is_connected() {
            self.log().error("Cannot read voltage: no adapter attached");
            return None;
        }

        if !self.ensure_adapter_responsive().await {
            self.log()
                .warn("Adapter did not pass health probe, reading voltage anyway");
        }
        tokio::time::sleep(self.config().voltage_settle()).await;

        let raw = match self
            .send_command_with("AT RV", self.config().voltage_command)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                self.log().error(&format!("Voltage read failed: {e}"));
                return None;
            }
        };

        if raw.trim().is_empty()
            || response::contains_token(&raw, NO_DATA)
            || response::contains_token(&raw, ERROR)
        {
            self.log()
                .error(&format!("Adapter returned no voltage: {:?}", raw.trim()));
            return None;
        }

        let Some(text) = parse_voltage(&raw) else {
            self.log()
                .error(&format!("Could not parse voltage from {:?}", raw.trim()));
            return None;
        };

        // parse_voltage only returns digits with an optional fraction
        let volts: f64 = text.parse().ok()?;
        let config = self.config();
        if (config.voltage_min..=config.voltage_max).contains(&volts) {
            self.log().info(&format!("Battery voltage {text}V"));
        } else {
            self.log().warn(&format!(
                "Battery voltage {text}V outside {}-{}V",
                config.voltage_min, config.voltage_max
            ));
        }
        Some(text.to_string())
    }
}

/// Voltage matchers, most specific first
const VOLTAGE_PATTERNS: [&str; 3] = [
    // number with a standalone V unit: 12.6V, 12.6 V, 13V
    r"(?i)(\d+(?:\.\d+)?)\s*V\b",
    // any decimal number
    r"(\d+\.\d+)",
    // a line that is nothing but a number
    r"^(\d+(?:\.\d+)?)$",
];

/// Pull the voltage number out of an `AT RV` answer
///
/// Adapter firmwares disagree on the format, so the matchers are tried in
/// order and the first hit wins. Each matcher scans lines from the last one
/// back, so a reset banner such as `ELM327 v1.5` printed before the reading
/// is never taken for it.
pub fn parse_voltage(raw: &str) -> Option<&str> {
    let lines = response::normalize_lines(raw);
    VOLTAGE_PATTERNS.iter().find_map(|pattern| {
        let matcher = Regex::new(pattern).ok()?;
        lines
            .iter()
            .rev()
            .copied()
            .find_map(|line| Some(matcher.captures(line)?.get(1)?.as_str()))
    })
}

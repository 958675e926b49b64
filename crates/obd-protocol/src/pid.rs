//! OBD-II PID Definitions and Mode 01 Decoders
//!
//! Defines the Mode 01 Parameter IDs read by the client and their SAE
//! J1979 decoding formulas.

use crate::client::ObdClient;
use crate::response;
use serde::{Deserialize, Serialize};

/// Mode 01 PIDs understood by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Pid {
    /// Calculated engine load (0x04)
    EngineLoad = 0x04,
    /// Engine coolant temperature (0x05)
    CoolantTemp = 0x05,
    /// Intake manifold absolute pressure (0x0B)
    IntakeManifoldPressure = 0x0B,
    /// Engine RPM (0x0C)
    Rpm = 0x0C,
    /// Vehicle speed (0x0D)
    Speed = 0x0D,
    /// Intake air temperature (0x0F)
    IntakeAirTemp = 0x0F,
    /// Throttle position (0x11)
    ThrottlePosition = 0x11,
    /// Fuel tank level input (0x2F)
    FuelLevel = 0x2F,
}

impl Pid {
    /// Every PID, in the order a live-data cycle reads them
    pub const ALL: [Pid; 8] = [
        Pid::Rpm,
        Pid::Speed,
        Pid::CoolantTemp,
        Pid::IntakeAirTemp,
        Pid::ThrottlePosition,
        Pid::EngineLoad,
        Pid::IntakeManifoldPressure,
        Pid::FuelLevel,
    ];

    /// Get the PID hex value
    pub fn as_hex(&self) -> u8 {
        *self as u8
    }

    /// Get the number of response bytes for this PID
    pub fn response_bytes(&self) -> usize {
        match self {
            Pid::Rpm => 2,
            _ => 1,
        }
    }

    /// Mode 01 request text, e.g. `010C`
    pub fn command(&self) -> String {
        format!("{:02X}{:02X}", crate::mode::CURRENT_DATA, self.as_hex())
    }
}

/// Temperature reading in both scales
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Temperature {
    pub celsius: f64,
    pub fahrenheit: f64,
}

impl Temperature {
    pub fn from_celsius(celsius: f64) -> Self {
        Self {
            celsius,
            fahrenheit: celsius * 9.0 / 5.0 + 32.0,
        }
    }
}

/// Decoded value of one Mode 01 read
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MeasurementValue {
    /// RPM or percentage
    Number(f64),
    Temperature(Temperature),
    /// Raw single-byte quantity (kPa, km/h)
    Raw(u8),
}

impl MeasurementValue {
    /// Decode `bytes` according to the formula for `pid`
    ///
    /// Returns `None` when fewer bytes than the PID needs are given.
    pub fn decode(pid: Pid, bytes: &[u8]) -> Option<Self> {
        let a = *bytes.first()?;
        let value = match pid {
            Pid::Rpm => MeasurementValue::Number(decode_rpm(a, *bytes.get(1)?)),
            Pid::CoolantTemp | Pid::IntakeAirTemp => {
                MeasurementValue::Temperature(decode_temperature(a))
            }
            Pid::ThrottlePosition | Pid::FuelLevel | Pid::EngineLoad => {
                MeasurementValue::Number(decode_percentage(a))
            }
            Pid::IntakeManifoldPressure | Pid::Speed => MeasurementValue::Raw(a),
        };
        Some(value)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            MeasurementValue::Number(v) => Some(*v),
            MeasurementValue::Raw(v) => Some(f64::from(*v)),
            MeasurementValue::Temperature(_) => None,
        }
    }

    pub fn as_temperature(&self) -> Option<Temperature> {
        match self {
            MeasurementValue::Temperature(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_raw(&self) -> Option<u8> {
        match self {
            MeasurementValue::Raw(v) => Some(*v),
            _ => None,
        }
    }
}

/// RPM: ((A*256)+B)/4
pub fn decode_rpm(a: u8, b: u8) -> f64 {
    (f64::from(a) * 256.0 + f64::from(b)) / 4.0
}

/// Temperature: A - 40 (°C)
pub fn decode_temperature(a: u8) -> Temperature {
    Temperature::from_celsius(f64::from(a) - 40.0)
}

/// Percentage: A * 100 / 255, rounded to one decimal
pub fn decode_percentage(a: u8) -> f64 {
    let percent = f64::from(a) * 100.0 / 255.0;
    (percent * 10.0).round() / 10.0
}

impl ObdClient {
    /// Read one Mode 01 PID and decode it
    ///
    /// Never fails: a missing adapter, exhausted retries, an adapter error
    /// token, a missing `41 <pid>` line or malformed data bytes all give
    /// `None`.
    pub async fn read_measurement(&self, pid: Pid) -> Option<MeasurementValue> {
        let bytes = self.read_pid_bytes(pid).await?;
        MeasurementValue::decode(pid, &bytes)
    }

    /// Engine speed in revolutions per minute
    pub async fn get_engine_rpm(&self) -> Option<f64> {
        self.read_measurement(Pid::Rpm).await?.as_number()
    }

    pub async fn get_coolant_temperature(&self) -> Option<Temperature> {
        self.read_measurement(Pid::CoolantTemp)
            .await?
            .as_temperature()
    }

    pub async fn get_intake_air_temperature(&self) -> Option<Temperature> {
        self.read_measurement(Pid::IntakeAirTemp)
            .await?
            .as_temperature()
    }

    /// Throttle opening in percent
    pub async fn get_throttle_position(&self) -> Option<f64> {
        self.read_measurement(Pid::ThrottlePosition)
            .await?
            .as_number()
    }

    /// Fuel tank level in percent
    pub async fn get_fuel_level(&self) -> Option<f64> {
        self.read_measurement(Pid::FuelLevel).await?.as_number()
    }

    /// Calculated engine load in percent
    pub async fn get_engine_load(&self) -> Option<f64> {
        self.read_measurement(Pid::EngineLoad).await?.as_number()
    }

    /// Intake manifold absolute pressure in kPa
    pub async fn get_manifold_pressure(&self) -> Option<u8> {
        self.read_measurement(Pid::IntakeManifoldPressure)
            .await?
            .as_raw()
    }

    /// Vehicle speed in km/h
    pub async fn get_vehicle_speed(&self) -> Option<u8> {
        self.read_measurement(Pid::Speed).await?.as_raw()
    }

    async fn read_pid_bytes(&self, pid: Pid) -> Option<Vec<u8>> {
        let command = pid.command();
        if !self.is_connected() {
            self.log()
                .error(&format!("Cannot read {pid:?}: no adapter attached"));
            return None;
        }

        let raw = match self.send_command(&command).await {
            Ok(raw) => raw,
            Err(e) => {
                self.log().error(&format!("Reading {pid:?} failed: {e}"));
                return None;
            }
        };

        let lines = response::normalize_lines(&raw);
        let Some(line) = response::find_pid_line(&lines, pid.as_hex()) else {
            self.log()
                .debug(&format!("No {pid:?} data in response {:?}", raw.trim()));
            return None;
        };

        let bytes = response::extract_pid_bytes(line, pid.as_hex(), pid.response_bytes());
        if bytes.is_none() {
            self.log()
                .warn(&format!("Malformed {pid:?} data line {line:?}"));
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ObdConfig;
    use crate::mock::{MockReply, MockTransport};
    use proptest::prelude::*;
    use std::sync::Arc;

    fn client_with(mock: &Arc<MockTransport>) -> ObdClient {
        ObdClient::new(mock.clone(), ObdConfig::default())
    }

    fn client_answering(command: &str, reply: &str) -> ObdClient {
        let mock = Arc::new(MockTransport::new());
        mock.set_fallback(command, MockReply::text(reply));
        client_with(&mock)
    }

    #[test]
    fn test_commands() {
        assert_eq!(Pid::Rpm.command(), "010C");
        assert_eq!(Pid::FuelLevel.command(), "012F");
        assert_eq!(Pid::EngineLoad.command(), "0104");
    }

    #[test]
    fn test_rpm_decode() {
        // 1A F8 => ((0x1A * 256) + 0xF8) / 4 = (26*256 + 248) / 4 = 1726
        assert_eq!(decode_rpm(0x1A, 0xF8), 1726.0);
        assert_eq!(decode_rpm(0x1A, 0x2B), 1674.75);
    }

    #[test]
    fn test_coolant_temp_decode() {
        // 0x7B = 123, so temp = 123 - 40 = 83°C
        let temp = decode_temperature(0x7B);
        assert_eq!(temp.celsius, 83.0);
        assert!((temp.fahrenheit - 181.4).abs() < 1e-9);
        assert_eq!(decode_temperature(0x00).celsius, -40.0);
        assert_eq!(decode_temperature(0x00).fahrenheit, -40.0);
    }

    #[test]
    fn test_percentage_rounding() {
        assert_eq!(decode_percentage(0x00), 0.0);
        assert_eq!(decode_percentage(0xFF), 100.0);
        // 0x64 = 100, 100*100/255 = 39.215...
        assert_eq!(decode_percentage(0x64), 39.2);
    }

    #[test]
    fn test_decode_needs_enough_bytes() {
        assert_eq!(MeasurementValue::decode(Pid::Rpm, &[0x1A]), None);
        assert_eq!(MeasurementValue::decode(Pid::Speed, &[]), None);
        assert_eq!(
            MeasurementValue::decode(Pid::Speed, &[0x28]),
            Some(MeasurementValue::Raw(40))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_engine_rpm() {
        let client = client_answering("010C", "010C\r41 0C 1A F8\r\r>");
        assert_eq!(client.get_engine_rpm().await, Some(1726.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_temperatures() {
        let client = client_answering("0105", "41 05 7B");
        assert_eq!(client.get_coolant_temperature().await.unwrap().celsius, 83.0);

        let client = client_answering("010F", "41 0f 38");
        let temp = client.get_intake_air_temperature().await.unwrap();
        assert_eq!(temp.celsius, 16.0);
        assert!((temp.fahrenheit - 60.8).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_percentages() {
        let mock = Arc::new(MockTransport::healthy_vehicle());
        let client = client_with(&mock);

        assert_eq!(client.get_throttle_position().await, Some(14.9));
        assert_eq!(client.get_fuel_level().await, Some(61.2));
        assert_eq!(client.get_engine_load().await, Some(39.2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_raw_values() {
        let client = client_answering("010B", "41 0B 21");
        assert_eq!(client.get_manifold_pressure().await, Some(33));

        let client = client_answering("010D", "SEARCHING...\r41 0D 28\r>");
        assert_eq!(client.get_vehicle_speed().await, Some(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_adapter_errors_give_none() {
        for reply in ["NO DATA", "CAN ERROR", "?", "41 0D", "41 0D ZZ", "7F 01 12"] {
            let client = client_answering("010D", reply);
            assert_eq!(client.get_vehicle_speed().await, None, "reply {reply:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_give_none() {
        let mock = Arc::new(MockTransport::new());
        mock.set_fallback("010C", MockReply::Timeout);

        assert_eq!(client_with(&mock).get_engine_rpm().await, None);
        assert_eq!(mock.call_count("010C"), 3);
    }

    #[tokio::test]
    async fn test_no_device_short_circuits() {
        let client = ObdClient::disconnected(ObdConfig::default());
        assert_eq!(client.get_engine_rpm().await, None);
        assert_eq!(client.get_coolant_temperature().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_reads_are_identical() {
        let client = client_answering("0105", "41 05 7B");
        let first = client.get_coolant_temperature().await;
        let second = client.get_coolant_temperature().await;
        assert!(first.is_some());
        assert_eq!(first, second);
    }

    proptest! {
        #[test]
        fn prop_rpm_is_exact_and_non_negative(a: u8, b: u8) {
            let rpm = decode_rpm(a, b);
            prop_assert!(rpm >= 0.0);
            prop_assert_eq!(rpm * 4.0, f64::from(a) * 256.0 + f64::from(b));
        }

        #[test]
        fn prop_fahrenheit_follows_celsius(a: u8) {
            let temp = decode_temperature(a);
            prop_assert_eq!(temp.fahrenheit, temp.celsius * 9.0 / 5.0 + 32.0);
        }

        #[test]
        fn prop_percentage_within_bounds(a: u8) {
            let percent = decode_percentage(a);
            prop_assert!((0.0..=100.0).contains(&percent));
        }

        #[test]
        fn prop_extracted_rpm_bytes_match(a: u8, b: u8) {
            let line = format!("41 0C {a:02X} {b:02X}");
            prop_assert_eq!(
                response::extract_pid_bytes(&line, 0x0C, 2),
                Some(vec![a, b])
            );
        }
    }
}

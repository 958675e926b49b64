//! Diagnostic Trouble Codes (Mode 03 read, Mode 04 clear)

use crate::client::ObdClient;
use crate::mode;
use crate::response::{self, NO_DATA};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Mode 03 line when no code is stored: `43 00`, maybe with zero padding
const NO_CODES_LINE: &str = r"^43(?:\s*00)+$";

/// System a trouble code belongs to (top two bits of the first byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DtcCategory {
    /// P (00)
    Powertrain,
    /// C (01)
    Chassis,
    /// B (10)
    Body,
    /// U (11)
    Network,
}

impl DtcCategory {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => DtcCategory::Powertrain,
            1 => DtcCategory::Chassis,
            2 => DtcCategory::Body,
            _ => DtcCategory::Network,
        }
    }

    fn bits(&self) -> u8 {
        match self {
            DtcCategory::Powertrain => 0,
            DtcCategory::Chassis => 1,
            DtcCategory::Body => 2,
            DtcCategory::Network => 3,
        }
    }

    pub fn prefix(&self) -> char {
        match self {
            DtcCategory::Powertrain => 'P',
            DtcCategory::Chassis => 'C',
            DtcCategory::Body => 'B',
            DtcCategory::Network => 'U',
        }
    }

    fn from_prefix(prefix: char) -> Option<Self> {
        match prefix.to_ascii_uppercase() {
            'P' => Some(DtcCategory::Powertrain),
            'C' => Some(DtcCategory::Chassis),
            'B' => Some(DtcCategory::Body),
            'U' => Some(DtcCategory::Network),
            _ => None,
        }
    }
}

/// A stored trouble code such as `P0301`
///
/// Wire layout, two bytes `A B`:
/// - `A` bits 7-6: category
/// - `A` bits 5-0: first group, printed as two hex digits
/// - `B` high nibble, then low nibble: last two digits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DtcCode {
    bytes: [u8; 2],
}

impl DtcCode {
    pub fn from_bytes(a: u8, b: u8) -> Self {
        Self { bytes: [a, b] }
    }

    /// Two-byte wire form, as found in a Mode 03 answer
    pub fn to_bytes(&self) -> [u8; 2] {
        self.bytes
    }

    pub fn category(&self) -> DtcCategory {
        DtcCategory::from_bits(self.bytes[0] >> 6)
    }
}

impl fmt::Display for DtcCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b] = self.bytes;
        write!(
            f,
            "{}{:02X}{:X}{:X}",
            self.category().prefix(),
            a & 0x3F,
            b >> 4,
            b & 0x0F
        )
    }
}

/// Error parsing a textual trouble code
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid trouble code {0:?}")]
pub struct ParseDtcError(String);

impl FromStr for DtcCode {
    type Err = ParseDtcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseDtcError(s.to_string());
        let mut chars = s.chars();
        let category = chars
            .next()
            .and_then(DtcCategory::from_prefix)
            .ok_or_else(invalid)?;
        let digits = chars.as_str();
        if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let group = u8::from_str_radix(&digits[..2], 16).map_err(|_| invalid())?;
        if group > 0x3F {
            return Err(invalid());
        }
        let rest = u8::from_str_radix(&digits[2..], 16).map_err(|_| invalid())?;

        Ok(Self::from_bytes(category.bits() << 6 | group, rest))
    }
}

impl TryFrom<String> for DtcCode {
    type Error = ParseDtcError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DtcCode> for String {
    fn from(code: DtcCode) -> Self {
        code.to_string()
    }
}

/// Decode every trouble code in a Mode 03 answer
///
/// Each line containing `43` contributes the codes found after its first
/// `43`, read as 4-hex-digit chunks. All-zero chunks are padding. Codes are
/// returned in order and not deduplicated.
///
/// `NO DATA` anywhere, or a line that is only `43 00` plus zero padding,
/// means no stored codes. The `43 00` marker only counts at the start of a
/// line, so code bytes that happen to read `43 00` (P0143 then padding)
/// are still decoded.
pub fn parse_dtc_response(raw: &str) -> Vec<DtcCode> {
    let upper = raw.to_ascii_uppercase();
    let lines = response::normalize_lines(&upper);
    let no_codes = Regex::new(NO_CODES_LINE)
        .map(|marker| lines.iter().any(|line| marker.is_match(line)))
        .unwrap_or(false);
    if upper.contains(NO_DATA) || no_codes {
        return Vec::new();
    }

    let mut codes = Vec::new();
    for line in lines {
        let Some(pos) = line.find("43") else {
            continue;
        };
        let payload: Vec<u8> = line[pos + 2..]
            .bytes()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();

        for chunk in payload.chunks_exact(4) {
            let Some([a, b]) = chunk_bytes(chunk) else {
                continue;
            };
            if a == 0 && b == 0 {
                continue;
            }
            codes.push(DtcCode::from_bytes(a, b));
        }
    }
    codes
}

fn chunk_bytes(chunk: &[u8]) -> Option<[u8; 2]> {
    let text = std::str::from_utf8(chunk).ok()?;
    let value = u16::from_str_radix(text, 16).ok()?;
    Some(value.to_be_bytes())
}

/// Whether a Mode 04 answer acknowledges the clear
pub fn is_clear_acknowledged(raw: &str) -> bool {
    let echo = format!("{:02X}", response::positive_response(mode::CLEAR_DTC));
    raw.contains(&echo) || raw.to_ascii_uppercase().contains("OK")
}

impl ObdClient {
    /// Read stored trouble codes (Mode 03)
    ///
    /// Returns an empty list when none are stored and when the read fails.
    pub async fn get_dtc_codes(&self) -> Vec<DtcCode> {
        if !self.is_connected() {
            self.log()
                .error("Cannot read trouble codes: no adapter attached");
            return Vec::new();
        }

        let command = format!("{:02X}", mode::READ_DTC);
        let raw = match self
            .send_command_with(&command, self.config().dtc_command)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                self.log().error(&format!("Reading trouble codes failed: {e}"));
                return Vec::new();
            }
        };

        let codes = parse_dtc_response(&raw);
        if codes.is_empty() {
            self.log().info("No stored trouble codes");
        } else {
            let list: Vec<String> = codes.iter().map(ToString::to_string).collect();
            self.log().info(&format!(
                "Found {} trouble code(s): {}",
                codes.len(),
                list.join(", ")
            ));
        }
        codes
    }

    /// Clear stored trouble codes and the MIL (Mode 04)
    pub async fn clear_dtc_codes(&self) -> bool {
        if !self.is_connected() {
            self.log()
                .error("Cannot clear trouble codes: no adapter attached");
            return false;
        }

        let command = format!("{:02X}", mode::CLEAR_DTC);
        match self
            .send_command_with(&command, self.config().dtc_command)
            .await
        {
            Ok(raw) if is_clear_acknowledged(&raw) => {
                self.log().info("Trouble codes cleared");
                true
            }
            Ok(raw) => {
                self.log().warn(&format!(
                    "Adapter refused to clear trouble codes: {:?}",
                    raw.trim()
                ));
                false
            }
            Err(e) => {
                self.log()
                    .error(&format!("Clearing trouble codes failed: {e}"));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ObdConfig;
    use crate::mock::{MockReply, MockTransport};
    use proptest::prelude::*;
    use std::sync::Arc;

    fn client_answering(command: &str, reply: MockReply) -> (ObdClient, Arc<MockTransport>) {
        let mock = Arc::new(MockTransport::new());
        mock.set_fallback(command, reply);
        (ObdClient::new(mock.clone(), ObdConfig::default()), mock)
    }

    fn codes(raw: &str) -> Vec<String> {
        parse_dtc_response(raw)
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn test_decode_literal_bytes() {
        // 0x01 = 00|000001 => P, group 01; 0x23 => 2, 3
        assert_eq!(DtcCode::from_bytes(0x01, 0x23).to_string(), "P0123");
        // 0x03 0x01 => P0301
        assert_eq!(DtcCode::from_bytes(0x03, 0x01).to_string(), "P0301");
        // 0x41 = 01|000001 => C0100 with 0x00
        assert_eq!(DtcCode::from_bytes(0x41, 0x00).to_string(), "C0100");
        // 0x81 = 10|000001 => B0123
        assert_eq!(DtcCode::from_bytes(0x81, 0x23).to_string(), "B0123");
        // 0xC1 = 11|000001 => U0155
        assert_eq!(DtcCode::from_bytes(0xC1, 0x55).to_string(), "U0155");
        assert_eq!(DtcCode::from_bytes(0xC1, 0x55).category(), DtcCategory::Network);
    }

    #[test]
    fn test_parse_single_code() {
        assert_eq!(codes("43 01 23 00 00"), vec!["P0123"]);
    }

    #[test]
    fn test_parse_empty_responses() {
        assert!(codes("NO DATA").is_empty());
        assert!(codes("43 00").is_empty());
        assert!(codes("03\r43 00 00 00 00 00 00\r>").is_empty());
        assert!(codes("").is_empty());
    }

    #[test]
    fn test_code_bytes_reading_43_00_are_kept() {
        assert_eq!(codes("43 01 43 00 00 00 00"), vec!["P0143"]);
        assert_eq!(codes("03\r43 01 43 00 00\r>"), vec!["P0143"]);
    }

    #[test]
    fn test_parse_multiple_lines_without_dedup() {
        let raw = "03\r43 01 33 03 01 00 00\r43 01 33 C1 55\r\r>";
        assert_eq!(codes(raw), vec!["P0133", "P0301", "P0133", "U0155"]);
    }

    #[test]
    fn test_parse_without_spaces() {
        assert_eq!(codes("4301330301"), vec!["P0133", "P0301"]);
    }

    #[test]
    fn test_parse_skips_malformed_chunk() {
        assert_eq!(codes("43 ZZ 01 03 01"), vec!["P0301"]);
    }

    #[test]
    fn test_from_str() {
        let code: DtcCode = "P0301".parse().unwrap();
        assert_eq!(code.to_bytes(), [0x03, 0x01]);
        assert_eq!("u0155".parse::<DtcCode>().unwrap().to_bytes(), [0xC1, 0x55]);
        assert!("X0301".parse::<DtcCode>().is_err());
        assert!("P030".parse::<DtcCode>().is_err());
        assert!("P4001".parse::<DtcCode>().is_err());
    }

    #[test]
    fn test_string_conversions() {
        let code = DtcCode::from_bytes(0x03, 0x01);
        assert_eq!(String::from(code), "P0301");
        assert_eq!(DtcCode::try_from("P0301".to_string()), Ok(code));
    }

    #[test]
    fn test_clear_acknowledgement() {
        assert!(is_clear_acknowledged("44"));
        assert!(is_clear_acknowledged("04\r44\r>"));
        assert!(is_clear_acknowledged("OK"));
        assert!(!is_clear_acknowledged("7F 04 31"));
        assert!(!is_clear_acknowledged("NO DATA"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_dtc_codes() {
        let (client, mock) = client_answering("03", MockReply::text("43 01 23 00 00"));
        let found = client.get_dtc_codes().await;
        assert_eq!(found, vec![DtcCode::from_bytes(0x01, 0x23)]);
        assert_eq!(mock.call_count("03"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_dtc_codes_timeout_uses_dtc_policy() {
        let (client, mock) = client_answering("03", MockReply::Timeout);
        assert!(client.get_dtc_codes().await.is_empty());
        assert_eq!(mock.call_count("03"), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_dtc_codes() {
        let (client, _) = client_answering("04", MockReply::text("44"));
        assert!(client.clear_dtc_codes().await);

        let (client, _) = client_answering("04", MockReply::text("7F 04 31"));
        assert!(!client.clear_dtc_codes().await);

        let (client, mock) = client_answering("04", MockReply::Timeout);
        assert!(!client.clear_dtc_codes().await);
        assert_eq!(mock.call_count("04"), 4);
    }

    #[tokio::test]
    async fn test_without_device() {
        let client = ObdClient::disconnected(ObdConfig::default());
        assert!(client.get_dtc_codes().await.is_empty());
        assert!(!client.clear_dtc_codes().await);
    }

    proptest! {
        #[test]
        fn prop_bytes_round_trip_through_text(a: u8, b: u8) {
            let code = DtcCode::from_bytes(a, b);
            let parsed: DtcCode = code.to_string().parse().unwrap();
            prop_assert_eq!(parsed.to_bytes(), [a, b]);
        }

        #[test]
        fn prop_prefix_matches_top_bits(a: u8, b: u8) {
            let text = DtcCode::from_bytes(a, b).to_string();
            let expected = ['P', 'C', 'B', 'U'][usize::from(a >> 6)];
            prop_assert_eq!(text.len(), 5);
            prop_assert_eq!(text.chars().next(), Some(expected));
        }
    }
}

//! Raw adapter output handling
//!
//! ELM327 firmwares differ in echo, spacing, casing and line endings.
//! Matching ignores whitespace and case but requires exact hex digits.

use regex::Regex;

/// Adapter reply when the vehicle did not answer
pub const NO_DATA: &str = "NO DATA";
/// Generic adapter failure token (also covers `CAN ERROR`, `BUS ERROR`)
pub const ERROR: &str = "ERROR";
/// Adapter reply to a command it did not understand
pub const UNKNOWN_COMMAND: &str = "?";

/// Mode response bytes are the request mode plus 0x40
pub const fn positive_response(mode: u8) -> u8 {
    mode + 0x40
}

/// Split raw output into trimmed, non-empty lines
///
/// Carriage returns and newlines both terminate a line. Order is kept and
/// nothing else is filtered, so echoes and the `>` prompt survive as lines.
pub fn normalize_lines(raw: &str) -> Vec<&str> {
    raw.split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

/// Case-insensitive substring test against an adapter token
pub fn contains_token(raw: &str, token: &str) -> bool {
    raw.to_ascii_uppercase().contains(token)
}

/// Last line carrying the `41 <pid>` echo, if any
///
/// The search runs from the end because the data frame follows any echo
/// or status noise the adapter prints first.
pub fn find_pid_line<'a>(lines: &[&'a str], pid: u8) -> Option<&'a str> {
    let echo = Regex::new(&format!(r"(?i){}", echo_pattern(pid))).ok()?;
    lines.iter().rev().copied().find(|line| echo.is_match(line))
}

/// Data bytes that directly follow the `41 <pid>` echo in `line`
///
/// Exactly `count` hex pairs must be present right after the echo,
/// separated by optional whitespace. Anything else yields `None`.
pub fn extract_pid_bytes(line: &str, pid: u8, count: usize) -> Option<Vec<u8>> {
    let strict = Regex::new(&format!(
        r"(?i){}((?:\s*[0-9A-F]{{2}}){{{count}}})",
        echo_pattern(pid)
    ))
    .ok()?;
    let digits: Vec<u8> = strict
        .captures(line)?
        .get(1)?
        .as_str()
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();

    digits
        .chunks_exact(2)
        .map(|pair| u8::from_str_radix(std::str::from_utf8(pair).ok()?, 16).ok())
        .collect()
}

/// `41 <pid>` with optional whitespace between the two bytes
fn echo_pattern(pid: u8) -> String {
    format!(
        r"{:02X}\s*{pid:02X}",
        positive_response(crate::mode::CURRENT_DATA)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_multiframe() {
        assert_eq!(
            normalize_lines("41 0C\r1A\rF8\r>"),
            vec!["41 0C", "1A", "F8", ">"]
        );
    }

    #[test]
    fn test_normalize_drops_empty_lines() {
        assert_eq!(
            normalize_lines("\r\n010C\r\r\n  41 0C 1A F8  \n\n>"),
            vec!["010C", "41 0C 1A F8", ">"]
        );
        assert!(normalize_lines("").is_empty());
        assert!(normalize_lines(" \r \n\t").is_empty());
    }

    #[test]
    fn test_find_pid_line_prefers_last_match() {
        let lines = vec!["41 0C 00 00", "SEARCHING...", "41 0C 1A F8", ">"];
        assert_eq!(find_pid_line(&lines, 0x0C), Some("41 0C 1A F8"));
    }

    #[test]
    fn test_find_pid_line_ignores_request_echo() {
        let lines = vec!["010C", "NO DATA"];
        assert_eq!(find_pid_line(&lines, 0x0C), None);
    }

    #[test]
    fn test_find_pid_line_wrong_pid() {
        let lines = vec!["41 0D 28"];
        assert_eq!(find_pid_line(&lines, 0x0C), None);
    }

    #[test]
    fn test_extract_with_flexible_spacing_and_case() {
        assert_eq!(extract_pid_bytes("41 0C 1A F8", 0x0C, 2), Some(vec![0x1A, 0xF8]));
        assert_eq!(extract_pid_bytes("410c1af8", 0x0C, 2), Some(vec![0x1A, 0xF8]));
        assert_eq!(extract_pid_bytes("41  0C\t1A  F8", 0x0C, 2), Some(vec![0x1A, 0xF8]));
    }

    #[test]
    fn test_extract_with_can_header() {
        assert_eq!(extract_pid_bytes("7E8 03 41 05 7B", 0x05, 1), Some(vec![0x7B]));
    }

    #[test]
    fn test_extract_rejects_malformed_bytes() {
        assert_eq!(extract_pid_bytes("41 0C ZZ F8", 0x0C, 2), None);
        assert_eq!(extract_pid_bytes("41 0C 1A", 0x0C, 2), None);
        assert_eq!(extract_pid_bytes("41 05", 0x05, 1), None);
    }

    #[test]
    fn test_extract_finds_echo_after_other_pid() {
        assert_eq!(extract_pid_bytes("41 0D 28 41 0C 0B B8", 0x0C, 2), Some(vec![0x0B, 0xB8]));
    }

    #[test]
    fn test_contains_token_is_case_insensitive() {
        assert!(contains_token("no data", NO_DATA));
        assert!(contains_token("CAN ERROR", ERROR));
        assert!(!contains_token("41 0C 1A F8", ERROR));
    }
}

//! OBD-II Protocol Implementation
//!
//! Command/response engine for ELM327-compatible OBD-II adapters: a
//! dispatcher with per-attempt timeouts and fixed retries, adapter health
//! probing, Mode 01 live-data decoders, battery voltage and Mode 03/04
//! trouble code handling.
//!
//! The adapter itself is reached through a [`Transport`]. Decoders never
//! return errors: a failed read is reported as `None`, `false` or an empty
//! list and the reason goes to the log.

mod client;
mod config;
mod dtc;
mod error;
mod log;
mod mock;
mod pid;
mod response;
mod transport;
mod voltage;

pub use client::ObdClient;
pub use config::{CommandPolicy, ObdConfig};
pub use dtc::{is_clear_acknowledged, parse_dtc_response, DtcCategory, DtcCode, ParseDtcError};
pub use error::ObdError;
pub use log::{LogFn, LogSink};
pub use mock::{MockReply, MockTransport};
pub use pid::{
    decode_percentage, decode_rpm, decode_temperature, MeasurementValue, Pid, Temperature,
};
pub use response::{extract_pid_bytes, find_pid_line, normalize_lines};
pub use transport::{SerialTransport, Transport};
pub use voltage::parse_voltage;

/// OBD-II mode constants
pub mod mode {
    /// Current data
    pub const CURRENT_DATA: u8 = 0x01;
    /// Diagnostic trouble codes
    pub const READ_DTC: u8 = 0x03;
    /// Clear trouble codes
    pub const CLEAR_DTC: u8 = 0x04;
}

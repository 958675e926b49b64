//! OBD-II Error Types

use thiserror::Error;

/// Errors that can occur while talking to an OBD-II adapter
///
/// Only the dispatcher and the transports produce these. The public
/// decoders fold every variant into their "no reading" result.
#[derive(Debug, Error)]
pub enum ObdError {
    /// No adapter is attached to the client
    #[error("No OBD adapter attached")]
    NoDevice,

    /// Timeout waiting for a single response
    #[error("Timeout waiting for OBD response after {0}ms")]
    Timeout(u64),

    /// Every attempt of a command failed
    #[error("Command {command:?} failed after {attempts} attempts")]
    RetriesExhausted { command: String, attempts: u32 },

    /// Serial port connection error
    #[error("Serial port error: {0}")]
    Serial(String),

    /// Transport produced bytes that are not adapter text
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<std::io::Error> for ObdError {
    fn from(err: std::io::Error) -> Self {
        ObdError::Serial(err.to_string())
    }
}

impl From<tokio_serial::Error> for ObdError {
    fn from(err: tokio_serial::Error) -> Self {
        ObdError::Serial(err.to_string())
    }
}

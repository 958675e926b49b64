//! OBD-II Client for ELM327 Adapters
//!
//! Owns the command dispatcher: one command, a fixed number of attempts,
//! a timeout per attempt. Measurement decoders live in their own modules
//! and are exposed as methods on [`ObdClient`].

use crate::config::{CommandPolicy, ObdConfig};
use crate::error::ObdError;
use crate::log::LogSink;
use crate::response::{self, ERROR, UNKNOWN_COMMAND};
use crate::transport::Transport;
use std::sync::Arc;

/// Adapter setup sent by [`ObdClient::initialize`]
const INIT_SEQUENCE: [&str; 5] = [
    "ATZ",   // reset
    "ATE0",  // echo off
    "ATL0",  // linefeeds off
    "ATS1",  // spaces between bytes
    "ATSP0", // let the adapter pick the bus protocol
];

/// OBD-II client for communicating with ELM327-compatible adapters
///
/// The client holds no protocol state between calls. Every method builds
/// its command, dispatches it and decodes the answer independently, so a
/// client can be shared behind an `Arc`. The adapter is half-duplex: callers
/// must not overlap commands on one physical adapter.
#[derive(Clone)]
pub struct ObdClient {
    /// Attached adapter, `None` when no device is connected
    device: Option<Arc<dyn Transport>>,
    /// Timing and retry configuration
    config: ObdConfig,
    /// Human-readable trace
    log: LogSink,
}

impl ObdClient {
    /// Create a client talking through `transport`
    pub fn new(transport: Arc<dyn Transport>, config: ObdConfig) -> Self {
        Self {
            device: Some(transport),
            config,
            log: LogSink::silent(),
        }
    }

    /// Create a client with no adapter attached
    ///
    /// Every decoder on such a client returns its empty result.
    pub fn disconnected(config: ObdConfig) -> Self {
        Self {
            device: None,
            config,
            log: LogSink::silent(),
        }
    }

    /// Forward trace lines to `log` in addition to `tracing`
    pub fn with_log_sink(mut self, log: LogSink) -> Self {
        self.log = log;
        self
    }

    pub fn config(&self) -> &ObdConfig {
        &self.config
    }

    pub fn log(&self) -> &LogSink {
        &self.log
    }

    /// Check if an adapter is attached
    pub fn is_connected(&self) -> bool {
        self.device.is_some()
    }

    /// Send `command` with the default retry policy
    pub async fn send_command(&self, command: &str) -> Result<String, ObdError> {
        self.send_command_with(command, self.config.default_command)
            .await
    }

    /// Send `command` with an explicit retry count and per-attempt timeout
    ///
    /// Any non-blank answer is returned as is, including `NO DATA`, `ERROR`
    /// and `?`: interpreting those is up to the decoder. The call fails only
    /// when no adapter is attached or all `policy.retries + 1` attempts time
    /// out, fail in the transport, or come back blank.
    pub async fn send_command_with(
        &self,
        command: &str,
        policy: CommandPolicy,
    ) -> Result<String, ObdError> {
        let Some(device) = &self.device else {
            self.log
                .error(&format!("Cannot send {command}: no adapter attached"));
            return Err(ObdError::NoDevice);
        };

        let attempts = policy.attempts();
        for attempt in 1..=attempts {
            self.log.debug(&format!(
                "Sending {command} to {} (attempt {attempt}/{attempts}, timeout {}ms)",
                device.describe(),
                policy.timeout_ms
            ));

            match tokio::time::timeout(policy.timeout(), device.send(command)).await {
                Ok(Ok(raw)) if !raw.trim().is_empty() => {
                    self.log.debug(&format!(
                        "Response to {command}: {}",
                        raw.trim().escape_debug()
                    ));
                    return Ok(raw);
                }
                Ok(Ok(_)) => {
                    self.log.warn(&format!(
                        "Empty response to {command} (attempt {attempt}/{attempts})"
                    ));
                }
                Ok(Err(e)) => {
                    self.log.warn(&format!(
                        "{command} failed (attempt {attempt}/{attempts}): {e}"
                    ));
                }
                Err(_) => {
                    let e = ObdError::Timeout(policy.timeout_ms);
                    self.log.warn(&format!(
                        "{command} failed (attempt {attempt}/{attempts}): {e}"
                    ));
                }
            }
        }

        self.log
            .error(&format!("{command} gave no response after {attempts} attempts"));
        Err(ObdError::RetriesExhausted {
            command: command.to_string(),
            attempts,
        })
    }

    /// Probe the adapter with a bare `AT`
    ///
    /// Advisory only. Some adapters fail the probe and still answer PID
    /// requests, so callers log a `false` and carry on.
    pub async fn ensure_adapter_responsive(&self) -> bool {
        match self.send_command_with("AT", self.config.health_probe).await {
            Ok(raw) => {
                let ok = !raw.trim().is_empty()
                    && !response::contains_token(&raw, ERROR)
                    && !raw.contains(UNKNOWN_COMMAND);
                if ok {
                    self.log.debug("Adapter answered health probe");
                } else {
                    self.log.warn(&format!(
                        "Adapter health probe got {:?}",
                        raw.trim()
                    ));
                }
                ok
            }
            Err(e) => {
                self.log
                    .warn(&format!("Adapter health probe failed: {e}"));
                false
            }
        }
    }

    /// Run the ELM327 setup sequence
    ///
    /// Each step is best-effort. Only a missing adapter is an error.
    pub async fn initialize(&self) -> Result<(), ObdError> {
        if self.device.is_none() {
            self.log.error("Cannot initialize: no adapter attached");
            return Err(ObdError::NoDevice);
        }

        self.log.info("Initializing OBD adapter");
        for command in INIT_SEQUENCE {
            match self.send_command(command).await {
                Ok(raw) if response::contains_token(&raw, ERROR) || raw.contains(UNKNOWN_COMMAND) => {
                    self.log
                        .warn(&format!("{command} rejected by adapter: {:?}", raw.trim()));
                }
                Ok(_) => {}
                Err(e) => self.log.warn(&format!("{command} not acknowledged: {e}")),
            }
        }
        self.log.info("OBD adapter initialized");
        Ok(())
    }
}

impl std::fmt::Debug for ObdClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObdClient")
            .field("device", &self.device.as_ref().map(|d| d.describe()))
            .field("config", &self.config)
            .finish()
    }
}

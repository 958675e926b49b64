//! Adapter transport seam
//!
//! A transport performs exactly one write/answer cycle. Timeouts and
//! retries are the dispatcher's job, so implementations should simply wait
//! for the adapter and report hard failures.

use crate::error::ObdError;
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, trace};

/// ELM327 prompt character marking the end of a response
const PROMPT: u8 = b'>';

/// Upper bound on a single response (multi-frame DTC dumps included)
const MAX_RESPONSE_BYTES: usize = 4096;

/// One command in, one raw response out
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write `command` to the adapter and return everything it answered
    async fn send(&self, command: &str) -> Result<String, ObdError>;

    /// Short description for log lines
    fn describe(&self) -> String {
        "adapter".to_string()
    }
}

/// ELM327 on a serial device (USB, RFCOMM or a BLE-serial bridge)
pub struct SerialTransport {
    device: String,
    port: Mutex<SerialStream>,
}

impl SerialTransport {
    /// Open the serial device
    ///
    /// # Arguments
    /// * `device` - Serial port device path (e.g. "/dev/rfcomm0" or "COM3")
    /// * `baud_rate` - Baud rate for serial communication
    pub fn open(device: &str, baud_rate: u32) -> Result<Self, ObdError> {
        info!("Opening ELM327 adapter on {} at {} baud", device, baud_rate);
        let port = tokio_serial::new(device, baud_rate).open_native_async()?;

        Ok(Self {
            device: device.to_string(),
            port: Mutex::new(port),
        })
    }

    async fn read_until_prompt(port: &mut SerialStream) -> Result<Vec<u8>, ObdError> {
        let mut response = Vec::new();
        let mut buf = [0u8; 64];

        loop {
            let n = port.read(&mut buf).await?;
            if n == 0 {
                return Err(ObdError::Serial("serial port closed".to_string()));
            }
            trace!("Response buffer ({:?})", &buf[..n]);

            if let Some(pos) = buf[..n].iter().position(|b| *b == PROMPT) {
                response.extend_from_slice(&buf[..pos]);
                return Ok(response);
            }
            response.extend_from_slice(&buf[..n]);

            if response.len() > MAX_RESPONSE_BYTES {
                return Err(ObdError::InvalidResponse(format!(
                    "no prompt after {} bytes",
                    response.len()
                )));
            }
        }
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&self, command: &str) -> Result<String, ObdError> {
        let mut port = self.port.lock().await;

        // Leftovers from an attempt abandoned on timeout would be taken for this answer
        port.clear(ClearBuffer::Input)?;

        debug!("Write string ({})", command);
        port.write_all(command.as_bytes()).await?;
        port.write_all(b"\r").await?;
        port.flush().await?;

        let bytes = Self::read_until_prompt(&mut port).await?;
        let response =
            String::from_utf8(bytes).map_err(|e| ObdError::InvalidResponse(e.to_string()))?;

        debug!("Response string ({})", response.escape_debug());
        Ok(response)
    }

    fn describe(&self) -> String {
        self.device.clone()
    }
}

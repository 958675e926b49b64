//! Human-readable protocol trace
//!
//! Every message is emitted through `tracing`. Callers that want to show
//! the exchange to a user (a diagnostics console, a log pane) can attach a
//! callback that receives the same lines as plain text.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Callback receiving one trace line per call
pub type LogFn = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Clone, Default)]
pub struct LogSink {
    callback: Option<LogFn>,
}

impl LogSink {
    /// Trace only through `tracing`
    pub fn silent() -> Self {
        Self::default()
    }

    /// Also forward every line to `callback`
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self {
            callback: Some(Arc::new(callback)),
        }
    }

    pub fn debug(&self, message: &str) {
        debug!(target: "obd", "{}", message);
        self.forward(message);
    }

    pub fn info(&self, message: &str) {
        info!(target: "obd", "{}", message);
        self.forward(message);
    }

    pub fn warn(&self, message: &str) {
        warn!(target: "obd", "{}", message);
        self.forward(message);
    }

    pub fn error(&self, message: &str) {
        error!(target: "obd", "{}", message);
        self.forward(message);
    }

    fn forward(&self, message: &str) {
        if let Some(callback) = &self.callback {
            callback(message);
        }
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink")
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod capture {
    use super::LogSink;
    use std::sync::{Arc, Mutex};

    /// Sink that records every forwarded line for assertions
    pub fn sink() -> (LogSink, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&lines);
        let sink = LogSink::new(move |line| recorded.lock().unwrap().push(line.to_string()));
        (sink, lines)
    }
}

//! Scripted transport for tests and for running without hardware

use crate::error::ObdError;
use crate::transport::Transport;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// What the mock adapter does for one attempt
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    /// Answer with this raw text
    Text(String),
    /// Never answer, so the dispatcher's timeout fires
    Timeout,
    /// Fail the write (dropped link, closed port)
    Fail(String),
}

impl MockReply {
    pub fn text(text: &str) -> Self {
        MockReply::Text(text.to_string())
    }
}

#[derive(Debug, Default)]
struct MockState {
    /// One-shot replies consumed in order
    scripted: HashMap<String, VecDeque<MockReply>>,
    /// Reply used once the script for a command runs dry
    fallback: HashMap<String, MockReply>,
    /// Every command received, in order
    calls: Vec<String>,
}

/// In-memory ELM327 stand-in
///
/// Commands with no script and no fallback get `?`, which is what a real
/// ELM327 prints for a command it does not understand.
#[derive(Debug, Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adapter attached to an idling car with one stored trouble code
    pub fn healthy_vehicle() -> Self {
        let mock = Self::new();
        for (command, reply) in [
            ("ATZ", "ELM327 v1.5"),
            ("ATE0", "OK"),
            ("ATL0", "OK"),
            ("ATS1", "OK"),
            ("ATSP0", "OK"),
            ("AT", "OK"),
            ("AT RV", "12.6V"),
            ("010C", "41 0C 0C 80"),
            ("0105", "41 05 7B"),
            ("010F", "41 0F 38"),
            ("0111", "41 11 26"),
            ("012F", "41 2F 9C"),
            ("0104", "41 04 64"),
            ("010B", "41 0B 21"),
            ("010D", "41 0D 00"),
            ("03", "43 01 33 00 00 00 00"),
            ("04", "44"),
        ] {
            mock.set_fallback(command, MockReply::text(reply));
        }
        mock
    }

    /// Queue one reply for the next attempt of `command`
    pub fn push(&self, command: &str, reply: MockReply) -> &Self {
        let mut state = self.lock();
        state
            .scripted
            .entry(Self::key(command))
            .or_default()
            .push_back(reply);
        drop(state);
        self
    }

    /// Queue a text reply for the next attempt of `command`
    pub fn push_text(&self, command: &str, text: &str) -> &Self {
        self.push(command, MockReply::text(text))
    }

    /// Reply used for `command` whenever nothing is queued
    pub fn set_fallback(&self, command: &str, reply: MockReply) -> &Self {
        self.lock().fallback.insert(Self::key(command), reply);
        self
    }

    /// Commands received so far
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Number of attempts made for `command`
    pub fn call_count(&self, command: &str) -> usize {
        let key = Self::key(command);
        self.lock().calls.iter().filter(|c| **c == key).count()
    }

    fn key(command: &str) -> String {
        command.trim().to_uppercase()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_reply(&self, command: &str) -> MockReply {
        let key = Self::key(command);
        let mut state = self.lock();
        state.calls.push(key.clone());

        if let Some(reply) = state.scripted.get_mut(&key).and_then(VecDeque::pop_front) {
            return reply;
        }
        state
            .fallback
            .get(&key)
            .cloned()
            .unwrap_or_else(|| MockReply::text("?"))
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, command: &str) -> Result<String, ObdError> {
        match self.next_reply(command) {
            MockReply::Text(text) => Ok(text),
            MockReply::Fail(reason) => Err(ObdError::Serial(reason)),
            MockReply::Timeout => std::future::pending().await,
        }
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

//! OBD-II Live Data Polling
//!
//! Reads a fixed set of Mode 01 measurements one after another and
//! publishes each cycle as a [`LiveSnapshot`].

mod scheduler;

pub use scheduler::{LiveDataPoller, LiveSnapshot, PollerConfig};

//! Live Data Poller Implementation

use obd_protocol::{MeasurementValue, ObdClient, Pid, Temperature};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Configuration for the live data poller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Time between the start of two cycles (milliseconds)
    pub interval_ms: u64,
    /// Mode 01 PIDs read every cycle, in order
    pub measurements: Vec<Pid>,
    /// Also read battery voltage (slow: health probe, settle delay, `AT RV`)
    pub include_voltage: bool,
    /// Stop after this many cycles, run until the receiver is gone if `None`
    pub max_cycles: Option<u64>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            measurements: Pid::ALL.to_vec(),
            include_voltage: false,
            max_cycles: None,
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        // tokio intervals reject a zero period
        Duration::from_millis(self.interval_ms.max(1))
    }
}

/// One cycle worth of readings
///
/// A field is `None` when its read failed this cycle or was not requested.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveSnapshot {
    /// Timestamp (Unix ms)
    pub timestamp_ms: u64,
    /// Engine RPM
    pub rpm: Option<f64>,
    /// Vehicle speed (km/h)
    pub speed_kmh: Option<u8>,
    pub coolant_temp: Option<Temperature>,
    pub intake_air_temp: Option<Temperature>,
    /// Throttle position (0-100%)
    pub throttle_position: Option<f64>,
    /// Calculated engine load (0-100%)
    pub engine_load: Option<f64>,
    /// Intake manifold absolute pressure (kPa)
    pub manifold_pressure_kpa: Option<u8>,
    /// Fuel tank level (0-100%)
    pub fuel_level: Option<f64>,
    /// Battery voltage as printed by the adapter
    pub voltage: Option<String>,
    /// Number of reads that produced a value
    pub readings_ok: u32,
}

impl LiveSnapshot {
    /// Create a new empty snapshot with the given timestamp
    pub fn new(timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            ..Default::default()
        }
    }

    /// Store a decoded value in the field for `pid`
    pub fn record(&mut self, pid: Pid, value: MeasurementValue) {
        match pid {
            Pid::Rpm => self.rpm = value.as_number(),
            Pid::Speed => self.speed_kmh = value.as_raw(),
            Pid::CoolantTemp => self.coolant_temp = value.as_temperature(),
            Pid::IntakeAirTemp => self.intake_air_temp = value.as_temperature(),
            Pid::ThrottlePosition => self.throttle_position = value.as_number(),
            Pid::EngineLoad => self.engine_load = value.as_number(),
            Pid::IntakeManifoldPressure => self.manifold_pressure_kpa = value.as_raw(),
            Pid::FuelLevel => self.fuel_level = value.as_number(),
        }
        self.readings_ok += 1;
    }
}

/// Reads live data cycle after cycle
///
/// Reads inside a cycle are strictly sequential: the adapter answers one
/// command at a time.
#[derive(Debug, Clone, Default)]
pub struct LiveDataPoller {
    config: PollerConfig,
}

impl LiveDataPoller {
    pub fn new(config: PollerConfig) -> Self {
        info!(
            "Live data poller created with {} PIDs every {}ms",
            config.measurements.len(),
            config.interval_ms
        );
        Self { config }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Run a single cycle
    pub async fn snapshot(&self, client: &ObdClient) -> LiveSnapshot {
        let mut snapshot = LiveSnapshot::new(now_ms());

        for &pid in &self.config.measurements {
            match client.read_measurement(pid).await {
                Some(value) => snapshot.record(pid, value),
                None => debug!("No {:?} reading this cycle", pid),
            }
        }

        if self.config.include_voltage {
            snapshot.voltage = client.fetch_voltage().await;
            if snapshot.voltage.is_some() {
                snapshot.readings_ok += 1;
            }
        }

        snapshot
    }

    /// Poll until the receiver is dropped or `max_cycles` is reached
    ///
    /// Snapshots with no successful reads are still sent. Returns the
    /// number of snapshots delivered.
    pub async fn run(&self, client: &ObdClient, frame_tx: mpsc::Sender<LiveSnapshot>) -> u64 {
        info!("Starting live data poller");

        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut delivered = 0;

        loop {
            if self.config.max_cycles.is_some_and(|max| delivered >= max) {
                break;
            }
            ticker.tick().await;

            let snapshot = self.snapshot(client).await;
            if snapshot.readings_ok == 0 {
                warn!("Live data cycle {} produced no readings", delivered + 1);
            }

            if frame_tx.send(snapshot).await.is_err() {
                debug!("Snapshot receiver dropped");
                break;
            }
            delivered += 1;
        }

        info!("Live data poller stopped after {} cycles", delivered);
        delivered
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

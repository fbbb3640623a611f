//! Instrument Capabilities
//!
//! The acquisition controller drives three physical instruments, all of which it
//! treats as black-box endpoints:
//!
//! - an oscilloscope that accumulates (signal-averages) free-induction decays,
//! - an arbitrary waveform generator (AWG) that plays the excitation chirp,
//! - a temperature controller for the pulsed nozzle.
//!
//! Each one implements the common [`Instrument`] lifecycle (`run` / `stop` /
//! `clear`, a live status, a [`CancellationSignal`]) plus a small type-specific
//! trait with the getters and setters the controller actually needs.
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Uses anyhow::Result for errors
//! - Takes `&self`; implementations use interior mutability
//!
//! Endpoints are *not* required to tolerate concurrent calls. The controller wraps
//! every endpoint in an [`Endpoint`](super::endpoint::Endpoint), which serializes
//! access with one mutex per instrument.
//!
//! # Example
//!
//! ```rust,ignore
//! async fn accumulate<S: Oscilloscope>(scope: &S, target: u64) -> Result<()> {
//!     scope.clear().await?;
//!     scope.run(true).await?;
//!     while scope.trace_count().await? <= target {
//!         tokio::time::sleep(Duration::from_millis(500)).await;
//!     }
//!     scope.stop().await
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::signal::CancellationSignal;
use super::Trace;
use crate::experiment::run_config::Band;

/// Live status of an instrument as shown on the status display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstrumentStatus {
    /// Never started since the process came up.
    Idle,
    /// Acquiring / outputting / regulating.
    Running,
    /// Halted; the live status display is disconnected.
    Stopped,
}

impl std::fmt::Display for InstrumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstrumentStatus::Idle => write!(f, "idle"),
            InstrumentStatus::Running => write!(f, "running"),
            InstrumentStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// Lifecycle shared by every endpoint.
///
/// # Contract
/// - `run(feedback)` starts the instrument. With `feedback = true` the instrument
///   keeps its live status field updated for the display.
/// - `stop()` halts it and disconnects the status display.
/// - `clear()` discards accumulated state (traces, error queues).
/// - `cancel_signal()` returns a clone of the instrument's own signal. Background
///   polls inside the endpoint must check it before restarting anything.
#[async_trait]
pub trait Instrument: Send + Sync {
    /// Short identifier used in logs and errors ("scope", "awg", ...).
    fn name(&self) -> &str;

    /// The instrument's cancellation signal (a shared clone).
    fn cancel_signal(&self) -> CancellationSignal;

    /// Start the instrument.
    async fn run(&self, feedback: bool) -> Result<()>;

    /// Halt the instrument and disconnect its status display.
    async fn stop(&self) -> Result<()>;

    /// Discard accumulated data.
    async fn clear(&self) -> Result<()>;

    /// Current live status.
    async fn status(&self) -> InstrumentStatus;
}

/// Capability: signal-averaging oscilloscope.
#[async_trait]
pub trait Oscilloscope: Instrument {
    /// Number of FIDs accumulated since the last `clear()`.
    async fn trace_count(&self) -> Result<u64>;

    /// Sample rate currently programmed, in samples per second.
    async fn sample_rate(&self) -> Result<f64>;

    /// Memory depth register of the averaging math channel (MATH2).
    async fn math2_memory(&self) -> Result<u64>;

    /// Write the MATH2 memory depth register.
    async fn set_math2_memory(&self, depth: u64) -> Result<()>;

    /// Reload the stored front-panel setup for a spectral band.
    async fn reload_setup(&self, band: Band) -> Result<()>;

    /// Read back the averaged time-domain trace.
    async fn fetch_trace(&self) -> Result<Trace>;
}

/// Capability: arbitrary waveform generator playing the excitation chirp.
#[async_trait]
pub trait WaveformGenerator: Instrument {
    /// Identifier of the waveform currently loaded.
    async fn active_waveform(&self) -> Result<String>;

    /// Load (but do not start) a stored waveform.
    async fn load_waveform(&self, waveform: &str) -> Result<()>;
}

/// Capability: nozzle temperature controller.
///
/// The controller carries three redundant setpoint registers which are expected
/// to agree.
#[async_trait]
pub trait TemperatureController: Instrument {
    /// Read the three redundant setpoints, in °C.
    async fn setpoints(&self) -> Result<[f64; 3]>;

    /// Write all setpoints to `celsius`.
    async fn set_setpoint(&self, celsius: f64) -> Result<()>;

    /// Measured nozzle temperature, in °C.
    async fn nozzle_temperature(&self) -> Result<f64>;
}

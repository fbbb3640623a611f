//! Events published by the acquisition controller.
//!
//! The status display subscribes to a broadcast channel of [`RunEvent`]s instead
//! of being poked directly from the worker. Sending never blocks and never fails
//! the run: with no subscribers an event is simply dropped.

use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::trace;

use super::consistency::Correction;
use super::run_config::RunModeKind;
use super::sequence::{QueueCommand, SequenceError, SequenceQueue};

/// Nozzle temperature as shown on the display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum TemperatureReadback {
    /// Controller answered.
    Known(f64),
    /// Controller did not answer; the display shows an unknown value.
    Unknown,
}

impl std::fmt::Display for TemperatureReadback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemperatureReadback::Known(c) => write!(f, "{c:.1} °C"),
            TemperatureReadback::Unknown => write!(f, "--- °C"),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RunOutcome {
    /// All requested accumulations finished.
    Completed,
    /// Cancelled by the operator.
    Aborted,
    /// Ended by an error.
    Failed(String),
}

/// Final account of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Unique run identifier.
    pub run_id: String,
    /// Mode the run executed in.
    pub mode: RunModeKind,
    /// How it ended.
    pub outcome: RunOutcome,
    /// Saved trace files, in save order.
    pub traces: Vec<PathBuf>,
    /// Saved spectrum files, in save order.
    pub spectra: Vec<PathBuf>,
}

/// Status update from the controller.
#[derive(Debug, Clone, Serialize)]
pub enum RunEvent {
    /// The worker has started.
    Started {
        /// Run identifier.
        run_id: String,
        /// Mode.
        mode: RunModeKind,
    },
    /// The consistency checker changed something.
    Correction(Correction),
    /// Periodic nozzle temperature reading.
    Temperature(TemperatureReadback),
    /// Averaging progress.
    Progress {
        /// Traces accumulated.
        count: u64,
        /// Traces required.
        target: u64,
    },
    /// A trace file was written.
    TraceSaved {
        /// File path.
        path: PathBuf,
    },
    /// A spectrum file was written.
    SpectrumSaved {
        /// File path.
        path: PathBuf,
    },
    /// The sequence queue changed.
    Queue(SequenceQueue),
    /// An operator queue command took effect.
    QueueCommandApplied(QueueCommand),
    /// An operator queue command was rejected.
    QueueCommandRejected {
        /// The command.
        command: QueueCommand,
        /// Why.
        reason: String,
    },
    /// The worker is holding at an iteration boundary.
    Paused,
    /// The worker resumed.
    Resumed,
    /// The run ended; instruments are stopped.
    Finished(RunSummary),
}

impl RunEvent {
    pub(crate) fn rejected(command: QueueCommand, err: SequenceError) -> Self {
        RunEvent::QueueCommandRejected {
            command,
            reason: err.to_string(),
        }
    }
}

/// Cheap clonable sender side of the event channel.
#[derive(Clone, Debug)]
pub struct EventSink {
    tx: broadcast::Sender<RunEvent>,
}

impl EventSink {
    /// Create a sink buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.tx.subscribe()
    }

    /// Publish an event, dropping it if nobody listens.
    pub fn emit(&self, event: RunEvent) {
        if self.tx.send(event).is_err() {
            trace!("Run event dropped, no subscribers");
        }
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new(256)
    }
}

//! Automated acquisition control.
//!
//! A run starts with a configuration snapshot, passes the consistency checks,
//! and then executes on a worker task in one of four modes. Sequence modes step
//! through a [`sequence::SequenceQueue`] that the operator can steer with
//! repeat/skip commands while the run is in progress.

pub mod acquisition;
pub mod consistency;
pub mod controller;
pub mod events;
pub mod prompt;
pub mod run_config;
pub mod sequence;
pub mod state;

pub use consistency::{ConsistencyChecker, ConsistencyReport, Correction};
pub use controller::{AcquisitionSettings, AutoController};
pub use events::{EventSink, RunEvent, RunOutcome, RunSummary, TemperatureReadback};
pub use prompt::{AutoConfirm, Decision, OperatorPrompt, ScriptedPrompt};
pub use run_config::{Band, ChirpOrder, FftParams, RunConfiguration, RunMode, RunModeKind};
pub use sequence::{QueueCommand, QueueSlot, SequenceError, SequenceQueue, Step};
pub use state::ControllerState;

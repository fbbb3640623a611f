//! Custom error types for the acquisition controller.
//!
//! This module defines the primary error type, `AcqError`, for the whole crate.
//! Using the `thiserror` crate, it gives one consistent place for the failures that
//! can stop a run from starting or end it early.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment`, typically file parsing or type
//!   mismatches in the configuration file.
//! - **`Configuration`**: Semantic errors in a configuration that parsed fine but is
//!   logically wrong (e.g. an empty sample name or a descending temperature ramp).
//! - **`Io`**: Wraps `std::io::Error`, covering trace and spectrum file writes.
//! - **`Instrument`**: Failures reported by an instrument endpoint. Endpoints speak
//!   `anyhow::Error`; the controller flattens them into this variant with context.
//! - **`Sequence`**: A rejected queue operation (repeat on a finished queue, skip past
//!   the last step, ...). See [`SequenceError`].
//! - **`AlreadyRunning` / `NotRunning` / `NotSequenceMode`**: Caller errors against the
//!   controller's state machine.
//! - **`StartCancelled`**: The operator cancelled a consistency prompt, so the run
//!   never started.
//!
//! Configuration mismatches found by the consistency checker are *not* errors: they
//! are resolved in place and reported as corrections.

use crate::experiment::sequence::SequenceError;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AcqResult<T> = std::result::Result<T, AcqError>;

#[derive(Error, Debug)]
pub enum AcqError {
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Instrument error: {0}")]
    Instrument(String),

    #[error("Sequence error: {0}")]
    Sequence(#[from] SequenceError),

    #[error("An acquisition run is already active")]
    AlreadyRunning,

    #[error("No acquisition run is active")]
    NotRunning,

    #[error("Operation requires a temperature or chirp sequence run")]
    NotSequenceMode,

    #[error("Run start cancelled by operator: {0}")]
    StartCancelled(String),

    #[error("Acquisition worker terminated abnormally: {0}")]
    WorkerPanicked(String),
}

impl AcqError {
    /// Wrap an endpoint failure with the name of the instrument that produced it.
    pub fn instrument(name: &str, err: anyhow::Error) -> Self {
        AcqError::Instrument(format!("{name}: {err:#}"))
    }

    /// Whether the run can sensibly be retried after this error.
    pub fn can_recover(&self) -> bool {
        match self {
            AcqError::Config(_) | AcqError::WorkerPanicked(_) => false,
            AcqError::Configuration(_)
            | AcqError::Io(_)
            | AcqError::Instrument(_)
            | AcqError::Sequence(_)
            | AcqError::AlreadyRunning
            | AcqError::NotRunning
            | AcqError::NotSequenceMode
            | AcqError::StartCancelled(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instrument_error_carries_endpoint_name_and_context() {
        let err = anyhow::anyhow!("timeout").context("reading trace count");
        let acq = AcqError::instrument("scope", err);
        let msg = acq.to_string();
        assert!(msg.contains("scope"));
        assert!(msg.contains("reading trace count"));
        assert!(msg.contains("timeout"));
        assert!(acq.can_recover());
    }

    #[test]
    fn sequence_error_converts_with_question_mark() {
        fn skip() -> AcqResult<()> {
            Err(SequenceError::SkipPastEnd)?
        }
        match skip() {
            Err(AcqError::Sequence(SequenceError::SkipPastEnd)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn worker_panic_is_not_recoverable() {
        assert!(!AcqError::WorkerPanicked("boom".into()).can_recover());
    }
}

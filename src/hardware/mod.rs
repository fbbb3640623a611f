//! Hardware Abstraction Layer
//!
//! Capability traits for the three instruments the controller drives, the
//! cancellation signal each of them carries, the per-instrument serialization
//! wrapper, and simulated implementations for tests and dry runs.

pub mod capabilities;
pub mod endpoint;
pub mod mock;
pub mod signal;

pub use capabilities::{
    Instrument, InstrumentStatus, Oscilloscope, TemperatureController, WaveformGenerator,
};
pub use endpoint::{Endpoint, InstrumentRig};
pub use signal::CancellationSignal;

/// An averaged time-domain trace read back from the oscilloscope.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    /// Sample spacing in seconds.
    pub dt_s: f64,
    /// Averaged amplitudes (volts).
    pub samples: Vec<f64>,
    /// Number of FIDs that went into the average.
    pub averages: u64,
}

impl Trace {
    /// Create a trace from raw samples.
    pub fn new(dt_s: f64, samples: Vec<f64>, averages: u64) -> Self {
        Self {
            dt_s,
            samples,
            averages,
        }
    }

    /// Number of samples in the trace.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the trace holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

//! # FTMW DAQ Core Library
//!
//! Automated acquisition control for a broadband (2-18 GHz) chirped-pulse
//! rotational spectrometer. The library coordinates an averaging
//! oscilloscope, an arbitrary waveform generator and a nozzle temperature
//! controller through single, continuous, temperature-ramp and chirp-sequence
//! runs, and writes the averaged FIDs and their spectra to disk.
//!
//! ## Crate Structure
//!
//! - **`config`**: `AppConfig`, loaded with figment from TOML plus `FTMW_DAQ_`
//!   environment overrides.
//! - **`data`**: trace/spectrum file naming and writing, and the Kaiser-windowed FFT.
//! - **`error`**: the crate-wide `AcqError` enum.
//! - **`experiment`**: run configuration, consistency checks, the sequence queue,
//!   and the `AutoController` that runs acquisitions on a worker task.
//! - **`hardware`**: instrument capability traits, cancellation signals, the
//!   per-instrument serialization wrapper and simulated instruments.
//! - **`logging`**: tracing-subscriber initialisation.

pub mod config;
pub mod data;
pub mod error;
pub mod experiment;
pub mod hardware;
pub mod logging;

//! Saved traces and their spectra.
pub mod fft;
pub mod persistence;

pub use fft::{KaiserFft, Spectrum, SpectrumProcessor};
pub use persistence::{DataWriter, TraceName};

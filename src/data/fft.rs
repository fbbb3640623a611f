//! Magnitude spectra of averaged FIDs.
//!
//! The default processor, [`KaiserFft`], takes the leading fraction of the FID,
//! applies a Kaiser-Bessel window, zero-pads (or truncates) to the configured
//! record length and keeps the bins inside the configured frequency bounds.

use num_complex::Complex;
use rustfft::FftPlanner;
use tracing::debug;

use crate::experiment::run_config::FftParams;
use crate::hardware::Trace;

/// A magnitude spectrum as (frequency in MHz, intensity) pairs, ascending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Spectrum {
    /// Spectrum points.
    pub points: Vec<(f64, f64)>,
}

impl Spectrum {
    /// Point with the largest intensity.
    pub fn peak(&self) -> Option<(f64, f64)> {
        self.points
            .iter()
            .copied()
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }
}

/// Turns a saved trace into a spectrum.
pub trait SpectrumProcessor: Send + Sync {
    /// Compute the spectrum of `trace`.
    fn transform(&self, trace: &Trace, params: &FftParams) -> Spectrum;
}

/// Kaiser-Bessel windowed FFT.
#[derive(Debug, Default, Clone, Copy)]
pub struct KaiserFft;

impl SpectrumProcessor for KaiserFft {
    fn transform(&self, trace: &Trace, params: &FftParams) -> Spectrum {
        if trace.is_empty() || params.record_length == 0 {
            return Spectrum::default();
        }

        let used = ((trace.len() as f64 * params.fid_fraction).ceil() as usize)
            .clamp(1, trace.len())
            .min(params.record_length);
        let window = kaiser_window(used, params.kaiser_beta);

        let mut buffer: Vec<Complex<f64>> = trace.samples[..used]
            .iter()
            .zip(window.iter())
            .map(|(&v, &w)| Complex::new(v * w, 0.0))
            .collect();
        buffer.resize(params.record_length, Complex::new(0.0, 0.0));

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(params.record_length);
        fft.process(&mut buffer);

        let bin_mhz = params.sampling_rate_hz / params.record_length as f64 / 1e6;
        let points: Vec<(f64, f64)> = buffer[..params.record_length / 2]
            .iter()
            .enumerate()
            .map(|(k, c)| (k as f64 * bin_mhz, c.norm() / used as f64))
            .filter(|(f, _)| *f >= params.freq_min_mhz && *f <= params.freq_max_mhz)
            .collect();

        debug!(
            samples = used,
            record_length = params.record_length,
            points = points.len(),
            "Spectrum computed"
        );
        Spectrum { points }
    }
}

/// Kaiser window of length `n` with shape parameter `beta`.
pub fn kaiser_window(n: usize, beta: f64) -> Vec<f64> {
    if n == 1 {
        return vec![1.0];
    }
    let denom = bessel_i0(beta);
    (0..n)
        .map(|i| {
            let r = 2.0 * i as f64 / (n - 1) as f64 - 1.0;
            bessel_i0(beta * (1.0 - r * r).max(0.0).sqrt()) / denom
        })
        .collect()
}

/// Modified Bessel function of the first kind, order zero (power series).
fn bessel_i0(x: f64) -> f64 {
    let half_sq = (x / 2.0) * (x / 2.0);
    let mut term = 1.0;
    let mut sum = 1.0;
    for k in 1..200 {
        term *= half_sq / (k as f64 * k as f64);
        sum += term;
        if term < sum * 1e-16 {
            break;
        }
    }
    sum
}

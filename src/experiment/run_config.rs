//! Per-run configuration snapshot.
//!
//! A [`RunConfiguration`] is built from the operator's inputs when a run is
//! requested, corrected once by the consistency checker, and then moved into the
//! acquisition worker. Edits the operator makes while the run is in progress only
//! affect the next run.

use serde::{Deserialize, Serialize};

use crate::error::{AcqError, AcqResult};

/// Spectral band the spectrometer is configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Band {
    /// 2-8 GHz
    #[serde(rename = "2-8")]
    Low,
    /// 6-18 GHz
    #[serde(rename = "6-18")]
    High,
}

impl Band {
    /// Short label used in file names.
    pub fn label(&self) -> &'static str {
        match self {
            Band::Low => "2to8",
            Band::High => "6to18",
        }
    }

    /// Oscilloscope sample rate the band's stored setup programs, in S/s.
    pub fn expected_sample_rate(&self) -> f64 {
        match self {
            Band::Low => 25.0e9,
            Band::High => 50.0e9,
        }
    }

    /// Canonical FFT display bounds in MHz.
    pub fn fft_bounds_mhz(&self) -> (f64, f64) {
        match self {
            Band::Low => (2000.0, 8000.0),
            Band::High => (6000.0, 18000.0),
        }
    }

    /// Whether a sample-rate readback matches this band's setup.
    pub fn matches_sample_rate(&self, sample_rate: f64) -> bool {
        let expected = self.expected_sample_rate();
        ((sample_rate - expected) / expected).abs() < 1e-6
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Band::Low => write!(f, "2-8 GHz"),
            Band::High => write!(f, "6-18 GHz"),
        }
    }
}

/// Order in which a chirp-duration sequence steps through its durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChirpOrder {
    /// Shortest chirp first.
    Ascending,
    /// Longest chirp first.
    Descending,
}

/// Durations (µs) covered by a chirp sequence, ascending.
pub const CHIRP_SEQUENCE_US: [f64; 3] = [1.0, 2.0, 4.0];

/// Stored AWG waveforms, keyed by band and chirp duration (µs).
const WAVEFORM_TABLE: &[(Band, f64, &str)] = &[
    (Band::Low, 0.5, "chirp_2to8_0p5us"),
    (Band::Low, 1.0, "chirp_2to8_1us"),
    (Band::Low, 2.0, "chirp_2to8_2us"),
    (Band::Low, 4.0, "chirp_2to8_4us"),
    (Band::High, 0.5, "chirp_6to18_0p5us"),
    (Band::High, 1.0, "chirp_6to18_1us"),
    (Band::High, 2.0, "chirp_6to18_2us"),
    (Band::High, 4.0, "chirp_6to18_4us"),
];

/// Look up the stored waveform for a band and chirp duration.
pub fn waveform_for(band: Band, chirp_us: f64) -> Option<&'static str> {
    WAVEFORM_TABLE
        .iter()
        .find(|(b, us, _)| *b == band && (us - chirp_us).abs() < 1e-9)
        .map(|(_, _, name)| *name)
}

/// One step of a chirp sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct ChirpStep {
    /// Chirp duration in µs.
    pub duration_us: f64,
    /// Waveform that plays this chirp.
    pub waveform: &'static str,
}

/// The three (duration, waveform) pairs of a chirp sequence, in run order.
pub fn chirp_sequence(band: Band, order: ChirpOrder) -> Vec<ChirpStep> {
    let mut durations = CHIRP_SEQUENCE_US.to_vec();
    if order == ChirpOrder::Descending {
        durations.reverse();
    }
    durations
        .into_iter()
        .filter_map(|duration_us| {
            waveform_for(band, duration_us).map(|waveform| ChirpStep {
                duration_us,
                waveform,
            })
        })
        .collect()
}

/// Acquisition mode, fixed for the duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunMode {
    /// One accumulation, then stop.
    Single,
    /// Accumulate, save and restart until aborted.
    Continuous,
    /// One accumulation per nozzle temperature, ascending.
    TemperatureSequence {
        /// Target temperatures in °C.
        steps: Vec<f64>,
    },
    /// One accumulation per chirp duration.
    ChirpSequence {
        /// Duration order.
        order: ChirpOrder,
    },
}

impl RunMode {
    /// Payload-free discriminant.
    pub fn kind(&self) -> RunModeKind {
        match self {
            RunMode::Single => RunModeKind::Single,
            RunMode::Continuous => RunModeKind::Continuous,
            RunMode::TemperatureSequence { .. } => RunModeKind::TemperatureSequence,
            RunMode::ChirpSequence { .. } => RunModeKind::ChirpSequence,
        }
    }
}

/// Discriminant of [`RunMode`], used in state reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunModeKind {
    /// Single accumulation.
    Single,
    /// Continuous accumulation.
    Continuous,
    /// Temperature ramp.
    TemperatureSequence,
    /// Chirp-duration sequence.
    ChirpSequence,
}

impl RunModeKind {
    /// Whether the mode steps through a sequence queue.
    pub fn is_sequence(&self) -> bool {
        matches!(
            self,
            RunModeKind::TemperatureSequence | RunModeKind::ChirpSequence
        )
    }
}

impl std::fmt::Display for RunModeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunModeKind::Single => write!(f, "single"),
            RunModeKind::Continuous => write!(f, "continuous"),
            RunModeKind::TemperatureSequence => write!(f, "temperature sequence"),
            RunModeKind::ChirpSequence => write!(f, "chirp sequence"),
        }
    }
}

/// Nozzle temperature handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemperaturePlan {
    /// Declared nozzle temperature for non-sequence runs, °C.
    pub target_c: f64,
    /// Half-width of the acceptance band, °C.
    pub tolerance_c: f64,
    /// Block before the first accumulation until the nozzle is in band.
    pub wait_initial: bool,
    /// Block before every sequence step until the nozzle is in band.
    pub wait_each_step: bool,
    /// Return the nozzle to the reset temperature when a ramp ends.
    pub reset_on_exit: bool,
}

impl Default for TemperaturePlan {
    fn default() -> Self {
        Self {
            target_c: 20.0,
            tolerance_c: 3.0,
            wait_initial: false,
            wait_each_step: false,
            reset_on_exit: false,
        }
    }
}

/// FFT parameters applied to saved traces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FftParams {
    /// Compute and save a spectrum after each saved trace.
    pub auto: bool,
    /// Sampling rate of the trace, S/s.
    pub sampling_rate_hz: f64,
    /// Leading fraction of the FID used for the transform.
    pub fid_fraction: f64,
    /// Kaiser-Bessel window shape parameter.
    pub kaiser_beta: f64,
    /// Zero-padded record length.
    pub record_length: usize,
    /// Lower displayed frequency, MHz.
    pub freq_min_mhz: f64,
    /// Upper displayed frequency, MHz.
    pub freq_max_mhz: f64,
}

impl Default for FftParams {
    fn default() -> Self {
        let (lo, hi) = Band::Low.fft_bounds_mhz();
        Self {
            auto: true,
            sampling_rate_hz: Band::Low.expected_sample_rate(),
            fid_fraction: 1.0,
            kaiser_beta: 9.5,
            record_length: 4096,
            freq_min_mhz: lo,
            freq_max_mhz: hi,
        }
    }
}

/// Immutable snapshot of everything a run needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfiguration {
    /// Spectral band.
    pub band: Band,
    /// Sample name used in file names.
    pub sample: String,
    /// Number of FIDs to accumulate before a trace is saved.
    pub save_threshold: u64,
    /// Chirp duration, µs.
    pub chirp_us: f64,
    /// Backing pressure, psig.
    pub backing_pressure_psig: f64,
    /// Nozzle temperature handling.
    pub temperature: TemperaturePlan,
    /// FFT parameters.
    pub fft: FftParams,
    /// Acquisition mode.
    pub mode: RunMode,
}

impl Default for RunConfiguration {
    fn default() -> Self {
        Self {
            band: Band::Low,
            sample: "sample".to_string(),
            save_threshold: 1000,
            chirp_us: 1.0,
            backing_pressure_psig: 15.0,
            temperature: TemperaturePlan::default(),
            fft: FftParams::default(),
            mode: RunMode::Single,
        }
    }
}

impl RunConfiguration {
    /// Check the configuration for values no run can use.
    pub fn validate(&self) -> AcqResult<()> {
        let invalid = |msg: String| Err(AcqError::Configuration(msg));
        let positive = |x: f64| x.is_finite() && x > 0.0;

        if self.sample.trim().is_empty() {
            return invalid("sample name must not be empty".into());
        }
        if self.sample.contains(['/', '\\']) {
            return invalid(format!("sample name '{}' contains a path separator", self.sample));
        }
        if self.save_threshold == 0 {
            return invalid("save threshold must be positive".into());
        }
        if !positive(self.chirp_us) {
            return invalid(format!("chirp duration {} µs must be positive", self.chirp_us));
        }
        if !positive(self.temperature.tolerance_c) {
            return invalid(format!(
                "temperature tolerance {} °C must be positive",
                self.temperature.tolerance_c
            ));
        }
        if !(self.fft.fid_fraction > 0.0 && self.fft.fid_fraction <= 1.0) {
            return invalid(format!(
                "FID fraction {} must be in (0, 1]",
                self.fft.fid_fraction
            ));
        }
        if self.fft.record_length == 0 {
            return invalid("FFT record length must be positive".into());
        }
        if !positive(self.fft.sampling_rate_hz) {
            return invalid("FFT sampling rate must be positive".into());
        }
        let bounds_ordered = self.fft.freq_min_mhz.is_finite()
            && self.fft.freq_max_mhz.is_finite()
            && self.fft.freq_min_mhz < self.fft.freq_max_mhz;
        if !bounds_ordered {
            return invalid(format!(
                "FFT bounds {}..{} MHz are empty",
                self.fft.freq_min_mhz, self.fft.freq_max_mhz
            ));
        }
        if let RunMode::TemperatureSequence { steps } = &self.mode {
            if steps.is_empty() {
                return invalid("temperature sequence has no steps".into());
            }
            if let Some(bad) = steps.iter().find(|t| !t.is_finite()) {
                return invalid(format!("temperature step {bad} is not a number"));
            }
            if steps.windows(2).any(|w| w[1] <= w[0]) {
                return invalid(format!(
                    "temperature sequence {:?} must be strictly ascending",
                    steps
                ));
            }
        }
        Ok(())
    }

    /// First sequence temperature, if this is a temperature ramp.
    pub fn initial_sequence_temperature(&self) -> Option<f64> {
        match &self.mode {
            RunMode::TemperatureSequence { steps } => steps.first().copied(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_labels_and_bounds() {
        assert_eq!(Band::Low.label(), "2to8");
        assert_eq!(Band::High.label(), "6to18");
        assert_eq!(Band::Low.fft_bounds_mhz(), (2000.0, 8000.0));
        assert_eq!(Band::High.fft_bounds_mhz(), (6000.0, 18000.0));
        assert!(Band::High.matches_sample_rate(50.0e9));
        assert!(!Band::High.matches_sample_rate(25.0e9));
    }

    #[test]
    fn waveform_table_lookup() {
        assert_eq!(waveform_for(Band::Low, 1.0), Some("chirp_2to8_1us"));
        assert_eq!(waveform_for(Band::High, 0.5), Some("chirp_6to18_0p5us"));
        assert_eq!(waveform_for(Band::Low, 3.0), None);
    }

    #[test]
    fn chirp_sequences_cover_both_orders_and_bands() {
        let asc = chirp_sequence(Band::Low, ChirpOrder::Ascending);
        assert_eq!(
            asc.iter().map(|s| s.duration_us).collect::<Vec<_>>(),
            vec![1.0, 2.0, 4.0]
        );
        assert_eq!(asc[0].waveform, "chirp_2to8_1us");

        let desc = chirp_sequence(Band::High, ChirpOrder::Descending);
        assert_eq!(
            desc.iter().map(|s| s.duration_us).collect::<Vec<_>>(),
            vec![4.0, 2.0, 1.0]
        );
        assert_eq!(desc[0].waveform, "chirp_6to18_4us");
    }

    #[test]
    fn default_configuration_is_valid() {
        assert!(RunConfiguration::default().validate().is_ok());
    }

    #[test]
    fn rejects_descending_temperature_ramp() {
        let config = RunConfiguration {
            mode: RunMode::TemperatureSequence {
                steps: vec![60.0, 50.0],
            },
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AcqError::Configuration(_))
        ));
    }

    #[test]
    fn rejects_nan_temperature_steps_and_parameters() {
        let config = RunConfiguration {
            mode: RunMode::TemperatureSequence {
                steps: vec![40.0, f64::NAN, 60.0],
            },
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AcqError::Configuration(_))
        ));

        let config = RunConfiguration {
            chirp_us: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let mut config = RunConfiguration::default();
        config.fft.freq_max_mhz = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_sample_and_zero_threshold() {
        let mut config = RunConfiguration {
            sample: "  ".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.sample = "ocs".into();
        config.save_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn mode_round_trips_through_toml() {
        let config = RunConfiguration {
            mode: RunMode::TemperatureSequence {
                steps: vec![40.0, 50.0, 60.0],
            },
            band: Band::High,
            ..Default::default()
        };
        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("temperature_sequence"));
        assert!(text.contains("6-18"));
        let back: RunConfiguration = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}

//! Pre-run consistency checks.
//!
//! Before any acquisition starts, the declared [`RunConfiguration`] is compared
//! against what the instruments actually report. Every mismatch is resolved on
//! the spot, either silently or by asking the operator, and recorded as a
//! [`Correction`]. None of them is fatal; the only way a check stops a run is the
//! operator answering *Cancel*.
//!
//! | # | Check | Resolution |
//! |---|-------|------------|
//! | 1 | band vs scope sample rate | prompt; confirm reloads scope setup |
//! | 2 | save threshold vs MATH2 depth | silent enlarge |
//! | 3 | FFT bounds vs band | silent reset (auto-FFT only) |
//! | 4 | declared temperature vs setpoints | prompt (non-sequence runs) |
//! | 5 | first ramp temperature vs setpoint | silent write (temperature ramps) |
//! | 6 | active waveform vs (band, chirp) | prompt; confirm reloads waveform |
//! | 7 | active waveform vs chirp sequence | silent load of the first step |
//!
//! If the temperature controller does not answer, checks 4 and 5 degrade to an
//! unknown readback and the run proceeds unverified.

use serde::Serialize;
use tracing::{debug, info, warn};

use super::events::{EventSink, RunEvent, TemperatureReadback};
use super::prompt::{Decision, OperatorPrompt};
use super::run_config::{chirp_sequence, waveform_for, Band, RunConfiguration, RunMode};
use crate::error::{AcqError, AcqResult};
use crate::hardware::InstrumentRig;

/// Traces held per unit of the MATH2 memory depth register.
pub const MATH2_TRACES_PER_UNIT: u64 = 8;

/// Temperatures closer than this are treated as equal, °C.
const TEMPERATURE_EPSILON: f64 = 1e-3;

/// One change (or deliberate non-change) made while reconciling configuration and
/// instrument state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Correction {
    /// Scope setup reloaded to match the declared band.
    ScopeSetupReloaded {
        /// Declared band.
        band: Band,
        /// Sample rate read before the reload.
        readback_sample_rate: f64,
    },
    /// Operator kept a scope setup that does not match the band.
    BandMismatchKept {
        /// Declared band.
        band: Band,
        /// Sample rate read back.
        readback_sample_rate: f64,
    },
    /// MATH2 memory enlarged to hold the save threshold.
    Math2MemoryEnlarged {
        /// Depth read back.
        readback: u64,
        /// Values written, in order.
        written: Vec<u64>,
    },
    /// FFT display bounds reset to the band's canonical range.
    FftBoundsReset {
        /// Previous bounds, MHz.
        from: (f64, f64),
        /// New bounds, MHz.
        to: (f64, f64),
    },
    /// FFT sampling rate set to the band's digitizer rate.
    FftSamplingRateReset {
        /// Previous rate, Hz.
        from: f64,
        /// New rate, Hz.
        to: f64,
    },
    /// Operator supplied a setpoint after the redundant setpoints disagreed.
    SetpointCorrected {
        /// Setpoints read back.
        readback: [f64; 3],
        /// Setpoint written.
        written: f64,
    },
    /// Operator declined to fix disagreeing setpoints.
    SetpointDisagreementKept {
        /// Setpoints read back.
        readback: [f64; 3],
    },
    /// Declared temperature written to the controller.
    DeclaredTemperatureApplied {
        /// Setpoint before the write.
        readback: f64,
        /// Declared value written.
        declared: f64,
    },
    /// Controller setpoint adopted as the run's temperature.
    ReadbackTemperatureAdopted {
        /// Value the operator had declared.
        declared: f64,
        /// Value adopted.
        readback: f64,
    },
    /// First ramp temperature written to the controller.
    SequenceSetpointWritten {
        /// Setpoint before the write.
        readback: f64,
        /// First ramp temperature.
        setpoint: f64,
    },
    /// Temperature verification skipped because the controller did not answer.
    TemperatureUnavailable {
        /// Error text.
        reason: String,
    },
    /// AWG waveform replaced.
    WaveformReloaded {
        /// Waveform that was active.
        from: String,
        /// Waveform loaded.
        to: String,
    },
    /// Operator kept a waveform that does not match band and chirp.
    WaveformMismatchKept {
        /// Active waveform.
        active: String,
        /// Waveform the table expects.
        expected: String,
    },
    /// No stored waveform exists for the band and chirp duration.
    NoWaveformForChirp {
        /// Declared band.
        band: Band,
        /// Declared chirp, µs.
        chirp_us: f64,
    },
}

/// Everything the checker changed, in order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConsistencyReport {
    /// Corrections in the order they were made.
    pub corrections: Vec<Correction>,
}

impl ConsistencyReport {
    /// Whether nothing needed changing.
    pub fn is_clean(&self) -> bool {
        self.corrections.is_empty()
    }
}

/// Reconciles a run configuration with live instrument state.
pub struct ConsistencyChecker<'a> {
    rig: &'a InstrumentRig,
    prompt: &'a dyn OperatorPrompt,
    events: Option<&'a EventSink>,
    report: ConsistencyReport,
}

impl<'a> ConsistencyChecker<'a> {
    /// Create a checker for one run start.
    pub fn new(rig: &'a InstrumentRig, prompt: &'a dyn OperatorPrompt) -> Self {
        Self {
            rig,
            prompt,
            events: None,
            report: ConsistencyReport::default(),
        }
    }

    /// Also publish every correction as a [`RunEvent::Correction`].
    pub fn with_events(mut self, events: &'a EventSink) -> Self {
        self.events = Some(events);
        self
    }

    fn record(&mut self, correction: Correction) {
        info!(?correction, "Consistency correction");
        if let Some(events) = self.events {
            events.emit(RunEvent::Correction(correction.clone()));
        }
        self.report.corrections.push(correction);
    }

    /// Run all seven checks and return the corrected configuration.
    pub async fn verify(
        mut self,
        mut config: RunConfiguration,
    ) -> AcqResult<(RunConfiguration, ConsistencyReport)> {
        self.check_band(&config).await?;
        self.check_math2_memory(&config).await?;
        self.check_fft_bounds(&mut config);

        if config.initial_sequence_temperature().is_some() {
            self.check_sequence_temperature(&config).await;
        } else {
            self.check_temperature(&mut config).await?;
        }

        if let RunMode::ChirpSequence { .. } = config.mode {
            self.check_chirp_sequence_waveform(&config).await?;
        } else {
            self.check_waveform(&config).await?;
        }

        debug!(corrections = self.report.corrections.len(), "Consistency checks done");
        Ok((config, self.report))
    }

    /// Check 1: the scope's sample rate must match the band's stored setup.
    pub async fn check_band(&mut self, config: &RunConfiguration) -> AcqResult<()> {
        let rate = self.rig.sample_rate().await?;
        if config.band.matches_sample_rate(rate) {
            return Ok(());
        }

        let question = format!(
            "Scope samples at {:.1} GS/s, which does not match the {} band. Reload the {} setup?",
            rate / 1e9,
            config.band,
            config.band
        );
        match self.prompt.confirm(&question).await {
            Decision::Confirm => {
                self.rig.reload_scope_setup(config.band).await?;
                self.record(Correction::ScopeSetupReloaded {
                    band: config.band,
                    readback_sample_rate: rate,
                });
            }
            Decision::Deny => self.record(Correction::BandMismatchKept {
                band: config.band,
                readback_sample_rate: rate,
            }),
            Decision::Cancel => {
                return Err(AcqError::StartCancelled("band / scope setup mismatch".into()))
            }
        }
        Ok(())
    }

    /// Check 2: the MATH2 memory must be able to hold the save threshold.
    ///
    /// Two writes are issued: the raw threshold, then the threshold in register
    /// units of [`MATH2_TRACES_PER_UNIT`] traces, rounded up.
    pub async fn check_math2_memory(&mut self, config: &RunConfiguration) -> AcqResult<()> {
        let readback = self.rig.math2_memory().await?;
        if readback >= config.save_threshold {
            return Ok(());
        }

        let units = config.save_threshold.div_ceil(MATH2_TRACES_PER_UNIT);
        self.rig.set_math2_memory(config.save_threshold).await?;
        self.rig.set_math2_memory(units).await?;
        self.record(Correction::Math2MemoryEnlarged {
            readback,
            written: vec![config.save_threshold, units],
        });
        Ok(())
    }

    /// Check 3: with auto-FFT on, the FFT bounds must be the band's range and
    /// the sampling rate the band's digitizer rate.
    pub fn check_fft_bounds(&mut self, config: &mut RunConfiguration) {
        if !config.fft.auto {
            return;
        }
        let rate = config.band.expected_sample_rate();
        if config.fft.sampling_rate_hz != rate {
            let from = config.fft.sampling_rate_hz;
            config.fft.sampling_rate_hz = rate;
            self.record(Correction::FftSamplingRateReset { from, to: rate });
        }
        let canonical = config.band.fft_bounds_mhz();
        let current = (config.fft.freq_min_mhz, config.fft.freq_max_mhz);
        if current != canonical {
            config.fft.freq_min_mhz = canonical.0;
            config.fft.freq_max_mhz = canonical.1;
            self.record(Correction::FftBoundsReset {
                from: current,
                to: canonical,
            });
        }
    }

    /// Check 4: declared temperature against the controller (non-ramp runs).
    pub async fn check_temperature(&mut self, config: &mut RunConfiguration) -> AcqResult<()> {
        let readback = match self.rig.setpoints().await {
            Ok(setpoints) => setpoints,
            Err(e) => {
                self.temperature_unavailable(e);
                return Ok(());
            }
        };

        let agree = readback
            .iter()
            .all(|sp| (sp - readback[0]).abs() < TEMPERATURE_EPSILON);
        let declared = config.temperature.target_c;

        if !agree {
            let question = format!(
                "Temperature controller setpoints disagree ({:.1} / {:.1} / {:.1} °C). Enter the setpoint to apply:",
                readback[0], readback[1], readback[2]
            );
            match self.prompt.request_number(&question, declared).await {
                Some(value) => {
                    if let Err(e) = self.rig.set_setpoint(value).await {
                        self.temperature_unavailable(e);
                        return Ok(());
                    }
                    config.temperature.target_c = value;
                    self.record(Correction::SetpointCorrected {
                        readback,
                        written: value,
                    });
                }
                None => self.record(Correction::SetpointDisagreementKept { readback }),
            }
            return Ok(());
        }

        let setpoint = readback[0];
        if (setpoint - declared).abs() < TEMPERATURE_EPSILON {
            return Ok(());
        }

        let question = format!(
            "Nozzle setpoint is {setpoint:.1} °C but {declared:.1} °C was entered. \
             Apply {declared:.1} °C (yes) or keep {setpoint:.1} °C (no)?"
        );
        match self.prompt.confirm(&question).await {
            Decision::Confirm => {
                if let Err(e) = self.rig.set_setpoint(declared).await {
                    self.temperature_unavailable(e);
                    return Ok(());
                }
                self.record(Correction::DeclaredTemperatureApplied {
                    readback: setpoint,
                    declared,
                });
            }
            Decision::Deny => {
                config.temperature.target_c = setpoint;
                if let Err(e) = self.rig.restart_temperature_monitor().await {
                    warn!(error = %e, "Temperature monitor restart failed");
                }
                self.record(Correction::ReadbackTemperatureAdopted {
                    declared,
                    readback: setpoint,
                });
            }
            Decision::Cancel => {
                return Err(AcqError::StartCancelled(
                    "declared temperature / setpoint mismatch".into(),
                ))
            }
        }
        Ok(())
    }

    /// Check 5: a ramp's first temperature is written without asking.
    pub async fn check_sequence_temperature(&mut self, config: &RunConfiguration) {
        let Some(first) = config.initial_sequence_temperature() else {
            return;
        };
        let readback = match self.rig.setpoints().await {
            Ok(setpoints) => setpoints[0],
            Err(e) => {
                self.temperature_unavailable(e);
                return;
            }
        };
        if (readback - first).abs() < TEMPERATURE_EPSILON {
            return;
        }
        match self.rig.set_setpoint(first).await {
            Ok(()) => self.record(Correction::SequenceSetpointWritten {
                readback,
                setpoint: first,
            }),
            Err(e) => self.temperature_unavailable(e),
        }
    }

    /// Check 6: the active waveform must match band and chirp duration.
    pub async fn check_waveform(&mut self, config: &RunConfiguration) -> AcqResult<()> {
        let Some(expected) = waveform_for(config.band, config.chirp_us) else {
            self.record(Correction::NoWaveformForChirp {
                band: config.band,
                chirp_us: config.chirp_us,
            });
            return Ok(());
        };
        let active = self.rig.active_waveform().await?;
        if active == expected {
            return Ok(());
        }

        let question = format!(
            "AWG is playing '{active}' but {} band with a {} µs chirp needs '{expected}'. Load it?",
            config.band, config.chirp_us
        );
        match self.prompt.confirm(&question).await {
            Decision::Confirm => {
                self.rig.load_waveform(expected).await?;
                self.record(Correction::WaveformReloaded {
                    from: active,
                    to: expected.to_string(),
                });
            }
            Decision::Deny => self.record(Correction::WaveformMismatchKept {
                active,
                expected: expected.to_string(),
            }),
            Decision::Cancel => {
                return Err(AcqError::StartCancelled("waveform mismatch".into()))
            }
        }
        Ok(())
    }

    /// Check 7: a chirp sequence always starts from its first waveform.
    pub async fn check_chirp_sequence_waveform(
        &mut self,
        config: &RunConfiguration,
    ) -> AcqResult<()> {
        let RunMode::ChirpSequence { order } = config.mode else {
            return Ok(());
        };
        let Some(first) = chirp_sequence(config.band, order).into_iter().next() else {
            return Err(AcqError::Configuration(format!(
                "no chirp sequence defined for the {} band",
                config.band
            )));
        };
        let active = self.rig.active_waveform().await?;
        self.rig.load_waveform(first.waveform).await?;
        self.record(Correction::WaveformReloaded {
            from: active,
            to: first.waveform.to_string(),
        });
        Ok(())
    }

    fn temperature_unavailable(&mut self, err: AcqError) {
        warn!(error = %err, "Temperature controller unreachable, skipping verification");
        if let Some(events) = self.events {
            events.emit(RunEvent::Temperature(TemperatureReadback::Unknown));
        }
        self.record(Correction::TemperatureUnavailable {
            reason: err.to_string(),
        });
    }
}

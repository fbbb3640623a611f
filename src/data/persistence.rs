//! Trace and spectrum files.
//!
//! Trace files are named
//! `{HH_MM_SS}_{sample}_{2to8|6to18}_{avg}{k|fid}_{temp}C_{chirp}us_{pressure}psig_.txt`
//! and spectrum files append the FFT parameters to the trace's stem:
//! `{stem}_FF{fraction*10}_KB{beta*10}_TRL{record_length}_.ft`.

use chrono::NaiveTime;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::fft::Spectrum;
use crate::error::AcqResult;
use crate::experiment::run_config::{Band, FftParams, RunConfiguration};
use crate::hardware::Trace;

/// Everything that goes into a trace file name apart from the time of day.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceName {
    /// Sample name.
    pub sample: String,
    /// Spectral band.
    pub band: Band,
    /// Averages in the saved trace.
    pub averages: u64,
    /// Nozzle temperature the trace was taken at, °C.
    pub temperature_c: f64,
    /// Chirp duration, µs.
    pub chirp_us: f64,
    /// Backing pressure, psig.
    pub pressure_psig: f64,
}

impl TraceName {
    /// Name for a trace of `config` taken at `temperature_c` with a `chirp_us` chirp.
    pub fn from_config(config: &RunConfiguration, temperature_c: f64, chirp_us: f64) -> Self {
        Self {
            sample: config.sample.clone(),
            band: config.band,
            averages: config.save_threshold,
            temperature_c,
            chirp_us,
            pressure_psig: config.backing_pressure_psig,
        }
    }

    /// File name for a trace saved at `time`.
    pub fn file_name(&self, time: NaiveTime) -> String {
        format!(
            "{}_{}_{}_{}_{}C_{}us_{}psig_.txt",
            time.format("%H_%M_%S"),
            self.sample,
            self.band.label(),
            averages_infix(self.averages),
            self.temperature_c,
            self.chirp_us,
            self.pressure_psig
        )
    }
}

/// `5000` becomes `"5k"`, `1500` becomes `"1.5k"`, `250` becomes `"250fid"`.
pub fn averages_infix(averages: u64) -> String {
    if averages >= 1000 {
        format!("{}k", averages as f64 / 1000.0)
    } else {
        format!("{averages}fid")
    }
}

/// Spectrum file name derived from the trace it was computed from.
pub fn spectrum_file_name(trace_path: &Path, params: &FftParams) -> String {
    let stem = trace_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!(
        "{stem}_FF{}_KB{}_TRL{}_.ft",
        (params.fid_fraction * 10.0).round() as i64,
        (params.kaiser_beta * 10.0).round() as i64,
        params.record_length
    )
}

/// Writes traces and spectra into one data directory.
#[derive(Debug, Clone)]
pub struct DataWriter {
    dir: PathBuf,
}

impl DataWriter {
    /// Writer targeting `dir`; the directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Target directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save `trace` as `time, amplitude` rows.
    ///
    /// Two saves within the same second would collide; the later one gets a
    /// numeric suffix instead of overwriting.
    pub async fn save_trace(
        &self,
        name: &TraceName,
        trace: &Trace,
        time: NaiveTime,
    ) -> AcqResult<PathBuf> {
        let mut body = String::with_capacity(trace.len() * 32);
        for (i, v) in trace.samples.iter().enumerate() {
            let _ = writeln!(body, "{:.6e}, {:.8e}", i as f64 * trace.dt_s, v);
        }

        let path = self.unused_path(&name.file_name(time)).await?;
        tokio::fs::write(&path, body).await?;
        debug!(path = %path.display(), samples = trace.len(), "Trace written");
        Ok(path)
    }

    /// Save `spectrum` next to the trace it came from.
    pub async fn save_spectrum(
        &self,
        trace_path: &Path,
        params: &FftParams,
        spectrum: &Spectrum,
    ) -> AcqResult<PathBuf> {
        let mut body = String::with_capacity(spectrum.points.len() * 24);
        for (freq, intensity) in &spectrum.points {
            let _ = writeln!(body, "{freq:.4}, {intensity:.8}");
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(spectrum_file_name(trace_path, params));
        tokio::fs::write(&path, body).await?;
        debug!(path = %path.display(), points = spectrum.points.len(), "Spectrum written");
        Ok(path)
    }

    async fn unused_path(&self, file_name: &str) -> AcqResult<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let candidate = self.dir.join(file_name);
        if !tokio::fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }

        let stem = file_name.trim_end_matches(".txt");
        let mut n = 2;
        loop {
            let candidate = self.dir.join(format!("{stem}{n}_.txt"));
            if !tokio::fs::try_exists(&candidate).await? {
                return Ok(candidate);
            }
            n += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(averages: u64) -> TraceName {
        TraceName {
            sample: "ethanol".into(),
            band: Band::Low,
            averages,
            temperature_c: 40.0,
            chirp_us: 1.0,
            pressure_psig: 15.0,
        }
    }

    fn noon() -> NaiveTime {
        NaiveTime::from_hms_opt(12, 3, 4).unwrap()
    }

    #[test]
    fn averages_infix_switches_to_thousands() {
        assert_eq!(averages_infix(5000), "5k");
        assert_eq!(averages_infix(1500), "1.5k");
        assert_eq!(averages_infix(1000), "1k");
        assert_eq!(averages_infix(250), "250fid");
        assert_eq!(averages_infix(999), "999fid");
    }

    #[test]
    fn trace_file_name_layout() {
        assert_eq!(
            name(5000).file_name(noon()),
            "12_03_04_ethanol_2to8_5k_40C_1us_15psig_.txt"
        );

        let high = TraceName {
            band: Band::High,
            chirp_us: 0.5,
            temperature_c: 37.5,
            ..name(250)
        };
        assert_eq!(
            high.file_name(noon()),
            "12_03_04_ethanol_6to18_250fid_37.5C_0.5us_15psig_.txt"
        );
    }

    #[test]
    fn spectrum_name_extends_trace_stem() {
        let params = FftParams {
            fid_fraction: 0.5,
            kaiser_beta: 9.5,
            record_length: 8192,
            ..Default::default()
        };
        let trace = Path::new("/data/12_03_04_ethanol_2to8_5k_40C_1us_15psig_.txt");
        assert_eq!(
            spectrum_file_name(trace, &params),
            "12_03_04_ethanol_2to8_5k_40C_1us_15psig__FF5_KB95_TRL8192_.ft"
        );
    }

    #[tokio::test]
    async fn writes_trace_and_spectrum_files() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DataWriter::new(dir.path().join("run"));
        let trace = Trace::new(1e-9, vec![0.5, -0.25, 0.125], 1000);

        let path = writer.save_trace(&name(1000), &trace, noon()).await.unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);

        let spectrum = Spectrum {
            points: vec![(2000.0, 0.5), (2000.5, 0.123456789)],
        };
        let ft = writer
            .save_spectrum(&path, &FftParams::default(), &spectrum)
            .await
            .unwrap();
        let text = std::fs::read_to_string(ft).unwrap();
        assert_eq!(text, "2000.0000, 0.50000000\n2000.5000, 0.12345679\n");
    }

    #[tokio::test]
    async fn same_second_saves_do_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DataWriter::new(dir.path());
        let trace = Trace::new(1e-9, vec![1.0], 10);

        let first = writer.save_trace(&name(10), &trace, noon()).await.unwrap();
        let second = writer.save_trace(&name(10), &trace, noon()).await.unwrap();
        assert_ne!(first, second);
        assert!(second
            .to_string_lossy()
            .ends_with("12_03_04_ethanol_2to8_10fid_40C_1us_15psig_2_.txt"));
    }
}

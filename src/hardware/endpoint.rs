//! Serialized access to instrument endpoints.
//!
//! No endpoint is safe to call from two contexts at once, yet the status display
//! and the acquisition worker both talk to the same three instruments. Each
//! instrument is therefore wrapped in an [`Endpoint`]: one async mutex per
//! instrument, plus a clone of its cancellation signal that can be read or set
//! without taking the lock.
//!
//! [`InstrumentRig`] bundles the three endpoints and offers the short call
//! sequences the controller uses, each mapping endpoint failures to
//! [`AcqError::Instrument`].

use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use super::capabilities::{Oscilloscope, TemperatureController, WaveformGenerator};
use super::signal::CancellationSignal;
use super::Trace;
use crate::error::{AcqError, AcqResult};
use crate::experiment::run_config::Band;

/// One instrument behind its own mutex.
pub struct Endpoint<T: ?Sized> {
    name: String,
    signal: CancellationSignal,
    inner: Arc<Mutex<T>>,
}

impl<T: ?Sized> Clone for Endpoint<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            signal: self.signal.clone(),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: ?Sized> Endpoint<T> {
    /// Wrap an already shared instrument.
    pub fn from_shared(
        name: impl Into<String>,
        signal: CancellationSignal,
        inner: Arc<Mutex<T>>,
    ) -> Self {
        Self {
            name: name.into(),
            signal,
            inner,
        }
    }

    /// Instrument name used in logs and errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The instrument's cancellation signal. Does not take the lock.
    pub fn signal(&self) -> &CancellationSignal {
        &self.signal
    }

    /// Take exclusive access to the instrument.
    pub async fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock().await
    }

    fn err(&self, e: anyhow::Error) -> AcqError {
        AcqError::instrument(&self.name, e)
    }
}

impl Endpoint<dyn Oscilloscope> {
    /// Wrap an oscilloscope.
    pub fn scope(scope: impl Oscilloscope + 'static) -> Self {
        let name = scope.name().to_string();
        let signal = scope.cancel_signal();
        let inner: Arc<Mutex<dyn Oscilloscope>> = Arc::new(Mutex::new(scope));
        Self::from_shared(name, signal, inner)
    }
}

impl Endpoint<dyn WaveformGenerator> {
    /// Wrap a waveform generator.
    pub fn awg(awg: impl WaveformGenerator + 'static) -> Self {
        let name = awg.name().to_string();
        let signal = awg.cancel_signal();
        let inner: Arc<Mutex<dyn WaveformGenerator>> = Arc::new(Mutex::new(awg));
        Self::from_shared(name, signal, inner)
    }
}

impl Endpoint<dyn TemperatureController> {
    /// Wrap a temperature controller.
    pub fn temperature(temp: impl TemperatureController + 'static) -> Self {
        let name = temp.name().to_string();
        let signal = temp.cancel_signal();
        let inner: Arc<Mutex<dyn TemperatureController>> = Arc::new(Mutex::new(temp));
        Self::from_shared(name, signal, inner)
    }
}

/// The three instruments of the spectrometer, shared for the process lifetime.
#[derive(Clone)]
pub struct InstrumentRig {
    /// Averaging oscilloscope.
    pub scope: Endpoint<dyn Oscilloscope>,
    /// Chirp waveform generator.
    pub awg: Endpoint<dyn WaveformGenerator>,
    /// Nozzle temperature controller.
    pub temperature: Endpoint<dyn TemperatureController>,
}

impl InstrumentRig {
    /// Bundle three instruments.
    pub fn new(
        scope: impl Oscilloscope + 'static,
        awg: impl WaveformGenerator + 'static,
        temperature: impl TemperatureController + 'static,
    ) -> Self {
        Self {
            scope: Endpoint::scope(scope),
            awg: Endpoint::awg(awg),
            temperature: Endpoint::temperature(temperature),
        }
    }

    /// Clear all three instrument signals ahead of a new run.
    pub fn reset_signals(&self) {
        self.scope.signal().reset();
        self.awg.signal().reset();
        self.temperature.signal().reset();
    }

    /// Set all three instrument signals without stopping anything.
    pub fn cancel_all(&self, reason: &str) {
        self.scope.signal().set(reason);
        self.awg.signal().set(reason);
        self.temperature.signal().set(reason);
    }

    /// Bring every instrument to the stopped, disconnected-display state.
    ///
    /// Signals are set before any `stop()` is issued. Individual stop failures are
    /// logged and collected; the remaining instruments are still stopped.
    pub async fn halt_all(&self, reason: &str) -> AcqResult<()> {
        self.cancel_all(reason);

        let mut failures = Vec::new();
        if let Err(e) = self.scope.lock().await.stop().await {
            warn!(error = %e, "Scope failed to stop");
            failures.push(self.scope.err(e).to_string());
        }
        if let Err(e) = self.awg.lock().await.stop().await {
            warn!(error = %e, "AWG failed to stop");
            failures.push(self.awg.err(e).to_string());
        }
        if let Err(e) = self.temperature.lock().await.stop().await {
            warn!(error = %e, "Temperature controller failed to stop");
            failures.push(self.temperature.err(e).to_string());
        }

        if failures.is_empty() {
            debug!("All instruments halted");
            Ok(())
        } else {
            Err(AcqError::Instrument(failures.join("; ")))
        }
    }

    // ---------------------------------------------------------------------
    // Oscilloscope
    // ---------------------------------------------------------------------

    /// Start scope accumulation.
    pub async fn scope_run(&self) -> AcqResult<()> {
        let scope = self.scope.lock().await;
        scope.run(true).await.map_err(|e| self.scope.err(e))
    }

    /// Stop scope accumulation.
    pub async fn scope_stop(&self) -> AcqResult<()> {
        let scope = self.scope.lock().await;
        scope.stop().await.map_err(|e| self.scope.err(e))
    }

    /// Discard accumulated traces.
    pub async fn scope_clear(&self) -> AcqResult<()> {
        let scope = self.scope.lock().await;
        scope.clear().await.map_err(|e| self.scope.err(e))
    }

    /// Current accumulated trace count.
    pub async fn trace_count(&self) -> AcqResult<u64> {
        let scope = self.scope.lock().await;
        scope.trace_count().await.map_err(|e| self.scope.err(e))
    }

    /// Programmed sample rate.
    pub async fn sample_rate(&self) -> AcqResult<f64> {
        let scope = self.scope.lock().await;
        scope.sample_rate().await.map_err(|e| self.scope.err(e))
    }

    /// MATH2 memory depth register.
    pub async fn math2_memory(&self) -> AcqResult<u64> {
        let scope = self.scope.lock().await;
        scope.math2_memory().await.map_err(|e| self.scope.err(e))
    }

    /// Write the MATH2 memory depth register.
    pub async fn set_math2_memory(&self, depth: u64) -> AcqResult<()> {
        let scope = self.scope.lock().await;
        scope
            .set_math2_memory(depth)
            .await
            .map_err(|e| self.scope.err(e))
    }

    /// Reload the band's stored scope setup.
    pub async fn reload_scope_setup(&self, band: Band) -> AcqResult<()> {
        let scope = self.scope.lock().await;
        scope.reload_setup(band).await.map_err(|e| self.scope.err(e))
    }

    /// Read back the averaged trace.
    pub async fn fetch_trace(&self) -> AcqResult<Trace> {
        let scope = self.scope.lock().await;
        scope.fetch_trace().await.map_err(|e| self.scope.err(e))
    }

    // ---------------------------------------------------------------------
    // AWG
    // ---------------------------------------------------------------------

    /// Start chirp output.
    pub async fn awg_run(&self) -> AcqResult<()> {
        let awg = self.awg.lock().await;
        awg.run(true).await.map_err(|e| self.awg.err(e))
    }

    /// Stop chirp output.
    pub async fn awg_stop(&self) -> AcqResult<()> {
        let awg = self.awg.lock().await;
        awg.stop().await.map_err(|e| self.awg.err(e))
    }

    /// Identifier of the loaded waveform.
    pub async fn active_waveform(&self) -> AcqResult<String> {
        let awg = self.awg.lock().await;
        awg.active_waveform().await.map_err(|e| self.awg.err(e))
    }

    /// Load a stored waveform.
    pub async fn load_waveform(&self, waveform: &str) -> AcqResult<()> {
        let awg = self.awg.lock().await;
        awg.load_waveform(waveform)
            .await
            .map_err(|e| self.awg.err(e))
    }

    // ---------------------------------------------------------------------
    // Temperature controller
    // ---------------------------------------------------------------------

    /// Read the three redundant setpoints.
    pub async fn setpoints(&self) -> AcqResult<[f64; 3]> {
        let temp = self.temperature.lock().await;
        temp.setpoints().await.map_err(|e| self.temperature.err(e))
    }

    /// Write the nozzle setpoint.
    pub async fn set_setpoint(&self, celsius: f64) -> AcqResult<()> {
        let temp = self.temperature.lock().await;
        temp.set_setpoint(celsius)
            .await
            .map_err(|e| self.temperature.err(e))
    }

    /// Measured nozzle temperature.
    pub async fn nozzle_temperature(&self) -> AcqResult<f64> {
        let temp = self.temperature.lock().await;
        temp.nozzle_temperature()
            .await
            .map_err(|e| self.temperature.err(e))
    }

    /// Cancel and restart temperature monitoring.
    pub async fn restart_temperature_monitor(&self) -> AcqResult<()> {
        self.temperature.signal().set("monitor restart");
        let temp = self.temperature.lock().await;
        temp.stop().await.map_err(|e| self.temperature.err(e))?;
        self.temperature.signal().reset();
        temp.run(true).await.map_err(|e| self.temperature.err(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{MockAwg, MockScope, MockTemperatureController};
    use crate::hardware::{Instrument, InstrumentStatus};

    fn rig() -> (InstrumentRig, MockScope, MockAwg, MockTemperatureController) {
        let scope = MockScope::new();
        let awg = MockAwg::new("chirp_2to8_1us");
        let temp = MockTemperatureController::new(20.0);
        let rig = InstrumentRig::new(scope.clone(), awg.clone(), temp.clone());
        (rig, scope, awg, temp)
    }

    #[tokio::test]
    async fn halt_all_sets_signals_and_stops_everything() {
        let (rig, scope, awg, temp) = rig();
        rig.scope_run().await.unwrap();
        rig.awg_run().await.unwrap();

        rig.halt_all("test").await.unwrap();

        assert!(rig.scope.signal().is_set());
        assert!(rig.awg.signal().is_set());
        assert!(rig.temperature.signal().is_set());
        assert_eq!(scope.status().await, InstrumentStatus::Stopped);
        assert_eq!(awg.status().await, InstrumentStatus::Stopped);
        assert_eq!(temp.status().await, InstrumentStatus::Stopped);
    }

    #[tokio::test]
    async fn cancelled_instrument_refuses_to_restart() {
        let (rig, _scope, _awg, _temp) = rig();
        rig.cancel_all("abort");
        assert!(rig.scope_run().await.is_err());

        rig.reset_signals();
        rig.scope_run().await.unwrap();
    }

    #[tokio::test]
    async fn monitor_restart_leaves_signal_clear() {
        let (rig, _scope, _awg, temp) = rig();
        rig.restart_temperature_monitor().await.unwrap();
        assert!(!rig.temperature.signal().is_set());
        assert_eq!(temp.status().await, InstrumentStatus::Running);
    }

    #[tokio::test]
    async fn unreachable_controller_maps_to_instrument_error() {
        let scope = MockScope::new();
        let awg = MockAwg::new("chirp_2to8_1us");
        let temp = MockTemperatureController::unreachable();
        let rig = InstrumentRig::new(scope, awg, temp);

        match rig.setpoints().await {
            Err(AcqError::Instrument(msg)) => assert!(msg.contains("temperature")),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}

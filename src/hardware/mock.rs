//! Mock Hardware Implementations
//!
//! Simulated instruments for tests, dry runs and the CLI's default rig.
//! All mocks are cheap clonable handles over shared state, so a test can keep a
//! clone for inspection after moving the instrument into an
//! [`InstrumentRig`](super::InstrumentRig).
//!
//! # Available Mocks
//!
//! - `MockScope` - averaging oscilloscope; the trace count advances by a fixed
//!   amount on every read while running, which keeps tests deterministic
//! - `MockAwg` - waveform generator recording every waveform load
//! - `MockTemperatureController` - three setpoints and a nozzle that moves toward
//!   the setpoint by a fixed step on every read
//!
//! Every mock refuses `run()` while its cancellation signal is set.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::experiment::run_config::Band;
use crate::hardware::capabilities::{
    Instrument, InstrumentStatus, Oscilloscope, TemperatureController, WaveformGenerator,
};
use crate::hardware::signal::CancellationSignal;
use crate::hardware::Trace;

// =============================================================================
// MockScope - Simulated Averaging Oscilloscope
// =============================================================================

#[derive(Debug)]
struct ScopeState {
    status: InstrumentStatus,
    count: u64,
    sample_rate: f64,
    math2_memory: u64,
    math2_writes: Vec<u64>,
    setup_reloads: Vec<Band>,
    run_calls: usize,
    clear_calls: usize,
    fail_reads: bool,
}

/// Mock averaging oscilloscope.
///
/// # Example
///
/// ```rust,ignore
/// let scope = MockScope::new().with_traces_per_poll(100);
/// scope.run(true).await?;
/// assert_eq!(scope.trace_count().await?, 100);
/// ```
#[derive(Clone)]
pub struct MockScope {
    state: Arc<RwLock<ScopeState>>,
    signal: CancellationSignal,
    traces_per_poll: u64,
    record_points: usize,
}

impl MockScope {
    /// Create a scope programmed for the 2-8 GHz band with a deep MATH2 memory.
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(ScopeState {
                status: InstrumentStatus::Idle,
                count: 0,
                sample_rate: Band::Low.expected_sample_rate(),
                math2_memory: 1_000_000,
                math2_writes: Vec::new(),
                setup_reloads: Vec::new(),
                run_calls: 0,
                clear_calls: 0,
                fail_reads: false,
            })),
            signal: CancellationSignal::new(),
            traces_per_poll: 250,
            record_points: 1024,
        }
    }

    /// Traces added per `trace_count()` read while running.
    pub fn with_traces_per_poll(mut self, traces: u64) -> Self {
        self.traces_per_poll = traces;
        self
    }

    /// Start with a specific sample rate readback.
    pub fn with_sample_rate(self, sample_rate: f64) -> Self {
        if let Ok(mut state) = self.state.try_write() {
            state.sample_rate = sample_rate;
        }
        self
    }

    /// Start with a specific MATH2 memory depth.
    pub fn with_math2_memory(self, depth: u64) -> Self {
        if let Ok(mut state) = self.state.try_write() {
            state.math2_memory = depth;
        }
        self
    }

    /// Make every trace count read fail (simulated bus error).
    pub async fn fail_reads(&self, fail: bool) {
        self.state.write().await.fail_reads = fail;
    }

    /// Every value written to the MATH2 memory register, in order.
    pub async fn math2_writes(&self) -> Vec<u64> {
        self.state.read().await.math2_writes.clone()
    }

    /// Bands whose stored setup has been reloaded.
    pub async fn setup_reloads(&self) -> Vec<Band> {
        self.state.read().await.setup_reloads.clone()
    }

    /// Number of `run()` calls accepted.
    pub async fn run_calls(&self) -> usize {
        self.state.read().await.run_calls
    }

    /// Number of `clear()` calls.
    pub async fn clear_calls(&self) -> usize {
        self.state.read().await.clear_calls
    }
}

impl Default for MockScope {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Instrument for MockScope {
    fn name(&self) -> &str {
        "scope"
    }

    fn cancel_signal(&self) -> CancellationSignal {
        self.signal.clone()
    }

    async fn run(&self, _feedback: bool) -> Result<()> {
        if self.signal.is_set() {
            bail!("MockScope: run refused, cancellation signal is set");
        }
        let mut state = self.state.write().await;
        state.status = InstrumentStatus::Running;
        state.run_calls += 1;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.state.write().await.status = InstrumentStatus::Stopped;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.count = 0;
        state.clear_calls += 1;
        Ok(())
    }

    async fn status(&self) -> InstrumentStatus {
        self.state.read().await.status
    }
}

#[async_trait]
impl Oscilloscope for MockScope {
    async fn trace_count(&self) -> Result<u64> {
        let mut state = self.state.write().await;
        if state.fail_reads {
            bail!("MockScope: trace count read failed");
        }
        if state.status == InstrumentStatus::Running {
            state.count += self.traces_per_poll;
        }
        Ok(state.count)
    }

    async fn sample_rate(&self) -> Result<f64> {
        Ok(self.state.read().await.sample_rate)
    }

    async fn math2_memory(&self) -> Result<u64> {
        Ok(self.state.read().await.math2_memory)
    }

    async fn set_math2_memory(&self, depth: u64) -> Result<()> {
        if depth == 0 {
            return Err(anyhow!("MockScope: MATH2 depth must be positive"));
        }
        let mut state = self.state.write().await;
        state.math2_memory = depth;
        state.math2_writes.push(depth);
        Ok(())
    }

    async fn reload_setup(&self, band: Band) -> Result<()> {
        let mut state = self.state.write().await;
        state.sample_rate = band.expected_sample_rate();
        state.setup_reloads.push(band);
        Ok(())
    }

    async fn fetch_trace(&self) -> Result<Trace> {
        let state = self.state.read().await;
        let dt = 1.0 / state.sample_rate;
        // Two decaying lines at 3.2 GHz and 5.1 GHz
        let samples = (0..self.record_points)
            .map(|i| {
                let t = i as f64 * dt;
                let envelope = (-t / 2.0e-6).exp();
                envelope
                    * ((2.0 * std::f64::consts::PI * 3.2e9 * t).sin()
                        + 0.5 * (2.0 * std::f64::consts::PI * 5.1e9 * t).sin())
            })
            .collect();
        Ok(Trace::new(dt, samples, state.count))
    }
}

// =============================================================================
// MockAwg - Simulated Waveform Generator
// =============================================================================

#[derive(Debug)]
struct AwgState {
    status: InstrumentStatus,
    waveform: String,
    loads: Vec<String>,
}

/// Mock arbitrary waveform generator.
#[derive(Clone)]
pub struct MockAwg {
    state: Arc<RwLock<AwgState>>,
    signal: CancellationSignal,
}

impl MockAwg {
    /// Create an AWG with `waveform` already loaded.
    pub fn new(waveform: impl Into<String>) -> Self {
        Self {
            state: Arc::new(RwLock::new(AwgState {
                status: InstrumentStatus::Idle,
                waveform: waveform.into(),
                loads: Vec::new(),
            })),
            signal: CancellationSignal::new(),
        }
    }

    /// Every waveform loaded, in order.
    pub async fn loads(&self) -> Vec<String> {
        self.state.read().await.loads.clone()
    }
}

#[async_trait]
impl Instrument for MockAwg {
    fn name(&self) -> &str {
        "awg"
    }

    fn cancel_signal(&self) -> CancellationSignal {
        self.signal.clone()
    }

    async fn run(&self, _feedback: bool) -> Result<()> {
        if self.signal.is_set() {
            bail!("MockAwg: run refused, cancellation signal is set");
        }
        self.state.write().await.status = InstrumentStatus::Running;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.state.write().await.status = InstrumentStatus::Stopped;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        Ok(())
    }

    async fn status(&self) -> InstrumentStatus {
        self.state.read().await.status
    }
}

#[async_trait]
impl WaveformGenerator for MockAwg {
    async fn active_waveform(&self) -> Result<String> {
        Ok(self.state.read().await.waveform.clone())
    }

    async fn load_waveform(&self, waveform: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.waveform = waveform.to_string();
        state.loads.push(waveform.to_string());
        Ok(())
    }
}

// =============================================================================
// MockTemperatureController - Simulated Nozzle Heater
// =============================================================================

#[derive(Debug)]
struct TemperatureState {
    status: InstrumentStatus,
    setpoints: [f64; 3],
    nozzle: f64,
    writes: Vec<f64>,
}

/// Mock nozzle temperature controller.
///
/// The nozzle moves toward the first setpoint by `step_c` per reading.
#[derive(Clone)]
pub struct MockTemperatureController {
    state: Arc<RwLock<TemperatureState>>,
    signal: CancellationSignal,
    step_c: f64,
    reachable: bool,
}

impl MockTemperatureController {
    /// Controller with all setpoints and the nozzle at `celsius`.
    pub fn new(celsius: f64) -> Self {
        Self {
            state: Arc::new(RwLock::new(TemperatureState {
                status: InstrumentStatus::Idle,
                setpoints: [celsius; 3],
                nozzle: celsius,
                writes: Vec::new(),
            })),
            signal: CancellationSignal::new(),
            step_c: 5.0,
            reachable: true,
        }
    }

    /// Controller whose redundant setpoints disagree.
    pub fn with_setpoints(setpoints: [f64; 3]) -> Self {
        let ctl = Self::new(setpoints[0]);
        if let Ok(mut state) = ctl.state.try_write() {
            state.setpoints = setpoints;
        }
        ctl
    }

    /// Controller that never answers.
    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::new(20.0)
        }
    }

    /// Degrees moved toward the setpoint per reading.
    pub fn with_step(mut self, step_c: f64) -> Self {
        self.step_c = step_c;
        self
    }

    /// Every setpoint written, in order.
    pub async fn writes(&self) -> Vec<f64> {
        self.state.read().await.writes.clone()
    }

    fn check_reachable(&self) -> Result<()> {
        if self.reachable {
            Ok(())
        } else {
            Err(anyhow!("MockTemperatureController: no response"))
        }
    }
}

#[async_trait]
impl Instrument for MockTemperatureController {
    fn name(&self) -> &str {
        "temperature"
    }

    fn cancel_signal(&self) -> CancellationSignal {
        self.signal.clone()
    }

    async fn run(&self, _feedback: bool) -> Result<()> {
        self.check_reachable()?;
        if self.signal.is_set() {
            bail!("MockTemperatureController: run refused, cancellation signal is set");
        }
        self.state.write().await.status = InstrumentStatus::Running;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.check_reachable()?;
        self.state.write().await.status = InstrumentStatus::Stopped;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.check_reachable()
    }

    async fn status(&self) -> InstrumentStatus {
        self.state.read().await.status
    }
}

#[async_trait]
impl TemperatureController for MockTemperatureController {
    async fn setpoints(&self) -> Result<[f64; 3]> {
        self.check_reachable()?;
        Ok(self.state.read().await.setpoints)
    }

    async fn set_setpoint(&self, celsius: f64) -> Result<()> {
        self.check_reachable()?;
        let mut state = self.state.write().await;
        state.setpoints = [celsius; 3];
        state.writes.push(celsius);
        Ok(())
    }

    async fn nozzle_temperature(&self) -> Result<f64> {
        self.check_reachable()?;
        let mut state = self.state.write().await;
        let target = state.setpoints[0];
        let delta = target - state.nozzle;
        if delta.abs() <= self.step_c {
            state.nozzle = target;
        } else {
            state.nozzle += self.step_c * delta.signum();
        }
        Ok(state.nozzle)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_scope_counts_only_while_running() {
        let scope = MockScope::new().with_traces_per_poll(100);
        assert_eq!(scope.trace_count().await.unwrap(), 0);

        scope.run(true).await.unwrap();
        assert_eq!(scope.trace_count().await.unwrap(), 100);
        assert_eq!(scope.trace_count().await.unwrap(), 200);

        scope.stop().await.unwrap();
        assert_eq!(scope.trace_count().await.unwrap(), 200);

        scope.clear().await.unwrap();
        assert_eq!(scope.trace_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mock_scope_refuses_run_when_cancelled() {
        let scope = MockScope::new();
        scope.cancel_signal().set("abort");
        assert!(scope.run(true).await.is_err());
        assert_eq!(scope.status().await, InstrumentStatus::Idle);
    }

    #[tokio::test]
    async fn test_mock_scope_reload_sets_band_rate() {
        let scope = MockScope::new().with_sample_rate(1.0e9);
        scope.reload_setup(Band::High).await.unwrap();
        assert_eq!(scope.sample_rate().await.unwrap(), Band::High.expected_sample_rate());
        assert_eq!(scope.setup_reloads().await, vec![Band::High]);
    }

    #[tokio::test]
    async fn test_mock_scope_trace_shape() {
        let scope = MockScope::new();
        let trace = scope.fetch_trace().await.unwrap();
        assert_eq!(trace.len(), 1024);
        assert!(trace.dt_s > 0.0);
    }

    #[tokio::test]
    async fn test_mock_awg_records_loads() {
        let awg = MockAwg::new("a");
        awg.load_waveform("b").await.unwrap();
        assert_eq!(awg.active_waveform().await.unwrap(), "b");
        assert_eq!(awg.loads().await, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_temperature_ramps_toward_setpoint() {
        let ctl = MockTemperatureController::new(20.0).with_step(10.0);
        ctl.set_setpoint(45.0).await.unwrap();
        assert_eq!(ctl.nozzle_temperature().await.unwrap(), 30.0);
        assert_eq!(ctl.nozzle_temperature().await.unwrap(), 40.0);
        assert_eq!(ctl.nozzle_temperature().await.unwrap(), 45.0);
        assert_eq!(ctl.setpoints().await.unwrap(), [45.0; 3]);
    }

    #[tokio::test]
    async fn test_mock_temperature_unreachable() {
        let ctl = MockTemperatureController::unreachable();
        assert!(ctl.setpoints().await.is_err());
        assert!(ctl.nozzle_temperature().await.is_err());
        assert!(ctl.run(true).await.is_err());
    }
}

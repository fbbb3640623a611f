//! The acquisition controller.
//!
//! [`AutoController`] is the handle the front end holds. `start()` snapshots the
//! run configuration, runs the consistency checks, and spawns one worker task
//! that executes the selected mode until it completes or is cancelled. While the
//! worker runs, the handle accepts:
//!
//! - `abort()`: sets the controller signal, then halts every instrument
//! - `pause()` / `resume()`: honoured at the next iteration boundary
//! - `repeat()` / `skip()`: queued over a channel and applied by the worker at
//!   iteration boundaries (sequence modes only)
//!
//! The worker is the only writer of the sequence queue; the handle observes it
//! through a `watch` channel and through [`RunEvent::Queue`].
//!
//! Whatever the exit path, the worker finishes by halting all three
//! instruments, so a run never leaves the scope, AWG or temperature monitor
//! running.

use chrono::Local;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument as _};
use uuid::Uuid;

use super::acquisition::{
    await_threshold, cancellable_sleep, wait_for_temperature, StatusMonitor, DEFAULT_POLL_INTERVAL,
};
use super::consistency::ConsistencyChecker;
use super::events::{EventSink, RunEvent, RunOutcome, RunSummary};
use super::prompt::OperatorPrompt;
use super::run_config::{chirp_sequence, ChirpOrder, RunConfiguration, RunMode, RunModeKind};
use super::sequence::{QueueCommand, QueueSlot, SequenceQueue};
use super::state::ControllerState;
use crate::data::{DataWriter, KaiserFft, SpectrumProcessor, TraceName};
use crate::error::{AcqError, AcqResult};
use crate::hardware::{CancellationSignal, InstrumentRig, Trace};

/// How often a paused worker checks for resume or abort.
const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Timing and housekeeping knobs that are not part of a run configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionSettings {
    /// Interval between trace-count polls.
    pub poll_interval: Duration,
    /// Interval between nozzle temperature reads while waiting for the band.
    pub temperature_poll_interval: Duration,
    /// Setpoint written when a temperature ramp ends with reset enabled, °C.
    pub nozzle_reset_c: f64,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            temperature_poll_interval: Duration::from_secs(1),
            nozzle_reset_c: 20.0,
        }
    }
}

/// Bookkeeping for the most recent run.
///
/// The worker drops `commands` as it leaves; `wait()` takes only `handle`, so
/// the run stays visible to `start()` and `repeat()` while someone awaits it.
struct ActiveRun {
    mode: RunModeKind,
    commands: Option<mpsc::UnboundedSender<QueueCommand>>,
    handle: Option<JoinHandle<RunSummary>>,
}

struct ControlState {
    cancel: CancellationSignal,
    pause_requested: AtomicBool,
    events: EventSink,
    state: RwLock<ControllerState>,
    queue: watch::Sender<Option<SequenceQueue>>,
    active: Mutex<Option<ActiveRun>>,
}

impl ControlState {
    /// Close the command channel and return to Idle.
    async fn retire(&self) {
        let mut active = self.active.lock().await;
        if let Some(run) = active.as_mut() {
            run.commands = None;
        }
        *self.state.write().await = ControllerState::Idle;
    }
}

/// Handle to the acquisition controller. Clones share the same run.
#[derive(Clone)]
pub struct AutoController {
    rig: InstrumentRig,
    prompt: Arc<dyn OperatorPrompt>,
    writer: DataWriter,
    processor: Arc<dyn SpectrumProcessor>,
    settings: AcquisitionSettings,
    control: Arc<ControlState>,
}

impl AutoController {
    /// Controller driving `rig`, asking `prompt` about mismatches and saving
    /// through `writer`.
    pub fn new(rig: InstrumentRig, prompt: Arc<dyn OperatorPrompt>, writer: DataWriter) -> Self {
        let (queue, _) = watch::channel(None);
        Self {
            rig,
            prompt,
            writer,
            processor: Arc::new(KaiserFft),
            settings: AcquisitionSettings::default(),
            control: Arc::new(ControlState {
                cancel: CancellationSignal::new(),
                pause_requested: AtomicBool::new(false),
                events: EventSink::default(),
                state: RwLock::new(ControllerState::Idle),
                queue,
                active: Mutex::new(None),
            }),
        }
    }

    /// Replace the timing settings.
    pub fn with_settings(mut self, settings: AcquisitionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replace the spectrum processor.
    pub fn with_processor(mut self, processor: Arc<dyn SpectrumProcessor>) -> Self {
        self.processor = processor;
        self
    }

    /// The instruments this controller drives.
    pub fn rig(&self) -> &InstrumentRig {
        &self.rig
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ControllerState {
        *self.control.state.read().await
    }

    /// Subscribe to run events.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.control.events.subscribe()
    }

    /// Latest sequence queue snapshot, if a sequence run has started.
    pub fn queue(&self) -> Option<SequenceQueue> {
        self.control.queue.borrow().clone()
    }

    /// Watch the sequence queue.
    pub fn watch_queue(&self) -> watch::Receiver<Option<SequenceQueue>> {
        self.control.queue.subscribe()
    }

    /// Start a run and return its identifier.
    ///
    /// The configuration is validated, checked against the instruments, and
    /// then owned by the worker; later edits by the caller do not reach it.
    pub async fn start(&self, config: RunConfiguration) -> AcqResult<String> {
        let mut active = self.control.active.lock().await;
        if !self.control.state.read().await.can_begin() {
            let worker_gone = active
                .as_ref()
                .and_then(|run| run.handle.as_ref())
                .is_some_and(JoinHandle::is_finished);
            if !worker_gone {
                return Err(AcqError::AlreadyRunning);
            }
            warn!("Previous worker exited without returning to Idle");
        }
        if active.as_ref().is_some_and(|run| run.handle.is_some()) {
            debug!("Discarding summary of a finished run that was never awaited");
        }

        config.validate()?;
        self.rig.reset_signals();
        self.control.cancel.reset();
        self.control.pause_requested.store(false, Ordering::SeqCst);

        let (config, report) = ConsistencyChecker::new(&self.rig, self.prompt.as_ref())
            .with_events(&self.control.events)
            .verify(config)
            .await?;
        debug!(corrections = report.corrections.len(), "Configuration verified");

        let mode = config.mode.kind();
        let run_id = Uuid::new_v4().to_string();
        let (commands, command_rx) = mpsc::unbounded_channel();

        self.control.queue.send_replace(None);
        *self.control.state.write().await = ControllerState::Running(mode);

        let worker = Worker {
            controller: self.clone(),
            config,
            run_id: run_id.clone(),
            commands: command_rx,
            traces: Vec::new(),
            spectra: Vec::new(),
        };
        let span = info_span!("acquisition", run_id = %run_id, mode = %mode);
        let handle = tokio::spawn(worker.run().instrument(span));

        info!(run_id = %run_id, mode = %mode, "Acquisition started");
        *active = Some(ActiveRun {
            mode,
            commands: Some(commands),
            handle: Some(handle),
        });
        Ok(run_id)
    }

    /// Cancel the active run.
    ///
    /// The controller signal is set first, then every instrument is halted. The
    /// worker notices at its next check and finishes on its own; use
    /// [`wait`](Self::wait) to collect the summary.
    pub async fn abort(&self) -> AcqResult<()> {
        {
            let mut state = self.control.state.write().await;
            if state.mode().is_none() {
                return Err(AcqError::NotRunning);
            }
            *state = ControllerState::Aborting;
        }

        info!("Abort requested");
        self.control.cancel.set("operator abort");
        if let Err(e) = self.rig.halt_all("operator abort").await {
            warn!(error = %e, "Instrument halt during abort reported failures");
        }
        Ok(())
    }

    /// Ask the worker to hold at the next iteration boundary.
    ///
    /// Single runs have no boundary and ignore the request.
    pub async fn pause(&self) -> AcqResult<()> {
        let state = *self.control.state.read().await;
        if !state.can_pause() {
            return Err(AcqError::NotRunning);
        }
        info!("Pause requested");
        self.control.pause_requested.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Release a pause.
    pub async fn resume(&self) -> AcqResult<()> {
        let state = *self.control.state.read().await;
        if state.mode().is_none() {
            return Err(AcqError::NotRunning);
        }
        info!("Resume requested");
        self.control.pause_requested.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Run the current sequence step once more after it finishes.
    pub async fn repeat(&self) -> AcqResult<()> {
        self.send_command(QueueCommand::Repeat).await
    }

    /// Drop the next sequence step.
    pub async fn skip(&self) -> AcqResult<()> {
        self.send_command(QueueCommand::Skip).await
    }

    async fn send_command(&self, command: QueueCommand) -> AcqResult<()> {
        let active = self.control.active.lock().await;
        let sender = active
            .as_ref()
            .filter(|run| run.mode.is_sequence())
            .and_then(|run| run.commands.as_ref())
            .ok_or(AcqError::NotSequenceMode)?;
        debug!(?command, "Queue command sent");
        sender.send(command).map_err(|_| AcqError::NotSequenceMode)
    }

    /// Wait for the active run to end and return its summary.
    ///
    /// Only one caller receives the summary; others get `NotRunning`.
    pub async fn wait(&self) -> AcqResult<RunSummary> {
        let handle = self
            .control
            .active
            .lock()
            .await
            .as_mut()
            .and_then(|run| run.handle.take())
            .ok_or(AcqError::NotRunning)?;

        match handle.await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                error!(error = %e, "Acquisition worker failed");
                self.control.retire().await;
                if let Err(e) = self.rig.halt_all("worker failure").await {
                    warn!(error = %e, "Instrument halt after worker failure reported failures");
                }
                Err(AcqError::WorkerPanicked(e.to_string()))
            }
        }
    }
}

/// A saved trace whose spectrum has not been computed yet.
struct FftJob {
    trace_path: PathBuf,
    trace: Trace,
}

struct Worker {
    controller: AutoController,
    config: RunConfiguration,
    run_id: String,
    commands: mpsc::UnboundedReceiver<QueueCommand>,
    traces: Vec<PathBuf>,
    spectra: Vec<PathBuf>,
}

impl Worker {
    fn rig(&self) -> &InstrumentRig {
        &self.controller.rig
    }

    fn cancel(&self) -> &CancellationSignal {
        &self.controller.control.cancel
    }

    fn events(&self) -> &EventSink {
        &self.controller.control.events
    }

    async fn run(mut self) -> RunSummary {
        let mode = self.config.mode.kind();
        let guard = self.cancel().guard("acquisition worker");
        self.events().emit(RunEvent::Started {
            run_id: self.run_id.clone(),
            mode,
        });

        let result = match self.config.mode.clone() {
            RunMode::Single => self.run_single().await,
            RunMode::Continuous => self.run_continuous().await,
            RunMode::TemperatureSequence { steps } => self.run_temperature_sequence(steps).await,
            RunMode::ChirpSequence { order } => self.run_chirp_sequence(order).await,
        };
        guard.dismiss();

        let outcome = match result {
            Ok(()) if self.cancel().is_set() => RunOutcome::Aborted,
            Ok(()) => RunOutcome::Completed,
            Err(e) if self.cancel().is_set() => {
                debug!(error = %e, "Instrument error after cancellation");
                RunOutcome::Aborted
            }
            Err(e) => {
                error!(error = %e, "Acquisition failed");
                RunOutcome::Failed(e.to_string())
            }
        };

        if let Err(e) = self.rig().halt_all("run finished").await {
            warn!(error = %e, "Instrument halt at run end reported failures");
        }
        self.controller.control.retire().await;

        info!(
            ?outcome,
            traces = self.traces.len(),
            spectra = self.spectra.len(),
            "Acquisition finished"
        );
        let summary = RunSummary {
            run_id: self.run_id,
            mode,
            outcome,
            traces: self.traces,
            spectra: self.spectra,
        };
        self.controller
            .control
            .events
            .emit(RunEvent::Finished(summary.clone()));
        summary
    }

    /// Wait until the scope has averaged past the save threshold.
    async fn accumulate(&self) -> AcqResult<bool> {
        let monitor = StatusMonitor::new(self.rig(), self.events());
        await_threshold(
            self.rig(),
            self.config.save_threshold,
            self.cancel(),
            self.controller.settings.poll_interval,
            &monitor,
        )
        .await
    }

    async fn wait_in_band(&self, target_c: f64) -> AcqResult<bool> {
        wait_for_temperature(
            self.rig(),
            target_c,
            self.config.temperature.tolerance_c,
            self.cancel(),
            self.controller.settings.temperature_poll_interval,
            self.events(),
        )
        .await
    }

    async fn save_trace(&mut self, temperature_c: f64, chirp_us: f64) -> AcqResult<FftJob> {
        let trace = self.rig().fetch_trace().await?;
        let name = TraceName::from_config(&self.config, temperature_c, chirp_us);
        let path = self
            .controller
            .writer
            .save_trace(&name, &trace, Local::now().time())
            .await?;

        info!(path = %path.display(), temperature_c, chirp_us, "Trace saved");
        self.events().emit(RunEvent::TraceSaved { path: path.clone() });
        self.traces.push(path.clone());
        Ok(FftJob {
            trace_path: path,
            trace,
        })
    }

    async fn save_spectrum(&mut self, job: FftJob) -> AcqResult<()> {
        let processor = Arc::clone(&self.controller.processor);
        let params = self.config.fft.clone();
        let FftJob { trace_path, trace } = job;

        let spectrum = tokio::task::spawn_blocking(move || processor.transform(&trace, &params))
            .await
            .map_err(|e| AcqError::WorkerPanicked(format!("FFT task: {e}")))?;

        let path = self
            .controller
            .writer
            .save_spectrum(&trace_path, &self.config.fft, &spectrum)
            .await?;
        info!(path = %path.display(), "Spectrum saved");
        self.events().emit(RunEvent::SpectrumSaved { path: path.clone() });
        self.spectra.push(path);
        Ok(())
    }

    fn publish_queue(&self, queue: &SequenceQueue) {
        self.controller.control.queue.send_replace(Some(queue.clone()));
        self.events().emit(RunEvent::Queue(queue.clone()));
    }

    /// Apply every operator command received since the last boundary.
    fn apply_commands(&mut self, queue: &mut SequenceQueue) {
        let mut changed = false;
        while let Ok(command) = self.commands.try_recv() {
            match queue.apply(command) {
                Ok(()) => {
                    info!(?command, next = %queue.next(), "Queue command applied");
                    self.events().emit(RunEvent::QueueCommandApplied(command));
                    changed = true;
                }
                Err(e) => {
                    warn!(?command, error = %e, "Queue command rejected");
                    self.events().emit(RunEvent::rejected(command, e));
                }
            }
        }
        if changed {
            self.publish_queue(queue);
        }
    }

    /// Hold here while a pause is requested.
    ///
    /// The scope is stopped for the duration of the pause and restarted on
    /// resume if it was running. Returns `false` if the run was cancelled.
    async fn hold_if_paused(&self, scope_running: bool) -> AcqResult<bool> {
        let control = &self.controller.control;
        if !control.pause_requested.load(Ordering::SeqCst) {
            return Ok(!self.cancel().is_set());
        }

        if scope_running {
            self.rig().scope_stop().await?;
        }
        {
            let mut state = control.state.write().await;
            if let ControllerState::Running(mode) = *state {
                *state = ControllerState::Paused(mode);
            }
        }
        info!("Run paused");
        control.events.emit(RunEvent::Paused);

        while control.pause_requested.load(Ordering::SeqCst) {
            if !cancellable_sleep(PAUSE_POLL_INTERVAL, self.cancel()).await {
                debug!("Cancelled while paused");
                return Ok(false);
            }
        }

        {
            let mut state = control.state.write().await;
            if let ControllerState::Paused(mode) = *state {
                *state = ControllerState::Running(mode);
            }
        }
        info!("Run resumed");
        control.events.emit(RunEvent::Resumed);

        if scope_running {
            self.rig().scope_run().await?;
        }
        Ok(!self.cancel().is_set())
    }

    /// One accumulation. The trace is saved even if the wait was cancelled.
    async fn run_single(&mut self) -> AcqResult<()> {
        self.rig().awg_run().await?;
        self.rig().scope_run().await?;

        let reached = self.accumulate().await?;
        if !reached {
            info!("Cancelled before the threshold; saving the partial average");
        }
        self.rig().scope_stop().await?;

        let job = self
            .save_trace(self.config.temperature.target_c, self.config.chirp_us)
            .await?;
        if self.config.fft.auto {
            self.save_spectrum(job).await?;
        }

        self.rig().awg_stop().await?;
        self.rig().scope_clear().await?;
        Ok(())
    }

    /// Accumulate, save and restart until cancelled.
    async fn run_continuous(&mut self) -> AcqResult<()> {
        self.rig().awg_run().await?;
        self.rig().scope_run().await?;

        loop {
            if !self.hold_if_paused(true).await? {
                break;
            }
            if !self.accumulate().await? {
                debug!("Continuous run cancelled mid-average");
                break;
            }

            self.rig().scope_stop().await?;
            let job = self
                .save_trace(self.config.temperature.target_c, self.config.chirp_us)
                .await?;
            self.rig().scope_clear().await?;
            self.rig().scope_run().await?;

            if self.config.fft.auto {
                self.save_spectrum(job).await?;
            }
        }
        Ok(())
    }

    async fn run_temperature_sequence(&mut self, steps: Vec<f64>) -> AcqResult<()> {
        let result = self.temperature_ramp(steps).await;

        if self.config.temperature.reset_on_exit {
            let reset = self.controller.settings.nozzle_reset_c;
            match self.rig().set_setpoint(reset).await {
                Ok(()) => info!(setpoint = reset, "Nozzle reset"),
                Err(e) => warn!(error = %e, "Nozzle reset failed"),
            }
        }
        result
    }

    /// One accumulation per temperature. Each trace is labelled with the
    /// temperature it was taken at; the next setpoint is written before the save
    /// so the nozzle starts moving while the file is written.
    async fn temperature_ramp(&mut self, steps: Vec<f64>) -> AcqResult<()> {
        let mut queue = SequenceQueue::ascending(steps)?;
        self.publish_queue(&queue);

        if let Some(first) = queue.current().step() {
            self.rig().set_setpoint(first.value).await?;
            if self.config.temperature.wait_initial && !self.wait_in_band(first.value).await? {
                return Ok(());
            }
        }
        self.rig().awg_run().await?;

        loop {
            self.apply_commands(&mut queue);
            if !self.hold_if_paused(false).await? {
                break;
            }
            let step = match queue.current() {
                QueueSlot::Step(step) => step,
                QueueSlot::Empty | QueueSlot::Complete => break,
            };
            debug!(step = %step, "Temperature step");

            self.rig().scope_run().await?;
            if self.config.temperature.wait_each_step && !self.wait_in_band(step.value).await? {
                break;
            }
            if !self.accumulate().await? {
                debug!(step = %step, "Temperature step cancelled mid-average");
                break;
            }
            self.rig().scope_stop().await?;

            self.apply_commands(&mut queue);
            let next = queue.advance()?;
            self.publish_queue(&queue);
            if let QueueSlot::Step(next) = next {
                if next.value != step.value {
                    self.rig().set_setpoint(next.value).await?;
                }
            }

            let job = self.save_trace(step.value, self.config.chirp_us).await?;
            self.rig().scope_clear().await?;
            if self.config.fft.auto {
                self.save_spectrum(job).await?;
            }

            if queue.is_complete() {
                break;
            }
        }
        Ok(())
    }

    /// One accumulation per chirp duration.
    ///
    /// The spectrum of step n is computed after step n+1's scope restart, while
    /// the scope is busy averaging; the last pending spectrum is flushed on exit.
    async fn run_chirp_sequence(&mut self, order: ChirpOrder) -> AcqResult<()> {
        let plan = chirp_sequence(self.config.band, order);
        let mut queue = SequenceQueue::new(plan.iter().map(|s| s.duration_us).collect())?;
        self.publish_queue(&queue);

        let mut pending: Option<FftJob> = None;
        loop {
            self.apply_commands(&mut queue);
            if !self.hold_if_paused(false).await? {
                break;
            }
            let step = match queue.current() {
                QueueSlot::Step(step) => step,
                QueueSlot::Empty | QueueSlot::Complete => break,
            };
            let Some(chirp) = plan.get(step.index) else {
                break;
            };
            debug!(step = %step, waveform = chirp.waveform, "Chirp step");

            self.rig().awg_stop().await?;
            self.rig().load_waveform(chirp.waveform).await?;
            self.rig().awg_run().await?;
            self.rig().scope_run().await?;

            if let Some(job) = pending.take() {
                self.save_spectrum(job).await?;
            }

            if !self.accumulate().await? {
                debug!(step = %step, "Chirp step cancelled mid-average");
                break;
            }
            self.rig().scope_stop().await?;

            self.apply_commands(&mut queue);
            queue.advance()?;
            self.publish_queue(&queue);

            let job = self
                .save_trace(self.config.temperature.target_c, chirp.duration_us)
                .await?;
            self.rig().scope_clear().await?;
            if self.config.fft.auto {
                pending = Some(job);
            }

            if queue.is_complete() {
                break;
            }
        }

        if let Some(job) = pending.take() {
            self.save_spectrum(job).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::prompt::AutoConfirm;
    use crate::hardware::mock::{MockAwg, MockScope, MockTemperatureController};
    use crate::hardware::{Instrument, InstrumentStatus};

    fn fast() -> AcquisitionSettings {
        AcquisitionSettings {
            poll_interval: Duration::from_millis(1),
            temperature_poll_interval: Duration::from_millis(1),
            nozzle_reset_c: 20.0,
        }
    }

    fn controller(scope: MockScope, dir: &std::path::Path) -> AutoController {
        let rig = InstrumentRig::new(
            scope,
            MockAwg::new("chirp_2to8_1us"),
            MockTemperatureController::new(20.0),
        );
        AutoController::new(rig, Arc::new(AutoConfirm), DataWriter::new(dir)).with_settings(fast())
    }

    #[tokio::test]
    async fn single_run_saves_one_trace_and_spectrum() {
        let dir = tempfile::tempdir().unwrap();
        let scope = MockScope::new().with_traces_per_poll(500);
        let ctl = controller(scope.clone(), dir.path());

        let config = RunConfiguration {
            save_threshold: 1000,
            ..Default::default()
        };
        ctl.start(config).await.unwrap();
        let summary = ctl.wait().await.unwrap();

        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert_eq!(summary.traces.len(), 1);
        assert_eq!(summary.spectra.len(), 1);
        assert_eq!(scope.clear_calls().await, 1);
        assert_eq!(scope.status().await, InstrumentStatus::Stopped);
        assert_eq!(ctl.state().await, ControllerState::Idle);
    }

    #[tokio::test]
    async fn abort_and_pause_require_a_run() {
        let dir = tempfile::tempdir().unwrap();
        let ctl = controller(MockScope::new(), dir.path());
        assert!(matches!(ctl.abort().await, Err(AcqError::NotRunning)));
        assert!(matches!(ctl.pause().await, Err(AcqError::NotRunning)));
        assert!(matches!(ctl.wait().await, Err(AcqError::NotRunning)));
        assert!(matches!(ctl.repeat().await, Err(AcqError::NotSequenceMode)));
    }

    #[tokio::test]
    async fn invalid_configuration_never_starts() {
        let dir = tempfile::tempdir().unwrap();
        let ctl = controller(MockScope::new(), dir.path());
        let config = RunConfiguration {
            save_threshold: 0,
            ..Default::default()
        };
        assert!(matches!(
            ctl.start(config).await,
            Err(AcqError::Configuration(_))
        ));
        assert_eq!(ctl.state().await, ControllerState::Idle);
    }

    #[tokio::test]
    async fn pause_holds_continuous_run_until_resumed() {
        let dir = tempfile::tempdir().unwrap();
        let scope = MockScope::new().with_traces_per_poll(600);
        let ctl = controller(scope.clone(), dir.path());
        let mut events = ctl.subscribe();

        let config = RunConfiguration {
            save_threshold: 1000,
            mode: RunMode::Continuous,
            fft: crate::experiment::run_config::FftParams {
                auto: false,
                ..Default::default()
            },
            ..Default::default()
        };
        ctl.start(config).await.unwrap();
        ctl.pause().await.unwrap();

        loop {
            if let RunEvent::Paused = events.recv().await.unwrap_or(RunEvent::Resumed) {
                break;
            }
        }
        assert!(matches!(ctl.state().await, ControllerState::Paused(_)));
        assert_eq!(scope.status().await, InstrumentStatus::Stopped);

        ctl.resume().await.unwrap();
        ctl.abort().await.unwrap();
        let summary = ctl.wait().await.unwrap();
        assert_eq!(summary.outcome, RunOutcome::Aborted);
    }
}

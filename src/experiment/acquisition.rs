//! Averaging and temperature wait primitives.
//!
//! These are the only places where an acquisition run suspends. Both poll at a
//! fixed interval and return early, without error, once their cancellation
//! signal is set.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace};

use super::events::{EventSink, RunEvent, TemperatureReadback};
use crate::error::AcqResult;
use crate::hardware::{CancellationSignal, InstrumentRig};

/// Default interval between trace-count polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Longest single sleep while waiting, so cancellation is noticed promptly.
const CANCEL_CHECK_SLICE: Duration = Duration::from_millis(20);

/// Callback run once per poll of the averaging wait.
#[async_trait]
pub trait PollHook: Send + Sync {
    /// Called after every trace-count read.
    async fn on_poll(&self, count: u64, target: u64);
}

/// Hook that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHook;

#[async_trait]
impl PollHook for NoHook {
    async fn on_poll(&self, _count: u64, _target: u64) {}
}

/// Publishes averaging progress and refreshes the nozzle temperature display.
pub struct StatusMonitor<'a> {
    rig: &'a InstrumentRig,
    events: &'a EventSink,
}

impl<'a> StatusMonitor<'a> {
    /// Monitor reading from `rig` and publishing to `events`.
    pub fn new(rig: &'a InstrumentRig, events: &'a EventSink) -> Self {
        Self { rig, events }
    }

    /// Read the nozzle temperature once and publish it.
    pub async fn refresh_temperature(&self) -> TemperatureReadback {
        let readback = match self.rig.nozzle_temperature().await {
            Ok(celsius) => TemperatureReadback::Known(celsius),
            Err(e) => {
                trace!(error = %e, "Nozzle temperature unavailable");
                TemperatureReadback::Unknown
            }
        };
        self.events.emit(RunEvent::Temperature(readback));
        readback
    }
}

#[async_trait]
impl PollHook for StatusMonitor<'_> {
    async fn on_poll(&self, count: u64, target: u64) {
        self.events.emit(RunEvent::Progress { count, target });
        self.refresh_temperature().await;
    }
}

/// Sleep for `duration`, waking early if `cancel` is set.
///
/// Returns `false` if the sleep was cut short.
pub async fn cancellable_sleep(duration: Duration, cancel: &CancellationSignal) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if cancel.is_set() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        sleep((deadline - now).min(CANCEL_CHECK_SLICE)).await;
    }
}

/// Block until the scope has accumulated more than `target` traces.
///
/// Returns `Ok(true)` once the count exceeds `target`, `Ok(false)` as soon as
/// `cancel` is set. Instrument errors are returned as-is; there are no retries.
pub async fn await_threshold(
    rig: &InstrumentRig,
    target: u64,
    cancel: &CancellationSignal,
    poll_interval: Duration,
    hook: &dyn PollHook,
) -> AcqResult<bool> {
    loop {
        if cancel.is_set() {
            debug!(target, "Averaging wait cancelled");
            return Ok(false);
        }
        let count = rig.trace_count().await?;
        hook.on_poll(count, target).await;
        if count > target {
            debug!(count, target, "Averaging threshold reached");
            return Ok(true);
        }
        if !cancellable_sleep(poll_interval, cancel).await {
            debug!(count, target, "Averaging wait cancelled");
            return Ok(false);
        }
    }
}

/// Block until the nozzle temperature is within `tolerance` of `target`.
///
/// Returns `Ok(false)` if `cancel` is set first.
pub async fn wait_for_temperature(
    rig: &InstrumentRig,
    target: f64,
    tolerance: f64,
    cancel: &CancellationSignal,
    poll_interval: Duration,
    events: &EventSink,
) -> AcqResult<bool> {
    debug!(target, tolerance, "Waiting for nozzle temperature");
    loop {
        if cancel.is_set() {
            return Ok(false);
        }
        let celsius = rig.nozzle_temperature().await?;
        events.emit(RunEvent::Temperature(TemperatureReadback::Known(celsius)));
        if (celsius - target).abs() <= tolerance {
            debug!(celsius, target, "Nozzle temperature in band");
            return Ok(true);
        }
        if !cancellable_sleep(poll_interval, cancel).await {
            return Ok(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{MockAwg, MockScope, MockTemperatureController};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn rig(scope: MockScope, temp: MockTemperatureController) -> InstrumentRig {
        InstrumentRig::new(scope, MockAwg::new("chirp_2to8_1us"), temp)
    }

    #[derive(Default)]
    struct CountingHook(AtomicUsize);

    #[async_trait]
    impl PollHook for CountingHook {
        async fn on_poll(&self, _count: u64, _target: u64) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn reaches_threshold_when_count_exceeds_target() {
        let scope = MockScope::new().with_traces_per_poll(100);
        let rig = rig(scope, MockTemperatureController::new(20.0));
        rig.scope_run().await.unwrap();

        let hook = CountingHook::default();
        let cancel = CancellationSignal::new();
        let reached = await_threshold(&rig, 300, &cancel, Duration::from_millis(1), &hook)
            .await
            .unwrap();

        assert!(reached);
        // 100, 200, 300 do not exceed the target; 400 does.
        assert_eq!(hook.0.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn cancellation_returns_false_promptly() {
        let scope = MockScope::new().with_traces_per_poll(0);
        let rig = rig(scope, MockTemperatureController::new(20.0));
        rig.scope_run().await.unwrap();

        let cancel = CancellationSignal::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            trigger.set("test abort");
        });

        let started = Instant::now();
        let reached = await_threshold(&rig, 10, &cancel, Duration::from_secs(30), &NoHook)
            .await
            .unwrap();
        assert!(!reached);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn read_errors_are_not_retried() {
        let scope = MockScope::new();
        scope.fail_reads(true).await;
        let rig = rig(scope, MockTemperatureController::new(20.0));
        let cancel = CancellationSignal::new();
        let result = await_threshold(&rig, 10, &cancel, Duration::from_millis(1), &NoHook).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn status_monitor_publishes_progress_and_temperature() {
        let rig = rig(MockScope::new(), MockTemperatureController::new(25.0));
        let events = EventSink::default();
        let mut rx = events.subscribe();
        let monitor = StatusMonitor::new(&rig, &events);

        monitor.on_poll(10, 100).await;
        assert!(matches!(
            rx.try_recv().unwrap(),
            RunEvent::Progress { count: 10, target: 100 }
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            RunEvent::Temperature(TemperatureReadback::Known(t)) if t == 25.0
        ));
    }

    #[tokio::test]
    async fn status_monitor_degrades_to_unknown() {
        let rig = rig(MockScope::new(), MockTemperatureController::unreachable());
        let events = EventSink::default();
        let monitor = StatusMonitor::new(&rig, &events);
        assert_eq!(monitor.refresh_temperature().await, TemperatureReadback::Unknown);
    }

    #[tokio::test]
    async fn temperature_wait_returns_once_in_band() {
        let temp = MockTemperatureController::new(20.0).with_step(10.0);
        let rig = rig(MockScope::new(), temp);
        rig.set_setpoint(50.0).await.unwrap();

        let cancel = CancellationSignal::new();
        let events = EventSink::default();
        let ok = wait_for_temperature(&rig, 50.0, 3.0, &cancel, Duration::from_millis(1), &events)
            .await
            .unwrap();
        assert!(ok);
        assert!((rig.nozzle_temperature().await.unwrap() - 50.0).abs() <= 3.0);
    }

    #[tokio::test]
    async fn temperature_wait_honours_cancellation() {
        let temp = MockTemperatureController::new(20.0).with_step(0.0);
        let rig = rig(MockScope::new(), temp);
        rig.set_setpoint(80.0).await.unwrap();

        let cancel = CancellationSignal::new();
        cancel.set("abort");
        let events = EventSink::default();
        let ok = wait_for_temperature(&rig, 80.0, 3.0, &cancel, Duration::from_millis(1), &events)
            .await
            .unwrap();
        assert!(!ok);
    }
}

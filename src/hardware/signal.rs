//! Cooperative cancellation flags.
//!
//! Every instrument endpoint owns a [`CancellationSignal`], and so does the
//! acquisition controller itself. A signal is a lock-free flag that any thread can
//! set; long-running loops poll it at their suspension points and exit on their
//! own. Nothing is ever killed from the outside.
//!
//! Ordering rule: when stopping an instrument, set its signal *first*, then call
//! `stop()`. A background poll that observes the stop but not the flag could
//! otherwise restart the instrument.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::warn;

/// A shared, clonable cancellation flag.
///
/// Clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancellationSignal {
    flag: Arc<AtomicBool>,
    reason: Arc<RwLock<Option<String>>>,
}

impl CancellationSignal {
    /// Create a new, unset signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the signal, recording why.
    pub fn set(&self, reason: impl Into<String>) {
        self.flag.store(true, Ordering::SeqCst);
        if let Ok(mut r) = self.reason.write() {
            *r = Some(reason.into());
        }
    }

    /// Check whether the signal has been set.
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// The reason given to the most recent [`set`](Self::set), if still set.
    pub fn reason(&self) -> Option<String> {
        self.reason.read().ok().and_then(|r| r.clone())
    }

    /// Clear the signal so the owner can run again.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
        if let Ok(mut r) = self.reason.write() {
            *r = None;
        }
    }

    /// Create a guard that sets this signal when dropped, unless dismissed.
    ///
    /// The acquisition worker holds one of these so that a panic inside a mode
    /// loop still leaves the controller flagged as cancelled.
    pub fn guard(&self, context: impl Into<String>) -> SignalGuard {
        SignalGuard {
            signal: Some(self.clone()),
            context: context.into(),
        }
    }
}

/// RAII guard returned by [`CancellationSignal::guard`].
pub struct SignalGuard {
    signal: Option<CancellationSignal>,
    context: String,
}

impl SignalGuard {
    /// Disarm the guard without touching the signal.
    pub fn dismiss(mut self) {
        self.signal = None;
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        if let Some(signal) = self.signal.take() {
            if std::thread::panicking() {
                warn!(context = %self.context, "Guard dropped during panic, setting cancellation");
            }
            signal.set(format!("guard dropped in {}", self.context));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let signal = CancellationSignal::new();
        let other = signal.clone();
        assert!(!other.is_set());

        signal.set("operator abort");
        assert!(other.is_set());
        assert_eq!(other.reason().as_deref(), Some("operator abort"));

        other.reset();
        assert!(!signal.is_set());
        assert!(signal.reason().is_none());
    }

    #[test]
    fn guard_sets_signal_on_drop() {
        let signal = CancellationSignal::new();
        {
            let _guard = signal.guard("worker");
        }
        assert!(signal.is_set());
        assert!(signal.reason().unwrap_or_default().contains("worker"));
    }

    #[test]
    fn dismissed_guard_leaves_signal_alone() {
        let signal = CancellationSignal::new();
        signal.guard("worker").dismiss();
        assert!(!signal.is_set());
    }

    #[test]
    fn guard_fires_when_thread_panics() {
        let signal = CancellationSignal::new();
        let inner = signal.clone();
        let result = std::thread::spawn(move || {
            let _guard = inner.guard("panicking worker");
            panic!("mode loop exploded");
        })
        .join();
        assert!(result.is_err());
        assert!(signal.is_set());
    }
}

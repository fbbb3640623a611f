//! Operator prompts.
//!
//! The consistency checker asks the operator to resolve some mismatches. The UI
//! that renders the question is not part of this crate; it plugs in through
//! [`OperatorPrompt`]. Calls block the caller until the operator answers.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Answer to a yes/no/cancel question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Apply the proposed correction.
    Confirm,
    /// Keep things as they are and carry on.
    Deny,
    /// Abandon the run start.
    Cancel,
}

/// Blocking operator dialog.
#[async_trait]
pub trait OperatorPrompt: Send + Sync {
    /// Ask a yes/no/cancel question.
    async fn confirm(&self, question: &str) -> Decision;

    /// Ask for a number, offering `suggested`. `None` means the operator cancelled.
    async fn request_number(&self, question: &str, suggested: f64) -> Option<f64>;
}

/// Prompt that accepts every proposal. Used for unattended runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoConfirm;

#[async_trait]
impl OperatorPrompt for AutoConfirm {
    async fn confirm(&self, _question: &str) -> Decision {
        Decision::Confirm
    }

    async fn request_number(&self, _question: &str, suggested: f64) -> Option<f64> {
        Some(suggested)
    }
}

/// Prompt replaying pre-recorded answers, recording every question asked.
///
/// When the script runs dry, `confirm` answers `Deny` and `request_number`
/// answers `None`.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    decisions: Mutex<VecDeque<Decision>>,
    numbers: Mutex<VecDeque<Option<f64>>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    /// Empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue answers for `confirm`.
    pub fn with_decisions(self, decisions: impl IntoIterator<Item = Decision>) -> Self {
        if let Ok(mut queue) = self.decisions.lock() {
            queue.extend(decisions);
        }
        self
    }

    /// Queue answers for `request_number`.
    pub fn with_numbers(self, numbers: impl IntoIterator<Item = Option<f64>>) -> Self {
        if let Ok(mut queue) = self.numbers.lock() {
            queue.extend(numbers);
        }
        self
    }

    /// Every question asked so far.
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().map(|a| a.clone()).unwrap_or_default()
    }

    fn record(&self, question: &str) {
        if let Ok(mut asked) = self.asked.lock() {
            asked.push(question.to_string());
        }
    }
}

#[async_trait]
impl OperatorPrompt for ScriptedPrompt {
    async fn confirm(&self, question: &str) -> Decision {
        self.record(question);
        self.decisions
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or(Decision::Deny)
    }

    async fn request_number(&self, question: &str, _suggested: f64) -> Option<f64> {
        self.record(question);
        self.numbers
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .flatten()
    }
}

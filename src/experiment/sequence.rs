//! Sequence queue for temperature ramps and chirp sequences.
//!
//! The queue holds the full list of step values plus three slots (`previous`,
//! `current`, `next`). The worker advances it after every completed accumulation;
//! the operator may ask to repeat the current step or skip the next one.
//!
//! A repeated step is the same step with a higher `repeat` count, shown as
//! `"40 (2)"`. Repeating never moves `previous`.
//!
//! ```text
//! steps    = [40, 50, 60]
//! start    : prev -        cur 40       next 50
//! repeat() : prev -        cur 40       next 40 (2)
//! advance(): prev -        cur 40 (2)   next 50
//! skip()   : prev -        cur 40 (2)   next 60
//! advance(): prev 40 (2)   cur 60       next Complete
//! advance(): prev 60       cur Complete next Complete
//! ```

use serde::Serialize;
use thiserror::Error;

/// Rejected queue operation. The queue is left unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SequenceError {
    #[error("sequence has no steps")]
    Empty,
    #[error("sequence steps must be finite")]
    NonFinite,
    #[error("sequence steps must be strictly ascending")]
    NotAscending,
    #[error("no step in progress to repeat")]
    NothingToRepeat,
    #[error("cannot skip past the last step")]
    SkipPastEnd,
    #[error("sequence is already complete")]
    SequenceComplete,
}

/// One scheduled pass over a sequence value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Step {
    /// Position in the full step list.
    pub index: usize,
    /// Step value (°C or µs).
    pub value: f64,
    /// 1 for the first pass, 2 for the first repeat, ...
    pub repeat: u32,
}

impl Step {
    fn first(index: usize, value: f64) -> Self {
        Self {
            index,
            value,
            repeat: 1,
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.repeat > 1 {
            write!(f, "{} ({})", self.value, self.repeat)
        } else {
            write!(f, "{}", self.value)
        }
    }
}

/// Contents of one queue slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum QueueSlot {
    /// Nothing yet (only `previous`, before the first advance).
    Empty,
    /// A scheduled step.
    Step(Step),
    /// Past the end of the sequence.
    Complete,
}

impl QueueSlot {
    /// The step in this slot, if any.
    pub fn step(&self) -> Option<Step> {
        match self {
            QueueSlot::Step(step) => Some(*step),
            _ => None,
        }
    }
}

impl std::fmt::Display for QueueSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueSlot::Empty => write!(f, "-"),
            QueueSlot::Step(step) => write!(f, "{step}"),
            QueueSlot::Complete => write!(f, "Complete"),
        }
    }
}

/// Operator request against a running sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QueueCommand {
    /// Run the current step once more.
    Repeat,
    /// Drop the next step without running it.
    Skip,
}

/// Previous / current / next pointers over a fixed step list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequenceQueue {
    steps: Vec<f64>,
    previous: QueueSlot,
    current: QueueSlot,
    next: QueueSlot,
}

impl SequenceQueue {
    /// Start a queue at the first of `steps`.
    pub fn new(steps: Vec<f64>) -> Result<Self, SequenceError> {
        let first = *steps.first().ok_or(SequenceError::Empty)?;
        if steps.iter().any(|v| !v.is_finite()) {
            return Err(SequenceError::NonFinite);
        }
        let mut queue = Self {
            steps,
            previous: QueueSlot::Empty,
            current: QueueSlot::Step(Step::first(0, first)),
            next: QueueSlot::Complete,
        };
        queue.next = queue.following(0);
        Ok(queue)
    }

    /// Like [`new`](Self::new), additionally requiring strictly ascending steps.
    pub fn ascending(steps: Vec<f64>) -> Result<Self, SequenceError> {
        if steps.windows(2).any(|w| w[1] <= w[0]) {
            return Err(SequenceError::NotAscending);
        }
        Self::new(steps)
    }

    /// The full step list.
    pub fn steps(&self) -> &[f64] {
        &self.steps
    }

    /// Step that completed before the current one.
    pub fn previous(&self) -> QueueSlot {
        self.previous
    }

    /// Step in progress (or just completed).
    pub fn current(&self) -> QueueSlot {
        self.current
    }

    /// Step that will run after the current one.
    pub fn next(&self) -> QueueSlot {
        self.next
    }

    /// Whether the sequence has run out of steps.
    pub fn is_complete(&self) -> bool {
        self.current == QueueSlot::Complete
    }

    fn following(&self, index: usize) -> QueueSlot {
        match self.steps.get(index + 1) {
            Some(&value) => QueueSlot::Step(Step::first(index + 1, value)),
            None => QueueSlot::Complete,
        }
    }

    /// Move to the next step and return the new `current`.
    ///
    /// Advancing onto a repeat of the current step keeps `previous` as it was.
    pub fn advance(&mut self) -> Result<QueueSlot, SequenceError> {
        let current = match self.current {
            QueueSlot::Complete => return Err(SequenceError::SequenceComplete),
            slot => slot,
        };

        match self.next {
            QueueSlot::Step(next) => {
                let same_step = current.step().map(|c| c.index) == Some(next.index);
                if !same_step {
                    self.previous = current;
                }
                self.current = QueueSlot::Step(next);
                self.next = self.following(next.index);
            }
            QueueSlot::Complete | QueueSlot::Empty => {
                self.previous = current;
                self.current = QueueSlot::Complete;
                self.next = QueueSlot::Complete;
            }
        }
        Ok(self.current)
    }

    /// Schedule the current step to run once more after it finishes.
    pub fn repeat(&mut self) -> Result<(), SequenceError> {
        let current = self.current.step().ok_or(SequenceError::NothingToRepeat)?;
        self.next = QueueSlot::Step(Step {
            repeat: current.repeat + 1,
            ..current
        });
        Ok(())
    }

    /// Replace `next` with the step after it. `current` is untouched.
    pub fn skip(&mut self) -> Result<(), SequenceError> {
        let next = self.next.step().ok_or(SequenceError::SkipPastEnd)?;
        match self.following(next.index) {
            QueueSlot::Step(after) => {
                self.next = QueueSlot::Step(after);
                Ok(())
            }
            _ => Err(SequenceError::SkipPastEnd),
        }
    }

    /// Apply an operator command.
    pub fn apply(&mut self, command: QueueCommand) -> Result<(), SequenceError> {
        match command {
            QueueCommand::Repeat => self.repeat(),
            QueueCommand::Skip => self.skip(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(queue: &SequenceQueue) -> (String, String, String) {
        (
            queue.previous().to_string(),
            queue.current().to_string(),
            queue.next().to_string(),
        )
    }

    #[test]
    fn advance_visits_every_step_then_completes() {
        let steps = vec![30.0, 40.0, 55.0, 70.0];
        let mut queue = SequenceQueue::ascending(steps.clone()).unwrap();

        let mut visited = vec![queue.current().step().unwrap().value];
        loop {
            match queue.advance().unwrap() {
                QueueSlot::Step(step) => visited.push(step.value),
                QueueSlot::Complete => break,
                QueueSlot::Empty => panic!("current became empty"),
            }
        }
        assert_eq!(visited, steps);
        assert!(queue.is_complete());
        assert_eq!(queue.previous().step().unwrap().value, 70.0);
        assert_eq!(queue.advance(), Err(SequenceError::SequenceComplete));
    }

    #[test]
    fn single_step_sequence_completes_after_one_advance() {
        let mut queue = SequenceQueue::new(vec![25.0]).unwrap();
        assert_eq!(queue.next(), QueueSlot::Complete);
        assert_eq!(queue.advance().unwrap(), QueueSlot::Complete);
    }

    #[test]
    fn repeat_then_advance_keeps_previous() {
        let mut queue = SequenceQueue::new(vec![40.0, 50.0, 60.0]).unwrap();
        queue.advance().unwrap();
        let before = queue.previous();
        assert_eq!(before.to_string(), "40");

        queue.repeat().unwrap();
        assert_eq!(queue.next().to_string(), "50 (2)");

        queue.advance().unwrap();
        assert_eq!(queue.previous(), before);
        let current = queue.current().step().unwrap();
        assert_eq!(current.value, 50.0);
        assert_eq!(current.repeat, 2);
        assert_eq!(queue.next().to_string(), "60");
    }

    #[test]
    fn repeated_repeats_count_up() {
        let mut queue = SequenceQueue::new(vec![1.0, 2.0]).unwrap();
        queue.repeat().unwrap();
        queue.advance().unwrap();
        queue.repeat().unwrap();
        assert_eq!(queue.next().to_string(), "1 (3)");
        queue.advance().unwrap();
        assert_eq!(values(&queue), ("-".into(), "1 (3)".into(), "2".into()));
    }

    #[test]
    fn skip_moves_next_one_further() {
        let mut queue = SequenceQueue::new(vec![40.0, 50.0, 60.0]).unwrap();
        queue.skip().unwrap();
        assert_eq!(values(&queue), ("-".into(), "40".into(), "60".into()));

        queue.advance().unwrap();
        assert_eq!(values(&queue), ("40".into(), "60".into(), "Complete".into()));
    }

    #[test]
    fn skip_past_last_step_is_rejected_without_change() {
        let mut queue = SequenceQueue::new(vec![40.0, 50.0]).unwrap();
        let snapshot = queue.clone();
        assert_eq!(queue.skip(), Err(SequenceError::SkipPastEnd));
        assert_eq!(queue, snapshot);

        queue.advance().unwrap();
        assert_eq!(queue.skip(), Err(SequenceError::SkipPastEnd));
    }

    #[test]
    fn skip_over_a_pending_repeat() {
        let mut queue = SequenceQueue::new(vec![40.0, 50.0, 60.0]).unwrap();
        queue.repeat().unwrap();
        queue.skip().unwrap();
        assert_eq!(queue.next().to_string(), "50");
    }

    #[test]
    fn repeat_after_completion_is_rejected() {
        let mut queue = SequenceQueue::new(vec![40.0]).unwrap();
        queue.advance().unwrap();
        assert_eq!(queue.repeat(), Err(SequenceError::NothingToRepeat));
        assert_eq!(
            queue.apply(QueueCommand::Skip),
            Err(SequenceError::SkipPastEnd)
        );
    }

    #[test]
    fn constructor_validation() {
        assert_eq!(SequenceQueue::new(vec![]), Err(SequenceError::Empty));
        assert_eq!(
            SequenceQueue::ascending(vec![50.0, 40.0]),
            Err(SequenceError::NotAscending)
        );
        assert!(SequenceQueue::new(vec![4.0, 2.0, 1.0]).is_ok());
    }

    #[test]
    fn nan_steps_are_rejected() {
        assert_eq!(
            SequenceQueue::ascending(vec![40.0, f64::NAN, 60.0]),
            Err(SequenceError::NonFinite)
        );
        assert_eq!(
            SequenceQueue::new(vec![f64::INFINITY]),
            Err(SequenceError::NonFinite)
        );
    }
}

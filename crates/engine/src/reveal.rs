//! Paced reveal of a reply, one paragraph at a time.
//!
//! The engine only describes the sequence. The renderer walks the steps,
//! sleeping `delay_before` ahead of each, and stops early once the plan is
//! cancelled (e.g. the user opened another character).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Units of one assistant message and the pause between them.
#[derive(Debug, Clone)]
pub struct RevealPlan {
    pub character_id: String,
    /// History index shared by every unit
    pub message_index: usize,
    pub units: Vec<String>,
    pub pace: Duration,
    cancelled: Arc<AtomicBool>,
}

/// A single unit to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealStep {
    /// Position within the plan
    pub index: usize,
    pub unit: String,
    pub delay_before: Duration,
}

/// Handle for stopping a reveal from elsewhere.
#[derive(Debug, Clone)]
pub struct RevealCancel(Arc<AtomicBool>);

impl RevealCancel {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl RevealPlan {
    pub fn new(character_id: impl Into<String>, message_index: usize, units: Vec<String>, pace: Duration) -> Self {
        Self {
            character_id: character_id.into(),
            message_index,
            units,
            pace,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel_handle(&self) -> RevealCancel {
        RevealCancel(Arc::clone(&self.cancelled))
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Ordered steps. The first unit shows immediately.
    pub fn steps(&self) -> RevealSequence<'_> {
        RevealSequence { plan: self, next: 0 }
    }

    /// Walk the steps with real pauses, handing each unit to `show`.
    ///
    /// Returns how many units were shown before completion or cancellation.
    pub async fn play<F>(&self, mut show: F) -> usize
    where
        F: FnMut(&RevealStep),
    {
        let mut shown = 0;
        for step in self.steps() {
            if !step.delay_before.is_zero() {
                tokio::time::sleep(step.delay_before).await;
            }
            if self.is_cancelled() {
                break;
            }
            show(&step);
            shown += 1;
        }
        shown
    }
}

/// Iterator over a plan's steps; ends early once cancelled.
pub struct RevealSequence<'a> {
    plan: &'a RevealPlan,
    next: usize,
}

impl Iterator for RevealSequence<'_> {
    type Item = RevealStep;

    fn next(&mut self) -> Option<RevealStep> {
        if self.plan.is_cancelled() {
            return None;
        }
        let unit = self.plan.units.get(self.next)?.clone();
        let step = RevealStep {
            index: self.next,
            unit,
            delay_before: if self.next == 0 {
                Duration::ZERO
            } else {
                self.plan.pace
            },
        };
        self.next += 1;
        Some(step)
    }
}

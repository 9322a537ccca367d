//! Cosmetic progress simulation shown while a generation request is pending.
//!
//! The indicator advances on its own timer and knows nothing about the real
//! request. It is owned by the in-flight generation and is aborted as soon as
//! the response arrives or the session is reset.

use std::time::Duration;

use tokio::{sync::watch, task::JoinHandle, time};

pub const DEFAULT_STEP_PERCENT: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    Detection,
    Processing,
    Synthesis,
    Finalization,
}

impl ProgressPhase {
    pub fn for_percent(percent: u8) -> Self {
        match percent {
            0..=24 => Self::Detection,
            25..=49 => Self::Processing,
            50..=74 => Self::Synthesis,
            _ => Self::Finalization,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Detection => "detecting facial features",
            Self::Processing => "processing face",
            Self::Synthesis => "synthesizing style",
            Self::Finalization => "finalizing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub phase: ProgressPhase,
    pub percent: u8,
}

impl ProgressUpdate {
    pub fn at(percent: u8) -> Self {
        let percent = percent.min(100);
        Self {
            phase: ProgressPhase::for_percent(percent),
            percent,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.percent >= 100
    }
}

pub struct ProgressIndicator {
    task: JoinHandle<()>,
    updates: watch::Receiver<ProgressUpdate>,
}

impl ProgressIndicator {
    pub fn start(tick: Duration, step: u8) -> Self {
        let (tx, updates) = watch::channel(ProgressUpdate::at(0));
        let step = step.max(1);
        let task = tokio::spawn(async move {
            let mut interval = time::interval_at(time::Instant::now() + tick, tick);
            let mut percent = 0u8;
            while percent < 100 {
                interval.tick().await;
                percent = percent.saturating_add(step).min(100);
                if tx.send(ProgressUpdate::at(percent)).is_err() {
                    break;
                }
            }
        });
        Self { task, updates }
    }

    pub fn current(&self) -> ProgressUpdate {
        *self.updates.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressUpdate> {
        self.updates.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn cancel(&self) {
        self.task.abort();
    }
}

impl Drop for ProgressIndicator {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
#[path = "tests/progress_tests.rs"]
mod tests;

//! Progress reporting for long-running iterations.

use tracing::info;

/// Receives `(completed, total)` after every step of an iterator or sampler.
pub trait ProgressReporter {
    fn report(&mut self, completed: usize, total: usize);
}

/// Discards progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&mut self, _completed: usize, _total: usize) {}
}

/// Logs at `info` each time another `step_percent` of the work is done.
#[derive(Debug, Clone)]
pub struct TracingProgress {
    label: String,
    step_percent: usize,
    next_percent: usize,
}

impl TracingProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self::with_step(label, 10)
    }

    pub fn with_step(label: impl Into<String>, step_percent: usize) -> Self {
        let step_percent = step_percent.clamp(1, 100);
        Self {
            label: label.into(),
            step_percent,
            next_percent: step_percent,
        }
    }
}

impl ProgressReporter for TracingProgress {
    fn report(&mut self, completed: usize, total: usize) {
        if total == 0 {
            return;
        }
        let percent = completed * 100 / total;
        if percent >= self.next_percent || completed == total {
            info!(label = %self.label, completed, total, "{percent}% complete");
            self.next_percent = (percent / self.step_percent + 1) * self.step_percent;
        }
    }
}

impl<F: FnMut(usize, usize)> ProgressReporter for F {
    fn report(&mut self, completed: usize, total: usize) {
        self(completed, total)
    }
}

// Submission Throttling
// Decides when the scheduler pauses between workflow submissions

use std::time::Duration;

/// How successive submissions are paced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleMode {
    /// Wait after every submission
    Simple,
    /// Wait between distinct parameter sets, and after `batch_limit`
    /// consecutive iterations of the same set
    BatchLimited { batch_limit: u32 },
}

/// Pacing mode plus wait length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlePolicy {
    pub mode: ThrottleMode,
    pub wait: Duration,
}

impl ThrottlePolicy {
    pub fn new(mode: ThrottleMode, wait: Duration) -> Self {
        Self { mode, wait }
    }

    pub fn simple(wait: Duration) -> Self {
        Self::new(ThrottleMode::Simple, wait)
    }

    pub fn batch_limited(batch_limit: u32, wait: Duration) -> Self {
        Self::new(
            ThrottleMode::BatchLimited {
                batch_limit: batch_limit.max(1),
            },
            wait,
        )
    }

    /// Production wait lengths: 7 hours simple, 5 hours batch-limited
    pub fn default_wait_hours(mode: ThrottleMode) -> f64 {
        match mode {
            ThrottleMode::Simple => 7.0,
            ThrottleMode::BatchLimited { .. } => 5.0,
        }
    }
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        let mode = ThrottleMode::Simple;
        Self::new(
            mode,
            Duration::from_secs((Self::default_wait_hours(mode) * 3600.0) as u64),
        )
    }
}

/// Consecutive-submission counter driving wait decisions
#[derive(Debug, Clone, Default)]
pub struct PacingState {
    consecutive: u32,
}

impl PacingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submissions since the last wait or set change
    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    /// Reset the counter when the scheduler moves to a new parameter set
    pub fn start_set(&mut self) {
        self.consecutive = 0;
    }

    /// Record a successful submission and decide whether to wait after it.
    ///
    /// `remaining_sets` counts the current set plus everything still queued.
    /// Nothing waits after the final submission of the run.
    pub fn record_submission(
        &mut self,
        policy: &ThrottlePolicy,
        remaining_sets: usize,
        final_submission: bool,
    ) -> bool {
        self.consecutive += 1;
        if final_submission {
            return false;
        }

        let wait = match policy.mode {
            ThrottleMode::Simple => true,
            ThrottleMode::BatchLimited { batch_limit } => {
                remaining_sets > 1 || self.consecutive >= batch_limit
            }
        };
        if wait {
            self.consecutive = 0;
        }
        wait
    }
}

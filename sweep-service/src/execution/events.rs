// Sweep Events
// Progress reporting and event types for a running sweep

use crate::execution::scheduler::SchedulerState;
use crate::runners::WorkflowHandle;

use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

/// Sender for sweep progress events
pub type ProgressSender = mpsc::UnboundedSender<SweepEvent>;

/// Receiver for sweep progress events
pub type ProgressReceiver = mpsc::UnboundedReceiver<SweepEvent>;

/// Create a new progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Events emitted while the scheduler works through its queue
#[derive(Debug, Clone)]
pub enum SweepEvent {
    /// Queue processing started
    SweepStarted {
        total_sets: usize,
        total_submissions: usize,
    },

    /// Scheduler moved to a new state
    StateChanged { state: SchedulerState },

    /// Input files for one iteration are in place
    InputsPrepared {
        sequence_number: usize,
        iteration: u32,
        dir: PathBuf,
    },

    /// Job graph built and validated
    GraphBuilt {
        workflow: String,
        jobs: usize,
        merges: usize,
    },

    /// Backend accepted the workflow
    Submitted {
        sequence_number: usize,
        iteration: u32,
        handle: WorkflowHandle,
    },

    /// Remaining iterations of a set were skipped
    SetSkipped {
        sequence_number: usize,
        iteration: u32,
        reason: String,
    },

    /// Submission failed
    SubmissionFailed {
        sequence_number: usize,
        iteration: u32,
        workflow: String,
        message: String,
    },

    /// Pacing wait started
    WaitStarted { total: Duration },

    /// One-second countdown tick
    Countdown { remaining: Duration },

    /// Pacing wait elapsed
    WaitFinished,

    /// Run stopped by a shutdown request
    Cancelled,

    /// Queue processing finished
    SweepCompleted {
        submitted: usize,
        skipped: usize,
        failed: usize,
        duration: Duration,
    },
}

impl SweepEvent {
    /// Create a state change event
    pub fn state(state: SchedulerState) -> Self {
        Self::StateChanged { state }
    }

    /// Create a countdown tick event
    pub fn countdown(remaining_secs: u64) -> Self {
        Self::Countdown {
            remaining: Duration::from_secs(remaining_secs),
        }
    }

    /// Create a skipped set event
    pub fn skipped(sequence_number: usize, iteration: u32, reason: impl Into<String>) -> Self {
        Self::SetSkipped {
            sequence_number,
            iteration,
            reason: reason.into(),
        }
    }
}

/// Helper trait for sending events, ignoring errors (fire-and-forget)
pub trait EventSender {
    fn send_event(&self, event: SweepEvent);
}

impl EventSender for ProgressSender {
    fn send_event(&self, event: SweepEvent) {
        let _ = self.send(event);
    }
}

impl EventSender for Option<ProgressSender> {
    fn send_event(&self, event: SweepEvent) {
        if let Some(sender) = self {
            let _ = sender.send(event);
        }
    }
}

// Execution Module
// Queue scheduling, submission pacing and progress reporting

pub mod clock;
pub mod events;
pub mod scheduler;
pub mod throttle;

// Re-export key types
pub use clock::{format_countdown, shutdown_channel, ShutdownSignal, ShutdownTrigger, Sleeper, TokioSleeper};
pub use events::{progress_channel, EventSender, ProgressReceiver, ProgressSender, SweepEvent};
pub use scheduler::{
    FailedSubmission, FailurePolicy, SchedulerConfig, SchedulerState, SkippedSet,
    SubmissionRecord, SubmissionScheduler, SweepReport,
};
pub use throttle::{PacingState, ThrottleMode, ThrottlePolicy};

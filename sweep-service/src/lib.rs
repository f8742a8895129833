// Sweep Service Library
// Workflow graph construction and submission pacing for GGAC simulation sweeps

pub mod config;
pub mod error;
pub mod execution;
pub mod params;
pub mod runners;
pub mod utils;
pub mod workflow;

// Re-export commonly used types
pub use error::{ServiceError, ServiceResult};

// Re-export configuration types
pub use config::{BackendSettings, SweepSettings};

// Re-export parameter types
pub use params::{
    job_count, ConfigParseError, ConfigParseErrorKind, DecayMode, ParameterExpander, ParameterSet,
};

// Re-export workflow types
pub use workflow::{
    FileRef, GraphBuilder, GraphError, InputCatalog, JobGraph, MergeAccumulator, MergeJob,
    ProcessingJob, SimulationJob, Variant,
};

// Re-export execution types
pub use execution::{
    FailurePolicy, ProgressSender, SchedulerConfig, SchedulerState, ShutdownSignal,
    ShutdownTrigger, SubmissionScheduler, SweepEvent, SweepReport, ThrottleMode, ThrottlePolicy,
};

// Re-export runner types
pub use runners::{
    prepare_row, FilePreparer, InputPreparer, PegasusBackend, PreparationRequest,
    SubmissionError, SubmitOptions, WorkflowBackend, WorkflowHandle,
};

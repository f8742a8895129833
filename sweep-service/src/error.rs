// Service Error Types
// Error taxonomy shared by expansion, graph building and submission

use crate::params::ConfigParseError;
use crate::runners::SubmissionError;
use crate::workflow::GraphError;

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while expanding, building or submitting a sweep
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    ConfigParse(#[from] ConfigParseError),

    #[error("Unknown decay mode: {0} (expected beta_minus or beta_plus)")]
    UnknownDecayMode(String),

    #[error(
        "Workflow '{workflow}' has no jobs: {total_events} events at {batch_events} per simulation rounds to zero"
    )]
    EmptyWorkflow {
        workflow: String,
        total_events: u64,
        batch_events: u64,
    },

    #[error("Missing input '{file}' in {} for workflow '{workflow}'", dir.display())]
    MissingInput {
        workflow: String,
        file: String,
        dir: PathBuf,
    },

    #[error("Submission failed: {0}")]
    Submission(#[from] SubmissionError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Settings file error: {0}")]
    SettingsFormat(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    /// Whether the error only invalidates the current parameter set.
    ///
    /// Empty workflows and missing inputs are local to one request, so the
    /// scheduler skips the set and moves on. Everything else is handled by
    /// the configured failure policy or aborts the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ServiceError::EmptyWorkflow { .. } | ServiceError::MissingInput { .. }
        )
    }
}

/// Exit status for any fatal service error.
///
/// Usage errors exit 2 from the argument parser.
pub const EXIT_FAILURE: i32 = 1;

/// Exit status when a run was cancelled by the operator
pub const EXIT_CANCELLED: i32 = 130;

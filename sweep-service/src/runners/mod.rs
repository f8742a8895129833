// Runners Module
// Collaborators the scheduler drives: input file preparation and workflow submission

pub mod files;
pub mod pegasus;

// Re-export key types
pub use files::{FilePreparer, PreparationRequest};
pub use pegasus::PegasusBackend;

use crate::error::ServiceResult;
use crate::params::{ConfigRow, ParameterExpander, ParameterSet};
use crate::workflow::JobGraph;

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors reported while handing a graph to the execution backend
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("Workflow planner not found: {0}")]
    PlannerNotFound(String),

    #[error("Planner exited with {}: {stderr}", code.map(|c| format!("status {}", c)).unwrap_or_else(|| "a signal".to_string()))]
    PlannerFailed { code: Option<i32>, stderr: String },

    #[error("Failed to write workflow description: {0}")]
    Serialization(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Backend rejected workflow '{workflow}': {message}")]
    Rejected { workflow: String, message: String },
}

/// Site selection and submit flag for one submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOptions {
    /// Execution sites
    pub sites: Vec<String>,
    /// Sites that receive staged-out outputs
    pub output_sites: Vec<String>,
    /// Plan and submit (true) or plan only (false)
    pub submit: bool,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            sites: vec!["condorpool".to_string()],
            output_sites: vec!["remote".to_string()],
            submit: true,
        }
    }
}

/// Reference to a planned or running workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowHandle {
    pub workflow: String,
    /// Planner submit directory, usable with the backend's monitoring tools
    pub submit_dir: Option<PathBuf>,
    pub submitted: bool,
}

/// Writes the input files of one parameter set
#[async_trait::async_trait]
pub trait InputPreparer: Send + Sync {
    /// Write every input artifact the graph builder expects into `request.data_dir`.
    ///
    /// Must be idempotent: repeated calls with the same request leave
    /// byte-identical files behind.
    async fn prepare(&self, request: &PreparationRequest) -> ServiceResult<PathBuf>;
}

/// External system that executes job graphs
#[async_trait::async_trait]
pub trait WorkflowBackend: Send + Sync {
    /// Hand a built graph to the backend
    async fn submit(
        &self,
        graph: &JobGraph,
        options: &SubmitOptions,
    ) -> Result<WorkflowHandle, SubmissionError>;
}

/// Expand a single configuration row and write its inputs.
///
/// The row is fully validated before the preparer runs, so a rejected row
/// leaves nothing on disk. `data_dir` overrides the parameter set's default
/// directory under `project_root`.
pub async fn prepare_row(
    preparer: &dyn InputPreparer,
    row: &ConfigRow,
    project_root: &Path,
    data_dir: Option<PathBuf>,
) -> ServiceResult<(ParameterSet, PathBuf)> {
    let params = ParameterExpander::expand_row(0, row)?;
    let data_dir = data_dir.unwrap_or_else(|| params.data_dir(project_root));
    let written = preparer
        .prepare(&PreparationRequest::from_parameters(&params, &data_dir))
        .await?;
    Ok((params, written))
}

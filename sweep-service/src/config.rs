// Sweep Settings
// Optional YAML settings file with defaults matching the production sweep setup

use crate::error::{ServiceError, ServiceResult};
use crate::execution::{FailurePolicy, SchedulerConfig, ThrottleMode, ThrottlePolicy};
use crate::runners::SubmitOptions;
use crate::workflow::DEFAULT_MERGE_LIMIT;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Settings file looked up in the project root when none is given
pub const DEFAULT_SETTINGS_FILE: &str = "sweep.yml";

/// Parameter file read when none is given
pub const DEFAULT_PARAMETER_FILE: &str = "simulation_parameters.cfg";

/// Top-level sweep settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweepSettings {
    /// Project root holding `inputs/` (default: detected from the working directory)
    pub project_root: Option<PathBuf>,

    /// CSV parameter file, relative to the project root
    pub parameter_file: PathBuf,

    /// Maximum histogram/peak-area pairs per merge job
    pub merge_limit: usize,

    pub throttle: ThrottleSettings,

    pub failure_policy: FailurePolicy,

    /// Submit planned workflows (false plans only)
    pub submit: bool,

    pub sites: Vec<String>,

    pub output_sites: Vec<String>,

    pub backend: BackendSettings,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            project_root: None,
            parameter_file: PathBuf::from(DEFAULT_PARAMETER_FILE),
            merge_limit: DEFAULT_MERGE_LIMIT,
            throttle: ThrottleSettings::default(),
            failure_policy: FailurePolicy::default(),
            submit: true,
            sites: vec!["condorpool".to_string()],
            output_sites: vec!["remote".to_string()],
            backend: BackendSettings::default(),
        }
    }
}

/// Pacing mode names as written in the settings file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThrottleModeName {
    #[default]
    Simple,
    BatchLimited,
}

/// Pacing between submissions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThrottleSettings {
    pub mode: ThrottleModeName,

    /// Consecutive submissions of one set allowed before a wait (batch-limited only)
    pub batch_limit: u32,

    /// Wait length in hours (default: 7 simple, 5 batch-limited)
    pub wait_hours: Option<f64>,
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            mode: ThrottleModeName::Simple,
            batch_limit: 2,
            wait_hours: None,
        }
    }
}

impl ThrottleSettings {
    pub fn mode(&self) -> ThrottleMode {
        match self.mode {
            ThrottleModeName::Simple => ThrottleMode::Simple,
            ThrottleModeName::BatchLimited => ThrottleMode::BatchLimited {
                batch_limit: self.batch_limit,
            },
        }
    }

    pub fn policy(&self) -> ThrottlePolicy {
        let mode = self.mode();
        let hours = self
            .wait_hours
            .unwrap_or_else(|| ThrottlePolicy::default_wait_hours(mode));
        ThrottlePolicy::new(mode, Duration::from_secs((hours * 3600.0) as u64))
    }
}

/// Workflow engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendSettings {
    /// Planner executable name or path
    pub planner: String,

    /// Directory for generated catalogs, scratch space and planner runs
    pub work_dir: PathBuf,

    /// `dagman.retry`
    pub retries: u32,

    /// `dagman.stageout.maxjobs`
    pub stageout_max_jobs: u32,

    /// Key used by the submit node to reach the remote storage site
    pub ssh_private_key: Option<PathBuf>,

    pub remote: RemoteStorage,

    pub images: ContainerImages,

    pub resources: CondorResources,
}

impl Default for BackendSettings {
    fn default() -> Self {
        let work_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("projects")
            .join("simulation-145mm-ggac");

        Self {
            planner: "pegasus-plan".to_string(),
            work_dir,
            retries: 3,
            stageout_max_jobs: 10,
            ssh_private_key: None,
            remote: RemoteStorage::default(),
            images: ContainerImages::default(),
            resources: CondorResources::default(),
        }
    }
}

/// Storage server receiving merged archives over scp
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteStorage {
    pub host: String,
    pub user: String,
    /// Base path; each workflow stores under `{base_path}/z{Z}.a{A}/{g1}-{g2}`
    pub base_path: String,
}

impl RemoteStorage {
    pub fn is_configured(&self) -> bool {
        !self.host.trim().is_empty()
            && !self.user.trim().is_empty()
            && !self.base_path.trim().is_empty()
    }
}

/// Container images attached to each job kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContainerImages {
    pub simulation: String,
    pub processing: String,
    pub merge: String,
}

impl Default for ContainerImages {
    fn default() -> Self {
        Self {
            simulation: "/cvmfs/singularity.opensciencegrid.org/cnatzke/griffin_simulation:geant4.10.01"
                .to_string(),
            processing: "osdf:///ospool/ap20/data/cnatzke/containers/processing_stack_v1.0.sif"
                .to_string(),
            merge: "/cvmfs/singularity.opensciencegrid.org/cnatzke/prepare_files:latest"
                .to_string(),
        }
    }
}

/// HTCondor requirements and resource requests for the execution pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CondorResources {
    pub requirements: String,
    pub request_cpus: u32,
    pub request_memory: String,
    pub request_disk: String,
}

impl Default for CondorResources {
    fn default() -> Self {
        Self {
            requirements: "HAS_SINGULARITY == TRUE && OSG_HOST_KERNEL_VERSION >= 31000"
                .to_string(),
            request_cpus: 1,
            request_memory: "4 GB".to_string(),
            request_disk: "2 GB".to_string(),
        }
    }
}

impl SweepSettings {
    /// Parse settings from YAML text and validate them
    pub fn parse(content: &str) -> ServiceResult<Self> {
        let settings: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(content)?
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a YAML file
    pub fn load(path: &Path) -> ServiceResult<Self> {
        debug!(path = %path.display(), "Loading sweep settings");
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Load the explicit settings file, or `sweep.yml` in the project root if present
    pub fn load_or_default(explicit: Option<&Path>, project_root: &Path) -> ServiceResult<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let candidate = project_root.join(DEFAULT_SETTINGS_FILE);
        if candidate.is_file() {
            Self::load(&candidate)
        } else {
            Ok(Self::default())
        }
    }

    /// Check invariants that serde cannot express
    pub fn validate(&self) -> ServiceResult<()> {
        if self.merge_limit == 0 {
            return Err(invalid("merge_limit must be at least 1"));
        }
        if self.throttle.mode == ThrottleModeName::BatchLimited && self.throttle.batch_limit == 0 {
            return Err(invalid("throttle.batch_limit must be at least 1"));
        }
        if let Some(hours) = self.throttle.wait_hours {
            if !hours.is_finite() || hours < 0.0 {
                return Err(invalid(format!(
                    "throttle.wait_hours must be a non-negative number, got {}",
                    hours
                )));
            }
        }
        if self.sites.is_empty() {
            return Err(invalid("at least one execution site is required"));
        }
        if self.output_sites.is_empty() {
            return Err(invalid("at least one output site is required"));
        }
        if self.backend.planner.trim().is_empty() {
            return Err(invalid("backend.planner must not be empty"));
        }
        Ok(())
    }

    /// Extra checks before handing workflows to a real backend
    pub fn validate_for_submission(&self) -> ServiceResult<()> {
        self.validate()?;
        if !self.backend.remote.is_configured() {
            return Err(invalid(
                "backend.remote host, user and base_path are required to stage out results",
            ));
        }
        Ok(())
    }

    /// Project root from the settings, or detected from the working directory
    pub fn resolve_project_root(&self) -> PathBuf {
        crate::utils::resolve_project_root(self.project_root.as_deref())
    }

    /// Parameter file resolved against the project root
    pub fn parameter_path(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.parameter_file)
    }

    pub fn submit_options(&self) -> SubmitOptions {
        SubmitOptions {
            sites: self.sites.clone(),
            output_sites: self.output_sites.clone(),
            submit: self.submit,
        }
    }

    pub fn scheduler_config(&self, project_root: &Path) -> SchedulerConfig {
        SchedulerConfig {
            project_root: project_root.to_path_buf(),
            merge_limit: self.merge_limit,
            throttle: self.throttle.policy(),
            failure_policy: self.failure_policy,
            submit: self.submit_options(),
        }
    }
}

fn invalid(message: impl Into<String>) -> ServiceError {
    ServiceError::InvalidSettings(message.into())
}

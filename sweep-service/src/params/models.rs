// Parameter Set Models
// Fully specified simulation requests and the quantities derived from them

use crate::error::ServiceError;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Beta decay mode of the parent nucleus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecayMode {
    BetaMinus,
    BetaPlus,
}

impl DecayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecayMode::BetaMinus => "beta_minus",
            DecayMode::BetaPlus => "beta_plus",
        }
    }

    /// Proton number of the daughter nucleus
    pub fn daughter(&self, element: i64) -> i64 {
        match self {
            DecayMode::BetaMinus => element + 1,
            DecayMode::BetaPlus => element - 1,
        }
    }

    /// Keyword used for the mode in radioactive decay files
    pub fn decay_file_keyword(&self) -> &'static str {
        match self {
            DecayMode::BetaMinus => "BetaMinus",
            DecayMode::BetaPlus => "BetaPlus",
        }
    }
}

impl FromStr for DecayMode {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "beta_minus" => Ok(DecayMode::BetaMinus),
            "beta_plus" => Ok(DecayMode::BetaPlus),
            other => Err(ServiceError::UnknownDecayMode(other.to_string())),
        }
    }
}

impl fmt::Display for DecayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One fully specified simulation request, derived from one configuration row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    /// Position of the source row (0-based)
    pub sequence_number: usize,
    /// Proton number of the parent, as written in the configuration
    pub element: String,
    /// Mass number, as written in the configuration
    pub isotope: String,
    pub decay_mode: DecayMode,
    /// First gamma energy in the cascade [keV]
    pub gamma1: String,
    /// Second gamma energy in the cascade [keV]
    pub gamma2: String,
    /// HPGe radius [mm]
    pub radius: String,
    pub total_events: u64,
    /// Events per simulation job
    pub batch_events: u64,
    /// Number of sequential submission rounds
    pub iterations: u32,
}

impl ParameterSet {
    /// Simulation jobs per variant
    pub fn job_count(&self) -> u64 {
        job_count(self.total_events, self.batch_events)
    }

    /// Identifier shared by the input directory and log messages
    pub fn label(&self) -> String {
        format!(
            "z{}.a{}.e{}_{}",
            self.element, self.isotope, self.gamma1, self.gamma2
        )
    }

    /// Directory the prepared input files are written to
    pub fn data_dir(&self, project_root: &Path) -> PathBuf {
        project_root
            .join("inputs")
            .join("user-data")
            .join(self.label())
    }

    /// Workflow name for one submission round
    pub fn workflow_name(&self, iteration: u32) -> String {
        format!(
            "ggac-z{}.a{}-{}_{}-i{}",
            self.element, self.isotope, self.gamma1, self.gamma2, iteration
        )
    }

    /// Sub-path of the output site where merged archives land
    pub fn output_subdir(&self) -> String {
        format!(
            "z{}.a{}/{}-{}",
            self.element, self.isotope, self.gamma1, self.gamma2
        )
    }
}

/// Number of simulation jobs needed to cover `total_events`.
///
/// Rounds half away from zero, computed exactly in integer arithmetic so
/// boundary ratios like 2500/1000 always give 3.
pub fn job_count(total_events: u64, batch_events: u64) -> u64 {
    if batch_events == 0 {
        return 0;
    }
    let total = total_events as u128;
    let batch = batch_events as u128;
    ((2 * total + batch) / (2 * batch)) as u64
}

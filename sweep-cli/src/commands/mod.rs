pub mod plan;
pub mod prepare;
pub mod run;
pub mod validate;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::Args;
use color_eyre::Result;

use sweep_service::error::EXIT_FAILURE;
use sweep_service::params::ConfigRow;
use sweep_service::utils::resolve_project_root;
use sweep_service::SweepSettings;

/// Settings and project root shared by every command
#[derive(Debug, Clone)]
pub struct Context {
    pub settings: SweepSettings,
    pub project_root: PathBuf,
}

impl Context {
    /// Resolve the project root and load settings.
    ///
    /// A root given on the command line wins over one in the settings file.
    pub fn load(settings_file: Option<&Path>, project_root: Option<&Path>) -> Result<Self> {
        let detected = resolve_project_root(project_root);
        let settings = SweepSettings::load_or_default(settings_file, &detected)?;

        let project_root = match (project_root, &settings.project_root) {
            (None, Some(configured)) => configured.clone(),
            _ => detected,
        };

        Ok(Self {
            settings,
            project_root,
        })
    }
}

/// Nuclide and gamma cascade of a single parameter set
#[derive(Args, Debug, Clone)]
pub struct NuclideArgs {
    /// Parent element (Z)
    #[arg(short = 'z', long = "element", value_name = "Z")]
    pub element: String,

    /// Isotope (A)
    #[arg(short = 'a', long = "isotope", value_name = "A")]
    pub isotope: String,

    /// Decay mode: beta_minus or beta_plus
    #[arg(long = "decay-mode", value_name = "MODE")]
    pub decay_mode: String,

    /// First gamma ray in the cascade (keV)
    #[arg(long = "g1", value_name = "KEV")]
    pub gamma1: String,

    /// Second gamma ray in the cascade (keV)
    #[arg(long = "g2", value_name = "KEV")]
    pub gamma2: String,

    /// Detector radius
    #[arg(short = 'r', long = "radius", value_name = "MM")]
    pub radius: String,
}

impl NuclideArgs {
    /// Configuration row equivalent to these arguments
    pub fn to_row(&self, total_events: &str, batch_events: &str) -> ConfigRow {
        HashMap::from([
            ("z".to_string(), self.element.clone()),
            ("a".to_string(), self.isotope.clone()),
            ("decay_mode".to_string(), self.decay_mode.clone()),
            ("gamma1".to_string(), self.gamma1.clone()),
            ("gamma2".to_string(), self.gamma2.clone()),
            ("radius".to_string(), self.radius.clone()),
            ("total_events".to_string(), total_events.to_string()),
            ("events_per_sim".to_string(), batch_events.to_string()),
        ])
    }
}

/// Report a fatal service error and exit
pub fn exit_with(err: &sweep_service::ServiceError) -> ! {
    crate::output::error(&err.to_string());
    std::process::exit(EXIT_FAILURE);
}

// Input File Preparer
// Writes decay, evaporation, multipole and run-macro files and stages shared helpers

use crate::error::{ServiceError, ServiceResult};
use crate::params::{ConfigParseError, DecayMode, ParameterSet};
use crate::runners::InputPreparer;
use crate::workflow::{Variant, PROCESSING_SUPPORT_FILES};

use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Calibration file copied into every input directory
pub const CALIBRATION_FILE: &str = "calibration_mapping.cal";

/// Everything needed to materialize the inputs of one parameter set
#[derive(Debug, Clone, PartialEq)]
pub struct PreparationRequest {
    pub element: String,
    pub isotope: String,
    pub decay_mode: DecayMode,
    pub gamma1: String,
    pub gamma2: String,
    pub radius: String,
    pub batch_events: u64,
    pub data_dir: PathBuf,
}

impl PreparationRequest {
    pub fn from_parameters(params: &ParameterSet, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            element: params.element.clone(),
            isotope: params.isotope.clone(),
            decay_mode: params.decay_mode,
            gamma1: params.gamma1.clone(),
            gamma2: params.gamma2.clone(),
            radius: params.radius.clone(),
            batch_events: params.batch_events,
            data_dir: data_dir.into(),
        }
    }
}

/// Generated file names and contents for one request
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedFiles {
    pub files: Vec<(String, String)>,
}

/// Writes generated inputs and copies static ones from the project's `inputs/` tree
#[derive(Debug, Clone)]
pub struct FilePreparer {
    /// Directory holding `calibration_mapping.cal`, `helpers/` and `processing-code/`
    inputs_dir: PathBuf,
}

impl FilePreparer {
    pub fn new(inputs_dir: impl Into<PathBuf>) -> Self {
        Self {
            inputs_dir: inputs_dir.into(),
        }
    }

    /// Preparer reading static inputs from `<project_root>/inputs`
    pub fn for_project(project_root: &Path) -> Self {
        Self::new(project_root.join("inputs"))
    }

    /// Source paths of the files copied verbatim, keyed by destination name
    pub fn static_sources(&self) -> Vec<(String, PathBuf)> {
        let mut sources = vec![(
            CALIBRATION_FILE.to_string(),
            self.inputs_dir.join(CALIBRATION_FILE),
        )];
        for name in PROCESSING_SUPPORT_FILES {
            let subdir = if name.starts_with("AngularCorrelationHelper") {
                "helpers"
            } else {
                "processing-code"
            };
            sources.push((name.to_string(), self.inputs_dir.join(subdir).join(name)));
        }
        sources
    }

    /// Render the generated input files without touching the filesystem
    pub fn render(request: &PreparationRequest) -> ServiceResult<GeneratedFiles> {
        let element = parse_integer("z", &request.element)?;
        let isotope = parse_integer("a", &request.isotope)?;
        let gamma1 = parse_energy("gamma1", &request.gamma1)?;
        let gamma2 = parse_energy("gamma2", &request.gamma2)?;
        let daughter = request.decay_mode.daughter(element);
        let level = gamma1 + gamma2;

        let mut files = Vec::with_capacity(3 + Variant::ALL.len());

        files.push((
            format!("z{}.a{}.decay", element, isotope),
            decay_file(request.decay_mode, level),
        ));
        files.push((
            format!("z{}.a{}.evap", daughter, isotope),
            evaporation_file(gamma1, gamma2),
        ));
        files.push((
            format!("z{}.a{}.multipole", daughter, isotope),
            multipole_file(gamma1, gamma2),
        ));

        for variant in Variant::ALL {
            files.push((
                variant.run_macro(),
                run_macro(element, daughter, isotope, request.batch_events, variant),
            ));
        }

        Ok(GeneratedFiles { files })
    }
}

#[async_trait::async_trait]
impl InputPreparer for FilePreparer {
    async fn prepare(&self, request: &PreparationRequest) -> ServiceResult<PathBuf> {
        // Render first so invalid requests leave nothing behind
        let generated = Self::render(request)?;
        let data_dir = &request.data_dir;

        if !data_dir.is_dir() {
            info!(dir = %data_dir.display(), "Creating input directory");
            tokio::fs::create_dir_all(data_dir).await?;
        }

        for (name, contents) in &generated.files {
            tokio::fs::write(data_dir.join(name), contents).await?;
        }

        for (name, source) in self.static_sources() {
            tokio::fs::copy(&source, data_dir.join(&name))
                .await
                .map_err(|e| with_path(e, &source))?;
        }

        debug!(
            dir = %data_dir.display(),
            radius = %request.radius,
            files = generated.files.len(),
            "Prepared input files"
        );

        Ok(data_dir.clone())
    }
}

fn with_path(err: io::Error, path: &Path) -> ServiceError {
    ServiceError::Io(io::Error::new(
        err.kind(),
        format!("{}: {}", path.display(), err),
    ))
}

fn parse_integer(field: &str, value: &str) -> ServiceResult<i64> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| ConfigParseError::invalid_number(field, value).into())
}

fn parse_energy(field: &str, value: &str) -> ServiceResult<f64> {
    match value.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ConfigParseError::invalid_number(field, value).into()),
    }
}

/// Format energies the way the downstream tools expect: whole numbers keep a `.0`
fn energy(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

fn decay_file(mode: DecayMode, level: f64) -> String {
    let keyword = mode.decay_file_keyword();
    format!(
        "#  Excitation  Halflife    Mode    Daughter    Ex  Intensity   Q\n\
         P  0.000000    1.0000e+02\n   \
         {keyword}   0.0000  1.0000e+00\n   \
         {keyword}   {}    1.0000e+00  10.0\n",
        energy(level)
    )
}

const EVAPORATION_TAIL: &str =
    "100.0 2+ 1.0e-12 2.00 0.0 0.0 0.0 0.0 0.0 0.0 0.0 0.0 0.0 0.0 0.0";

fn evaporation_file(gamma1: f64, gamma2: f64) -> String {
    format!(
        "{} {} {tail}\n{} {} {tail}\n",
        energy(gamma2),
        energy(gamma2),
        energy(gamma2 + gamma1),
        energy(gamma1),
        tail = EVAPORATION_TAIL
    )
}

fn multipole_file(gamma1: f64, gamma2: f64) -> String {
    format!(
        "{} {} 2 0 0\n{} {} 2 0 0\n",
        energy(gamma2),
        energy(gamma2),
        energy(gamma1 + gamma2),
        energy(gamma1)
    )
}

fn run_macro(element: i64, daughter: i64, isotope: i64, batch_events: u64, variant: Variant) -> String {
    let [a2, a4, a6] = variant.correlation_coefficients();
    let mut out = String::new();

    out.push_str("#--- Physics List ----------------------------------------------------\n");
    out.push_str("/DetSys/phys/SelectPhysics emlivermore\n\n");
    out.push_str("/cuts/setLowEdge 250 eV\n\n");
    out.push_str("/run/initialize\n");
    out.push_str("/process/em/fluo true\n");
    out.push_str("/process/em/auger true\n");
    out.push_str("/process/em/pixe true\n\n");

    out.push_str("#--- Detector Properties ---------------------------------------------\n");
    out.push_str("/DetSys/det/SetCustomRadialDistance 14.5 cm\n");
    out.push_str("/DetSys/det/SetCustomShieldsPresent 0\n");
    out.push_str("/DetSys/det/SetCustomExtensionSuppressorLocation 0\n\n");
    for detector in 1..=16 {
        let _ = writeln!(out, "/DetSys/det/SetCustomDeadLayer {0} {0} 0", detector);
        let _ = writeln!(out, "/DetSys/det/addGriffinCustomDetector {}", detector);
    }

    out.push_str("#--- Auxiliary Properties --------------------------------------------\n");
    out.push_str("/DetSys/app/addGriffinStructure 0\n\n");

    out.push_str("#--- Verbosity Properties --------------------------------------------\n");
    out.push_str("/control/verbose 1\n");
    out.push_str("/run/verbose 0\n");
    out.push_str("/event/verbose 0\n");
    out.push_str("/tracking/verbose 0\n\n");

    out.push_str("#--- User Defined Decays ----------------------------------------------\n");
    out.push_str("# parent\n");
    let _ = writeln!(
        out,
        "/grdm/setRadioactiveDecayFile {e} {a} z{e}.a{a}.decay",
        e = element,
        a = isotope
    );
    out.push_str("# daughter\n");
    let _ = writeln!(
        out,
        "/grdm/setPhotoEvaporationFile {d} {a} z{d}.a{a}.evap",
        d = daughter,
        a = isotope
    );
    let _ = writeln!(
        out,
        "/grdm/setMultipoleFile {d} {a} z{d}.a{a}.multipole",
        d = daughter,
        a = isotope
    );
    let _ = writeln!(
        out,
        "/grdm/setMultipoleGroundStateSpinAngularMomentum {} {} 0.0",
        daughter, isotope
    );
    let _ = writeln!(
        out,
        "/grdm/setAngularCorrelationCoefficients {} {} {}\n",
        a2, a4, a6
    );

    out.push_str("#--- Beam Properties -------------------------------------------------\n");
    out.push_str("/gun/particle ion\n");
    let _ = writeln!(out, "/gun/ion {} {}", element, isotope);
    let _ = writeln!(
        out,
        "/grdm/nucleusLimits {a} {a} {e} {e}\n",
        a = isotope,
        e = element
    );
    let _ = writeln!(out, "/run/beamOn {}", batch_events);

    out
}

// Workflow Models
// Simulation, processing and merge jobs and the graph that holds them

use crate::workflow::catalog::InputCatalog;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Files every processing job needs besides the simulation output
pub const PROCESSING_SUPPORT_FILES: [&str; 3] = [
    "AngularCorrelationHelper.cxx",
    "AngularCorrelationHelper.hh",
    "processSimulationOutputOSG.C",
];

/// Angular-correlation distribution applied to a batch of simulations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Z0,
    Z2,
    Z4,
}

impl Variant {
    pub const ALL: [Variant; 3] = [Variant::Z0, Variant::Z2, Variant::Z4];

    pub fn tag(&self) -> &'static str {
        match self {
            Variant::Z0 => "z0",
            Variant::Z2 => "z2",
            Variant::Z4 => "z4",
        }
    }

    /// Run macro that selects this distribution
    pub fn run_macro(&self) -> String {
        format!("run_macro.{}.mac", self.tag())
    }

    /// Coefficients passed to `/grdm/setAngularCorrelationCoefficients`
    pub fn correlation_coefficients(&self) -> [u8; 3] {
        match self {
            Variant::Z0 => [0, 0, 0],
            Variant::Z2 => [1, 0, 0],
            Variant::Z4 => [0, 1, 0],
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Logical file name of an artifact moving through the workflow
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileRef(String);

impl FileRef {
    pub fn new(lfn: impl Into<String>) -> Self {
        Self(lfn.into())
    }

    pub fn lfn(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One Geant4 simulation batch
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationJob {
    pub id: String,
    pub variant: Variant,
    pub batch_index: u64,
    pub input_files: Vec<FileRef>,
    pub output_file: FileRef,
}

impl SimulationJob {
    pub fn new(variant: Variant, batch_index: u64, input_files: Vec<FileRef>) -> Self {
        Self {
            id: format!("simulation_{}_{:04}", variant, batch_index),
            variant,
            batch_index,
            input_files,
            output_file: FileRef::new(format!("g4out_{}_{:04}.root", variant, batch_index)),
        }
    }

    pub fn arguments(&self) -> Vec<String> {
        vec![
            self.variant.run_macro(),
            self.output_file.lfn().to_string(),
        ]
    }
}

/// Sorting and fitting of one simulation batch
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingJob {
    pub id: String,
    pub variant: Variant,
    pub batch_index: u64,
    pub inputs: Vec<FileRef>,
    /// Intermediate analysis tree, kept on the execution node
    pub analysis_file: FileRef,
    pub histogram: FileRef,
    pub peak_areas: FileRef,
    pub gamma1: String,
    pub gamma2: String,
}

impl ProcessingJob {
    /// Processing job consuming the output of `simulation`
    pub fn for_simulation(simulation: &SimulationJob, gamma1: &str, gamma2: &str) -> Self {
        let variant = simulation.variant;
        let batch = simulation.batch_index;

        let mut inputs = vec![simulation.output_file.clone()];
        inputs.extend(PROCESSING_SUPPORT_FILES.iter().map(|f| FileRef::new(*f)));

        Self {
            id: format!("data_processing_{}_{:04}", variant, batch),
            variant,
            batch_index: batch,
            inputs,
            analysis_file: FileRef::new(format!("analysis_{}_{:04}.root", variant, batch)),
            histogram: FileRef::new(format!("histograms_{}_{:04}.root", variant, batch)),
            peak_areas: FileRef::new(format!("peak_areas_{}_{:04}.csv", variant, batch)),
            gamma1: gamma1.to_string(),
            gamma2: gamma2.to_string(),
        }
    }

    pub fn arguments(&self) -> Vec<String> {
        vec![
            self.inputs[0].lfn().to_string(),
            self.analysis_file.lfn().to_string(),
            self.histogram.lfn().to_string(),
            self.gamma1.clone(),
            self.gamma2.clone(),
            self.peak_areas.lfn().to_string(),
        ]
    }

    /// The (histogram, peak-area) pair routed into a merge job
    pub fn outputs(&self) -> [&FileRef; 2] {
        [&self.histogram, &self.peak_areas]
    }
}

/// Archive of up to `merge_limit` processed batches
#[derive(Debug, Clone, PartialEq)]
pub struct MergeJob {
    pub id: String,
    pub merge_index: usize,
    /// Input files of the parameter set, archived alongside the results
    pub bundled_inputs: Vec<FileRef>,
    /// Histogram and peak-area files, in routing order
    pub accumulated_inputs: Vec<FileRef>,
    pub output_archive: FileRef,
}

impl MergeJob {
    pub fn new(merge_index: usize, bundled_inputs: Vec<FileRef>) -> Self {
        Self {
            id: format!("merge_{:04}", merge_index),
            merge_index,
            bundled_inputs,
            accumulated_inputs: Vec::new(),
            output_archive: FileRef::new(format!("{}.tar.gz", merge_index)),
        }
    }

    pub fn pair_count(&self) -> usize {
        self.accumulated_inputs.len() / 2
    }

    pub fn add_pair(&mut self, histogram: FileRef, peak_areas: FileRef) {
        self.accumulated_inputs.push(histogram);
        self.accumulated_inputs.push(peak_areas);
    }

    /// All inputs in staging order: bundled files first, then accumulated pairs
    pub fn inputs(&self) -> impl Iterator<Item = &FileRef> {
        self.bundled_inputs
            .iter()
            .chain(self.accumulated_inputs.iter())
    }

    pub fn arguments(&self) -> Vec<String> {
        std::iter::once(self.output_archive.lfn().to_string())
            .chain(self.inputs().map(|f| f.lfn().to_string()))
            .collect()
    }
}

/// The job graph built for one parameter set and iteration
#[derive(Debug, Clone)]
pub struct JobGraph {
    pub name: String,
    /// Sub-path of the output site that receives the archives
    pub output_subdir: String,
    pub simulations: Vec<SimulationJob>,
    pub processing: Vec<ProcessingJob>,
    pub merges: Vec<MergeJob>,
    /// Prepared input files and where they live
    pub replicas: InputCatalog,
}

impl JobGraph {
    pub fn job_total(&self) -> usize {
        self.simulations.len() + self.processing.len() + self.merges.len()
    }

    pub fn simulations_for(&self, variant: Variant) -> impl Iterator<Item = &SimulationJob> {
        self.simulations.iter().filter(move |j| j.variant == variant)
    }

    pub fn processing_for(&self, variant: Variant) -> impl Iterator<Item = &ProcessingJob> {
        self.processing.iter().filter(move |j| j.variant == variant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_files() {
        assert_eq!(Variant::Z0.run_macro(), "run_macro.z0.mac");
        assert_eq!(Variant::Z4.run_macro(), "run_macro.z4.mac");
        assert_eq!(Variant::Z2.correlation_coefficients(), [1, 0, 0]);
    }

    #[test]
    fn test_simulation_and_processing_naming() {
        let sim = SimulationJob::new(Variant::Z2, 7, vec![FileRef::new("run_macro.z2.mac")]);
        assert_eq!(sim.output_file.lfn(), "g4out_z2_0007.root");
        assert_eq!(sim.arguments(), vec!["run_macro.z2.mac", "g4out_z2_0007.root"]);

        let proc = ProcessingJob::for_simulation(&sim, "100", "200");
        assert_eq!(proc.inputs[0], sim.output_file);
        assert_eq!(proc.inputs.len(), 1 + PROCESSING_SUPPORT_FILES.len());
        assert_eq!(
            proc.arguments(),
            vec![
                "g4out_z2_0007.root",
                "analysis_z2_0007.root",
                "histograms_z2_0007.root",
                "100",
                "200",
                "peak_areas_z2_0007.csv",
            ]
        );
    }

    #[test]
    fn test_merge_job_arguments() {
        let mut merge = MergeJob::new(3, vec![FileRef::new("z50.a132.decay")]);
        merge.add_pair(FileRef::new("h.root"), FileRef::new("p.csv"));

        assert_eq!(merge.pair_count(), 1);
        assert_eq!(merge.output_archive.lfn(), "3.tar.gz");
        assert_eq!(
            merge.arguments(),
            vec!["3.tar.gz", "z50.a132.decay", "h.root", "p.csv"]
        );
    }
}

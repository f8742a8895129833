// Job Graph Builder
// Expands one parameter set into simulate -> process -> merge jobs across all variants

use crate::error::{ServiceError, ServiceResult};
use crate::params::ParameterSet;
use crate::workflow::catalog::InputCatalog;
use crate::workflow::merge::MergeAccumulator;
use crate::workflow::models::{
    JobGraph, ProcessingJob, SimulationJob, Variant, PROCESSING_SUPPORT_FILES,
};

use tracing::debug;

/// Maximum (histogram, peak-area) pairs archived by one merge job
pub const DEFAULT_MERGE_LIMIT: usize = 50;

/// Builds job graphs with a fixed merge fan-in
#[derive(Debug, Clone, Copy)]
pub struct GraphBuilder {
    merge_limit: usize,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_MERGE_LIMIT)
    }
}

impl GraphBuilder {
    pub fn new(merge_limit: usize) -> Self {
        Self {
            merge_limit: merge_limit.max(1),
        }
    }

    pub fn merge_limit(&self) -> usize {
        self.merge_limit
    }

    /// Build the graph for one parameter set and iteration.
    ///
    /// Fails with `EmptyWorkflow` when the event counts round to zero jobs and
    /// with `MissingInput` when a run macro or processing helper has not been
    /// prepared. Nothing is submitted.
    pub fn build(
        &self,
        params: &ParameterSet,
        iteration: u32,
        catalog: &InputCatalog,
    ) -> ServiceResult<JobGraph> {
        let name = params.workflow_name(iteration);
        let jobs = params.job_count();
        if jobs == 0 {
            return Err(ServiceError::EmptyWorkflow {
                workflow: name,
                total_events: params.total_events,
                batch_events: params.batch_events,
            });
        }

        for support in PROCESSING_SUPPORT_FILES {
            catalog.require(support, &name)?;
        }

        let input_files = catalog.files();
        let mut merges = MergeAccumulator::new(self.merge_limit, input_files.clone());

        let per_variant = jobs as usize;
        let mut simulations = Vec::with_capacity(per_variant * Variant::ALL.len());
        let mut processing = Vec::with_capacity(per_variant * Variant::ALL.len());
        let mut sealed = Vec::new();

        for variant in Variant::ALL {
            catalog.require(&variant.run_macro(), &name)?;

            for batch in 0..jobs {
                let simulation = SimulationJob::new(variant, batch, input_files.clone());
                let process = ProcessingJob::for_simulation(&simulation, &params.gamma1, &params.gamma2);

                if let Some(full) =
                    merges.push_pair(process.histogram.clone(), process.peak_areas.clone())
                {
                    sealed.push(full);
                }

                simulations.push(simulation);
                processing.push(process);
            }

            // Partial merges never carry over into the next variant
            if let Some(partial) = merges.flush() {
                sealed.push(partial);
            }
        }

        let graph = JobGraph {
            name,
            output_subdir: params.output_subdir(),
            simulations,
            processing,
            merges: sealed,
            replicas: catalog.clone(),
        };
        graph.validate()?;

        debug!(
            workflow = %graph.name,
            simulations = graph.simulations.len(),
            merges = graph.merges.len(),
            merge_limit = self.merge_limit,
            "Built job graph"
        );

        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::DecayMode;
    use crate::workflow::models::FileRef;

    use std::collections::HashMap;

    fn params(total_events: u64, batch_events: u64) -> ParameterSet {
        ParameterSet {
            sequence_number: 0,
            element: "50".to_string(),
            isotope: "132".to_string(),
            decay_mode: DecayMode::BetaMinus,
            gamma1: "100".to_string(),
            gamma2: "200".to_string(),
            radius: "70".to_string(),
            total_events,
            batch_events,
            iterations: 1,
        }
    }

    fn full_catalog() -> InputCatalog {
        let mut files: Vec<String> = Variant::ALL.iter().map(|v| v.run_macro()).collect();
        files.extend(PROCESSING_SUPPORT_FILES.iter().map(|f| f.to_string()));
        files.push("z50.a132.decay".to_string());
        files.push("z51.a132.evap".to_string());
        files.push("z51.a132.multipole".to_string());
        files.push("calibration_mapping.cal".to_string());
        InputCatalog::from_files("/project/inputs/user-data/z50.a132.e100_200", files)
    }

    #[test]
    fn test_scenario_three_batches() {
        let graph = GraphBuilder::new(50)
            .build(&params(3000, 1000), 0, &full_catalog())
            .unwrap();

        assert_eq!(graph.name, "ggac-z50.a132-100_200-i0");
        for variant in Variant::ALL {
            assert_eq!(graph.simulations_for(variant).count(), 3);
            assert_eq!(graph.processing_for(variant).count(), 3);
        }
        // One merge per variant, each with three pairs
        assert_eq!(graph.merges.len(), 3);
        assert!(graph.merges.iter().all(|m| m.pair_count() == 3));
        assert_eq!(
            graph.merges.iter().map(|m| m.merge_index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_merge_counts_per_variant() {
        for (jobs, limit) in [(1u64, 1usize), (7, 3), (9, 3), (120, 50), (50, 50), (4, 10)] {
            let graph = GraphBuilder::new(limit)
                .build(&params(jobs * 100, 100), 0, &full_catalog())
                .unwrap();

            let per_variant = (jobs as usize).div_ceil(limit);
            assert_eq!(graph.merges.len(), per_variant * Variant::ALL.len());

            let expected_last = match jobs as usize % limit {
                0 => limit,
                rest => rest,
            };
            for chunk in graph.merges.chunks(per_variant) {
                let (last, full) = chunk.split_last().unwrap();
                assert!(full.iter().all(|m| m.pair_count() == limit));
                assert_eq!(last.pair_count(), expected_last);
            }
        }
    }

    #[test]
    fn test_every_output_merged_once() {
        let graph = GraphBuilder::new(4)
            .build(&params(1000, 100), 0, &full_catalog())
            .unwrap();

        let mut merged: HashMap<&FileRef, usize> = HashMap::new();
        for merge in &graph.merges {
            for file in &merge.accumulated_inputs {
                *merged.entry(file).or_default() += 1;
            }
        }

        for proc in &graph.processing {
            assert_eq!(merged.get(&proc.histogram), Some(&1));
            assert_eq!(merged.get(&proc.peak_areas), Some(&1));
        }
        for (sim, proc) in graph.simulations.iter().zip(&graph.processing) {
            assert_eq!(proc.inputs[0], sim.output_file);
        }
        assert_eq!(merged.len(), graph.processing.len() * 2);
    }

    #[test]
    fn test_merges_bundle_inputs() {
        let catalog = full_catalog();
        let graph = GraphBuilder::default()
            .build(&params(3000, 1000), 0, &catalog)
            .unwrap();

        assert_eq!(graph.merges[0].bundled_inputs, catalog.files());
        assert_eq!(graph.simulations[0].input_files, catalog.files());
    }

    #[test]
    fn test_empty_workflow() {
        let err = GraphBuilder::default()
            .build(&params(400, 1000), 0, &full_catalog())
            .unwrap_err();
        assert!(matches!(err, ServiceError::EmptyWorkflow { .. }));
    }

    #[test]
    fn test_missing_run_macro() {
        let files: Vec<String> = full_catalog()
            .files()
            .into_iter()
            .map(|f| f.lfn().to_string())
            .filter(|f| f != "run_macro.z4.mac")
            .collect();
        let catalog = InputCatalog::from_files("/inputs", files);

        let err = GraphBuilder::default()
            .build(&params(3000, 1000), 0, &catalog)
            .unwrap_err();
        match err {
            ServiceError::MissingInput { file, .. } => assert_eq!(file, "run_macro.z4.mac"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_helper() {
        let catalog = InputCatalog::from_files("/inputs", ["run_macro.z0.mac"]);
        let err = GraphBuilder::default()
            .build(&params(3000, 1000), 0, &catalog)
            .unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_iteration_in_name() {
        let graph = GraphBuilder::default()
            .build(&params(3000, 1000), 4, &full_catalog())
            .unwrap();
        assert_eq!(graph.name, "ggac-z50.a132-100_200-i4");
        assert_eq!(graph.output_subdir, "z50.a132/100-200");
    }
}

// Job Graph (DAG) Analysis
// Derives data dependencies between jobs, validates artifact flow and orders execution

use crate::workflow::models::{FileRef, JobGraph};

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

/// Error type for graph operations
#[derive(Debug, Clone)]
pub struct GraphError {
    pub message: String,
    pub kind: GraphErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphErrorKind {
    /// Circular dependency detected
    CyclicDependency,
    /// Two jobs produce the same artifact
    DuplicateOutput,
    /// An intermediate artifact is consumed by no job
    UnconsumedOutput,
    /// An intermediate artifact is consumed by more than one job
    DuplicateConsumer,
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "graph error: {}", self.message)
    }
}

impl std::error::Error for GraphError {}

impl GraphError {
    pub fn new(kind: GraphErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

/// Stage a job belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Simulation,
    Processing,
    Merge,
}

impl JobKind {
    /// Name of the executable the job runs
    pub fn transformation(&self) -> &'static str {
        match self {
            JobKind::Simulation => "simulation",
            JobKind::Processing => "data_processing",
            JobKind::Merge => "merge",
        }
    }
}

/// Uniform view of any job in the graph
#[derive(Debug, Clone)]
pub struct JobNode<'a> {
    pub id: &'a str,
    pub kind: JobKind,
    pub arguments: Vec<String>,
    pub inputs: Vec<&'a FileRef>,
    pub outputs: Vec<&'a FileRef>,
}

impl JobGraph {
    /// All jobs, simulations first, then processing, then merges
    pub fn nodes(&self) -> Vec<JobNode<'_>> {
        let simulations = self.simulations.iter().map(|job| JobNode {
            id: &job.id,
            kind: JobKind::Simulation,
            arguments: job.arguments(),
            inputs: job.input_files.iter().collect(),
            outputs: vec![&job.output_file],
        });

        let processing = self.processing.iter().map(|job| JobNode {
            id: &job.id,
            kind: JobKind::Processing,
            arguments: job.arguments(),
            inputs: job.inputs.iter().collect(),
            outputs: job.outputs().to_vec(),
        });

        let merges = self.merges.iter().map(|job| JobNode {
            id: &job.id,
            kind: JobKind::Merge,
            arguments: job.arguments(),
            inputs: job.inputs().collect(),
            outputs: vec![&job.output_archive],
        });

        simulations.chain(processing).chain(merges).collect()
    }

    /// Map each produced artifact to the job producing it
    fn producers<'a>(nodes: &[JobNode<'a>]) -> Result<HashMap<&'a str, &'a str>, GraphError> {
        let mut producers = HashMap::new();
        for node in nodes {
            for output in &node.outputs {
                if let Some(previous) = producers.insert(output.lfn(), node.id) {
                    return Err(GraphError::new(
                        GraphErrorKind::DuplicateOutput,
                        format!(
                            "'{}' is produced by both '{}' and '{}'",
                            output, previous, node.id
                        ),
                    ));
                }
            }
        }
        Ok(producers)
    }

    /// Data dependencies as (parent, child) job ids, deduplicated, in job order
    pub fn edges(&self) -> Result<Vec<(String, String)>, GraphError> {
        let nodes = self.nodes();
        let producers = Self::producers(&nodes)?;

        let mut seen = HashSet::new();
        let mut edges = Vec::new();
        for node in &nodes {
            for input in &node.inputs {
                if let Some(&parent) = producers.get(input.lfn()) {
                    if seen.insert((parent, node.id)) {
                        edges.push((parent.to_string(), node.id.to_string()));
                    }
                }
            }
        }
        Ok(edges)
    }

    /// Validate artifact flow.
    ///
    /// Every artifact produced by a simulation or processing job must be
    /// consumed by exactly one job, so no batch is merged twice or dropped,
    /// and the dependencies must be acyclic.
    pub fn validate(&self) -> Result<(), GraphError> {
        let nodes = self.nodes();
        let producers = Self::producers(&nodes)?;

        let mut consumers: HashMap<&str, Vec<&str>> = HashMap::new();
        for node in &nodes {
            for input in &node.inputs {
                if producers.contains_key(input.lfn()) {
                    consumers.entry(input.lfn()).or_default().push(node.id);
                }
            }
        }

        for node in nodes.iter().filter(|n| n.kind != JobKind::Merge) {
            for output in &node.outputs {
                match consumers.get(output.lfn()).map(Vec::as_slice) {
                    None | Some([]) => {
                        return Err(GraphError::new(
                            GraphErrorKind::UnconsumedOutput,
                            format!("'{}' from '{}' is never consumed", output, node.id),
                        ))
                    }
                    Some([_]) => {}
                    Some(many) => {
                        return Err(GraphError::new(
                            GraphErrorKind::DuplicateConsumer,
                            format!(
                                "'{}' from '{}' is consumed by {}",
                                output,
                                node.id,
                                many.join(", ")
                            ),
                        ))
                    }
                }
            }
        }

        self.levels()?;
        Ok(())
    }

    /// Group jobs into levels that can run in parallel (Kahn's algorithm)
    pub fn levels(&self) -> Result<Vec<Vec<JobNode<'_>>>, GraphError> {
        let nodes = self.nodes();
        let edges = self.edges()?;

        let mut in_degree: HashMap<&str, usize> = nodes.iter().map(|n| (n.id, 0)).collect();
        let mut adj_list: HashMap<&str, Vec<&str>> = HashMap::new();
        for (parent, child) in &edges {
            adj_list.entry(parent.as_str()).or_default().push(child.as_str());
            *in_degree.entry(child.as_str()).or_insert(0) += 1;
        }

        // Start from nodes with in-degree 0, in job order
        let mut queue: VecDeque<(&str, usize)> = nodes
            .iter()
            .filter(|n| in_degree.get(n.id) == Some(&0))
            .map(|n| (n.id, 0))
            .collect();

        let mut assigned: HashMap<&str, usize> = HashMap::new();
        while let Some((name, level)) = queue.pop_front() {
            assigned.insert(name, level);

            if let Some(neighbors) = adj_list.get(name) {
                for &neighbor in neighbors {
                    if let Some(deg) = in_degree.get_mut(neighbor) {
                        *deg -= 1;
                        if *deg == 0 {
                            queue.push_back((neighbor, level + 1));
                        }
                    }
                }
            }
        }

        if assigned.len() != nodes.len() {
            let stuck: Vec<&str> = nodes
                .iter()
                .map(|n| n.id)
                .filter(|id| !assigned.contains_key(id))
                .collect();
            return Err(GraphError::new(
                GraphErrorKind::CyclicDependency,
                format!("circular dependency among: {}", stuck.join(", ")),
            ));
        }

        let mut levels: Vec<Vec<JobNode<'_>>> = Vec::new();
        for node in nodes {
            let level = assigned[node.id];
            if level >= levels.len() {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[level].push(node);
        }

        Ok(levels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::catalog::InputCatalog;
    use crate::workflow::models::{MergeJob, ProcessingJob, SimulationJob, Variant};

    fn small_graph() -> JobGraph {
        let sim = SimulationJob::new(Variant::Z0, 0, vec![FileRef::new("run_macro.z0.mac")]);
        let proc = ProcessingJob::for_simulation(&sim, "100", "200");
        let mut merge = MergeJob::new(0, vec![FileRef::new("run_macro.z0.mac")]);
        merge.add_pair(proc.histogram.clone(), proc.peak_areas.clone());

        JobGraph {
            name: "test".to_string(),
            output_subdir: "z50.a132/100-200".to_string(),
            simulations: vec![sim],
            processing: vec![proc],
            merges: vec![merge],
            replicas: InputCatalog::from_files("/inputs", ["run_macro.z0.mac"]),
        }
    }

    #[test]
    fn test_edges_follow_artifacts() {
        let graph = small_graph();
        let edges = graph.edges().unwrap();

        assert_eq!(
            edges,
            vec![
                (
                    "simulation_z0_0000".to_string(),
                    "data_processing_z0_0000".to_string()
                ),
                ("data_processing_z0_0000".to_string(), "merge_0000".to_string()),
            ]
        );
    }

    #[test]
    fn test_levels() {
        let graph = small_graph();
        let levels = graph.levels().unwrap();

        assert_eq!(levels.len(), 3);
        assert_eq!(levels[0][0].kind, JobKind::Simulation);
        assert_eq!(levels[1][0].kind, JobKind::Processing);
        assert_eq!(levels[2][0].kind, JobKind::Merge);
    }

    #[test]
    fn test_valid_graph() {
        assert!(small_graph().validate().is_ok());
    }

    #[test]
    fn test_dropped_pair_detected() {
        let mut graph = small_graph();
        graph.merges[0].accumulated_inputs.clear();

        let err = graph.validate().unwrap_err();
        assert_eq!(err.kind, GraphErrorKind::UnconsumedOutput);
    }

    #[test]
    fn test_double_merge_detected() {
        let mut graph = small_graph();
        let mut extra = MergeJob::new(1, Vec::new());
        extra.add_pair(
            graph.processing[0].histogram.clone(),
            graph.processing[0].peak_areas.clone(),
        );
        graph.merges.push(extra);

        let err = graph.validate().unwrap_err();
        assert_eq!(err.kind, GraphErrorKind::DuplicateConsumer);
    }

    #[test]
    fn test_duplicate_output_detected() {
        let mut graph = small_graph();
        let duplicate = graph.simulations[0].clone();
        graph.simulations.push(duplicate);

        let err = graph.edges().unwrap_err();
        assert_eq!(err.kind, GraphErrorKind::DuplicateOutput);
    }
}

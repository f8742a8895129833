// Workflow Module
// Job graph model, input catalog, merge batching and graph construction

pub mod builder;
pub mod catalog;
pub mod graph;
pub mod merge;
pub mod models;

// Re-export key types
pub use builder::{GraphBuilder, DEFAULT_MERGE_LIMIT};
pub use catalog::InputCatalog;
pub use graph::{GraphError, GraphErrorKind, JobKind, JobNode};
pub use merge::MergeAccumulator;
pub use models::{
    FileRef, JobGraph, MergeJob, ProcessingJob, SimulationJob, Variant, PROCESSING_SUPPORT_FILES,
};

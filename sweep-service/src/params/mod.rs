// Parameters Module
// Configuration rows, their validation, and the simulation requests they expand into

pub mod error;
pub mod expander;
pub mod models;

// Re-export key types
pub use error::{ConfigParseError, ConfigParseErrorKind, ConfigParseResult};
pub use expander::{ConfigRow, ParameterExpander, REQUIRED_FIELDS};
pub use models::{job_count, DecayMode, ParameterSet};

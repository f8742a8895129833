// Parameter Set Expander
// Turns configuration rows into fully specified, validated simulation requests

use crate::error::ServiceResult;
use crate::params::error::{ConfigParseError, ConfigParseErrorKind, ConfigParseResult};
use crate::params::models::{DecayMode, ParameterSet};

use std::collections::HashMap;
use std::path::Path;

/// One configuration row: header name to raw value
pub type ConfigRow = HashMap<String, String>;

/// Fields every configuration row must carry
pub const REQUIRED_FIELDS: [&str; 8] = [
    "z",
    "a",
    "decay_mode",
    "gamma1",
    "gamma2",
    "radius",
    "total_events",
    "events_per_sim",
];

/// Expands configuration rows into parameter sets
pub struct ParameterExpander;

impl ParameterExpander {
    /// Load and expand a CSV parameter file
    pub fn load_file(path: impl AsRef<Path>) -> ServiceResult<Vec<ParameterSet>> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigParseError::new(
                format!("cannot read {}: {}", path.display(), e),
                ConfigParseErrorKind::IoError,
            )
        })?;
        Self::parse_str(&content)
    }

    /// Expand CSV content with a header row
    pub fn parse_str(content: &str) -> ServiceResult<Vec<ParameterSet>> {
        let rows = Self::read_rows(content)?;
        Self::expand_rows(&rows)
    }

    /// Read raw rows, trimming whitespace around every field
    pub fn read_rows(content: &str) -> ConfigParseResult<Vec<ConfigRow>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        reader
            .deserialize::<ConfigRow>()
            .map(|row| row.map_err(|e| ConfigParseError::from_csv_error(&e)))
            .collect()
    }

    /// Expand every row, numbering them by position
    pub fn expand_rows(rows: &[ConfigRow]) -> ServiceResult<Vec<ParameterSet>> {
        rows.iter()
            .enumerate()
            .map(|(index, row)| Self::expand_row(index, row))
            .collect()
    }

    /// Expand a single row into a parameter set.
    ///
    /// Field problems are reported as `ConfigParse` errors tagged with the
    /// row; an unrecognized decay mode is reported as `UnknownDecayMode`.
    pub fn expand_row(sequence_number: usize, row: &ConfigRow) -> ServiceResult<ParameterSet> {
        let fields = RowFields { row };
        let tag = |err: ConfigParseError| err.with_row(sequence_number);

        let element = fields.integer("z").map_err(tag)?;
        let isotope = fields.integer("a").map_err(tag)?;
        let decay_mode = fields.required("decay_mode").map_err(tag)?;
        let gamma1 = fields.number("gamma1").map_err(tag)?;
        let gamma2 = fields.number("gamma2").map_err(tag)?;
        let radius = fields.number("radius").map_err(tag)?;
        let total_events = fields.event_count("total_events").map_err(tag)?;
        let batch_events = fields.event_count("events_per_sim").map_err(tag)?;
        let iterations = fields.iterations().map_err(tag)?;

        let decay_mode: DecayMode = decay_mode.parse()?;

        Ok(ParameterSet {
            sequence_number,
            element: element.to_string(),
            isotope: isotope.to_string(),
            decay_mode,
            gamma1: gamma1.to_string(),
            gamma2: gamma2.to_string(),
            radius: radius.to_string(),
            total_events,
            batch_events,
            iterations,
        })
    }
}

/// Typed accessors over one raw row
struct RowFields<'a> {
    row: &'a ConfigRow,
}

impl<'a> RowFields<'a> {
    fn required(&self, field: &str) -> ConfigParseResult<&'a str> {
        match self.row.get(field).map(|v| v.trim()) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(ConfigParseError::missing_field(field).with_field_suggestion(self.row.keys())),
        }
    }

    /// Integer-valued string field, returned as written
    fn integer(&self, field: &str) -> ConfigParseResult<&'a str> {
        let value = self.required(field)?;
        value
            .parse::<i64>()
            .map(|_| value)
            .map_err(|_| ConfigParseError::invalid_number(field, value))
    }

    /// Numeric string field, returned as written
    fn number(&self, field: &str) -> ConfigParseResult<&'a str> {
        let value = self.required(field)?;
        match value.parse::<f64>() {
            Ok(parsed) if parsed.is_finite() => Ok(value),
            _ => Err(ConfigParseError::invalid_number(field, value)),
        }
    }

    /// Event counts go through floating point and are truncated, so "1.5e5" is accepted
    fn event_count(&self, field: &str) -> ConfigParseResult<u64> {
        let value = self.required(field)?;
        let parsed = value
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| ConfigParseError::invalid_number(field, value))?;

        let truncated = parsed.trunc();
        if truncated < 1.0 {
            return Err(ConfigParseError::invalid_value(
                field,
                format!("must be at least 1, found '{}'", value),
            ));
        }
        if truncated > u64::MAX as f64 {
            return Err(ConfigParseError::invalid_value(
                field,
                format!("is too large, found '{}'", value),
            ));
        }
        Ok(truncated as u64)
    }

    fn iterations(&self) -> ConfigParseResult<u32> {
        let value = match self.row.get("iterations").map(|v| v.trim()) {
            Some(value) if !value.is_empty() => value,
            _ => return Ok(1),
        };
        match value.parse::<u32>() {
            Ok(0) => Err(ConfigParseError::invalid_value(
                "iterations",
                "must be at least 1",
            )),
            Ok(n) => Ok(n),
            Err(_) => Err(ConfigParseError::invalid_number("iterations", value)),
        }
    }
}

// Configuration error types with helpful error messages
// Carries the offending row and field plus suggestions for common mistakes

use std::fmt;

/// Malformed or missing configuration data
#[derive(Debug, Clone)]
pub struct ConfigParseError {
    /// Error message
    pub message: String,
    /// Data row (0-based, header excluded) if known
    pub row: Option<usize>,
    /// Field the error refers to
    pub field: Option<String>,
    /// Optional suggestion for fixing the error
    pub suggestion: Option<String>,
    /// The kind of error
    pub kind: ConfigParseErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigParseErrorKind {
    /// Required field absent or empty
    MissingField,
    /// Field present but not a number
    InvalidNumber,
    /// Number present but outside the accepted range
    InvalidValue,
    /// Malformed CSV (unbalanced rows, bad quoting)
    CsvSyntax,
    /// IO error (file not found, etc.)
    IoError,
}

impl ConfigParseError {
    pub fn new(message: impl Into<String>, kind: ConfigParseErrorKind) -> Self {
        Self {
            message: message.into(),
            row: None,
            field: None,
            suggestion: None,
            kind,
        }
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            format!("missing required field '{}'", field),
            ConfigParseErrorKind::MissingField,
        )
        .with_field(field)
    }

    pub fn invalid_number(field: &str, value: &str) -> Self {
        Self::new(
            format!("field '{}' must be numeric, found '{}'", field, value),
            ConfigParseErrorKind::InvalidNumber,
        )
        .with_field(field)
    }

    pub fn invalid_value(field: &str, message: impl Into<String>) -> Self {
        Self::new(
            format!("field '{}' {}", field, message.into()),
            ConfigParseErrorKind::InvalidValue,
        )
        .with_field(field)
    }

    pub fn with_row(mut self, row: usize) -> Self {
        self.row = Some(row);
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    fn with_suggestion_opt(mut self, suggestion: Option<String>) -> Self {
        self.suggestion = suggestion;
        self
    }

    /// Create from a csv reader error
    pub fn from_csv_error(err: &csv::Error) -> Self {
        let kind = if err.is_io_error() {
            ConfigParseErrorKind::IoError
        } else {
            ConfigParseErrorKind::CsvSyntax
        };

        let mut parsed = Self::new(err.to_string(), kind);
        // Record numbers count the header as record 0
        if let Some(position) = err.position() {
            if position.record() > 0 {
                parsed = parsed.with_row(position.record() as usize - 1);
            }
        }

        let suggestion = match err.kind() {
            csv::ErrorKind::UnequalLengths { .. } => {
                Some("every row needs a value for each header column".to_string())
            }
            _ => None,
        };

        parsed.with_suggestion_opt(suggestion)
    }

    /// Suggest a fix for a missing field by looking at the keys the row does have
    pub fn with_field_suggestion<'a>(self, present: impl IntoIterator<Item = &'a String>) -> Self {
        let Some(field) = self.field.clone() else {
            return self;
        };
        let suggestion = suggest_field_name(&field, present);
        self.with_suggestion_opt(suggestion)
    }
}

impl fmt::Display for ConfigParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}", self.message)?;
        if let Some(row) = self.row {
            write!(f, " (row {})", row)?;
        }
        if let Some(suggestion) = &self.suggestion {
            write!(f, "; help: {}", suggestion)?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigParseError {}

/// Result type for configuration parsing
pub type ConfigParseResult<T> = Result<T, ConfigParseError>;

/// Common misspellings of the configuration headers
const FIELD_ALIASES: &[(&str, &str)] = &[
    ("element", "z"),
    ("isotope", "a"),
    ("decay", "decay_mode"),
    ("mode", "decay_mode"),
    ("g1", "gamma1"),
    ("g2", "gamma2"),
    ("r", "radius"),
    ("events", "total_events"),
    ("batch_events", "events_per_sim"),
    ("events_per_simulation", "events_per_sim"),
    ("batch_size", "events_per_sim"),
    ("iteration", "iterations"),
];

fn suggest_field_name<'a>(
    missing: &str,
    present: impl IntoIterator<Item = &'a String>,
) -> Option<String> {
    for key in present {
        let normalized = key.trim().to_lowercase();
        if normalized == missing && key != missing {
            return Some(format!("rename header '{}' to '{}'", key, missing));
        }
        for (alias, correct) in FIELD_ALIASES {
            if normalized == *alias && *correct == missing {
                return Some(format!("did you mean '{}' instead of '{}'?", missing, key));
            }
        }
    }
    None
}

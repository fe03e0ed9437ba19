use std::path::PathBuf;
use thiserror::Error;

/// All errors produced while analysing lab attendance.
#[derive(Error, Debug)]
pub enum AttendanceError {
    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The semester configuration document is not valid YAML for our schema.
    #[error("Failed to parse semester config: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A lab term is not of the form `HH:MM-HH:MM`.
    #[error("Invalid lab term \"{term}\" for course {course} on {weekday}")]
    InvalidLabTerm {
        course: String,
        weekday: String,
        term: String,
    },

    /// A caller-supplied log grammar is not a usable regular expression.
    #[error("Invalid log pattern: {0}")]
    LogPattern(String),

    /// A log timestamp did not match the expected format.
    #[error("Invalid timestamp \"{value}\", expected format {format}")]
    TimestampParse { value: String, format: String },

    /// A record reached a pipeline step without a field the step needs.
    #[error("Missing field: {0}")]
    MissingField(String),

    /// A record field holds a value of the wrong kind for the step reading it.
    #[error("Field {field} has unexpected type, expected {expected}")]
    FieldType {
        field: String,
        expected: &'static str,
    },

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the attendance crates.
pub type Result<T> = std::result::Result<T, AttendanceError>;

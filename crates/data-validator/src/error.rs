//! Validation Error Types

use chrono::NaiveDate;
use std::fmt;
use thiserror::Error;

/// Errors detected while validating a raw observation or deriving features from it
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Value out of allowed range
    #[error("{field} value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Value present but not of the expected shape
    #[error("Invalid value for {field}: {reason}")]
    InvalidFormat { field: &'static str, reason: String },

    /// Date string that could not be parsed
    #[error("Invalid date for {field}: {value:?}")]
    InvalidDate { field: &'static str, value: String },

    /// Field needed by a safety-relevant derivation is absent
    #[error("Missing required field: {0}")]
    MissingRequiredField(&'static str),

    /// A date that must not precede another one does
    #[error("{later} ({later_date}) is {days} day(s) before {earlier} ({earlier_date})")]
    InvalidTemporalOrder {
        earlier: &'static str,
        earlier_date: NaiveDate,
        later: &'static str,
        later_date: NaiveDate,
        days: i64,
    },
}

impl ValidationError {
    /// Stable machine-readable kind, used in API responses and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::OutOfRange { .. } => "out_of_range",
            ValidationError::InvalidFormat { .. } => "invalid_format",
            ValidationError::InvalidDate { .. } => "invalid_date",
            ValidationError::MissingRequiredField(_) => "missing_required_field",
            ValidationError::InvalidTemporalOrder { .. } => "invalid_temporal_order",
        }
    }

    /// Raw field(s) the error refers to
    pub fn fields(&self) -> Vec<&'static str> {
        match self {
            ValidationError::OutOfRange { field, .. }
            | ValidationError::InvalidFormat { field, .. }
            | ValidationError::InvalidDate { field, .. }
            | ValidationError::MissingRequiredField(field) => vec![field],
            ValidationError::InvalidTemporalOrder { earlier, later, .. } => vec![earlier, later],
        }
    }
}

/// All validation errors collected for one request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    /// Errors in detection order
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    /// Create an empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error
    pub fn push(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Fold the outcome of a fallible step into the report
    pub fn capture<T>(&mut self, result: Result<T, ValidationError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.push(e);
                None
            }
        }
    }

    /// Whether no error was recorded
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Whether any recorded error matches the predicate
    pub fn contains(&self, predicate: impl Fn(&ValidationError) -> bool) -> bool {
        self.errors.iter().any(predicate)
    }
}

impl From<ValidationError> for ValidationReport {
    fn from(error: ValidationError) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} validation error(s)", self.errors.len())?;
        for (i, error) in self.errors.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{}{}", sep, error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationReport {}

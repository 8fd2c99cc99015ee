//! Validation error types

use std::fmt;

/// Validation error for tweet query parameters
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Coordinate is NaN or infinite
    NotFinite { field: &'static str },

    /// Date is neither RFC 3339, `YYYY-MM-DD`, nor epoch milliseconds
    InvalidDate { field: &'static str, value: String },

    /// Offset below zero
    NegativeOffset { value: i64 },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFinite { field } => write!(f, "{} must be a finite number", field),
            Self::InvalidDate { field, value } => {
                write!(f, "invalid {} value: '{}'", field, value)
            }
            Self::NegativeOffset { value } => {
                write!(f, "offset must not be negative, got {}", value)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ValidationError::InvalidDate {
            field: "mindate",
            value: "yesterday".into(),
        };
        assert_eq!(err.to_string(), "invalid mindate value: 'yesterday'");
    }
}

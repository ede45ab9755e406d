//! Validation errors raised at the edit boundary

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Latitude out of range: {0}")]
    LatitudeOutOfRange(f64),

    #[error("Longitude out of range: {0}")]
    LongitudeOutOfRange(f64),

    #[error("{0} must be a finite number")]
    NotFinite(&'static str),

    #[error("Confidence out of range: {0}")]
    ConfidenceOutOfRange(f64),

    #[error("Link thickness must be between 1 and 5, got {0}")]
    ThicknessOutOfRange(u8),

    #[error("Tag cannot be empty")]
    EmptyTag,

    #[error("Property key cannot be empty")]
    EmptyPropertyKey,

    #[error("Date range ends before it starts")]
    InvalidDateRange,
}

use thiserror::Error;

use crate::ride::RideStatus;

#[derive(Debug, Error, PartialEq)]
pub enum CoreError {
    #[error("rating must be between 1 and 5 stars, got {0}")]
    InvalidRating(u8),

    #[error("cannot move ride from {from} to {to}")]
    InvalidTransition { from: RideStatus, to: RideStatus },

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("unknown {kind}: {value:?}")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("commission rate must be within 0.0..=1.0, got {0}")]
    InvalidCommissionRate(f64),
}

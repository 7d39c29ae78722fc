//! Error types for the Outbox Core.

use thiserror::Error;

/// Validation errors for operations submitted to the outbox.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("endpoint must not be empty")]
    EmptyEndpoint,

    #[error("parameter names must not be empty")]
    EmptyParameterName,

    #[error("parameter {0} is not a finite number")]
    NonFiniteParameter(String),
}

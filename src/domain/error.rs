//! Error taxonomy for detection runs
//!
//! Data-quality problems on individual reads are not errors: they are logged,
//! counted in `RunStats` and the run continues.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DetectionError {
    /// Invalid window, threshold or limit values; raised before any scanning
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Malformed date/time filter strings
    #[error("Invalid filter: {0}")]
    Validation(String),

    /// A defect, never bad input
    #[error("Internal invariant violated: {0}")]
    InternalInvariant(String),

    #[error("Input too dense: {reason} ({observed} > {limit})")]
    InputTooDense { reason: &'static str, observed: usize, limit: usize },

    #[error("Detection timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

impl DetectionError {
    /// Client-facing errors caused by the request rather than by the service
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            DetectionError::Configuration(_)
                | DetectionError::Validation(_)
                | DetectionError::InputTooDense { .. }
        )
    }

    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            DetectionError::Configuration(_) => "configuration",
            DetectionError::Validation(_) => "validation",
            DetectionError::InternalInvariant(_) => "internal_invariant",
            DetectionError::InputTooDense { .. } => "input_too_dense",
            DetectionError::Timeout { .. } => "timeout",
        }
    }
}

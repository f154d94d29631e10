use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("guardrail violated: {0}")]
    GuardrailViolation(String),

    #[error("illegal state transition: {from} -> {to}")]
    StateTransitionError { from: String, to: String },

    #[error("internal invariant violated: {0}")]
    InternalInvariantViolation(String),
}

impl reliability::Attemptable for AnalysisError {
    /// Only failures that plausibly come from a flaky upstream API are
    /// worth retrying; validation and invariant failures never are.
    fn is_retryable(&self) -> bool {
        matches!(self, AnalysisError::ApiError(_) | AnalysisError::CacheError(_))
    }
}

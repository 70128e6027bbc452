use thiserror::Error;

/// Error taxonomy for the training core.
///
/// Configuration errors (`UnknownStep`, `MissingEntry`, `UnknownParam`,
/// `InvalidParam`, `DuplicateWorkflow`) fail fast and are not recoverable.
/// Data validation errors fail the affected call; numeric edge cases are not
/// represented here, they propagate through floating-point semantics.
#[derive(Debug, Error)]
pub enum PredageError {
    #[error("step type '{0}' not recognized")]
    UnknownStep(String),

    #[error("entry '{0}' not found in configuration")]
    MissingEntry(String),

    #[error("unknown parameter '{param}' for '{target}'")]
    UnknownParam { target: String, param: String },

    #[error("invalid value for parameter '{param}': {reason}")]
    InvalidParam { param: String, reason: String },

    #[error("step '{0}' is an estimator and cannot be used as a processing step")]
    MisplacedEstimator(String),

    #[error("step '{0}' is a processing step, not an estimator")]
    NotAnEstimator(String),

    #[error("duplicate workflow '{0}' in experiment")]
    DuplicateWorkflow(String),

    #[error("column '{0}' not found")]
    MissingColumn(String),

    #[error("column '{column}' contains values outside the fitted range [{lo}, {hi}]")]
    OutOfDomain { column: String, lo: f64, hi: f64 },

    #[error("length mismatch: expected {expected}, got {got}")]
    LengthMismatch { expected: usize, got: usize },

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("model type '{0}' not supported")]
    UnsupportedModel(String),

    #[error("model has not been fitted")]
    NotFitted,

    #[error("numeric failure: {0}")]
    Numeric(String),
}

pub type Result<T> = std::result::Result<T, PredageError>;

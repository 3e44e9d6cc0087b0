//! Error taxonomy for the inference pipeline

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors raised while loading the pipeline or serving a prediction.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Payload failed type or shape checks
    #[error("validation failed: {0}")]
    Validation(String),

    /// Strict mode: request key without a translation entry
    #[error("unknown field '{0}'")]
    UnknownField(String),

    /// Required canonical columns absent from the record
    #[error("missing required columns: {}", .columns.join(", "))]
    MissingColumns { columns: Vec<String> },

    /// Non-finite numeric input
    #[error("non-finite value {value} for column '{column}'")]
    InvalidValue { column: String, value: f64 },

    /// A record of a batch failed; the whole batch is aborted
    #[error("record {index}: {source}")]
    BatchRecord {
        index: usize,
        #[source]
        source: Box<PipelineError>,
    },

    /// Artifact could not be loaded or validated at startup
    #[error("failed to load pipeline artifact: {0}")]
    PipelineLoad(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn load(msg: impl Into<String>) -> Self {
        PipelineError::PipelineLoad(msg.into())
    }

    /// Whether the caller is at fault (as opposed to the server).
    pub fn is_client_error(&self) -> bool {
        match self {
            PipelineError::Validation(_)
            | PipelineError::UnknownField(_)
            | PipelineError::MissingColumns { .. }
            | PipelineError::InvalidValue { .. } => true,
            PipelineError::BatchRecord { source, .. } => source.is_client_error(),
            PipelineError::PipelineLoad(_) | PipelineError::Internal(_) => false,
        }
    }

    /// Stable snake_case identifier used in error bodies and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validation_error",
            PipelineError::UnknownField(_) => "unknown_field",
            PipelineError::MissingColumns { .. } => "missing_columns",
            PipelineError::InvalidValue { .. } => "invalid_value",
            PipelineError::BatchRecord { source, .. } => source.kind(),
            PipelineError::PipelineLoad(_) => "pipeline_load_error",
            PipelineError::Internal(_) => "internal_error",
        }
    }

    /// Innermost error, unwrapping batch context.
    pub fn root(&self) -> &PipelineError {
        match self {
            PipelineError::BatchRecord { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Validation(format!("malformed JSON: {}", err))
    }
}

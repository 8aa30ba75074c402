use thiserror::Error;

/// Errors surfaced by the analysis pipeline.
///
/// Every variant is terminal for the request that triggered it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Failed to parse upload: {0}")]
    Parse(String),

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Not authorized to access {entity} '{id}'")]
    Forbidden { entity: &'static str, id: String },

    #[error("Column '{0}' not found in headers")]
    UnknownColumn(String),

    #[error("Unsupported plot type: {0}")]
    UnsupportedChartType(String),

    #[error("{0}")]
    Validation(String),

    #[error("Failed to render analysis: {0}")]
    Render(String),

    #[error("Storage failure: {0}")]
    Storage(String),
}

/// Coarse status buckets a transport can map onto its own codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    ClientError,
    NotFound,
    Forbidden,
    ServerError,
}

impl AnalysisError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        AnalysisError::NotFound { entity, id: id.into() }
    }

    pub fn forbidden(entity: &'static str, id: impl Into<String>) -> Self {
        AnalysisError::Forbidden { entity, id: id.into() }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            AnalysisError::Parse(_)
            | AnalysisError::UnknownColumn(_)
            | AnalysisError::UnsupportedChartType(_)
            | AnalysisError::Validation(_) => ErrorCategory::ClientError,
            AnalysisError::NotFound { .. } => ErrorCategory::NotFound,
            AnalysisError::Forbidden { .. } => ErrorCategory::Forbidden,
            AnalysisError::Render(_) | AnalysisError::Storage(_) => ErrorCategory::ServerError,
        }
    }
}

impl From<csv::Error> for AnalysisError {
    fn from(e: csv::Error) -> Self {
        AnalysisError::Parse(e.to_string())
    }
}

impl From<std::io::Error> for AnalysisError {
    fn from(e: std::io::Error) -> Self {
        AnalysisError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

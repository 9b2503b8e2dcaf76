use thiserror::Error;

pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Failure talking to an external collaborator (NPPES, ClinicalTrials.gov).
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(err.to_string())
    }
}

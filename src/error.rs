//! Error types for the analysis pipeline.
//!
//! Every collaborator of the orchestrator reports failures through
//! [`Error`]. The HTTP layer collapses all of them into a generic 500
//! response, so the detail carried here is meant for logs only.

/// Result alias used across the pipeline.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures raised while resolving, staging, analyzing or persisting.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The head revision could not be fetched or decoded.
    #[error("failed to resolve head revision of {repo}: {reason}")]
    Resolution { repo: String, reason: String },

    /// The repository could not be materialized on local storage.
    #[error("failed to stage {repo}: {reason}")]
    Staging { repo: String, reason: String },

    /// The external analyzer could not be run or its output was unusable.
    #[error("analysis failed: {0}")]
    Analysis(String),

    /// A record with the same URL already exists.
    #[error("repository already stored: {0}")]
    Duplicate(String),

    /// Any other read/write failure of the repository store.
    #[error("storage error: {0}")]
    Persistence(String),

    /// Malformed caller input (pagination bounds, repository identifiers).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Short, stable label for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Resolution { .. } => "resolution",
            Error::Staging { .. } => "staging",
            Error::Analysis(_) => "analysis",
            Error::Duplicate(_) => "duplicate",
            Error::Persistence(_) => "persistence",
            Error::InvalidArgument(_) => "invalid_argument",
        }
    }

    pub(crate) fn resolution(repo: impl ToString, reason: impl ToString) -> Self {
        Error::Resolution {
            repo: repo.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn staging(repo: impl ToString, reason: impl ToString) -> Self {
        Error::Staging {
            repo: repo.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Persistence(format!("malformed repository document: {}", e))
    }
}

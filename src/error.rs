use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Every issue found while checking input tables, never only the first one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationError {
    pub issues: Vec<String>,
}

impl ValidationError {
    pub fn new(issues: Vec<String>) -> Self {
        Self { issues }
    }

    pub fn single(issue: impl Into<String>) -> Self {
        Self {
            issues: vec![issue.into()],
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.issues.join(ISSUE_SEPARATOR))
    }
}

impl std::error::Error for ValidationError {}

/// Separator used when the issue list is flattened into a single message.
pub const ISSUE_SEPARATOR: &str = "; ";

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("job already running")]
    Conflict,

    #[error("missing input: {what}")]
    NotFound { what: String },

    #[error("solver failure: {0}")]
    Solver(String),

    #[error("cannot persist result to {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl Error {
    /// Taxonomy name reported to control-surface clients.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::Conflict => "conflict",
            Error::NotFound { .. } => "not_found",
            Error::Solver(_) => "solver",
            Error::Persistence { .. } => "persistence",
            Error::Config(_) => "config",
            Error::Io(_) | Error::Json(_) | Error::Csv(_) => "internal",
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrellisError {
    #[error("template not found: {kind}/{name}")]
    TemplateNotFound { name: String, kind: String },

    #[error("malformed document {}: {reason}", .path.display())]
    MalformedDocument { path: PathBuf, reason: String },

    #[error("invalid name '{0}': must be lowercase alphanumeric with '-' or '_'")]
    InvalidName(String),

    #[error("no {0} template location is configured")]
    NoWritableLocation(String),

    #[error("issue not found: #{0}")]
    IssueNotFound(u64),

    #[error("milestone not found: {0}")]
    MilestoneNotFound(u64),

    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("column '{column}' not found in project {project}")]
    ColumnNotFound { project: String, column: String },

    #[error("project {0} has no columns")]
    NoColumns(String),

    #[error("no tasks found in issue #{0}")]
    NoTasksFound(u64),

    #[error("task conversion for #{parent} aborted after creating {created:?}: {source}")]
    ConversionAborted {
        parent: u64,
        created: Vec<u64>,
        #[source]
        source: Box<TrellisError>,
    },

    #[error("body of issue #{number} changed during conversion; created {created:?} were not linked")]
    BodyChanged { number: u64, created: Vec<u64> },

    #[error("remote request failed ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("invalid repository '{0}': expected owner/repo")]
    InvalidRepo(String),

    #[error("no GitHub token: set GITHUB_TOKEN or GH_TOKEN")]
    MissingToken,

    #[error("home directory not found: set HOME environment variable")]
    HomeNotFound,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl TrellisError {
    /// Child issues created before the operation failed, if any.
    pub fn created_children(&self) -> &[u64] {
        match self {
            TrellisError::ConversionAborted { created, .. }
            | TrellisError::BodyChanged { created, .. } => created,
            _ => &[],
        }
    }
}

pub type Result<T> = std::result::Result<T, TrellisError>;

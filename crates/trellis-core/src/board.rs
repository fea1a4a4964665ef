//! Project boards built from `project/*` templates.

use crate::document::{Document, Value};
use crate::error::{Result, TrellisError};
use crate::labels::{self, LabelResult};
use crate::tracker::{IssueTracker, NewLabel, NewProject, Project, ProjectCard, ProjectOwner};
use serde::Serialize;

/// What a project template asks for.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BoardTemplate {
    pub columns: Vec<String>,
    pub labels: Vec<NewLabel>,
    /// Free-form `automation` section, kept for display only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub automation: Option<Value>,
}

impl BoardTemplate {
    /// Columns are listed in order under `columns`, either as plain names or
    /// as mappings with a `name` key. Blank and repeated names are dropped.
    pub fn from_document(doc: &Document) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for entry in doc.get("columns").and_then(Value::as_sequence).unwrap_or(&[]) {
            let name = match entry {
                Value::Mapping(m) => m.get("name").and_then(Value::to_scalar_string),
                other => other.to_scalar_string(),
            };
            match name.map(|n| n.trim().to_string()) {
                Some(n) if !n.is_empty() && !columns.contains(&n) => columns.push(n),
                Some(n) if !n.is_empty() => tracing::warn!(column = %n, "ignoring repeated column"),
                _ => tracing::warn!("ignoring template column without a name"),
            }
        }
        Self {
            columns,
            labels: labels::from_template(doc),
            automation: doc.get("automation").cloned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardOutcome {
    pub project: Project,
    pub labels: Vec<LabelResult>,
}

/// Create the board, then the template's labels. Labels live on a
/// repository, so they are only created for repository boards.
pub fn create_board<T: IssueTracker + ?Sized>(
    tracker: &mut T,
    new: &NewProject,
    labels: &[NewLabel],
) -> Result<BoardOutcome> {
    if new.columns.is_empty() {
        return Err(TrellisError::NoColumns(new.title.clone()));
    }
    let project = tracker.create_project(new)?;
    tracing::info!(project = %project.id, columns = project.columns.len(), "created project board");

    let labels = match new.owner {
        ProjectOwner::Repository => labels::ensure(tracker, labels),
        _ if labels.is_empty() => Vec::new(),
        _ => {
            tracing::info!(count = labels.len(), "skipping template labels for a board without a repository");
            Vec::new()
        }
    };
    Ok(BoardOutcome { project, labels })
}

/// Pick the column an issue should land in: a case-insensitive match on
/// `requested`, or the first column when none is requested.
pub fn resolve_column<'a>(project: &'a Project, requested: Option<&str>) -> Result<&'a str> {
    let Some(first) = project.columns.first() else {
        return Err(TrellisError::NoColumns(project.id.clone()));
    };
    let Some(requested) = requested else {
        return Ok(first);
    };
    project
        .columns
        .iter()
        .find(|c| c.eq_ignore_ascii_case(requested.trim()))
        .map(String::as_str)
        .ok_or_else(|| TrellisError::ColumnNotFound {
            project: project.id.clone(),
            column: requested.to_string(),
        })
}

/// Put an existing issue on a board.
pub fn add_issue<T: IssueTracker + ?Sized>(
    tracker: &mut T,
    project_id: &str,
    issue_number: u64,
    column: Option<&str>,
) -> Result<ProjectCard> {
    let project = tracker.get_project(project_id)?;
    let column = resolve_column(&project, column)?;
    let card = tracker.add_issue_to_project(&project.id, issue_number, column)?;
    tracing::info!(project = project_id, issue = issue_number, column, "added issue to project");
    Ok(card)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

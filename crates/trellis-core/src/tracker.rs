use crate::error::{Result, TrellisError};
use crate::roadmap::{Milestone, MilestoneState};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueState {
    Open,
    Closed,
}

impl fmt::Display for IssueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IssueState::Open => "open",
            IssueState::Closed => "closed",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
    #[serde(default)]
    pub assignees: Vec<String>,
    pub state: IssueState,
    pub milestone: Option<String>,
    pub html_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NewIssue {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub assignees: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone: Option<u64>,
}

/// Fields left as `None` are not sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IssuePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<IssueState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignees: Option<Vec<String>>,
    /// `Some(None)` detaches the issue from its milestone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone: Option<Option<u64>>,
}

impl IssuePatch {
    pub fn body(body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            ..Self::default()
        }
    }

    pub fn close() -> Self {
        Self {
            state: Some(IssueState::Closed),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateFilter {
    Open,
    Closed,
    #[default]
    All,
}

impl StateFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            StateFilter::Open => "open",
            StateFilter::Closed => "closed",
            StateFilter::All => "all",
        }
    }
}

/// Issues matching the state and carrying every listed label.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IssueFilter {
    pub state: StateFilter,
    pub labels: Vec<String>,
}

impl IssueFilter {
    pub fn matches(&self, issue: &Issue) -> bool {
        let state_ok = match self.state {
            StateFilter::All => true,
            StateFilter::Open => issue.state == IssueState::Open,
            StateFilter::Closed => issue.state == IssueState::Closed,
        };
        state_ok && self.labels.iter().all(|l| issue.labels.contains(l))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NewMilestone {
    pub title: String,
    pub description: String,
    pub due_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MilestonePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<MilestoneState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_on: Option<NaiveDate>,
}

impl MilestonePatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewLabel {
    pub name: String,
    pub color: String,
    pub description: String,
}

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

/// Who a new project board belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "login", rename_all = "snake_case")]
pub enum ProjectOwner {
    /// The authenticated user.
    Viewer,
    Organization(String),
    /// The tracker's repository: owned by the repository owner and linked to
    /// the repository.
    Repository,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewProject {
    pub title: String,
    pub description: String,
    pub owner: ProjectOwner,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub number: u64,
    pub title: String,
    pub description: String,
    pub url: String,
    pub columns: Vec<String>,
    pub cards: Vec<ProjectCard>,
}

impl Project {
    /// Cards filed under `column`, in board order.
    pub fn cards_in<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a ProjectCard> {
        self.cards
            .iter()
            .filter(move |c| c.column.as_deref() == Some(column))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectCard {
    pub id: String,
    pub column: Option<String>,
    pub issue: Option<u64>,
    pub title: String,
}

// ---------------------------------------------------------------------------
// IssueTracker
// ---------------------------------------------------------------------------

/// The remote system holding issues, milestones and project boards. Every
/// call is blocking and is tried once; failures come back as
/// `TrellisError::Remote` or one of the not-found variants.
pub trait IssueTracker {
    fn get_issue(&mut self, number: u64) -> Result<Issue>;

    fn list_issues(&mut self, filter: &IssueFilter) -> Result<Vec<Issue>>;

    fn create_issue(&mut self, issue: &NewIssue) -> Result<Issue>;

    fn update_issue(&mut self, number: u64, patch: &IssuePatch) -> Result<Issue>;

    fn list_milestones(&mut self) -> Result<Vec<Milestone>>;

    fn create_milestone(&mut self, milestone: &NewMilestone) -> Result<Milestone>;

    fn update_milestone(&mut self, number: u64, patch: &MilestonePatch) -> Result<Milestone>;

    fn delete_milestone(&mut self, number: u64) -> Result<()>;

    /// Returns `false` when a label with that name already exists.
    fn create_label(&mut self, label: &NewLabel) -> Result<bool>;

    fn create_project(&mut self, project: &NewProject) -> Result<Project>;

    fn get_project(&mut self, id: &str) -> Result<Project>;

    /// `column` must name one of the project's columns exactly.
    fn add_issue_to_project(
        &mut self,
        project_id: &str,
        issue_number: u64,
        column: &str,
    ) -> Result<ProjectCard>;
}

// ---------------------------------------------------------------------------
// MemoryTracker
// ---------------------------------------------------------------------------

/// In-process tracker. Numbers are assigned sequentially from 1, shared by
/// issues and milestones like on GitHub's issue counter.
#[derive(Default)]
pub struct MemoryTracker {
    issues: BTreeMap<u64, Issue>,
    milestones: BTreeMap<u64, Milestone>,
    projects: BTreeMap<String, Project>,
    labels: Vec<NewLabel>,
    next_number: u64,
    fail_creates_after: Option<usize>,
    creates: usize,
    updates: usize,
    on_get: Option<Box<dyn FnMut(&mut Issue)>>,
}

impl fmt::Debug for MemoryTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTracker")
            .field("issues", &self.issues.len())
            .field("milestones", &self.milestones.len())
            .field("projects", &self.projects.len())
            .field("creates", &self.creates)
            .field("updates", &self.updates)
            .finish_non_exhaustive()
    }
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an issue directly, bypassing the create counter.
    pub fn seed_issue(&mut self, title: &str, body: &str) -> u64 {
        let number = self.allocate();
        self.issues
            .insert(number, make_issue(number, title, body, Vec::new()));
        number
    }

    pub fn seed_milestone(&mut self, milestone: Milestone) {
        self.next_number = self.next_number.max(milestone.number);
        self.milestones.insert(milestone.number, milestone);
    }

    /// Let the first `n` `create_issue` calls succeed and fail the rest.
    pub fn fail_creates_after(&mut self, n: usize) {
        self.fail_creates_after = Some(n);
    }

    /// Run `hook` against the stored issue on every `get_issue`, before it is
    /// returned. Simulates concurrent edits.
    pub fn on_get(&mut self, hook: impl FnMut(&mut Issue) + 'static) {
        self.on_get = Some(Box::new(hook));
    }

    pub fn issue(&self, number: u64) -> Option<&Issue> {
        self.issues.get(&number)
    }

    pub fn issues(&self) -> impl Iterator<Item = &Issue> {
        self.issues.values()
    }

    pub fn milestone(&self, number: u64) -> Option<&Milestone> {
        self.milestones.get(&number)
    }

    pub fn projects(&self) -> impl Iterator<Item = &Project> {
        self.projects.values()
    }

    pub fn labels(&self) -> &[NewLabel] {
        &self.labels
    }

    pub fn create_count(&self) -> usize {
        self.creates
    }

    pub fn update_count(&self) -> usize {
        self.updates
    }

    fn allocate(&mut self) -> u64 {
        self.next_number += 1;
        self.next_number
    }

    fn milestone_title(&self, number: u64) -> Result<String> {
        self.milestones
            .get(&number)
            .map(|m| m.title.clone())
            .ok_or(TrellisError::MilestoneNotFound(number))
    }
}

fn make_issue(number: u64, title: &str, body: &str, labels: Vec<String>) -> Issue {
    Issue {
        number,
        title: title.to_string(),
        body: body.to_string(),
        labels,
        assignees: Vec::new(),
        state: IssueState::Open,
        milestone: None,
        html_url: format!("memory://issues/{number}"),
    }
}

impl IssueTracker for MemoryTracker {
    fn get_issue(&mut self, number: u64) -> Result<Issue> {
        let issue = self
            .issues
            .get_mut(&number)
            .ok_or(TrellisError::IssueNotFound(number))?;
        if let Some(hook) = self.on_get.as_mut() {
            hook(issue);
        }
        Ok(issue.clone())
    }

    fn list_issues(&mut self, filter: &IssueFilter) -> Result<Vec<Issue>> {
        Ok(self
            .issues
            .values()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect())
    }

    fn create_issue(&mut self, new: &NewIssue) -> Result<Issue> {
        if self.fail_creates_after.is_some_and(|n| self.creates >= n) {
            return Err(TrellisError::Remote {
                status: 502,
                message: "injected create failure".to_string(),
            });
        }
        let milestone = new.milestone.map(|m| self.milestone_title(m)).transpose()?;
        self.creates += 1;
        let number = self.allocate();
        let mut issue = make_issue(number, &new.title, &new.body, new.labels.clone());
        issue.assignees = new.assignees.clone();
        issue.milestone = milestone;
        self.issues.insert(number, issue.clone());
        Ok(issue)
    }

    fn update_issue(&mut self, number: u64, patch: &IssuePatch) -> Result<Issue> {
        let milestone = match patch.milestone {
            Some(Some(m)) => Some(Some(self.milestone_title(m)?)),
            Some(None) => Some(None),
            None => None,
        };
        let issue = self
            .issues
            .get_mut(&number)
            .ok_or(TrellisError::IssueNotFound(number))?;
        if let Some(title) = &patch.title {
            issue.title = title.clone();
        }
        if let Some(body) = &patch.body {
            issue.body = body.clone();
        }
        if let Some(state) = patch.state {
            issue.state = state;
        }
        if let Some(labels) = &patch.labels {
            issue.labels = labels.clone();
        }
        if let Some(assignees) = &patch.assignees {
            issue.assignees = assignees.clone();
        }
        if let Some(m) = milestone {
            issue.milestone = m;
        }
        self.updates += 1;
        Ok(issue.clone())
    }

    fn list_milestones(&mut self) -> Result<Vec<Milestone>> {
        Ok(self.milestones.values().cloned().collect())
    }

    fn create_milestone(&mut self, new: &NewMilestone) -> Result<Milestone> {
        let number = self.allocate();
        let milestone = Milestone {
            number,
            title: new.title.clone(),
            description: new.description.clone(),
            due_on: new.due_on,
            state: MilestoneState::Open,
            open_issues: 0,
            closed_issues: 0,
            html_url: format!("memory://milestones/{number}"),
        };
        self.milestones.insert(number, milestone.clone());
        Ok(milestone)
    }

    fn update_milestone(&mut self, number: u64, patch: &MilestonePatch) -> Result<Milestone> {
        let m = self
            .milestones
            .get_mut(&number)
            .ok_or(TrellisError::MilestoneNotFound(number))?;
        if let Some(title) = &patch.title {
            m.title = title.clone();
        }
        if let Some(description) = &patch.description {
            m.description = description.clone();
        }
        if let Some(state) = patch.state {
            m.state = state;
        }
        if let Some(due) = patch.due_on {
            m.due_on = Some(due);
        }
        Ok(m.clone())
    }

    fn delete_milestone(&mut self, number: u64) -> Result<()> {
        self.milestones
            .remove(&number)
            .map(|_| ())
            .ok_or(TrellisError::MilestoneNotFound(number))
    }

    fn create_label(&mut self, label: &NewLabel) -> Result<bool> {
        if self.labels.iter().any(|l| l.name == label.name) {
            return Ok(false);
        }
        self.labels.push(label.clone());
        Ok(true)
    }

    fn create_project(&mut self, new: &NewProject) -> Result<Project> {
        let number = self.projects.len() as u64 + 1;
        let project = Project {
            id: format!("PVT_{number}"),
            number,
            title: new.title.clone(),
            description: new.description.clone(),
            url: format!("memory://projects/{number}"),
            columns: new.columns.clone(),
            cards: Vec::new(),
        };
        self.projects.insert(project.id.clone(), project.clone());
        Ok(project)
    }

    fn get_project(&mut self, id: &str) -> Result<Project> {
        self.projects
            .get(id)
            .cloned()
            .ok_or_else(|| TrellisError::ProjectNotFound(id.to_string()))
    }

    fn add_issue_to_project(
        &mut self,
        project_id: &str,
        issue_number: u64,
        column: &str,
    ) -> Result<ProjectCard> {
        let title = self
            .issues
            .get(&issue_number)
            .map(|i| i.title.clone())
            .ok_or(TrellisError::IssueNotFound(issue_number))?;
        let project = self
            .projects
            .get_mut(project_id)
            .ok_or_else(|| TrellisError::ProjectNotFound(project_id.to_string()))?;
        if !project.columns.iter().any(|c| c == column) {
            return Err(TrellisError::ColumnNotFound {
                project: project_id.to_string(),
                column: column.to_string(),
            });
        }
        let card = ProjectCard {
            id: format!("{project_id}_ITEM_{}", project.cards.len() + 1),
            column: Some(column.to_string()),
            issue: Some(issue_number),
            title,
        };
        project.cards.push(card.clone());
        Ok(card)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn open_milestone(t: &mut MemoryTracker, title: &str) -> u64 {
        t.create_milestone(&NewMilestone {
            title: title.to_string(),
            ..NewMilestone::default()
        })
        .unwrap()
        .number
    }

    #[test]
    fn create_get_update() {
        let mut t = MemoryTracker::new();
        let created = t
            .create_issue(&NewIssue {
                title: "Write docs".to_string(),
                labels: vec!["docs".to_string()],
                ..NewIssue::default()
            })
            .unwrap();
        assert_eq!(created.number, 1);
        assert_eq!(created.state, IssueState::Open);

        t.update_issue(1, &IssuePatch::close()).unwrap();
        let fetched = t.get_issue(1).unwrap();
        assert_eq!(fetched.state, IssueState::Closed);
        assert_eq!(fetched.labels, vec!["docs"]);
    }

    #[test]
    fn missing_issue_is_not_found() {
        let mut t = MemoryTracker::new();
        assert!(matches!(t.get_issue(7), Err(TrellisError::IssueNotFound(7))));
        assert!(matches!(
            t.update_issue(7, &IssuePatch::body("x")),
            Err(TrellisError::IssueNotFound(7))
        ));
    }

    #[test]
    fn injected_failure_after_n_creates() {
        let mut t = MemoryTracker::new();
        t.fail_creates_after(1);
        let new = NewIssue {
            title: "a".to_string(),
            ..NewIssue::default()
        };
        assert!(t.create_issue(&new).is_ok());
        assert!(matches!(
            t.create_issue(&new),
            Err(TrellisError::Remote { status: 502, .. })
        ));
    }

    #[test]
    fn duplicate_label_reports_false() {
        let mut t = MemoryTracker::new();
        let label = NewLabel {
            name: "blocked".to_string(),
            color: "B60205".to_string(),
            description: String::new(),
        };
        assert!(t.create_label(&label).unwrap());
        assert!(!t.create_label(&label).unwrap());
        assert_eq!(t.labels().len(), 1);
    }

    #[test]
    fn patch_sets_assignees_and_milestone() {
        let mut t = MemoryTracker::new();
        let m = open_milestone(&mut t, "v1");
        let n = t.seed_issue("Task", "");

        let patch = IssuePatch {
            assignees: Some(vec!["octocat".to_string()]),
            milestone: Some(Some(m)),
            ..IssuePatch::default()
        };
        let updated = t.update_issue(n, &patch).unwrap();
        assert_eq!(updated.assignees, vec!["octocat"]);
        assert_eq!(updated.milestone.as_deref(), Some("v1"));

        let cleared = t
            .update_issue(
                n,
                &IssuePatch {
                    milestone: Some(None),
                    ..IssuePatch::default()
                },
            )
            .unwrap();
        assert!(cleared.milestone.is_none());
        assert_eq!(cleared.assignees, vec!["octocat"]);

        assert!(matches!(
            t.update_issue(
                n,
                &IssuePatch {
                    milestone: Some(Some(999)),
                    ..IssuePatch::default()
                }
            ),
            Err(TrellisError::MilestoneNotFound(999))
        ));
    }

    #[test]
    fn patch_serializes_cleared_milestone_as_null() {
        let patch = IssuePatch {
            milestone: Some(None),
            ..IssuePatch::default()
        };
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            serde_json::json!({ "milestone": null })
        );
        assert!(IssuePatch::default().is_empty());
        assert!(!patch.is_empty());
    }

    #[test]
    fn list_filters_by_state_and_every_label() {
        let mut t = MemoryTracker::new();
        let a = t
            .create_issue(&NewIssue {
                title: "a".to_string(),
                labels: vec!["bug".to_string(), "ui".to_string()],
                ..NewIssue::default()
            })
            .unwrap()
            .number;
        let b = t
            .create_issue(&NewIssue {
                title: "b".to_string(),
                labels: vec!["bug".to_string()],
                ..NewIssue::default()
            })
            .unwrap()
            .number;
        t.update_issue(b, &IssuePatch::close()).unwrap();

        let numbers = |t: &mut MemoryTracker, filter: IssueFilter| -> Vec<u64> {
            t.list_issues(&filter).unwrap().iter().map(|i| i.number).collect()
        };
        assert_eq!(numbers(&mut t, IssueFilter::default()), vec![a, b]);
        assert_eq!(
            numbers(
                &mut t,
                IssueFilter {
                    state: StateFilter::Open,
                    labels: vec!["bug".to_string()],
                }
            ),
            vec![a]
        );
        assert_eq!(
            numbers(
                &mut t,
                IssueFilter {
                    state: StateFilter::All,
                    labels: vec!["bug".to_string(), "ui".to_string()],
                }
            ),
            vec![a]
        );
        assert_eq!(
            numbers(
                &mut t,
                IssueFilter {
                    state: StateFilter::Closed,
                    labels: Vec::new(),
                }
            ),
            vec![b]
        );
    }

    #[test]
    fn milestone_update_and_delete() {
        let mut t = MemoryTracker::new();
        let m = open_milestone(&mut t, "v1");
        let updated = t
            .update_milestone(
                m,
                &MilestonePatch {
                    state: Some(MilestoneState::Closed),
                    due_on: NaiveDate::from_ymd_opt(2030, 1, 1),
                    ..MilestonePatch::default()
                },
            )
            .unwrap();
        assert_eq!(updated.title, "v1");
        assert_eq!(updated.state, MilestoneState::Closed);
        assert_eq!(updated.due_on, NaiveDate::from_ymd_opt(2030, 1, 1));

        t.delete_milestone(m).unwrap();
        assert!(t.milestone(m).is_none());
        assert!(matches!(
            t.delete_milestone(m),
            Err(TrellisError::MilestoneNotFound(n)) if n == m
        ));
    }

    #[test]
    fn project_cards_need_known_issue_and_column() {
        let mut t = MemoryTracker::new();
        let n = t.seed_issue("Login page", "");
        let project = t
            .create_project(&NewProject {
                title: "Board".to_string(),
                description: String::new(),
                owner: ProjectOwner::Repository,
                columns: vec!["To Do".to_string(), "Done".to_string()],
            })
            .unwrap();

        let card = t.add_issue_to_project(&project.id, n, "To Do").unwrap();
        assert_eq!(card.issue, Some(n));
        assert_eq!(card.title, "Login page");

        assert!(matches!(
            t.add_issue_to_project(&project.id, n, "Review"),
            Err(TrellisError::ColumnNotFound { .. })
        ));
        assert!(matches!(
            t.add_issue_to_project(&project.id, 404, "To Do"),
            Err(TrellisError::IssueNotFound(404))
        ));
        assert!(matches!(
            t.add_issue_to_project("PVT_missing", n, "To Do"),
            Err(TrellisError::ProjectNotFound(_))
        ));

        let fetched = t.get_project(&project.id).unwrap();
        assert_eq!(fetched.cards_in("To Do").count(), 1);
        assert_eq!(fetched.cards_in("Done").count(), 0);
    }
}

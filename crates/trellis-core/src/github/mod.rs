//! GitHub implementation of [`IssueTracker`]. Issues, milestones and labels
//! go through REST v3; project boards go through GraphQL (see [`projects`]).

use crate::error::{Result, TrellisError};
use crate::roadmap::{Milestone, MilestoneState};
use crate::tracker::{
    Issue, IssueFilter, IssuePatch, IssueState, IssueTracker, MilestonePatch, NewIssue, NewLabel,
    NewMilestone, NewProject, Project, ProjectCard,
};
use chrono::{DateTime, NaiveDate};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fmt;

mod projects;

const USER_AGENT: &str = concat!("trellis/", env!("CARGO_PKG_VERSION"));
const API_VERSION: &str = "2022-11-28";
const PAGE_SIZE: usize = 100;

/// Environment variables consulted for a token, in order.
pub const TOKEN_VARS: &[&str] = &["GITHUB_TOKEN", "GH_TOKEN"];

// ---------------------------------------------------------------------------
// RepoSlug
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSlug {
    pub owner: String,
    pub name: String,
}

impl RepoSlug {
    /// Parse `owner/repo`.
    pub fn parse(s: &str) -> Result<Self> {
        let valid = |part: &str| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };
        match s.trim().split_once('/') {
            Some((owner, name)) if valid(owner) && valid(name) => Ok(Self {
                owner: owner.to_string(),
                name: name.to_string(),
            }),
            _ => Err(TrellisError::InvalidRepo(s.to_string())),
        }
    }
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct WireLabel {
    name: String,
}

#[derive(Deserialize)]
struct WireUser {
    login: String,
}

#[derive(Deserialize)]
struct WireMilestoneRef {
    title: String,
}

#[derive(Deserialize)]
struct WireIssue {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    labels: Vec<WireLabel>,
    #[serde(default)]
    assignees: Vec<WireUser>,
    state: IssueState,
    #[serde(default)]
    milestone: Option<WireMilestoneRef>,
    #[serde(default)]
    html_url: String,
    /// Present only when the "issue" is a pull request.
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

impl From<WireIssue> for Issue {
    fn from(w: WireIssue) -> Self {
        Issue {
            number: w.number,
            title: w.title,
            body: w.body.unwrap_or_default(),
            labels: w.labels.into_iter().map(|l| l.name).collect(),
            assignees: w.assignees.into_iter().map(|u| u.login).collect(),
            state: w.state,
            milestone: w.milestone.map(|m| m.title),
            html_url: w.html_url,
        }
    }
}

#[derive(Deserialize)]
struct WireMilestone {
    number: u64,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    due_on: Option<String>,
    state: MilestoneState,
    #[serde(default)]
    open_issues: u64,
    #[serde(default)]
    closed_issues: u64,
    #[serde(default)]
    html_url: String,
}

/// GitHub reports `due_on` as a full timestamp; only the date is kept.
fn due_date(raw: &str) -> Option<NaiveDate> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.date_naive());
    }
    let parsed = raw
        .get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());
    if parsed.is_none() {
        tracing::warn!(due_on = raw, "ignoring unparseable milestone due date");
    }
    parsed
}

impl From<WireMilestone> for Milestone {
    fn from(w: WireMilestone) -> Self {
        Milestone {
            number: w.number,
            title: w.title,
            description: w.description.unwrap_or_default(),
            due_on: w.due_on.as_deref().and_then(due_date),
            state: w.state,
            open_issues: w.open_issues,
            closed_issues: w.closed_issues,
            html_url: w.html_url,
        }
    }
}

#[derive(Deserialize)]
struct WireError {
    message: String,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// GitHubClient
// ---------------------------------------------------------------------------

pub struct GitHubClient {
    http: Client,
    base_url: String,
    token: String,
    repo: RepoSlug,
}

impl fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubClient")
            .field("base_url", &self.base_url)
            .field("repo", &self.repo)
            .finish_non_exhaustive()
    }
}

fn transport(e: reqwest::Error) -> TrellisError {
    TrellisError::Remote {
        status: e.status().map_or(0, |s| s.as_u16()),
        message: e.to_string(),
    }
}

/// Map a 404 to the not-found variant that fits the call.
fn or_not_found(err: TrellisError, not_found: TrellisError) -> TrellisError {
    match err {
        TrellisError::Remote { status: 404, .. } => not_found,
        other => other,
    }
}

impl GitHubClient {
    pub fn new(base_url: &str, token: impl Into<String>, repo: RepoSlug) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(transport)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
            repo,
        })
    }

    /// Build a client with the token taken from `GITHUB_TOKEN` or `GH_TOKEN`.
    pub fn from_env(base_url: &str, repo: RepoSlug) -> Result<Self> {
        let token = TOKEN_VARS
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|t| !t.trim().is_empty())
            .ok_or(TrellisError::MissingToken)?;
        Self::new(base_url, token, repo)
    }

    pub fn repo(&self) -> &RepoSlug {
        &self.repo
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/{path}",
            self.base_url, self.repo.owner, self.repo.name
        )
    }

    fn send(&self, req: RequestBuilder) -> Result<Response> {
        let resp = req
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .send()
            .map_err(transport)?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let text = resp.text().unwrap_or_default();
        let message = match serde_json::from_str::<WireError>(&text) {
            Ok(w) if w.errors.is_empty() => w.message,
            Ok(w) => format!(
                "{}: {}",
                w.message,
                serde_json::Value::Array(w.errors)
            ),
            Err(_) if text.is_empty() => status.to_string(),
            Err(_) => text,
        };
        Err(TrellisError::Remote {
            status: status.as_u16(),
            message,
        })
    }

    fn json<T: DeserializeOwned>(resp: Response) -> Result<T> {
        resp.json().map_err(transport)
    }
}

/// Milestone request body; GitHub wants `due_on` as a timestamp.
fn milestone_body(
    title: Option<&str>,
    description: Option<&str>,
    state: Option<MilestoneState>,
    due_on: Option<NaiveDate>,
) -> serde_json::Value {
    let mut body = serde_json::Map::new();
    if let Some(title) = title {
        body.insert("title".into(), title.into());
    }
    if let Some(description) = description {
        body.insert("description".into(), description.into());
    }
    if let Some(state) = state {
        body.insert("state".into(), state.to_string().into());
    }
    if let Some(due) = due_on {
        body.insert("due_on".into(), format!("{due}T00:00:00Z").into());
    }
    serde_json::Value::Object(body)
}

impl IssueTracker for GitHubClient {
    fn get_issue(&mut self, number: u64) -> Result<Issue> {
        tracing::debug!(repo = %self.repo, number, "GET issue");
        let resp = self
            .send(self.http.get(self.url(&format!("issues/{number}"))))
            .map_err(|e| or_not_found(e, TrellisError::IssueNotFound(number)))?;
        Ok(Self::json::<WireIssue>(resp)?.into())
    }

    fn list_issues(&mut self, filter: &IssueFilter) -> Result<Vec<Issue>> {
        let mut out = Vec::new();
        for page in 1.. {
            tracing::debug!(repo = %self.repo, page, state = filter.state.as_str(), "GET issues");
            let mut query = vec![
                ("state", filter.state.as_str().to_string()),
                ("per_page", PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ];
            if !filter.labels.is_empty() {
                query.push(("labels", filter.labels.join(",")));
            }
            let req = self.http.get(self.url("issues")).query(&query);
            let batch: Vec<WireIssue> = Self::json(self.send(req)?)?;
            let done = batch.len() < PAGE_SIZE;
            out.extend(
                batch
                    .into_iter()
                    .filter(|w| w.pull_request.is_none())
                    .map(Issue::from),
            );
            if done {
                break;
            }
        }
        Ok(out)
    }

    fn create_issue(&mut self, issue: &NewIssue) -> Result<Issue> {
        tracing::debug!(repo = %self.repo, title = %issue.title, "POST issue");
        let resp = self.send(self.http.post(self.url("issues")).json(issue))?;
        Ok(Self::json::<WireIssue>(resp)?.into())
    }

    fn update_issue(&mut self, number: u64, patch: &IssuePatch) -> Result<Issue> {
        tracing::debug!(repo = %self.repo, number, "PATCH issue");
        let resp = self
            .send(
                self.http
                    .patch(self.url(&format!("issues/{number}")))
                    .json(patch),
            )
            .map_err(|e| or_not_found(e, TrellisError::IssueNotFound(number)))?;
        Ok(Self::json::<WireIssue>(resp)?.into())
    }

    fn list_milestones(&mut self) -> Result<Vec<Milestone>> {
        let mut out = Vec::new();
        for page in 1.. {
            tracing::debug!(repo = %self.repo, page, "GET milestones");
            let req = self.http.get(self.url("milestones")).query(&[
                ("state", "all".to_string()),
                ("per_page", PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ]);
            let batch: Vec<WireMilestone> = Self::json(self.send(req)?)?;
            let done = batch.len() < PAGE_SIZE;
            out.extend(batch.into_iter().map(Milestone::from));
            if done {
                break;
            }
        }
        Ok(out)
    }

    fn create_milestone(&mut self, milestone: &NewMilestone) -> Result<Milestone> {
        tracing::debug!(repo = %self.repo, title = %milestone.title, "POST milestone");
        let body = milestone_body(
            Some(&milestone.title),
            Some(&milestone.description),
            None,
            milestone.due_on,
        );
        let resp = self.send(self.http.post(self.url("milestones")).json(&body))?;
        Ok(Self::json::<WireMilestone>(resp)?.into())
    }

    fn update_milestone(&mut self, number: u64, patch: &MilestonePatch) -> Result<Milestone> {
        tracing::debug!(repo = %self.repo, number, "PATCH milestone");
        let body = milestone_body(
            patch.title.as_deref(),
            patch.description.as_deref(),
            patch.state,
            patch.due_on,
        );
        let resp = self
            .send(
                self.http
                    .patch(self.url(&format!("milestones/{number}")))
                    .json(&body),
            )
            .map_err(|e| or_not_found(e, TrellisError::MilestoneNotFound(number)))?;
        Ok(Self::json::<WireMilestone>(resp)?.into())
    }

    fn delete_milestone(&mut self, number: u64) -> Result<()> {
        tracing::debug!(repo = %self.repo, number, "DELETE milestone");
        self.send(self.http.delete(self.url(&format!("milestones/{number}"))))
            .map_err(|e| or_not_found(e, TrellisError::MilestoneNotFound(number)))?;
        Ok(())
    }

    fn create_label(&mut self, label: &NewLabel) -> Result<bool> {
        tracing::debug!(repo = %self.repo, name = %label.name, "POST label");
        let req = self.http.post(self.url("labels")).json(label);
        match self.send(req) {
            Ok(_) => Ok(true),
            Err(TrellisError::Remote { status: 422, message })
                if message.contains("already_exists") =>
            {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn create_project(&mut self, project: &NewProject) -> Result<Project> {
        self.create_project_v2(project)
    }

    fn get_project(&mut self, id: &str) -> Result<Project> {
        self.project_v2(id)
    }

    fn add_issue_to_project(
        &mut self,
        project_id: &str,
        issue_number: u64,
        column: &str,
    ) -> Result<ProjectCard> {
        self.add_project_v2_item(project_id, issue_number, column)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

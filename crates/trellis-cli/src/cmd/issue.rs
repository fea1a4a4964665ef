use crate::context::{self, Project};
use crate::output::{print_json, print_table};
use anyhow::{bail, Context};
use clap::Subcommand;
use std::path::{Path, PathBuf};
use trellis_core::hierarchy::{self, HierarchyBuilder};
use trellis_core::tracker::{
    IssueFilter, IssuePatch, IssueState, IssueTracker, NewIssue, StateFilter,
};

const PREVIEW_CHARS: usize = 200;

#[derive(Subcommand)]
pub enum IssueSubcommand {
    /// Create an issue, optionally from a template and under a parent
    Create {
        #[arg(long)]
        title: Option<String>,
        #[arg(long, conflicts_with = "body_file")]
        body: Option<String>,
        /// Read the body from a file
        #[arg(long)]
        body_file: Option<PathBuf>,
        /// Label to apply (repeatable)
        #[arg(long = "label")]
        labels: Vec<String>,
        /// Login to assign (repeatable)
        #[arg(long = "assignee")]
        assignees: Vec<String>,
        /// Milestone number
        #[arg(long)]
        milestone: Option<u64>,
        /// Link the new issue as a sub-issue of this one
        #[arg(long)]
        parent: Option<u64>,
        /// Issue template supplying labels and body
        #[arg(long)]
        template: Option<String>,
        /// Template overrides: inline JSON or a JSON/YAML file
        #[arg(long)]
        values: Option<String>,
        #[arg(long = "set", value_name = "PATH=VALUE")]
        sets: Vec<String>,
        #[arg(long)]
        repo: Option<String>,
        /// Show what would be created without calling GitHub
        #[arg(long)]
        dry_run: bool,
    },

    /// Turn the unchecked checklist of an issue into linked sub-issues
    ConvertTasks {
        issue: u64,
        /// Label for every created sub-issue (repeatable; default from config)
        #[arg(long = "label")]
        labels: Vec<String>,
        #[arg(long)]
        repo: Option<String>,
        #[arg(long)]
        dry_run: bool,
        /// With --dry-run, plan against this file instead of the live body
        #[arg(long, requires = "dry_run")]
        body_file: Option<PathBuf>,
    },

    /// Record CHILD as a sub-issue of PARENT
    Link {
        parent: u64,
        child: u64,
        #[arg(long)]
        repo: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },

    /// List issues, filtered by state and labels
    List {
        #[arg(long, value_parser = ["open", "closed", "all"], default_value = "all")]
        state: String,
        /// Only issues carrying this label (repeatable; all must match)
        #[arg(long = "label")]
        labels: Vec<String>,
        #[arg(long)]
        repo: Option<String>,
    },

    /// Change an issue's fields; labels and assignees replace the current set
    Update {
        number: u64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, conflicts_with = "body_file")]
        body: Option<String>,
        #[arg(long)]
        body_file: Option<PathBuf>,
        #[arg(long, value_parser = ["open", "closed"])]
        state: Option<String>,
        #[arg(long = "label")]
        labels: Vec<String>,
        #[arg(long = "assignee")]
        assignees: Vec<String>,
        /// Milestone number
        #[arg(long, conflicts_with = "no_milestone")]
        milestone: Option<u64>,
        /// Detach the issue from its milestone
        #[arg(long)]
        no_milestone: bool,
        #[arg(long)]
        repo: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },

    /// Close an issue
    Close {
        number: u64,
        #[arg(long)]
        repo: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },
}

pub fn run(root: &Path, subcmd: IssueSubcommand, json: bool) -> anyhow::Result<()> {
    let project = Project::load(root)?;
    match subcmd {
        IssueSubcommand::Create {
            title,
            body,
            body_file,
            labels,
            assignees,
            milestone,
            parent,
            template,
            values,
            sets,
            repo,
            dry_run,
        } => {
            let body = match body_file {
                Some(p) => Some(
                    std::fs::read_to_string(&p)
                        .with_context(|| format!("failed to read {}", p.display()))?,
                ),
                None => body,
            };
            let draft = Draft {
                title,
                body,
                labels,
                assignees,
                milestone,
            };
            let tmpl = template.as_deref().map(|t| (t, values.as_deref(), sets.as_slice()));
            create(&project, draft, tmpl, parent, repo.as_deref(), dry_run, json)
        }
        IssueSubcommand::ConvertTasks {
            issue,
            labels,
            repo,
            dry_run,
            body_file,
        } => convert_tasks(
            &project,
            issue,
            labels,
            repo.as_deref(),
            dry_run,
            body_file.as_deref(),
            json,
        ),
        IssueSubcommand::Link {
            parent,
            child,
            repo,
            dry_run,
        } => link(&project, parent, child, repo.as_deref(), dry_run, json),
        IssueSubcommand::List {
            state,
            labels,
            repo,
        } => {
            let filter = IssueFilter {
                state: match state.as_str() {
                    "open" => StateFilter::Open,
                    "closed" => StateFilter::Closed,
                    _ => StateFilter::All,
                },
                labels,
            };
            list(&project, &filter, repo.as_deref(), json)
        }
        IssueSubcommand::Update {
            number,
            title,
            body,
            body_file,
            state,
            labels,
            assignees,
            milestone,
            no_milestone,
            repo,
            dry_run,
        } => {
            let body = match body_file {
                Some(p) => Some(
                    std::fs::read_to_string(&p)
                        .with_context(|| format!("failed to read {}", p.display()))?,
                ),
                None => body,
            };
            let patch = IssuePatch {
                title,
                body,
                state: state.as_deref().map(|s| match s {
                    "closed" => IssueState::Closed,
                    _ => IssueState::Open,
                }),
                labels: (!labels.is_empty()).then_some(labels),
                assignees: (!assignees.is_empty()).then_some(assignees),
                milestone: if no_milestone { Some(None) } else { milestone.map(Some) },
            };
            update(&project, number, patch, repo.as_deref(), dry_run, json)
        }
        IssueSubcommand::Close {
            number,
            repo,
            dry_run,
        } => close(&project, number, repo.as_deref(), dry_run, json),
    }
}

// ---------------------------------------------------------------------------
// create
// ---------------------------------------------------------------------------

struct Draft {
    title: Option<String>,
    body: Option<String>,
    labels: Vec<String>,
    assignees: Vec<String>,
    milestone: Option<u64>,
}

/// Fill what the flags left out from an issue template: labels from
/// `labels`, body from `fields.body.template`.
fn fill_from_template(
    project: &Project,
    draft: &mut Draft,
    name: &str,
    values: Option<&str>,
    sets: &[String],
) -> anyhow::Result<()> {
    let overrides = context::overrides(values, sets)?;
    let doc = project
        .store()
        .apply(name, "issue", overrides.as_ref())
        .with_context(|| format!("failed to apply issue template '{name}'"))?;
    if draft.labels.is_empty() {
        draft.labels = doc.get_strings("labels");
    }
    if draft.body.is_none() {
        draft.body = doc.get_str("fields.body.template").map(str::to_string);
    }
    if draft.title.is_none() {
        draft.title = doc.get_str("fields.title.default").map(str::to_string);
    }
    Ok(())
}

fn create(
    project: &Project,
    mut draft: Draft,
    template: Option<(&str, Option<&str>, &[String])>,
    parent: Option<u64>,
    repo: Option<&str>,
    dry_run: bool,
    json: bool,
) -> anyhow::Result<()> {
    if let Some((name, values, sets)) = template {
        fill_from_template(project, &mut draft, name, values, sets)?;
    }
    let Some(title) = draft.title.filter(|t| !t.trim().is_empty()) else {
        bail!("issue title is required: pass --title or use a template with fields.title.default");
    };
    let new = NewIssue {
        title,
        body: draft.body.unwrap_or_default(),
        labels: draft.labels,
        assignees: draft.assignees,
        milestone: draft.milestone,
    };
    let repo = project.repo(repo)?;

    if dry_run {
        if json {
            return print_json(&serde_json::json!({
                "dry_run": true,
                "repository": repo.to_string(),
                "issue": new,
                "parent": parent,
            }));
        }
        println!("Would create issue: {}", new.title);
        println!("In repository: {repo}");
        if !new.body.is_empty() {
            let preview: String = new.body.chars().take(PREVIEW_CHARS).collect();
            let ellipsis = if new.body.chars().count() > PREVIEW_CHARS { "..." } else { "" };
            println!("\nBody preview:\n{preview}{ellipsis}\n");
        }
        if !new.labels.is_empty() {
            println!("Labels: {}", new.labels.join(", "));
        }
        if !new.assignees.is_empty() {
            println!("Assignees: {}", new.assignees.join(", "));
        }
        if let Some(m) = new.milestone {
            println!("Milestone: {m}");
        }
        if let Some(p) = parent {
            println!("As a sub-issue of: #{p}");
        }
        return Ok(());
    }

    let mut tracker = project.tracker(repo)?;
    let issue = match parent {
        Some(p) => HierarchyBuilder::new(&mut tracker)
            .create_sub_issue(p, &new)
            .with_context(|| format!("failed to create sub-issue of #{p}"))?,
        None => tracker.create_issue(&new).context("failed to create issue")?,
    };

    if json {
        return print_json(&issue);
    }
    println!("Created issue #{}: {}", issue.number, issue.title);
    println!("URL: {}", issue.html_url);
    Ok(())
}

// ---------------------------------------------------------------------------
// convert-tasks
// ---------------------------------------------------------------------------

fn convert_tasks(
    project: &Project,
    number: u64,
    labels: Vec<String>,
    repo: Option<&str>,
    dry_run: bool,
    body_file: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let labels = if labels.is_empty() {
        project.config.defaults.sub_issue_labels.clone()
    } else {
        labels
    };
    let repo = project.repo(repo)?;

    if dry_run {
        let items = match body_file {
            Some(path) => {
                let body = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                Some(hierarchy::plan(&body, number)?)
            }
            None => None,
        };
        if json {
            let tasks: Option<Vec<_>> = items.map(|items| {
                items
                    .iter()
                    .map(|i| serde_json::json!({ "line": i.line + 1, "label": i.label }))
                    .collect()
            });
            return print_json(&serde_json::json!({
                "dry_run": true,
                "repository": repo.to_string(),
                "issue": number,
                "labels": labels,
                "tasks": tasks,
            }));
        }
        println!("Would convert tasks in issue #{number} to sub-issues");
        println!("In repository: {repo}");
        if !labels.is_empty() {
            println!("Labels: {}", labels.join(", "));
        }
        if let Some(items) = items {
            println!("Tasks:");
            for item in items {
                println!("  line {}: {}", item.line + 1, item.label);
            }
        }
        return Ok(());
    }

    let mut tracker = project.tracker(repo)?;
    let conversion = HierarchyBuilder::new(&mut tracker)
        .convert_tasks(number, &labels)
        .with_context(|| format!("failed to convert tasks in #{number}"))?;

    if json {
        return print_json(&conversion);
    }
    println!("Created {} sub-issues:", conversion.children.len());
    let rows = conversion
        .children
        .iter()
        .map(|c| vec![format!("#{}", c.number), c.title.clone()])
        .collect();
    print_table(&["ISSUE", "TITLE"], rows);
    Ok(())
}

// ---------------------------------------------------------------------------
// list / update
// ---------------------------------------------------------------------------

fn list(project: &Project, filter: &IssueFilter, repo: Option<&str>, json: bool) -> anyhow::Result<()> {
    let repo = project.repo(repo)?;
    let name = repo.to_string();
    let mut tracker = project.tracker(repo)?;
    let issues = tracker
        .list_issues(filter)
        .with_context(|| format!("failed to list issues of {name}"))?;

    if json {
        return print_json(&issues);
    }
    if issues.is_empty() {
        println!("No issues.");
        return Ok(());
    }
    let rows = issues
        .iter()
        .map(|i| {
            vec![
                format!("#{}", i.number),
                i.state.to_string(),
                i.title.clone(),
                i.labels.join(", "),
                i.milestone.clone().unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();
    print_table(&["ISSUE", "STATE", "TITLE", "LABELS", "MILESTONE"], rows);
    Ok(())
}

fn update(
    project: &Project,
    number: u64,
    patch: IssuePatch,
    repo: Option<&str>,
    dry_run: bool,
    json: bool,
) -> anyhow::Result<()> {
    if patch.is_empty() {
        bail!("nothing to update: pass at least one field to change");
    }
    let repo = project.repo(repo)?;

    if dry_run {
        if json {
            return print_json(&serde_json::json!({
                "dry_run": true,
                "repository": repo.to_string(),
                "issue": number,
                "update": patch,
            }));
        }
        println!("Would update issue #{number} in {repo}");
        if let Some(t) = &patch.title {
            println!("Title: {t}");
        }
        if let Some(b) = &patch.body {
            let preview: String = b.chars().take(PREVIEW_CHARS).collect();
            let ellipsis = if b.chars().count() > PREVIEW_CHARS { "..." } else { "" };
            println!("\nBody preview:\n{preview}{ellipsis}\n");
        }
        if let Some(s) = patch.state {
            println!("State: {s}");
        }
        if let Some(l) = &patch.labels {
            println!("Labels: {}", l.join(", "));
        }
        if let Some(a) = &patch.assignees {
            println!("Assignees: {}", a.join(", "));
        }
        match patch.milestone {
            Some(Some(m)) => println!("Milestone: {m}"),
            Some(None) => println!("Milestone: none"),
            None => {}
        }
        return Ok(());
    }

    let mut tracker = project.tracker(repo)?;
    let issue = tracker
        .update_issue(number, &patch)
        .with_context(|| format!("failed to update #{number}"))?;
    if json {
        return print_json(&issue);
    }
    println!("Updated issue #{}: {}", issue.number, issue.title);
    println!("URL: {}", issue.html_url);
    Ok(())
}

// ---------------------------------------------------------------------------
// link / close
// ---------------------------------------------------------------------------

fn link(
    project: &Project,
    parent: u64,
    child: u64,
    repo: Option<&str>,
    dry_run: bool,
    json: bool,
) -> anyhow::Result<()> {
    if parent == child {
        bail!("an issue cannot be its own sub-issue");
    }
    let repo = project.repo(repo)?;
    if dry_run {
        if json {
            return print_json(&serde_json::json!({
                "dry_run": true,
                "repository": repo.to_string(),
                "parent": parent,
                "child": child,
            }));
        }
        println!("Would link #{child} as a sub-issue of #{parent} in {repo}");
        return Ok(());
    }

    let mut tracker = project.tracker(repo)?;
    let outcome = HierarchyBuilder::new(&mut tracker)
        .link(parent, child)
        .with_context(|| format!("failed to link #{child} under #{parent}"))?;
    if json {
        return print_json(&outcome);
    }
    println!("Linked #{child} under #{parent}");
    if !outcome.child_marked {
        println!("  #{child} already named #{parent} as its parent");
    }
    Ok(())
}

fn close(
    project: &Project,
    number: u64,
    repo: Option<&str>,
    dry_run: bool,
    json: bool,
) -> anyhow::Result<()> {
    let repo = project.repo(repo)?;
    if dry_run {
        if json {
            return print_json(&serde_json::json!({
                "dry_run": true,
                "repository": repo.to_string(),
                "close": number,
            }));
        }
        println!("Would close #{number} in {repo}");
        return Ok(());
    }

    let mut tracker = project.tracker(repo)?;
    let issue = tracker
        .update_issue(number, &IssuePatch::close())
        .with_context(|| format!("failed to close #{number}"))?;
    if json {
        return print_json(&issue);
    }
    println!("Closed #{}: {}", issue.number, issue.title);
    Ok(())
}

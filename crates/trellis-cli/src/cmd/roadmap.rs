use crate::context::{self, Project};
use crate::output::{print_json, print_table};
use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::Subcommand;
use std::path::{Path, PathBuf};
use trellis_core::document::{Document, Value};
use trellis_core::labels::{self, LabelOutcome};
use trellis_core::roadmap::{self, Milestone, MilestoneState};
use trellis_core::tracker::{IssueTracker, MilestonePatch, NewLabel, NewMilestone};

#[derive(Subcommand)]
pub enum RoadmapSubcommand {
    /// Create a milestone, optionally from a roadmap template
    Create {
        #[arg(long)]
        title: Option<String>,
        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due_date: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Roadmap template; its first milestone and labels are used
        #[arg(long)]
        template: Option<String>,
        /// Replaces {quarter} in the template (e.g. Q1-2026)
        #[arg(long)]
        quarter: Option<String>,
        #[arg(long)]
        values: Option<String>,
        #[arg(long = "set", value_name = "PATH=VALUE")]
        sets: Vec<String>,
        #[arg(long)]
        repo: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },

    /// Change a milestone's title, description, state or due date
    Update {
        number: u64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, value_parser = ["open", "closed"])]
        state: Option<String>,
        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due_date: Option<String>,
        #[arg(long)]
        repo: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete a milestone
    Delete {
        number: u64,
        #[arg(long)]
        repo: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },

    /// Show milestones classified as current, upcoming and completed
    List {
        #[arg(long)]
        repo: Option<String>,
        /// Classify as of this date instead of today
        #[arg(long)]
        as_of: Option<String>,
    },

    /// Render a markdown roadmap report
    Report {
        #[arg(long)]
        repo: Option<String>,
        /// Write the report here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        as_of: Option<String>,
    },
}

pub fn run(root: &Path, subcmd: RoadmapSubcommand, json: bool) -> anyhow::Result<()> {
    let project = Project::load(root)?;
    match subcmd {
        RoadmapSubcommand::Create {
            title,
            due_date,
            description,
            template,
            quarter,
            values,
            sets,
            repo,
            dry_run,
        } => {
            let mut plan = Plan {
                title,
                description,
                due_on: due_date.as_deref().map(roadmap::parse_due_date).transpose()?,
                labels: Vec::new(),
            };
            if let Some(name) = template.as_deref() {
                let overrides = context::overrides(values.as_deref(), &sets)?;
                let mut doc = project
                    .store()
                    .apply(name, "roadmap", overrides.as_ref())
                    .with_context(|| format!("failed to apply roadmap template '{name}'"))?;
                if let Some(q) = quarter.as_deref() {
                    doc.substitute("quarter", q);
                }
                plan.fill_from_template(&doc, today())?;
            }
            create(&project, plan, repo.as_deref(), dry_run, json)
        }
        RoadmapSubcommand::Update {
            number,
            title,
            description,
            state,
            due_date,
            repo,
            dry_run,
        } => {
            let patch = MilestonePatch {
                title,
                description,
                state: state.as_deref().map(|s| match s {
                    "closed" => MilestoneState::Closed,
                    _ => MilestoneState::Open,
                }),
                due_on: due_date.as_deref().map(roadmap::parse_due_date).transpose()?,
            };
            update(&project, number, patch, repo.as_deref(), dry_run, json)
        }
        RoadmapSubcommand::Delete {
            number,
            repo,
            dry_run,
        } => delete(&project, number, repo.as_deref(), dry_run, json),
        RoadmapSubcommand::List { repo, as_of } => {
            list(&project, repo.as_deref(), as_of.as_deref(), json)
        }
        RoadmapSubcommand::Report {
            repo,
            output,
            as_of,
        } => report(&project, repo.as_deref(), output.as_deref(), as_of.as_deref(), json),
    }
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn as_of_date(raw: Option<&str>) -> anyhow::Result<NaiveDate> {
    Ok(match raw {
        Some(d) => roadmap::parse_due_date(d)?,
        None => today(),
    })
}

// ---------------------------------------------------------------------------
// create
// ---------------------------------------------------------------------------

struct Plan {
    title: Option<String>,
    description: Option<String>,
    due_on: Option<NaiveDate>,
    labels: Vec<NewLabel>,
}

impl Plan {
    /// Take title, description and due date from the template's first
    /// milestone where the flags left them out, and collect its labels.
    fn fill_from_template(&mut self, doc: &Document, today: NaiveDate) -> anyhow::Result<()> {
        let first = doc
            .get("milestones")
            .and_then(Value::as_sequence)
            .and_then(|ms| ms.first())
            .and_then(Value::as_mapping);

        if let Some(m) = first {
            let field = |key: &str| m.get(key).and_then(Value::to_scalar_string);
            if self.title.is_none() {
                self.title = field("name");
            }
            if self.description.is_none() {
                self.description = field("description");
            }
            if self.due_on.is_none() {
                if let Some(d) = field("due_date") {
                    self.due_on = Some(roadmap::parse_due_date(&d)?);
                } else if let Some(rel) = field("relative_date") {
                    self.due_on = Some(roadmap::resolve_relative_date(&rel, today)?);
                }
            }
        }

        self.labels.extend(labels::from_template(doc));
        Ok(())
    }
}

fn create(
    project: &Project,
    plan: Plan,
    repo: Option<&str>,
    dry_run: bool,
    json: bool,
) -> anyhow::Result<()> {
    let Some(title) = plan.title.filter(|t| !t.trim().is_empty()) else {
        bail!("milestone title is required: pass --title or use a template");
    };
    let milestone = NewMilestone {
        title,
        description: plan.description.unwrap_or_default(),
        due_on: plan.due_on,
    };
    let repo = project.repo(repo)?;

    if dry_run {
        if json {
            return print_json(&serde_json::json!({
                "dry_run": true,
                "repository": repo.to_string(),
                "milestone": milestone,
                "labels": plan.labels,
            }));
        }
        println!("Would create milestone: {}", milestone.title);
        println!("In repository: {repo}");
        if !milestone.description.is_empty() {
            println!("Description: {}", milestone.description);
        }
        if let Some(d) = milestone.due_on {
            println!("Due date: {d}");
        }
        if !plan.labels.is_empty() {
            println!("Would create labels:");
            for l in &plan.labels {
                println!("  - {}", l.name);
            }
        }
        return Ok(());
    }

    let mut tracker = project.tracker(repo)?;
    let created = tracker
        .create_milestone(&milestone)
        .context("failed to create milestone")?;

    let label_results = labels::ensure(&mut tracker, &plan.labels);

    if json {
        return print_json(&serde_json::json!({ "milestone": created, "labels": label_results }));
    }
    println!("Created milestone: {}", created.title);
    if let Some(d) = created.due_on {
        println!("Due date: {d}");
    }
    println!("URL: {}", created.html_url);
    if !label_results.is_empty() {
        println!("\nLabels from template:");
        for result in &label_results {
            println!("  - {}: {}", result.name, describe(&result.outcome));
        }
    }
    Ok(())
}

pub(crate) fn describe(outcome: &LabelOutcome) -> String {
    match outcome {
        LabelOutcome::Created => "created".to_string(),
        LabelOutcome::Exists => "exists".to_string(),
        LabelOutcome::Failed(e) => format!("error: {e}"),
    }
}

// ---------------------------------------------------------------------------
// update / delete
// ---------------------------------------------------------------------------

fn update(
    project: &Project,
    number: u64,
    patch: MilestonePatch,
    repo: Option<&str>,
    dry_run: bool,
    json: bool,
) -> anyhow::Result<()> {
    if patch.is_empty() {
        bail!("nothing to update: pass --title, --description, --state or --due-date");
    }
    let repo = project.repo(repo)?;

    if dry_run {
        if json {
            return print_json(&serde_json::json!({
                "dry_run": true,
                "repository": repo.to_string(),
                "milestone": number,
                "update": patch,
            }));
        }
        println!("Would update milestone {number} in {repo}");
        if let Some(t) = &patch.title {
            println!("Title: {t}");
        }
        if let Some(d) = &patch.description {
            println!("Description: {d}");
        }
        if let Some(s) = patch.state {
            println!("State: {s}");
        }
        if let Some(d) = patch.due_on {
            println!("Due date: {d}");
        }
        return Ok(());
    }

    let mut tracker = project.tracker(repo)?;
    let updated = tracker
        .update_milestone(number, &patch)
        .with_context(|| format!("failed to update milestone {number}"))?;
    if json {
        return print_json(&updated);
    }
    println!("Updated milestone {}: {}", updated.number, updated.title);
    println!("URL: {}", updated.html_url);
    Ok(())
}

fn delete(
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
                "delete": number,
            }));
        }
        println!("Would delete milestone {number} in {repo}");
        return Ok(());
    }

    let mut tracker = project.tracker(repo)?;
    tracker
        .delete_milestone(number)
        .with_context(|| format!("failed to delete milestone {number}"))?;
    if json {
        return print_json(&serde_json::json!({ "deleted": number }));
    }
    println!("Deleted milestone {number}");
    Ok(())
}

// ---------------------------------------------------------------------------
// list / report
// ---------------------------------------------------------------------------

fn fetch(project: &Project, repo: Option<&str>) -> anyhow::Result<(String, Vec<Milestone>)> {
    let repo = project.repo(repo)?;
    let name = repo.to_string();
    let mut tracker = project.tracker(repo)?;
    let milestones = tracker
        .list_milestones()
        .with_context(|| format!("failed to list milestones of {name}"))?;
    Ok((name, milestones))
}

fn list(project: &Project, repo: Option<&str>, as_of: Option<&str>, json: bool) -> anyhow::Result<()> {
    let as_of = as_of_date(as_of)?;
    let (_, milestones) = fetch(project, repo)?;
    let roadmap = roadmap::classify(milestones, as_of);

    if json {
        return print_json(&roadmap);
    }

    let row = |section: &str, m: &Milestone| {
        vec![
            section.to_string(),
            m.title.clone(),
            m.due_on.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string()),
            format!("{}%", m.completion_percentage()),
            format!("{}/{}", m.closed_issues, m.total_issues()),
        ]
    };
    let mut rows = Vec::new();
    if let Some(m) = &roadmap.current {
        rows.push(row("current", m));
    }
    rows.extend(roadmap.upcoming.iter().map(|m| row("upcoming", m)));
    rows.extend(roadmap.completed.iter().map(|m| row("completed", m)));

    if rows.is_empty() {
        println!("No milestones.");
        return Ok(());
    }
    print_table(&["SECTION", "MILESTONE", "DUE", "DONE", "ISSUES"], rows);
    Ok(())
}

fn report(
    project: &Project,
    repo: Option<&str>,
    output: Option<&Path>,
    as_of: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let as_of = as_of_date(as_of)?;
    let (name, milestones) = fetch(project, repo)?;
    let text = roadmap::render_report(&name, &roadmap::classify(milestones, as_of));

    match output {
        Some(path) => {
            trellis_core::io::atomic_write(path, text.as_bytes())
                .with_context(|| format!("failed to write {}", path.display()))?;
            if json {
                return print_json(&serde_json::json!({ "path": path }));
            }
            println!("Report written to {}", path.display());
        }
        None if json => print_json(&serde_json::json!({ "report": text }))?,
        None => print!("{text}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::builtin;
    use trellis_core::document::Format;

    fn quarterly(quarter: &str) -> Document {
        let t = builtin::find("roadmap", "quarterly").unwrap();
        let mut doc = Document::parse(t.yaml, Format::Yaml).unwrap();
        doc.substitute("quarter", quarter);
        doc
    }

    fn empty_plan() -> Plan {
        Plan {
            title: None,
            description: None,
            due_on: None,
            labels: Vec::new(),
        }
    }

    #[test]
    fn quarterly_template_fills_plan() {
        let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let mut plan = empty_plan();
        plan.fill_from_template(&quarterly("Q1-2026"), today).unwrap();

        assert_eq!(plan.title.as_deref(), Some("Q1-2026 Release"));
        assert_eq!(plan.due_on, NaiveDate::from_ymd_opt(2026, 4, 1));
        assert_eq!(plan.labels.len(), 1);
        assert_eq!(plan.labels[0].name, "release:Q1-2026");
        assert_eq!(plan.labels[0].color, "0E8A16");
    }

    #[test]
    fn flags_win_over_template() {
        let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let mut plan = empty_plan();
        plan.title = Some("Custom".to_string());
        plan.due_on = NaiveDate::from_ymd_opt(2026, 6, 30);
        plan.fill_from_template(&quarterly("Q2"), today).unwrap();

        assert_eq!(plan.title.as_deref(), Some("Custom"));
        assert_eq!(plan.due_on, NaiveDate::from_ymd_opt(2026, 6, 30));
    }
}

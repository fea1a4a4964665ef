use crate::cmd::roadmap::describe;
use crate::context::{self, Project};
use crate::output::{print_json, print_table};
use anyhow::{bail, Context};
use clap::Subcommand;
use std::path::Path;
use trellis_core::board::{self, BoardTemplate};
use trellis_core::tracker::{IssueTracker, NewProject, ProjectOwner};

#[derive(Subcommand)]
pub enum ProjectSubcommand {
    /// Create a project board from a project template
    Create {
        #[arg(long)]
        name: String,
        /// Board description
        #[arg(long, default_value = "")]
        body: String,
        /// Create the board under this organization
        #[arg(long, conflicts_with = "user")]
        org: Option<String>,
        /// Create the board for the authenticated user
        #[arg(long)]
        user: bool,
        /// Project template supplying columns and labels
        #[arg(long, default_value = "basic")]
        template: String,
        #[arg(long)]
        values: Option<String>,
        #[arg(long = "set", value_name = "PATH=VALUE")]
        sets: Vec<String>,
        #[arg(long)]
        repo: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },

    /// Show a board's columns and cards
    Show {
        /// Project node id
        id: String,
        #[arg(long)]
        repo: Option<String>,
    },

    /// Put an issue on a board
    AddIssue {
        project_id: String,
        issue: u64,
        /// Column name, matched case-insensitively (default: first column)
        #[arg(long)]
        column: Option<String>,
        #[arg(long)]
        repo: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },
}

pub fn run(root: &Path, subcmd: ProjectSubcommand, json: bool) -> anyhow::Result<()> {
    let project = Project::load(root)?;
    match subcmd {
        ProjectSubcommand::Create {
            name,
            body,
            org,
            user,
            template,
            values,
            sets,
            repo,
            dry_run,
        } => {
            let overrides = context::overrides(values.as_deref(), &sets)?;
            let doc = project
                .store()
                .apply(&template, "project", overrides.as_ref())
                .with_context(|| format!("failed to apply project template '{template}'"))?;
            let layout = BoardTemplate::from_document(&doc);
            let owner = match (org, user) {
                (Some(org), _) => ProjectOwner::Organization(org),
                (None, true) => ProjectOwner::Viewer,
                (None, false) => ProjectOwner::Repository,
            };
            let new = NewProject {
                title: name,
                description: body,
                owner,
                columns: layout.columns.clone(),
            };
            create(&project, &new, &layout, &template, repo.as_deref(), dry_run, json)
        }
        ProjectSubcommand::Show { id, repo } => show(&project, &id, repo.as_deref(), json),
        ProjectSubcommand::AddIssue {
            project_id,
            issue,
            column,
            repo,
            dry_run,
        } => add_issue(
            &project,
            &project_id,
            issue,
            column.as_deref(),
            repo.as_deref(),
            dry_run,
            json,
        ),
    }
}

// ---------------------------------------------------------------------------
// create
// ---------------------------------------------------------------------------

fn create(
    project: &Project,
    new: &NewProject,
    layout: &BoardTemplate,
    template: &str,
    repo: Option<&str>,
    dry_run: bool,
    json: bool,
) -> anyhow::Result<()> {
    if new.title.trim().is_empty() {
        bail!("project name is required");
    }
    if layout.columns.is_empty() {
        bail!("project template '{template}' defines no columns");
    }
    let repo = project.repo(repo)?;

    if dry_run {
        if json {
            return print_json(&serde_json::json!({
                "dry_run": true,
                "repository": repo.to_string(),
                "template": template,
                "project": new,
                "labels": layout.labels,
                "automation": layout.automation,
            }));
        }
        println!("Would create project: {}", new.title);
        match &new.owner {
            ProjectOwner::Organization(org) => println!("In organization: {org}"),
            ProjectOwner::Repository => println!("In repository: {repo}"),
            ProjectOwner::Viewer => println!("As a user project"),
        }
        println!("Using template: {template}");
        println!("With columns: {}", new.columns.join(", "));
        if !layout.labels.is_empty() && new.owner == ProjectOwner::Repository {
            println!("Would create labels:");
            for l in &layout.labels {
                println!("  - {}", l.name);
            }
        }
        return Ok(());
    }

    let mut tracker = project.tracker(repo)?;
    let outcome = board::create_board(&mut tracker, new, &layout.labels)
        .with_context(|| format!("failed to create project '{}'", new.title))?;

    if json {
        return print_json(&outcome);
    }
    println!("Created project: {}", outcome.project.title);
    println!("ID: {}", outcome.project.id);
    println!("URL: {}", outcome.project.url);
    println!("Columns:");
    for column in &outcome.project.columns {
        println!("  {column}");
    }
    if !outcome.labels.is_empty() {
        println!("\nLabels from template:");
        for result in &outcome.labels {
            println!("  - {}: {}", result.name, describe(&result.outcome));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// show / add-issue
// ---------------------------------------------------------------------------

fn show(project: &Project, id: &str, repo: Option<&str>, json: bool) -> anyhow::Result<()> {
    let repo = project.repo(repo)?;
    let mut tracker = project.tracker(repo)?;
    let board = tracker
        .get_project(id)
        .with_context(|| format!("failed to fetch project {id}"))?;

    if json {
        return print_json(&board);
    }
    println!("{} (#{})", board.title, board.number);
    if !board.description.is_empty() {
        println!("{}", board.description);
    }
    println!("URL: {}\n", board.url);

    let rows: Vec<Vec<String>> = board
        .columns
        .iter()
        .flat_map(|column| {
            board.cards_in(column).map(move |card| {
                vec![
                    column.clone(),
                    card.issue.map(|n| format!("#{n}")).unwrap_or_else(|| "-".to_string()),
                    card.title.clone(),
                ]
            })
        })
        .chain(
            board
                .cards
                .iter()
                .filter(|c| c.column.is_none())
                .map(|card| {
                    vec![
                        "(none)".to_string(),
                        card.issue.map(|n| format!("#{n}")).unwrap_or_else(|| "-".to_string()),
                        card.title.clone(),
                    ]
                }),
        )
        .collect();
    if rows.is_empty() {
        println!("Columns: {}", board.columns.join(", "));
        println!("No cards.");
        return Ok(());
    }
    print_table(&["COLUMN", "ISSUE", "TITLE"], rows);
    Ok(())
}

fn add_issue(
    project: &Project,
    project_id: &str,
    issue: u64,
    column: Option<&str>,
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
                "project": project_id,
                "issue": issue,
                "column": column,
            }));
        }
        let target = column.unwrap_or("the first column");
        println!("Would add #{issue} from {repo} to project {project_id} in {target}");
        return Ok(());
    }

    let mut tracker = project.tracker(repo)?;
    let card = board::add_issue(&mut tracker, project_id, issue, column)
        .with_context(|| format!("failed to add #{issue} to project {project_id}"))?;
    if json {
        return print_json(&card);
    }
    println!(
        "Added #{issue} to project {project_id} in column {}",
        card.column.as_deref().unwrap_or("-")
    );
    Ok(())
}

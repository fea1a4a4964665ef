mod cmd;
mod context;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    config::ConfigSubcommand, issue::IssueSubcommand, project::ProjectSubcommand,
    roadmap::RoadmapSubcommand, template::TemplateSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "trellis",
    about = "Templates, issue hierarchies and milestone roadmaps for GitHub repositories",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .trellis/ or .git/)
    #[arg(long, global = true, env = "TRELLIS_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize trellis in the current project
    Init {
        /// Default repository (owner/repo) written to the new config
        #[arg(long)]
        repo: Option<String>,
    },

    /// Manage issue, project and roadmap templates
    Template {
        #[command(subcommand)]
        subcommand: TemplateSubcommand,
    },

    /// Create issues, convert checklists to sub-issues, link hierarchies
    Issue {
        #[command(subcommand)]
        subcommand: IssueSubcommand,
    },

    /// Create project boards and put issues on them
    Project {
        #[command(subcommand)]
        subcommand: ProjectSubcommand,
    },

    /// Create milestones and report roadmap progress
    Roadmap {
        #[command(subcommand)]
        subcommand: RoadmapSubcommand,
    },

    /// Show or validate the project configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init { repo } => cmd::init::run(&root, repo.as_deref(), cli.json),
        Commands::Template { subcommand } => cmd::template::run(&root, subcommand, cli.json),
        Commands::Issue { subcommand } => cmd::issue::run(&root, subcommand, cli.json),
        Commands::Project { subcommand } => cmd::project::run(&root, subcommand, cli.json),
        Commands::Roadmap { subcommand } => cmd::roadmap::run(&root, subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

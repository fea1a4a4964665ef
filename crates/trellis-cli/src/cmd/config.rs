use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use std::path::Path;
use trellis_core::config::{Config, WarnLevel};
use trellis_core::template::{TemplateLocation, TemplateStore};

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the effective config and template search path
    Show,

    /// Validate the config for common mistakes
    Validate,
}

pub fn run(root: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(root, json),
        ConfigSubcommand::Validate => validate(root, json),
    }
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let store = TemplateStore::discover(root, &config.templates);
    let search_path: Vec<(String, String)> = store
        .locations()
        .iter()
        .map(|l| {
            let where_ = match l {
                TemplateLocation::Directory { path, .. } => path.display().to_string(),
                TemplateLocation::Builtin => "(compiled in)".to_string(),
            };
            (l.scope().to_string(), where_)
        })
        .collect();

    if json {
        let search_path: Vec<_> = search_path
            .iter()
            .map(|(scope, location)| serde_json::json!({ "scope": scope, "location": location }))
            .collect();
        return print_json(&serde_json::json!({
            "config": config,
            "search_path": search_path,
        }));
    }

    print!("{}", serde_yaml::to_string(&config)?);
    println!("\n# template search path (highest precedence first)");
    for (scope, location) in search_path {
        println!("#   {scope:<8} {location}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let warnings = config.validate(root);

    if json {
        print_json(&serde_json::json!({ "warnings": warnings }))?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}

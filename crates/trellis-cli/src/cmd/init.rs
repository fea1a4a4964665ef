use crate::output::print_json;
use anyhow::Context;
use std::path::Path;
use trellis_core::config::Config;
use trellis_core::github::RepoSlug;
use trellis_core::{io, paths};

pub fn run(root: &Path, repo: Option<&str>, json: bool) -> anyhow::Result<()> {
    if let Some(r) = repo {
        RepoSlug::parse(r)?;
    }

    let templates = paths::local_templates_dir(root);
    io::ensure_dir(&templates)
        .with_context(|| format!("failed to create {}", templates.display()))?;

    let config_path = paths::config_path(root);
    let created = !config_path.exists();
    if created {
        let mut cfg = Config::default();
        cfg.defaults.repository = repo.map(str::to_string);
        cfg.save(root).context("failed to write config.yaml")?;
    }

    if json {
        return print_json(&serde_json::json!({
            "root": root,
            "config": config_path,
            "config_created": created,
            "templates": templates,
        }));
    }

    println!("Initializing trellis in: {}", root.display());
    println!("  ready:   {}", paths::TEMPLATES_DIR);
    if created {
        println!("  created: {}", paths::CONFIG_FILE);
    } else {
        println!("  exists:  {}", paths::CONFIG_FILE);
    }
    Ok(())
}

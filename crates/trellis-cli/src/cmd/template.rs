use crate::context::{self, Project};
use crate::output::{print_document, print_json, print_table};
use anyhow::Context;
use clap::{Subcommand, ValueEnum};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use trellis_core::document::{Document, Format};
use trellis_core::template::Scope;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Yaml,
    Json,
}

impl From<OutputFormat> for Format {
    fn from(f: OutputFormat) -> Self {
        match f {
            OutputFormat::Yaml => Format::Yaml,
            OutputFormat::Json => Format::Json,
        }
    }
}

#[derive(Subcommand)]
pub enum TemplateSubcommand {
    /// List templates across every search location
    List {
        /// Only this kind (issue, project, roadmap, ...)
        #[arg(long)]
        kind: Option<String>,
        /// Include templates shadowed by a higher-precedence copy
        #[arg(long)]
        all: bool,
    },

    /// Print the resolved template
    Show {
        name: String,
        kind: String,
        #[arg(long, value_enum, default_value = "yaml")]
        format: OutputFormat,
    },

    /// Create a template in the local (or user-global) store
    Create {
        name: String,
        kind: String,
        /// YAML or JSON file to use as the template body
        #[arg(long)]
        from_file: Option<PathBuf>,
        #[arg(long)]
        description: Option<String>,
        /// Write to ~/.trellis/templates instead of the project
        #[arg(long)]
        global: bool,
    },

    /// Store a YAML or JSON file as a template
    Import {
        input: PathBuf,
        name: String,
        kind: String,
        #[arg(long)]
        global: bool,
    },

    /// Write the resolved template to a file (.json for JSON, YAML otherwise)
    Export {
        name: String,
        kind: String,
        output: PathBuf,
    },

    /// Print the template with overrides merged in; the store is not changed
    Apply {
        name: String,
        kind: String,
        /// Inline JSON object or path to a JSON/YAML file
        #[arg(long)]
        values: Option<String>,
        /// Override one field (repeatable): --set fields.body.template=...
        #[arg(long = "set", value_name = "PATH=VALUE")]
        sets: Vec<String>,
        #[arg(long, value_enum, default_value = "yaml")]
        format: OutputFormat,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, subcmd: TemplateSubcommand, json: bool) -> anyhow::Result<()> {
    let project = Project::load(root)?;
    match subcmd {
        TemplateSubcommand::List { kind, all } => list(&project, kind.as_deref(), all, json),
        TemplateSubcommand::Show { name, kind, format } => {
            show(&project, &name, &kind, format, json)
        }
        TemplateSubcommand::Create {
            name,
            kind,
            from_file,
            description,
            global,
        } => create(
            &project,
            &name,
            &kind,
            from_file.as_deref(),
            description.as_deref(),
            scope(global),
            json,
        ),
        TemplateSubcommand::Import {
            input,
            name,
            kind,
            global,
        } => import(&project, &input, &name, &kind, scope(global), json),
        TemplateSubcommand::Export { name, kind, output } => {
            export(&project, &name, &kind, &output, json)
        }
        TemplateSubcommand::Apply {
            name,
            kind,
            values,
            sets,
            format,
        } => apply(&project, &name, &kind, values.as_deref(), &sets, format, json),
    }
}

fn scope(global: bool) -> Scope {
    if global {
        Scope::User
    } else {
        Scope::Local
    }
}

// ---------------------------------------------------------------------------
// list / show
// ---------------------------------------------------------------------------

fn list(project: &Project, kind: Option<&str>, all: bool, json: bool) -> anyhow::Result<()> {
    let store = project.store();
    let mut entries = store.list_entries(kind).context("failed to list templates")?;
    if !all {
        // Locations are scanned in precedence order, so the first hit wins.
        let mut seen = HashSet::new();
        entries.retain(|e| seen.insert((e.kind.clone(), e.name.clone())));
    }
    entries.sort_by(|a, b| (&a.kind, &a.name).cmp(&(&b.kind, &b.name)));

    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("No templates found.");
        return Ok(());
    }
    let rows = entries
        .into_iter()
        .map(|e| vec![e.kind, e.name, e.scope.to_string()])
        .collect();
    print_table(&["KIND", "NAME", "SCOPE"], rows);
    Ok(())
}

fn show(
    project: &Project,
    name: &str,
    kind: &str,
    format: OutputFormat,
    json: bool,
) -> anyhow::Result<()> {
    let template = project.store().get(name, kind)?;
    if json {
        return print_json(&serde_json::json!({
            "name": template.name,
            "kind": template.kind,
            "scope": template.scope,
            "path": template.path,
            "document": template.document,
        }));
    }
    print_document(&template.document, format.into())
}

// ---------------------------------------------------------------------------
// create / import / export
// ---------------------------------------------------------------------------

fn create(
    project: &Project,
    name: &str,
    kind: &str,
    from_file: Option<&Path>,
    description: Option<&str>,
    scope: Scope,
    json: bool,
) -> anyhow::Result<()> {
    let store = project.store();
    let path = match from_file {
        Some(input) => store
            .import(input, name, kind, scope)
            .with_context(|| format!("failed to import {}", input.display()))?,
        None => {
            let mut doc = Document::new();
            doc.insert("name", name);
            if let Some(d) = description {
                doc.insert("description", d);
            }
            store.create(name, kind, &doc, scope)?
        }
    };

    if json {
        return print_json(&serde_json::json!({ "kind": kind, "name": name, "path": path }));
    }
    println!("Created template {kind}/{name}: {}", path.display());
    if from_file.is_none() {
        println!("Edit this file to configure the template.");
    }
    Ok(())
}

fn import(
    project: &Project,
    input: &Path,
    name: &str,
    kind: &str,
    scope: Scope,
    json: bool,
) -> anyhow::Result<()> {
    let path = project
        .store()
        .import(input, name, kind, scope)
        .with_context(|| format!("failed to import {}", input.display()))?;
    if json {
        return print_json(&serde_json::json!({ "kind": kind, "name": name, "path": path }));
    }
    println!("Imported {} as {kind}/{name}: {}", input.display(), path.display());
    Ok(())
}

fn export(project: &Project, name: &str, kind: &str, output: &Path, json: bool) -> anyhow::Result<()> {
    project
        .store()
        .export(name, kind, output)
        .with_context(|| format!("failed to export {kind}/{name}"))?;
    if json {
        return print_json(&serde_json::json!({ "kind": kind, "name": name, "path": output }));
    }
    println!("Exported {kind}/{name} to {}", output.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// apply
// ---------------------------------------------------------------------------

fn apply(
    project: &Project,
    name: &str,
    kind: &str,
    values: Option<&str>,
    sets: &[String],
    format: OutputFormat,
    json: bool,
) -> anyhow::Result<()> {
    let overrides = context::overrides(values, sets)?;
    let merged = project.store().apply(name, kind, overrides.as_ref())?;
    if json {
        return print_json(&merged);
    }
    print_document(&merged, format.into())
}

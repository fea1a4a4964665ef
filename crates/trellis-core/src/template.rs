use crate::builtin::{self, BUILTIN_TEMPLATES};
use crate::config::TemplatesConfig;
use crate::document::{Document, Format};
use crate::error::{Result, TrellisError};
use crate::merge;
use crate::paths;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Scope / TemplateLocation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// `<root>/.trellis/templates`
    Local,
    /// `~/.trellis/templates`
    User,
    /// Directories listed under `templates.extra_dirs` in config.
    Extra,
    /// Compiled into the binary.
    Builtin,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Scope::Local => "local",
            Scope::User => "user",
            Scope::Extra => "extra",
            Scope::Builtin => "builtin",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateLocation {
    Directory { scope: Scope, path: PathBuf },
    Builtin,
}

impl TemplateLocation {
    pub fn dir(scope: Scope, path: impl Into<PathBuf>) -> Self {
        TemplateLocation::Directory {
            scope,
            path: path.into(),
        }
    }

    pub fn scope(&self) -> Scope {
        match self {
            TemplateLocation::Directory { scope, .. } => *scope,
            TemplateLocation::Builtin => Scope::Builtin,
        }
    }
}

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Template {
    pub name: String,
    pub kind: String,
    pub scope: Scope,
    /// `None` for builtin templates.
    pub path: Option<PathBuf>,
    pub document: Document,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateEntry {
    pub kind: String,
    pub name: String,
    pub scope: Scope,
}

// ---------------------------------------------------------------------------
// TemplateStore
// ---------------------------------------------------------------------------

/// Resolves templates by (name, kind) over an ordered search path. The first
/// location holding a readable file wins; lower locations are not consulted.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    locations: Vec<TemplateLocation>,
}

impl TemplateStore {
    /// `locations` is ordered highest precedence first.
    pub fn new(locations: Vec<TemplateLocation>) -> Self {
        Self { locations }
    }

    /// The standard search path: local, user-global, configured extra
    /// directories, then builtin templates.
    pub fn discover(root: &Path, config: &TemplatesConfig) -> Self {
        let mut locations = vec![TemplateLocation::dir(
            Scope::Local,
            paths::local_templates_dir(root),
        )];
        match paths::user_templates_dir() {
            Ok(dir) => locations.push(TemplateLocation::dir(Scope::User, dir)),
            Err(e) => tracing::debug!("skipping user template location: {e}"),
        }
        for extra in &config.extra_dirs {
            let dir = if extra.is_absolute() {
                extra.clone()
            } else {
                root.join(extra)
            };
            locations.push(TemplateLocation::dir(Scope::Extra, dir));
        }
        if config.builtin {
            locations.push(TemplateLocation::Builtin);
        }
        Self::new(locations)
    }

    pub fn locations(&self) -> &[TemplateLocation] {
        &self.locations
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Find the highest-precedence template for (name, kind). Malformed files
    /// are logged and skipped so a broken override never hides a lower
    /// default.
    pub fn resolve(&self, name: &str, kind: &str) -> Result<Option<Template>> {
        paths::validate_name(name)?;
        paths::validate_name(kind)?;

        for location in &self.locations {
            match location {
                TemplateLocation::Directory { scope, path } => {
                    let Some(file) = find_template_file(path, kind, name) else {
                        continue;
                    };
                    match Document::load(&file) {
                        Ok(document) => {
                            tracing::debug!("resolved {kind}/{name} from {}", file.display());
                            return Ok(Some(Template {
                                name: name.to_string(),
                                kind: kind.to_string(),
                                scope: *scope,
                                path: Some(file),
                                document,
                            }));
                        }
                        Err(e) => {
                            tracing::warn!("skipping template {}: {e}", file.display());
                        }
                    }
                }
                TemplateLocation::Builtin => {
                    let Some(t) = builtin::find(kind, name) else {
                        continue;
                    };
                    match Document::parse(t.yaml, Format::Yaml) {
                        Ok(document) => {
                            return Ok(Some(Template {
                                name: name.to_string(),
                                kind: kind.to_string(),
                                scope: Scope::Builtin,
                                path: None,
                                document,
                            }));
                        }
                        Err(e) => tracing::warn!("skipping builtin template {kind}/{name}: {e}"),
                    }
                }
            }
        }
        Ok(None)
    }

    /// Like [`resolve`](Self::resolve) but a miss is an error.
    pub fn get(&self, name: &str, kind: &str) -> Result<Template> {
        self.resolve(name, kind)?
            .ok_or_else(|| TrellisError::TemplateNotFound {
                name: name.to_string(),
                kind: kind.to_string(),
            })
    }

    /// Every (kind, name, scope) visible across all locations, including
    /// templates shadowed by a higher-precedence copy.
    pub fn list_entries(&self, kind: Option<&str>) -> Result<Vec<TemplateEntry>> {
        if let Some(k) = kind {
            paths::validate_name(k)?;
        }
        let mut entries = Vec::new();
        for location in &self.locations {
            match location {
                TemplateLocation::Directory { scope, path } => {
                    for (k, name) in scan_directory(path, kind)? {
                        entries.push(TemplateEntry {
                            kind: k,
                            name,
                            scope: *scope,
                        });
                    }
                }
                TemplateLocation::Builtin => {
                    for t in BUILTIN_TEMPLATES {
                        if kind.map_or(true, |k| k == t.kind) {
                            entries.push(TemplateEntry {
                                kind: t.kind.to_string(),
                                name: t.name.to_string(),
                                scope: Scope::Builtin,
                            });
                        }
                    }
                }
            }
        }
        Ok(entries)
    }

    /// Template names grouped by kind, aggregated over every location.
    pub fn list(&self, kind: Option<&str>) -> Result<BTreeMap<String, BTreeSet<String>>> {
        let mut out: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for entry in self.list_entries(kind)? {
            out.entry(entry.kind).or_default().insert(entry.name);
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Write `document` as `<kind>/<name>.yaml` in the location for `scope`,
    /// replacing any existing file.
    pub fn create(
        &self,
        name: &str,
        kind: &str,
        document: &Document,
        scope: Scope,
    ) -> Result<PathBuf> {
        paths::validate_name(name)?;
        paths::validate_name(kind)?;

        let dir = self.writable_dir(scope)?;
        let path = paths::template_file(dir, kind, name, Format::Yaml.extension());
        document.save(&path)?;
        tracing::info!("wrote template {}", path.display());
        Ok(path)
    }

    /// Strict load of a single file outside the search path, e.g. an
    /// override document. Parse failures are `MalformedDocument`.
    pub fn load_file(&self, path: &Path) -> Result<Document> {
        Document::load(path)
    }

    /// Load `input` (JSON or YAML by extension) and store it as a template.
    pub fn import(&self, input: &Path, name: &str, kind: &str, scope: Scope) -> Result<PathBuf> {
        let document = self.load_file(input)?;
        self.create(name, kind, &document, scope)
    }

    /// Write the resolved template to `output`, as JSON when the path ends
    /// in `.json` and YAML otherwise.
    pub fn export(&self, name: &str, kind: &str, output: &Path) -> Result<()> {
        let template = self.get(name, kind)?;
        template.document.save(output)
    }

    /// Resolve a template and deep-merge `overrides` onto a copy of it. The
    /// stored template is never modified.
    pub fn apply(&self, name: &str, kind: &str, overrides: Option<&Document>) -> Result<Document> {
        let template = self.get(name, kind)?;
        Ok(match overrides {
            Some(o) => merge::merge(&template.document, o),
            None => template.document,
        })
    }

    fn writable_dir(&self, scope: Scope) -> Result<&Path> {
        self.locations
            .iter()
            .find_map(|l| match l {
                TemplateLocation::Directory { scope: s, path }
                    if *s == scope && matches!(scope, Scope::Local | Scope::User) =>
                {
                    Some(path.as_path())
                }
                _ => None,
            })
            .ok_or_else(|| TrellisError::NoWritableLocation(scope.to_string()))
    }
}

fn find_template_file(dir: &Path, kind: &str, name: &str) -> Option<PathBuf> {
    paths::TEMPLATE_EXTENSIONS
        .iter()
        .map(|ext| paths::template_file(dir, kind, name, ext))
        .find(|p| p.is_file())
}

/// (kind, name) pairs under `dir`, optionally limited to one kind.
fn scan_directory(dir: &Path, kind: Option<&str>) -> Result<Vec<(String, String)>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let kinds: Vec<String> = match kind {
        Some(k) => vec![k.to_string()],
        None => {
            let mut ks = Vec::new();
            for entry in std::fs::read_dir(dir)? {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    ks.push(entry.file_name().to_string_lossy().into_owned());
                }
            }
            ks.sort();
            ks
        }
    };

    let mut out = Vec::new();
    for k in kinds {
        let kind_dir = dir.join(&k);
        if !kind_dir.is_dir() {
            continue;
        }
        let mut names = BTreeSet::new();
        for entry in std::fs::read_dir(&kind_dir)? {
            let path = entry?.path();
            let is_template = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| paths::TEMPLATE_EXTENSIONS.contains(&e));
            if !is_template {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.insert(stem.to_string());
            }
        }
        out.extend(names.into_iter().map(|n| (k.clone(), n)));
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

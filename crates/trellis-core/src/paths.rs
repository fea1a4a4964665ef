use crate::error::{Result, TrellisError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const TRELLIS_DIR: &str = ".trellis";
pub const TEMPLATES_DIR: &str = ".trellis/templates";
pub const CONFIG_FILE: &str = ".trellis/config.yaml";

/// Extensions recognised for template files, in lookup order. The first one
/// is used when writing.
pub const TEMPLATE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn local_templates_dir(root: &Path) -> PathBuf {
    root.join(TEMPLATES_DIR)
}

/// `~/.trellis/templates`
pub fn user_templates_dir() -> Result<PathBuf> {
    let home = home::home_dir().ok_or(TrellisError::HomeNotFound)?;
    Ok(home.join(TEMPLATES_DIR))
}

/// `<dir>/<kind>/<name>.<ext>`
pub fn template_file(dir: &Path, kind: &str, name: &str, ext: &str) -> PathBuf {
    dir.join(kind).join(format!("{name}.{ext}"))
}

// ---------------------------------------------------------------------------
// Name validation
// ---------------------------------------------------------------------------

static NAME_RE: OnceLock<Regex> = OnceLock::new();

fn name_re() -> &'static Regex {
    NAME_RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9][a-z0-9_\-]*[a-z0-9]$|^[a-z0-9]$").expect("static regex")
    })
}

/// Template names and kinds become path segments, so they are restricted to
/// a slug alphabet.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 64 || !name_re().is_match(name) {
        return Err(TrellisError::InvalidName(name.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

use anyhow::{bail, Context};
use std::path::{Path, PathBuf};
use trellis_core::config::Config;
use trellis_core::document::{Document, Format, Value};
use trellis_core::github::{GitHubClient, RepoSlug};
use trellis_core::template::TemplateStore;

/// Config and template store for one invocation.
pub struct Project {
    pub root: PathBuf,
    pub config: Config,
}

impl Project {
    pub fn load(root: &Path) -> anyhow::Result<Self> {
        let config = Config::load(root).context("failed to load config")?;
        Ok(Self {
            root: root.to_path_buf(),
            config,
        })
    }

    pub fn store(&self) -> TemplateStore {
        TemplateStore::discover(&self.root, &self.config.templates)
    }

    /// `--repo` if given, else `defaults.repository`.
    pub fn repo(&self, flag: Option<&str>) -> anyhow::Result<RepoSlug> {
        let Some(raw) = flag.or(self.config.defaults.repository.as_deref()) else {
            bail!("no repository: pass --repo owner/repo or set defaults.repository in .trellis/config.yaml");
        };
        Ok(RepoSlug::parse(raw)?)
    }

    pub fn tracker(&self, repo: RepoSlug) -> anyhow::Result<GitHubClient> {
        GitHubClient::from_env(&self.config.github.api_url, repo)
            .context("failed to set up GitHub client")
    }
}

/// Build an override document from `--values` (inline JSON or a JSON/YAML
/// file) and repeated `--set path=value` pairs. `--set` wins on conflict.
pub fn overrides(values: Option<&str>, sets: &[String]) -> anyhow::Result<Option<Document>> {
    let mut doc = match values {
        None => Document::new(),
        Some(v) if Path::new(v).is_file() => Document::load(Path::new(v))?,
        Some(v) => Document::parse(v, Format::Json)
            .with_context(|| format!("--values is neither a file nor a JSON object: {v}"))?,
    };
    for set in sets {
        let Some((path, raw)) = set.split_once('=') else {
            bail!("--set expects path=value, got '{set}'");
        };
        if path.is_empty() {
            bail!("--set expects path=value, got '{set}'");
        }
        doc.set_path(path, scalar(raw));
    }
    Ok((!doc.is_empty()).then_some(doc))
}

/// Read a `--set` value as a YAML scalar so numbers and booleans keep their
/// type. Anything that is not a scalar stays a string.
fn scalar(raw: &str) -> Value {
    match serde_yaml::from_str::<Value>(raw) {
        Ok(v @ (Value::Bool(_) | Value::Integer(_) | Value::Float(_))) => v,
        _ => Value::from(raw),
    }
}

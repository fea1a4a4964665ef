use crate::error::{Result, TrellisError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Keys keep the order they were written in.
pub type Mapping = IndexMap<String, Value>;

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A node in a template document. Scalars, sequences and mappings are the
/// only shapes; anything else is rejected when the document is parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Sequence(Vec<Value>),
    Mapping(Mapping),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Value::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn is_mapping(&self) -> bool {
        matches!(self, Value::Mapping(_))
    }

    /// Render a scalar the way it would appear in a label or title.
    /// Sequences and mappings have no scalar form.
    pub fn to_scalar_string(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::String(s) => Some(s.clone()),
            Value::Sequence(_) | Value::Mapping(_) => None,
        }
    }

    fn substitute(&mut self, pattern: &str, replacement: &str) {
        match self {
            Value::String(s) if s.contains(pattern) => {
                *s = s.replace(pattern, replacement);
            }
            Value::Sequence(items) => {
                for item in items {
                    item.substitute(pattern, replacement);
                }
            }
            Value::Mapping(map) => {
                for v in map.values_mut() {
                    v.substitute(pattern, replacement);
                }
            }
            _ => {}
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Sequence(items)
    }
}

impl From<Mapping> for Value {
    fn from(map: Mapping) -> Self {
        Value::Mapping(map)
    }
}

// ---------------------------------------------------------------------------
// Format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
}

impl Format {
    /// `.json` selects JSON; every other extension is treated as YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Format::Json,
            _ => Format::Yaml,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Format::Yaml => "yaml",
            Format::Json => "json",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A template or override document: always a mapping at the root.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Mapping);

impl Document {
    pub fn new() -> Self {
        Self(Mapping::new())
    }

    pub fn parse(text: &str, format: Format) -> Result<Self> {
        let doc = match format {
            Format::Yaml => serde_yaml::from_str(text)?,
            Format::Json => serde_json::from_str(text)?,
        };
        Ok(doc)
    }

    /// Load exactly one file. Any read or parse failure is reported as
    /// `MalformedDocument` naming the file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text, Format::from_path(path)).map_err(|e| TrellisError::MalformedDocument {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn to_string(&self, format: Format) -> Result<String> {
        let text = match format {
            Format::Yaml => serde_yaml::to_string(self)?,
            Format::Json => {
                let mut s = serde_json::to_string_pretty(self)?;
                s.push('\n');
                s
            }
        };
        Ok(text)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = self.to_string(Format::from_path(path))?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Look up a dotted path such as `fields.body.template`.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.0.get(parts.next()?)?;
        for part in parts {
            current = current.as_mapping()?.get(part)?;
        }
        Some(current)
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get_path(path).and_then(Value::as_str)
    }

    /// String items of a sequence at `path`; non-string items are skipped.
    pub fn get_strings(&self, path: &str) -> Vec<String> {
        self.get_path(path)
            .and_then(Value::as_sequence)
            .map(|items| items.iter().filter_map(Value::to_scalar_string).collect())
            .unwrap_or_default()
    }

    /// Set a dotted path, creating intermediate mappings and replacing any
    /// non-mapping value in the way.
    pub fn set_path(&mut self, path: &str, value: impl Into<Value>) {
        let parts: Vec<&str> = path.split('.').collect();
        set_in(&mut self.0, &parts, value.into());
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_mapping(&self) -> &Mapping {
        &self.0
    }

    pub fn as_mapping_mut(&mut self) -> &mut Mapping {
        &mut self.0
    }

    /// Replace every `{key}` placeholder inside string values.
    pub fn substitute(&mut self, key: &str, replacement: &str) {
        let pattern = format!("{{{key}}}");
        for v in self.0.values_mut() {
            v.substitute(&pattern, replacement);
        }
    }
}

fn set_in(map: &mut Mapping, parts: &[&str], value: Value) {
    match parts {
        [] => {}
        [last] => {
            map.insert(last.to_string(), value);
        }
        [head, rest @ ..] => {
            let entry = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Mapping(Mapping::new()));
            if !entry.is_mapping() {
                *entry = Value::Mapping(Mapping::new());
            }
            if let Value::Mapping(child) = entry {
                set_in(child, rest, value);
            }
        }
    }
}

impl From<Mapping> for Document {
    fn from(map: Mapping) -> Self {
        Self(map)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Labels declared by project and roadmap templates.

use crate::document::{Document, Value};
use crate::tracker::{IssueTracker, NewLabel};
use serde::Serialize;

/// Colour for template labels that do not set one.
pub const DEFAULT_LABEL_COLOR: &str = "CCCCCC";

/// Read the template's `labels` list. Entries must be mappings with a
/// `name`; anything else is skipped with a warning. A leading `#` on the
/// colour is dropped.
pub fn from_template(doc: &Document) -> Vec<NewLabel> {
    let entries = doc.get("labels").and_then(Value::as_sequence).unwrap_or(&[]);
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(map) = entry.as_mapping() else {
            tracing::warn!("ignoring template label that is not a mapping");
            continue;
        };
        let Some(name) = map.get("name").and_then(Value::to_scalar_string) else {
            tracing::warn!("ignoring template label without a name");
            continue;
        };
        out.push(NewLabel {
            name,
            color: map
                .get("color")
                .and_then(Value::to_scalar_string)
                .map(|c| c.trim_start_matches('#').to_string())
                .unwrap_or_else(|| DEFAULT_LABEL_COLOR.to_string()),
            description: map
                .get("description")
                .and_then(Value::to_scalar_string)
                .unwrap_or_default(),
        });
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "error", rename_all = "snake_case")]
pub enum LabelOutcome {
    Created,
    Exists,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelResult {
    pub name: String,
    #[serde(flatten)]
    pub outcome: LabelOutcome,
}

/// Create every label, one call each. A failure is recorded and logged but
/// does not stop the rest.
pub fn ensure<T: IssueTracker + ?Sized>(tracker: &mut T, labels: &[NewLabel]) -> Vec<LabelResult> {
    labels
        .iter()
        .map(|label| {
            let outcome = match tracker.create_label(label) {
                Ok(true) => LabelOutcome::Created,
                Ok(false) => LabelOutcome::Exists,
                Err(e) => {
                    tracing::warn!(label = %label.name, error = %e, "label creation failed");
                    LabelOutcome::Failed(e.to_string())
                }
            };
            LabelResult {
                name: label.name.clone(),
                outcome,
            }
        })
        .collect()
}

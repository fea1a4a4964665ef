use crate::checklist::{self, ChecklistItem};
use crate::error::{Result, TrellisError};
use crate::relation;
use crate::tracker::{Issue, IssuePatch, IssueTracker, NewIssue};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// A child issue created from one checklist line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChildRef {
    pub number: u64,
    pub title: String,
    /// Zero-based line of the parent body the child was created from.
    pub line: usize,
}

/// Output of [`HierarchyBuilder::materialize`]: the rewritten parent body and
/// the children behind it. Nothing has been written to the parent yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Materialized {
    pub body: String,
    pub children: Vec<ChildRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversion {
    pub parent: Issue,
    pub children: Vec<ChildRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkOutcome {
    pub parent: Issue,
    pub child: Issue,
    /// False when the child already started with its `Parent:` marker.
    pub child_marked: bool,
}

pub fn child_body(parent: u64) -> String {
    format!("Created from task in #{parent}.")
}

fn body_digest(body: &str) -> String {
    format!("{:x}", Sha256::digest(body.as_bytes()))
}

/// The checklist items a conversion of `parent_body` would turn into issues.
/// Makes no remote calls.
pub fn plan(parent_body: &str, parent_number: u64) -> Result<Vec<ChecklistItem>> {
    let items = checklist::extract(parent_body);
    if items.is_empty() {
        return Err(TrellisError::NoTasksFound(parent_number));
    }
    Ok(items)
}

// ---------------------------------------------------------------------------
// HierarchyBuilder
// ---------------------------------------------------------------------------

pub struct HierarchyBuilder<'a, T: IssueTracker> {
    tracker: &'a mut T,
}

impl<'a, T: IssueTracker> HierarchyBuilder<'a, T> {
    pub fn new(tracker: &'a mut T) -> Self {
        Self { tracker }
    }

    pub fn plan(&self, parent_body: &str, parent_number: u64) -> Result<Vec<ChecklistItem>> {
        plan(parent_body, parent_number)
    }

    /// Create one child per unchecked checklist item of `parent_body`, in
    /// source order, and return the body with each item's line rewritten to
    /// `- [ ] #<child> <label>`.
    ///
    /// On a failed create the children made so far are reported through
    /// `ConversionAborted` and no body is produced.
    pub fn materialize(
        &mut self,
        parent_body: &str,
        parent_number: u64,
        labels: &[String],
    ) -> Result<Materialized> {
        let items = plan(parent_body, parent_number)?;

        let mut children: Vec<ChildRef> = Vec::with_capacity(items.len());
        let mut replacements = HashMap::with_capacity(items.len());
        for item in &items {
            let new = NewIssue {
                title: item.label.clone(),
                body: child_body(parent_number),
                labels: labels.to_vec(),
                ..NewIssue::default()
            };
            let created = self.tracker.create_issue(&new).map_err(|e| {
                tracing::warn!(parent = parent_number, error = %e, "child creation failed");
                TrellisError::ConversionAborted {
                    parent: parent_number,
                    created: children.iter().map(|c| c.number).collect(),
                    source: Box::new(e),
                }
            })?;
            tracing::debug!(parent = parent_number, child = created.number, "created child issue");
            replacements.insert(item.line, item.linked_line(created.number));
            children.push(ChildRef {
                number: created.number,
                title: created.title,
                line: item.line,
            });
        }

        Ok(Materialized {
            body: checklist::rewrite_lines(parent_body, &replacements),
            children,
        })
    }

    /// Turn the checklist of issue `parent_number` into child issues and
    /// write the rewritten body back in a single update.
    ///
    /// The parent is re-read before that update; if its body no longer
    /// matches the one the children were created from, the update is skipped
    /// and `BodyChanged` names the orphaned children.
    pub fn convert_tasks(&mut self, parent_number: u64, labels: &[String]) -> Result<Conversion> {
        let parent = self.tracker.get_issue(parent_number)?;
        let digest = body_digest(&parent.body);

        let materialized = self.materialize(&parent.body, parent_number, labels)?;
        let created: Vec<u64> = materialized.children.iter().map(|c| c.number).collect();

        let abort = |source: TrellisError, created: &[u64]| TrellisError::ConversionAborted {
            parent: parent_number,
            created: created.to_vec(),
            source: Box::new(source),
        };

        let current = self
            .tracker
            .get_issue(parent_number)
            .map_err(|e| abort(e, &created))?;
        if body_digest(&current.body) != digest {
            tracing::warn!(parent = parent_number, ?created, "parent body changed during conversion");
            return Err(TrellisError::BodyChanged {
                number: parent_number,
                created,
            });
        }

        let updated = self
            .tracker
            .update_issue(parent_number, &IssuePatch::body(materialized.body))
            .map_err(|e| abort(e, &created))?;
        tracing::info!(parent = parent_number, children = created.len(), "converted tasks");

        Ok(Conversion {
            parent: updated,
            children: materialized.children,
        })
    }

    /// Record `child_number` under the parent's `## Sub-issues` section and
    /// mark the child with `Parent: #<parent>`.
    pub fn link(&mut self, parent_number: u64, child_number: u64) -> Result<LinkOutcome> {
        let parent = self.tracker.get_issue(parent_number)?;
        let child = self.tracker.get_issue(child_number)?;

        let parent_body = relation::append_sub_issue_entry(&parent.body, child.number, &child.title);
        let parent = self
            .tracker
            .update_issue(parent_number, &IssuePatch::body(parent_body))?;

        let (child, child_marked) = match relation::prepend_parent_marker(&child.body, parent_number)
        {
            Some(body) => (
                self.tracker
                    .update_issue(child_number, &IssuePatch::body(body))?,
                true,
            ),
            None => (child, false),
        };
        tracing::debug!(parent = parent_number, child = child_number, "linked sub-issue");

        Ok(LinkOutcome {
            parent,
            child,
            child_marked,
        })
    }

    /// Create `new` and link it under `parent_number`. The parent is looked
    /// up first so a missing parent creates nothing.
    pub fn create_sub_issue(&mut self, parent_number: u64, new: &NewIssue) -> Result<Issue> {
        self.tracker.get_issue(parent_number)?;
        let created = self.tracker.create_issue(new)?;
        Ok(self.link(parent_number, created.number)?.child)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

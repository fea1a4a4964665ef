//! Parent/child links between issues, encoded as plain text in issue bodies.
//!
//! Three markers carry the relation:
//!
//! * `Parent: #<n>` as the first line of a child,
//! * a `## Sub-issues` section in the parent listing `- #<n>: <title>`,
//! * converted checklist lines `- [ ] #<n> <label>` in the parent.
//!
//! The helpers here are pure string transforms; `hierarchy` drives them
//! against an `IssueTracker`.

use crate::checklist;
use crate::tracker::Issue;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

pub const SUB_ISSUES_HEADING: &str = "## Sub-issues";

static PARENT_RE: OnceLock<Regex> = OnceLock::new();
static ENTRY_RE: OnceLock<Regex> = OnceLock::new();

fn parent_re() -> &'static Regex {
    PARENT_RE.get_or_init(|| Regex::new(r"^Parent:[ \t]*#(?P<number>\d+)\b").expect("static regex"))
}

fn entry_re() -> &'static Regex {
    ENTRY_RE.get_or_init(|| {
        Regex::new(r"^[ \t]*[-*+][ \t]+#(?P<number>\d+):?[ \t]*(?P<title>.*?)[ \t]*$")
            .expect("static regex")
    })
}

fn lines(body: &str) -> impl Iterator<Item = &str> {
    body.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l))
}

fn is_sub_issues_heading(line: &str) -> bool {
    line.trim_end() == SUB_ISSUES_HEADING
}

/// `#` or `##` headings end a `## Sub-issues` section; deeper ones do not.
fn ends_section(line: &str) -> bool {
    line.starts_with("# ") || line.starts_with("## ") || line == "#" || line == "##"
}

// ---------------------------------------------------------------------------
// Marker parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubIssueRef {
    pub number: u64,
    pub title: String,
}

/// The parent named by a `Parent: #<n>` first line, if any.
pub fn parent_marker(body: &str) -> Option<u64> {
    let first = lines(body).next()?;
    parent_re().captures(first)?["number"].parse().ok()
}

/// Entries listed under the `## Sub-issues` heading.
pub fn section_entries(body: &str) -> Vec<SubIssueRef> {
    let mut out = Vec::new();
    let mut in_section = false;
    for line in lines(body) {
        if is_sub_issues_heading(line) {
            in_section = true;
            continue;
        }
        if in_section && ends_section(line) {
            in_section = false;
        }
        if !in_section {
            continue;
        }
        if let Some(caps) = entry_re().captures(line) {
            if let Ok(number) = caps["number"].parse() {
                out.push(SubIssueRef {
                    number,
                    title: caps["title"].to_string(),
                });
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Body rewrites
// ---------------------------------------------------------------------------

/// `body` with `Parent: #<parent>` as its first line, or `None` when it
/// already starts with that marker.
pub fn prepend_parent_marker(body: &str, parent: u64) -> Option<String> {
    if parent_marker(body) == Some(parent) {
        return None;
    }
    if body.is_empty() {
        Some(format!("Parent: #{parent}"))
    } else {
        Some(format!("Parent: #{parent}\n\n{body}"))
    }
}

/// Add `- #<child>: <title>` at the end of the `## Sub-issues` section,
/// creating the heading at the end of the body when it is missing. The
/// heading is never duplicated. Entries are appended even if `child` is
/// already listed.
pub fn append_sub_issue_entry(body: &str, child: u64, title: &str) -> String {
    let entry = format!("- #{child}: {title}");
    let all: Vec<&str> = body.split('\n').collect();

    let Some(heading) = all.iter().position(|l| is_sub_issues_heading(l.trim_end_matches('\r')))
    else {
        let trimmed = body.trim_end();
        return if trimmed.is_empty() {
            format!("{SUB_ISSUES_HEADING}\n\n{entry}\n")
        } else {
            format!("{trimmed}\n\n{SUB_ISSUES_HEADING}\n\n{entry}\n")
        };
    };

    let section_end = all[heading + 1..]
        .iter()
        .position(|l| ends_section(l.trim_end_matches('\r')))
        .map_or(all.len(), |p| heading + 1 + p);

    // Insert after the last non-blank line of the section.
    let insert_at = all[heading + 1..section_end]
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .map_or(heading + 1, |p| heading + 2 + p);

    let mut out: Vec<String> = all.iter().map(|l| l.to_string()).collect();
    let entry_idx = if insert_at == heading + 1 {
        // Empty section: leave one blank line under the heading.
        out.insert(insert_at, String::new());
        insert_at + 1
    } else {
        insert_at
    };
    out.insert(entry_idx, entry);
    if entry_idx + 1 == out.len() {
        out.push(String::new());
    }
    out.join("\n")
}

// ---------------------------------------------------------------------------
// SubIssueRelation
// ---------------------------------------------------------------------------

/// The parent/child graph recovered from a set of issue bodies.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubIssueRelation {
    pub parent_of: BTreeMap<u64, u64>,
    pub children_of: BTreeMap<u64, Vec<SubIssueRef>>,
}

impl SubIssueRelation {
    pub fn from_bodies<'a>(issues: impl IntoIterator<Item = &'a Issue>) -> Self {
        let issues: Vec<&Issue> = issues.into_iter().collect();
        let titles: BTreeMap<u64, &str> =
            issues.iter().map(|i| (i.number, i.title.as_str())).collect();
        let mut rel = SubIssueRelation::default();

        for issue in &issues {
            for entry in section_entries(&issue.body) {
                rel.add(issue.number, entry);
            }
            for linked in checklist::linked_items(&issue.body) {
                let title = titles
                    .get(&linked.number)
                    .map(|t| t.to_string())
                    .unwrap_or(linked.label);
                rel.add(
                    issue.number,
                    SubIssueRef {
                        number: linked.number,
                        title,
                    },
                );
            }
            if let Some(parent) = parent_marker(&issue.body) {
                rel.add(
                    parent,
                    SubIssueRef {
                        number: issue.number,
                        title: issue.title.clone(),
                    },
                );
            }
        }
        rel
    }

    fn add(&mut self, parent: u64, child: SubIssueRef) {
        self.parent_of.entry(child.number).or_insert(parent);
        let children = self.children_of.entry(parent).or_default();
        if !children.iter().any(|c| c.number == child.number) {
            children.push(child);
        }
    }

    pub fn parent(&self, child: u64) -> Option<u64> {
        self.parent_of.get(&child).copied()
    }

    pub fn children(&self, parent: u64) -> &[SubIssueRef] {
        self.children_of
            .get(&parent)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// A `## Sub-issues` section listing every known child of `parent`, or
    /// `None` when it has none.
    pub fn render_section(&self, parent: u64) -> Option<String> {
        let children = self.children(parent);
        if children.is_empty() {
            return None;
        }
        let mut out = format!("{SUB_ISSUES_HEADING}\n\n");
        for c in children {
            out.push_str(&format!("- #{}: {}\n", c.number, c.title));
        }
        Some(out)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

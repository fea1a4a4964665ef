use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

static UNCHECKED_RE: OnceLock<Regex> = OnceLock::new();
static LINKED_RE: OnceLock<Regex> = OnceLock::new();

/// `- [ ] label`, any of `-*+` as bullet, whitespace inside the box allowed.
fn unchecked_re() -> &'static Regex {
    UNCHECKED_RE.get_or_init(|| {
        Regex::new(r"^(?P<indent>[ \t]*)(?P<bullet>[-*+])[ \t]+\[[ \t]*\][ \t]+(?P<label>\S.*?)[ \t]*$")
            .expect("static regex")
    })
}

/// `- [ ] #12 label` or `- [x] #12 label`.
fn linked_re() -> &'static Regex {
    LINKED_RE.get_or_init(|| {
        Regex::new(
            r"^[ \t]*[-*+][ \t]+\[(?P<mark>[ \txX]*)\][ \t]+#(?P<number>\d+)(?:[ \t]+(?P<label>.*?))?[ \t]*$",
        )
        .expect("static regex")
    })
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// An unchecked checklist line that has not been linked to an issue yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecklistItem {
    /// Zero-based line index within the body.
    pub line: usize,
    /// The full line without its terminator.
    pub raw: String,
    pub label: String,
    indent: String,
    bullet: char,
}

impl ChecklistItem {
    /// The replacement line once this item has become issue `number`. The
    /// box stays unchecked: conversion records provenance, not completion.
    pub fn linked_line(&self, number: u64) -> String {
        format!("{}{} [ ] #{number} {}", self.indent, self.bullet, self.label)
    }
}

/// A checklist line already pointing at an issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedItem {
    pub line: usize,
    pub number: u64,
    pub label: String,
    pub checked: bool,
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

fn body_lines(body: &str) -> impl Iterator<Item = (usize, &str)> {
    body.split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .enumerate()
}

/// Unchecked, not-yet-linked checklist items in source order. Checked items
/// and lines of the form `- [ ] #<n> ...` are skipped. A hand-written label
/// that itself opens with `#<digits>` reads as linked and is skipped too.
pub fn extract(body: &str) -> Vec<ChecklistItem> {
    body_lines(body)
        .filter(|(_, line)| !linked_re().is_match(line))
        .filter_map(|(idx, line)| {
            let caps = unchecked_re().captures(line)?;
            Some(ChecklistItem {
                line: idx,
                raw: line.to_string(),
                label: caps["label"].trim().to_string(),
                indent: caps["indent"].to_string(),
                bullet: caps["bullet"].chars().next().unwrap_or('-'),
            })
        })
        .collect()
}

/// Checklist lines that reference an issue number, checked or not.
pub fn linked_items(body: &str) -> Vec<LinkedItem> {
    body_lines(body)
        .filter_map(|(idx, line)| {
            let caps = linked_re().captures(line)?;
            let number = caps["number"].parse().ok()?;
            Some(LinkedItem {
                line: idx,
                number,
                label: caps
                    .name("label")
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_default(),
                checked: caps["mark"].trim().eq_ignore_ascii_case("x"),
            })
        })
        .collect()
}

/// Replace whole lines by index, keeping every other line and every line
/// terminator byte-for-byte.
pub fn rewrite_lines(body: &str, replacements: &HashMap<usize, String>) -> String {
    let mut out = String::with_capacity(body.len() + replacements.len() * 8);
    for (idx, segment) in body.split_inclusive('\n').enumerate() {
        match replacements.get(&idx) {
            Some(new_line) => {
                let terminator = if segment.ends_with("\r\n") {
                    "\r\n"
                } else if segment.ends_with('\n') {
                    "\n"
                } else {
                    ""
                };
                out.push_str(new_line);
                out.push_str(terminator);
            }
            None => out.push_str(segment),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(body: &str) -> Vec<String> {
        extract(body).into_iter().map(|i| i.label).collect()
    }

    #[test]
    fn skips_checked_items() {
        assert_eq!(labels("- [ ] A\n- [x] B\n- [ ] C"), vec!["A", "C"]);
    }

    #[test]
    fn no_checklist_is_empty() {
        assert!(extract("Just prose.\n\n* a bullet\n1. numbered").is_empty());
        assert!(extract("").is_empty());
    }

    #[test]
    fn tolerant_markers_and_trimmed_labels() {
        let body = "  * [ ]   Indented star  \n+ []\tPlus bullet\n-  [  ] Wide box\n- [X] Upper done";
        assert_eq!(labels(body), vec!["Indented star", "Plus bullet", "Wide box"]);
    }

    #[test]
    fn records_line_and_raw() {
        let items = extract("intro\r\n- [ ] First\r\n\r\n- [ ] Second");
        assert_eq!(items[0].line, 1);
        assert_eq!(items[0].raw, "- [ ] First");
        assert_eq!(items[1].line, 3);
    }

    #[test]
    fn duplicates_kept_in_order() {
        assert_eq!(labels("- [ ] Same\n- [ ] Other\n- [ ] Same"), vec!["Same", "Other", "Same"]);
    }

    #[test]
    fn empty_box_without_label_ignored() {
        assert!(extract("- [ ]\n- [ ]   ").is_empty());
    }

    #[test]
    fn already_linked_lines_are_not_candidates() {
        let body = "- [ ] #10 A\n- [ ] B\n- [x] #11 C";
        assert_eq!(labels(body), vec!["B"]);

        let linked = linked_items(body);
        assert_eq!(linked.len(), 2);
        assert_eq!(linked[0].number, 10);
        assert_eq!(linked[0].label, "A");
        assert!(!linked[0].checked);
        assert_eq!(linked[1].number, 11);
        assert!(linked[1].checked);
    }

    #[test]
    fn label_opening_with_issue_number_reads_as_linked() {
        let body = "- [ ] #1 priority: fix login\n- [ ] B\n- [ ] fix #1 first";
        assert_eq!(labels(body), vec!["B", "fix #1 first"]);
        let linked = linked_items(body);
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].number, 1);
        assert_eq!(linked[0].label, "priority: fix login");
    }

    #[test]
    fn linked_line_keeps_indent_and_bullet() {
        let item = &extract("    * [ ] Nested")[0];
        assert_eq!(item.linked_line(42), "    * [ ] #42 Nested");
    }

    #[test]
    fn rewrite_touches_only_named_lines() {
        let body = "# Title\r\n- [ ] A\nkeep me\n- [ ] B";
        let mut repl = HashMap::new();
        repl.insert(1, "- [ ] #10 A".to_string());
        repl.insert(3, "- [ ] #11 B".to_string());
        assert_eq!(
            rewrite_lines(body, &repl),
            "# Title\r\n- [ ] #10 A\nkeep me\n- [ ] #11 B"
        );
    }

    #[test]
    fn rewrite_with_no_replacements_is_identity() {
        let body = "a\n\nb\n";
        assert_eq!(rewrite_lines(body, &HashMap::new()), body);
    }
}

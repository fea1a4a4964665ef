use crate::error::{Result, TrellisError};
use chrono::{Duration, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::fmt::Write as _;
use std::sync::OnceLock;

/// Completed milestones shown by [`render_report`].
pub const REPORT_COMPLETED_LIMIT: usize = 3;

// ---------------------------------------------------------------------------
// Milestone
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneState {
    Open,
    Closed,
}

impl fmt::Display for MilestoneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MilestoneState::Open => "open",
            MilestoneState::Closed => "closed",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub due_on: Option<NaiveDate>,
    pub state: MilestoneState,
    pub open_issues: u64,
    pub closed_issues: u64,
    #[serde(default)]
    pub html_url: String,
}

impl Milestone {
    pub fn total_issues(&self) -> u64 {
        self.open_issues + self.closed_issues
    }

    /// Closed share of all issues as a whole percentage; 0 for an empty
    /// milestone. Exact halves round to the even neighbour, so 1 of 8 is 12.
    pub fn completion_percentage(&self) -> u8 {
        let total = u128::from(self.total_issues());
        if total == 0 {
            return 0;
        }
        let scaled = u128::from(self.closed_issues) * 100;
        let (quotient, remainder) = (scaled / total, scaled % total);
        let rounded = match (remainder * 2).cmp(&total) {
            Ordering::Greater => quotient + 1,
            Ordering::Equal if quotient % 2 == 1 => quotient + 1,
            _ => quotient,
        };
        u8::try_from(rounded).unwrap_or(100)
    }

    pub fn is_open(&self) -> bool {
        self.state == MilestoneState::Open
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Roadmap {
    pub current: Option<Milestone>,
    pub upcoming: Vec<Milestone>,
    pub completed: Vec<Milestone>,
}

/// Undated milestones sort after every dated one.
fn cmp_due(a: &Option<NaiveDate>, b: &Option<NaiveDate>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Due date ascending, undated last. Stable for equal dates.
pub fn sort_by_due(milestones: &mut [Milestone]) {
    milestones.sort_by(|a, b| cmp_due(&a.due_on, &b.due_on));
}

/// Split milestones into current, upcoming and completed as of `as_of`.
///
/// The current milestone is the first open one, in due order, that is either
/// undated or not yet overdue. Every other open milestone is upcoming, overdue
/// ones included. Completed holds all closed milestones, latest due first.
pub fn classify(milestones: Vec<Milestone>, as_of: NaiveDate) -> Roadmap {
    let mut milestones = milestones;
    sort_by_due(&mut milestones);

    let (open, mut completed): (Vec<_>, Vec<_>) =
        milestones.into_iter().partition(Milestone::is_open);

    let current_idx = open
        .iter()
        .position(|m| m.due_on.map_or(true, |due| due >= as_of));

    let mut current = None;
    let mut upcoming = Vec::with_capacity(open.len());
    for (idx, m) in open.into_iter().enumerate() {
        if Some(idx) == current_idx {
            current = Some(m);
        } else {
            upcoming.push(m);
        }
    }

    completed.sort_by(|a, b| match (a.due_on, b.due_on) {
        (Some(a), Some(b)) => b.cmp(&a),
        (x, y) => cmp_due(&x, &y),
    });

    Roadmap {
        current,
        upcoming,
        completed,
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

fn write_progress(out: &mut String, m: &Milestone) {
    let due = m
        .due_on
        .map(|d| d.to_string())
        .unwrap_or_else(|| "No due date".to_string());
    let _ = write!(out, "### {}\n\nDue: {due}\n\n", m.title);
    let _ = write!(
        out,
        "Progress: {}% complete ({}/{} issues closed)\n\n",
        m.completion_percentage(),
        m.closed_issues,
        m.total_issues()
    );
}

/// Markdown summary of a classified roadmap. Only the most recent
/// [`REPORT_COMPLETED_LIMIT`] completed milestones are listed.
pub fn render_report(repo: &str, roadmap: &Roadmap) -> String {
    let mut out = format!("# Roadmap Report for {repo}\n\n");

    if let Some(current) = &roadmap.current {
        out.push_str("## Current Milestone\n\n");
        write_progress(&mut out, current);
    }

    if !roadmap.upcoming.is_empty() {
        out.push_str("## Upcoming Milestones\n\n");
        for m in &roadmap.upcoming {
            write_progress(&mut out, m);
        }
    }

    if !roadmap.completed.is_empty() {
        out.push_str("## Completed Milestones\n\n");
        for m in roadmap.completed.iter().take(REPORT_COMPLETED_LIMIT) {
            let date = m
                .due_on
                .map(|d| d.to_string())
                .unwrap_or_else(|| "Unknown date".to_string());
            let _ = write!(out, "### {}\n\nCompleted on: {date}\n\n", m.title);
        }
    }

    out
}

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

pub fn parse_due_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
        TrellisError::InvalidDate(format!("'{s}' is not a YYYY-MM-DD date"))
    })
}

static RELATIVE_RE: OnceLock<Regex> = OnceLock::new();

fn relative_re() -> &'static Regex {
    RELATIVE_RE.get_or_init(|| {
        Regex::new(r"^\s*(?P<sign>[+-])(?P<amount>\d+)\s+(?P<unit>[A-Za-z]+)\s*$")
            .expect("static regex")
    })
}

/// Resolve an offset such as `+3 months` or `-1 week` against `today`.
/// A month counts as 30 days. Unknown units are read as days.
pub fn resolve_relative_date(input: &str, today: NaiveDate) -> Result<NaiveDate> {
    let caps = relative_re().captures(input).ok_or_else(|| {
        TrellisError::InvalidDate(format!(
            "'{input}' is not a relative date like '+2 weeks'"
        ))
    })?;
    let amount: i64 = caps["amount"]
        .parse()
        .map_err(|_| TrellisError::InvalidDate(format!("'{input}': amount out of range")))?;

    let unit = caps["unit"].to_ascii_lowercase();
    let per_unit = match unit.as_str() {
        "day" | "days" => 1,
        "week" | "weeks" => 7,
        "month" | "months" => 30,
        other => {
            tracing::warn!(unit = other, "unknown relative date unit, reading as days");
            1
        }
    };
    let delta = amount
        .checked_mul(per_unit)
        .and_then(Duration::try_days)
        .ok_or_else(|| TrellisError::InvalidDate(format!("'{input}': offset out of range")))?;

    let resolved = if &caps["sign"] == "+" {
        today.checked_add_signed(delta)
    } else {
        today.checked_sub_signed(delta)
    };
    resolved.ok_or_else(|| TrellisError::InvalidDate(format!("'{input}': date out of range")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

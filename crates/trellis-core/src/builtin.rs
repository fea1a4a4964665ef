//! Templates compiled into the binary. They are the lowest-precedence
//! location of the default search path.

pub struct BuiltinTemplate {
    pub kind: &'static str,
    pub name: &'static str,
    pub yaml: &'static str,
}

pub const BUILTIN_TEMPLATES: &[BuiltinTemplate] = &[
    BuiltinTemplate {
        kind: "issue",
        name: "bug",
        yaml: BUG_ISSUE,
    },
    BuiltinTemplate {
        kind: "issue",
        name: "feature",
        yaml: FEATURE_ISSUE,
    },
    BuiltinTemplate {
        kind: "project",
        name: "basic",
        yaml: BASIC_PROJECT,
    },
    BuiltinTemplate {
        kind: "project",
        name: "advanced",
        yaml: ADVANCED_PROJECT,
    },
    BuiltinTemplate {
        kind: "roadmap",
        name: "quarterly",
        yaml: QUARTERLY_ROADMAP,
    },
];

pub fn find(kind: &str, name: &str) -> Option<&'static BuiltinTemplate> {
    BUILTIN_TEMPLATES
        .iter()
        .find(|t| t.kind == kind && t.name == name)
}

const BUG_ISSUE: &str = r#"name: Bug Report
description: Template for reporting bugs
labels:
  - bug
  - needs-triage
fields:
  title:
    description: A clear and concise title for the bug
  body:
    template: |
      ## Bug Description
      A clear and concise description of what the bug is.

      ## Steps To Reproduce
      1. Step one
      2. Step two

      ## Expected Behavior
      What you expected to happen.

      ## Actual Behavior
      What actually happened.
"#;

const FEATURE_ISSUE: &str = r#"name: Feature Request
description: Template for proposing a feature and breaking it into tasks
labels:
  - enhancement
fields:
  title:
    description: A short name for the feature
  body:
    template: |
      ## Summary
      What the feature does and who it is for.

      ## Tasks
      - [ ] Design
      - [ ] Implementation
      - [ ] Documentation
"#;

const BASIC_PROJECT: &str = r#"name: Basic Board
description: Three-column kanban board
columns:
  - To Do
  - In Progress
  - Done
"#;

const ADVANCED_PROJECT: &str = r#"name: Advanced Board
description: Board with review and testing stages
columns:
  - Backlog
  - To Do
  - In Progress
  - Review
  - Testing
  - Done
labels:
  - name: blocked
    color: "B60205"
    description: Work cannot proceed
  - name: needs-review
    color: "FBCA04"
    description: Waiting for review
"#;

const QUARTERLY_ROADMAP: &str = r#"name: Quarterly Release
description: One milestone per quarter
milestones:
  - name: "{quarter} Release"
    description: "Planned work for {quarter}"
    relative_date: "+3 months"
labels:
  - name: "release:{quarter}"
    color: "0E8A16"
    description: "Scheduled for the {quarter} release"
"#;

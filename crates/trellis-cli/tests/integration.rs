#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// A project directory plus an isolated HOME for the user-global store.
struct Env {
    project: TempDir,
    home: TempDir,
}

impl Env {
    fn new() -> Self {
        Self {
            project: TempDir::new().unwrap(),
            home: TempDir::new().unwrap(),
        }
    }

    fn trellis(&self) -> Command {
        let mut cmd = Command::cargo_bin("trellis").unwrap();
        cmd.current_dir(self.project.path())
            .env("TRELLIS_ROOT", self.project.path())
            .env("HOME", self.home.path())
            .env_remove("GITHUB_TOKEN")
            .env_remove("GH_TOKEN")
            .env_remove("RUST_LOG");
        cmd
    }

    fn init(&self) {
        self.trellis()
            .args(["init", "--repo", "acme/widgets"])
            .assert()
            .success();
    }

    fn write(&self, rel: &str, body: &str) -> std::path::PathBuf {
        let path = self.project.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, body).unwrap();
        path
    }
}

fn stdout_json(output: &[u8]) -> serde_json::Value {
    serde_json::from_slice(output).expect("stdout is JSON")
}

// ---------------------------------------------------------------------------
// trellis init / config
// ---------------------------------------------------------------------------

#[test]
fn init_creates_layout_and_is_idempotent() {
    let env = Env::new();
    env.init();
    assert!(env.project.path().join(".trellis/templates").is_dir());
    let config = std::fs::read_to_string(env.project.path().join(".trellis/config.yaml")).unwrap();
    assert!(config.contains("acme/widgets"));

    env.trellis()
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:  .trellis/config.yaml"));
}

#[test]
fn init_rejects_bad_repo() {
    let env = Env::new();
    env.trellis()
        .args(["init", "--repo", "not-a-slug"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid repository"));
}

#[test]
fn config_validate_flags_bad_repository() {
    let env = Env::new();
    env.write(".trellis/config.yaml", "defaults:\n  repository: nope\n");
    env.trellis()
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error]"));
}

#[test]
fn config_show_lists_search_path() {
    let env = Env::new();
    env.init();
    let out = env
        .trellis()
        .args(["config", "show", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json = stdout_json(&out);
    let scopes: Vec<_> = json["search_path"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["scope"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(scopes, vec!["local", "user", "builtin"]);
}

// ---------------------------------------------------------------------------
// trellis template
// ---------------------------------------------------------------------------

#[test]
fn template_list_includes_builtins() {
    let env = Env::new();
    env.trellis()
        .args(["template", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("bug"))
        .stdout(predicate::str::contains("quarterly"))
        .stdout(predicate::str::contains("builtin"));
}

#[test]
fn local_template_shadows_builtin() {
    let env = Env::new();
    env.init();
    env.write(
        ".trellis/templates/issue/bug.yaml",
        "name: Local Bug\nlabels: [local]\n",
    );

    let out = env
        .trellis()
        .args(["template", "show", "bug", "issue", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json = stdout_json(&out);
    assert_eq!(json["scope"], "local");
    assert_eq!(json["document"]["name"], "Local Bug");

    env.trellis()
        .args(["template", "list", "--kind", "issue", "--all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("local"))
        .stdout(predicate::str::contains("builtin"));
}

#[test]
fn malformed_local_falls_through() {
    let env = Env::new();
    env.init();
    env.write(".trellis/templates/issue/bug.yaml", "name: [unclosed\n");
    env.trellis()
        .args(["template", "show", "bug", "issue"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Bug Report"));
}

#[test]
fn show_missing_template_fails() {
    let env = Env::new();
    env.trellis()
        .args(["template", "show", "nope", "issue"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("template not found: issue/nope"));
}

#[test]
fn create_global_goes_to_home() {
    let env = Env::new();
    env.trellis()
        .args(["template", "create", "epic", "issue", "--global", "--description", "Big work"])
        .assert()
        .success();
    let path = env.home.path().join(".trellis/templates/issue/epic.yaml");
    let body = std::fs::read_to_string(path).unwrap();
    assert!(body.contains("Big work"));
}

#[test]
fn apply_merges_without_touching_store() {
    let env = Env::new();
    env.init();
    let path = env.write(
        ".trellis/templates/issue/task.yaml",
        "name: Task\nfields:\n  body:\n    template: original\n  title:\n    description: t\n",
    );
    let before = std::fs::read_to_string(&path).unwrap();

    let out = env
        .trellis()
        .args([
            "template",
            "apply",
            "task",
            "issue",
            "--set",
            "fields.body.template=changed",
            "--json",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json = stdout_json(&out);
    assert_eq!(json["fields"]["body"]["template"], "changed");
    assert_eq!(json["fields"]["title"]["description"], "t");
    assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
}

#[test]
fn export_json_then_import() {
    let env = Env::new();
    env.init();
    env.trellis()
        .args(["template", "export", "feature", "issue", "feature.json"])
        .assert()
        .success();
    let exported = env.project.path().join("feature.json");
    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&exported).unwrap()).unwrap();
    assert_eq!(parsed["name"], "Feature Request");

    env.trellis()
        .args(["template", "import", "feature.json", "feature-copy", "issue"])
        .assert()
        .success();
    assert!(env
        .project
        .path()
        .join(".trellis/templates/issue/feature-copy.yaml")
        .exists());
}

#[test]
fn import_malformed_file_fails() {
    let env = Env::new();
    env.init();
    env.write("broken.json", "{ not json");
    env.trellis()
        .args(["template", "import", "broken.json", "broken", "issue"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("malformed document"));
}

// ---------------------------------------------------------------------------
// trellis issue (dry runs; no network)
// ---------------------------------------------------------------------------

#[test]
fn issue_create_dry_run_uses_template() {
    let env = Env::new();
    env.init();
    env.trellis()
        .args(["issue", "create", "--title", "Crash on save", "--template", "bug", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Would create issue: Crash on save"))
        .stdout(predicate::str::contains("Labels: bug, needs-triage"))
        .stdout(predicate::str::contains("## Bug Description"));
}

#[test]
fn issue_create_requires_repository() {
    let env = Env::new();
    env.trellis()
        .args(["issue", "create", "--title", "x", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no repository"));
}

#[test]
fn issue_create_requires_title() {
    let env = Env::new();
    env.init();
    env.trellis()
        .args(["issue", "create", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("title is required"));
}

#[test]
fn convert_tasks_dry_run_plans_from_file() {
    let env = Env::new();
    env.init();
    env.write("body.md", "# Epic\n- [ ] Design\n- [x] Done\n- [ ] Build\n");
    let out = env
        .trellis()
        .args([
            "issue",
            "convert-tasks",
            "12",
            "--dry-run",
            "--body-file",
            "body.md",
            "--label",
            "subtask",
            "--json",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json = stdout_json(&out);
    let labels: Vec<_> = json["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["label"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(labels, vec!["Design", "Build"]);
    assert_eq!(json["tasks"][0]["line"], 2);
    assert_eq!(json["labels"][0], "subtask");
}

#[test]
fn convert_tasks_dry_run_without_tasks_fails() {
    let env = Env::new();
    env.init();
    env.write("body.md", "Nothing to split.\n");
    env.trellis()
        .args(["issue", "convert-tasks", "3", "--dry-run", "--body-file", "body.md"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no tasks found in issue #3"));
}

#[test]
fn link_to_self_is_rejected() {
    let env = Env::new();
    env.init();
    env.trellis()
        .args(["issue", "link", "4", "4", "--dry-run"])
        .assert()
        .failure();
}

#[test]
fn issue_update_dry_run_lists_changes() {
    let env = Env::new();
    env.init();
    env.trellis()
        .args([
            "issue", "update", "9", "--state", "closed", "--label", "bug", "--label", "ui",
            "--no-milestone", "--dry-run",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Would update issue #9 in acme/widgets"))
        .stdout(predicate::str::contains("State: closed"))
        .stdout(predicate::str::contains("Labels: bug, ui"))
        .stdout(predicate::str::contains("Milestone: none"));
}

#[test]
fn issue_update_dry_run_json_clears_milestone() {
    let env = Env::new();
    env.init();
    let out = env
        .trellis()
        .args(["issue", "update", "9", "--assignee", "octocat", "--no-milestone", "--dry-run", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json = stdout_json(&out);
    assert_eq!(json["update"]["assignees"][0], "octocat");
    assert!(json["update"]["milestone"].is_null());
    assert!(json["update"].get("title").is_none());
}

#[test]
fn issue_update_without_changes_fails() {
    let env = Env::new();
    env.init();
    env.trellis()
        .args(["issue", "update", "9", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nothing to update"));
}

#[test]
fn issue_list_needs_token() {
    let env = Env::new();
    env.init();
    env.trellis()
        .args(["issue", "list", "--state", "open"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("GITHUB_TOKEN"));
}

#[test]
fn live_command_without_token_fails_cleanly() {
    let env = Env::new();
    env.init();
    env.trellis()
        .args(["issue", "close", "4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("GITHUB_TOKEN"));
}

// ---------------------------------------------------------------------------
// trellis roadmap
// ---------------------------------------------------------------------------

#[test]
fn roadmap_create_dry_run_from_quarterly_template() {
    let env = Env::new();
    env.init();
    let out = env
        .trellis()
        .args([
            "roadmap",
            "create",
            "--template",
            "quarterly",
            "--quarter",
            "Q1-2026",
            "--due-date",
            "2026-03-31",
            "--dry-run",
            "--json",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json = stdout_json(&out);
    assert_eq!(json["milestone"]["title"], "Q1-2026 Release");
    assert_eq!(json["milestone"]["due_on"], "2026-03-31");
    assert_eq!(json["labels"][0]["name"], "release:Q1-2026");
}

#[test]
fn roadmap_create_rejects_bad_date() {
    let env = Env::new();
    env.init();
    env.trellis()
        .args(["roadmap", "create", "--title", "v1", "--due-date", "31/03/2026", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid date"));
}

#[test]
fn roadmap_update_dry_run() {
    let env = Env::new();
    env.init();
    env.trellis()
        .args(["roadmap", "update", "4", "--state", "closed", "--due-date", "2026-06-30", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Would update milestone 4 in acme/widgets"))
        .stdout(predicate::str::contains("State: closed"))
        .stdout(predicate::str::contains("Due date: 2026-06-30"));
}

#[test]
fn roadmap_update_without_changes_fails() {
    let env = Env::new();
    env.init();
    env.trellis()
        .args(["roadmap", "update", "4", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nothing to update"));
}

#[test]
fn roadmap_delete_dry_run() {
    let env = Env::new();
    env.init();
    env.trellis()
        .args(["roadmap", "delete", "4", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Would delete milestone 4 in acme/widgets"));
}

// ---------------------------------------------------------------------------
// trellis project
// ---------------------------------------------------------------------------

#[test]
fn project_create_dry_run_uses_basic_board() {
    let env = Env::new();
    env.init();
    env.trellis()
        .args(["project", "create", "--name", "Sprint", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Would create project: Sprint"))
        .stdout(predicate::str::contains("In repository: acme/widgets"))
        .stdout(predicate::str::contains("Using template: basic"))
        .stdout(predicate::str::contains("With columns: To Do, In Progress, Done"));
}

#[test]
fn project_create_dry_run_advanced_in_org_skips_labels() {
    let env = Env::new();
    env.init();
    env.trellis()
        .args([
            "project", "create", "--name", "Release", "--org", "acme", "--template", "advanced",
            "--dry-run",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("In organization: acme"))
        .stdout(predicate::str::contains("Backlog, To Do, In Progress, Review, Testing, Done"))
        .stdout(predicate::str::contains("Would create labels").not());
}

#[test]
fn project_create_dry_run_json_lists_labels() {
    let env = Env::new();
    env.init();
    let out = env
        .trellis()
        .args(["project", "create", "--name", "Release", "--template", "advanced", "--dry-run", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json = stdout_json(&out);
    assert_eq!(json["project"]["owner"]["kind"], "repository");
    assert_eq!(json["project"]["columns"].as_array().unwrap().len(), 6);
    assert_eq!(json["labels"][0]["name"], "blocked");
}

#[test]
fn project_create_user_board() {
    let env = Env::new();
    env.init();
    env.trellis()
        .args(["project", "create", "--name", "Mine", "--user", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("As a user project"));
}

#[test]
fn project_create_local_template_columns() {
    let env = Env::new();
    env.init();
    env.write(
        ".trellis/templates/project/triage.yaml",
        "name: Triage\ncolumns:\n  - name: Inbox\n  - Accepted\n",
    );
    env.trellis()
        .args(["project", "create", "--name", "Triage", "--template", "triage", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("With columns: Inbox, Accepted"));
}

#[test]
fn project_create_unknown_template_fails() {
    let env = Env::new();
    env.init();
    env.trellis()
        .args(["project", "create", "--name", "X", "--template", "kanban", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("template not found: project/kanban"));
}

#[test]
fn project_create_template_without_columns_fails() {
    let env = Env::new();
    env.init();
    env.write(".trellis/templates/project/bare.yaml", "name: Bare\n");
    env.trellis()
        .args(["project", "create", "--name", "X", "--template", "bare", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("defines no columns"));
}

#[test]
fn project_add_issue_dry_run() {
    let env = Env::new();
    env.init();
    env.trellis()
        .args(["project", "add-issue", "PVT_1", "12", "--column", "Review", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Would add #12 from acme/widgets to project PVT_1 in Review"));
}

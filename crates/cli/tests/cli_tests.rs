//! End-to-end tests for the cascade binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const PACKAGES: &str = r#"
[[packages]]
id = "core"
version = "0.1.0"

[[packages]]
id = "orm"
version = "0.1.0"
dependencies = ["core"]

[[packages]]
id = "web"
version = "0.1.0"
dependencies = ["orm"]
"#;

fn workspace(config: &str, messages: &[&str]) -> TempDir {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("cascade.toml"), config).unwrap();
    let lines: Vec<String> = messages
        .iter()
        .enumerate()
        .map(|(i, message)| {
            serde_json::json!({ "id": format!("c{i}"), "message": message }).to_string()
        })
        .collect();
    fs::write(temp.path().join("commits.jsonl"), lines.join("\n")).unwrap();
    temp
}

fn cascade(root: &Path) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("cascade").unwrap();
    cmd.current_dir(root).env_remove("RUST_LOG");
    cmd
}

fn save_plan(root: &Path) -> String {
    cascade(root)
        .args(["plan", "--commits", "commits.jsonl", "--out", "plan.json"])
        .assert()
        .success();
    let plan: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(root.join("plan.json")).unwrap()).unwrap();
    plan["cycle_id"].as_str().unwrap().to_string()
}

#[test]
fn test_plan_prints_json_plan() {
    let temp = workspace(PACKAGES, &["feat(orm): add joins"]);
    let output = cascade(temp.path())
        .args(["plan", "--commits", "commits.jsonl", "--date", "2024-01-05"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(plan["publish_order"], serde_json::json!(["orm", "web"]));
    assert_eq!(plan["releases"]["web"]["new_version"], "0.2.0");
    assert_eq!(plan["releases"]["web"]["is_cascaded"], true);

    // Planning is read-only.
    let config = fs::read_to_string(temp.path().join("cascade.toml")).unwrap();
    assert_eq!(config, PACKAGES);
}

#[test]
fn test_plan_json_envelope() {
    let temp = workspace(PACKAGES, &["fix(core): null check"]);
    let output = cascade(temp.path())
        .args(["--json", "plan", "--commits", "commits.jsonl"])
        .output()
        .unwrap();

    let envelope: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(envelope["status"], "ok");
    assert_eq!(
        envelope["data"]["publish_order"],
        serde_json::json!(["core", "orm", "web"])
    );
}

#[test]
fn test_nothing_to_release_exits_2() {
    let temp = workspace(PACKAGES, &["chore: tidy", "docs: readme"]);
    cascade(temp.path())
        .args(["plan", "--commits", "commits.jsonl"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("Nothing to release"));
}

#[test]
fn test_cycle_exits_3() {
    let config = r#"
[[packages]]
id = "a"
version = "1.0.0"
dependencies = ["b"]

[[packages]]
id = "b"
version = "1.0.0"
dependencies = ["a"]
"#;
    let temp = workspace(config, &["feat(a): anything"]);
    cascade(temp.path())
        .args(["plan", "--commits", "commits.jsonl"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_invalid_config_exits_3_with_json_error() {
    let temp = workspace("[cascade]\npolicy = \"sometimes\"\n", &[]);
    let output = cascade(temp.path())
        .args(["--json", "plan", "--commits", "commits.jsonl"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(3));
    let envelope: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(envelope["status"], "error");
    assert_eq!(envelope["error"]["code"], "config");
}

#[test]
fn test_apply_writes_versions_and_changelogs() {
    let temp = workspace(PACKAGES, &["fix(core): null check"]);
    cascade(temp.path())
        .args(["apply", "--commits", "commits.jsonl"])
        .assert()
        .success()
        .stdout(predicate::str::contains("core: 0.1.0 -> 0.1.1"));

    let config = fs::read_to_string(temp.path().join("cascade.toml")).unwrap();
    assert!(!config.contains("version = \"0.1.0\""));
    assert!(temp.path().join("web/CHANGELOG.md").is_file());

    cascade(temp.path())
        .args(["plan", "--commits", "commits.jsonl"])
        .assert()
        .code(2);
}

#[test]
fn test_execute_publishes_then_rollback() {
    let temp = workspace(PACKAGES, &["feat(core): add api"]);
    let cycle_id = save_plan(temp.path());

    cascade(temp.path())
        .args(["execute", "plan.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("PACKAGE"))
        .stdout(predicate::str::contains("published"));

    let registry = temp.path().join(".cascade/registry");
    assert!(registry.join("core/0.2.0.json").is_file());
    assert!(registry.join("web/0.2.0.json").is_file());
    let report = temp
        .path()
        .join(".cascade/runs")
        .join(format!("{cycle_id}.json"));
    assert!(report.is_file());

    cascade(temp.path())
        .args(["rollback", "web", "--report"])
        .arg(&report)
        .assert()
        .success()
        .stdout(predicate::str::contains("Rolled back web 0.2.0"));
    let record: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(registry.join("web/0.2.0.json")).unwrap())
            .unwrap();
    assert_eq!(record["yanked"], true);
}

#[test]
fn test_execute_twice_is_idempotent() {
    let temp = workspace(PACKAGES, &["feat(core): add api"]);
    save_plan(temp.path());
    cascade(temp.path())
        .args(["execute", "plan.json"])
        .assert()
        .success();

    cascade(temp.path())
        .args(["execute", "plan.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("skipped (already published)"))
        .stdout(predicate::str::contains("published").count(3));
}

#[test]
fn test_rerun_after_failure_can_roll_back_earlier_publish() {
    let temp = workspace(PACKAGES, &["feat(core): add api"]);
    let cycle_id = save_plan(temp.path());
    // A file where the package directory belongs makes the orm publish fail.
    let registry = temp.path().join(".cascade/registry");
    fs::create_dir_all(&registry).unwrap();
    fs::write(registry.join("orm"), "").unwrap();

    cascade(temp.path())
        .args(["execute", "plan.json"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("failed: "));

    fs::remove_file(registry.join("orm")).unwrap();
    cascade(temp.path())
        .args(["execute", "plan.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("skipped (already published)"));

    cascade(temp.path())
        .args(["rollback", "core", "--cycle", &cycle_id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Rolled back core 0.2.0"));
}

#[test]
fn test_unsaved_report_still_prints_states() {
    let temp = workspace(PACKAGES, &["feat(core): add api"]);
    save_plan(temp.path());
    fs::create_dir_all(temp.path().join(".cascade")).unwrap();
    fs::write(temp.path().join(".cascade/runs"), "").unwrap();

    cascade(temp.path())
        .args(["execute", "plan.json"])
        .assert()
        .code(3)
        .stdout(predicate::str::contains("PACKAGE"))
        .stdout(predicate::str::contains("published"))
        .stdout(predicate::str::contains("error: "));
    assert!(temp.path().join(".cascade/registry/web/0.2.0.json").is_file());
}

#[test]
fn test_rollback_of_unpublished_package_fails() {
    let temp = workspace(PACKAGES, &["fix(web): layout"]);
    let cycle_id = save_plan(temp.path());
    cascade(temp.path())
        .args(["execute", "plan.json"])
        .assert()
        .success();

    cascade(temp.path())
        .args(["rollback", "core", "--cycle", &cycle_id])
        .assert()
        .code(3);
}

#[test]
fn test_dry_run_touches_nothing() {
    let temp = workspace(PACKAGES, &["feat(core): add api"]);
    save_plan(temp.path());

    cascade(temp.path())
        .args(["execute", "plan.json", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry run of cycle"))
        .stdout(predicate::str::contains("skipped (dry run)"));

    assert!(!temp.path().join(".cascade/registry").exists());
    assert!(!temp.path().join(".cascade/runs").exists());
}

#[cfg(unix)]
#[test]
fn test_failed_publish_exits_1() {
    let config = format!(
        r#"
[registry]
kind = "command"
publish = ["sh", "-c", "echo 'permission denied for {{package}}' >&2; exit 1"]
{PACKAGES}"#
    );
    let temp = workspace(&config, &["feat(core): add api"]);
    save_plan(temp.path());

    cascade(temp.path())
        .args(["execute", "plan.json"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("failed: "))
        .stdout(predicate::str::contains("pending"));
}

#[test]
fn test_missing_config_file_exits_3() {
    let temp = workspace(PACKAGES, &["fix(core): null check"]);
    cascade(temp.path())
        .args(["--config", "missing.toml", "plan", "--commits", "commits.jsonl"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Config file not found"));
}

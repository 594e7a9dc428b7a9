//! CLI command integration tests.
//! Each test uses a temp directory via RECON_DATA_DIR for full isolation.

use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const GRAPH: &str = r#"
[[nodes]]
id = "levels"
kind = "level"

[[nodes.outputs]]
slot = "L1"
geometry = { elevation = 0.0 }

[[nodes.outputs]]
slot = "L2"
geometry = { elevation = 3.5 }

[[nodes]]
id = "ground"
kind = "floor"
interest = { kinds = ["level"] }

[[nodes.outputs]]
type = "Basic"
geometry = { profile = [[0.0, 0.0, 0.0], [10.0, 0.0, 0.0], [10.0, 10.0, 0.0]] }
attributes = { level = "L1" }
"#;

fn recon_cmd(data_dir: &TempDir) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("recon").unwrap();
    cmd.env("RECON_DATA_DIR", data_dir.path());
    cmd
}

fn write_graph(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("graph.toml");
    std::fs::write(&path, content).unwrap();
    path
}

fn solve(dir: &TempDir) -> String {
    let graph = write_graph(dir, GRAPH);
    let output = recon_cmd(dir).arg("solve").arg(&graph).output().unwrap();
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn list_fresh_document() {
    let dir = TempDir::new().unwrap();
    recon_cmd(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("no entities"));
}

#[test]
fn solve_creates_and_names_entities() {
    let dir = TempDir::new().unwrap();
    let stdout = solve(&dir);
    assert!(stdout.contains(r#"levels/L1: #1 "Level""#), "{stdout}");
    assert!(stdout.contains(r#"levels/L2: #2 "Level 2""#), "{stdout}");
    assert!(stdout.contains(r#"ground/Floor: #3 "Floor""#), "{stdout}");
    assert!(stdout.contains("solved 2 of 2 nodes"), "{stdout}");

    recon_cmd(&dir)
        .arg("slots")
        .assert()
        .success()
        .stdout(predicate::str::contains("levels/L1 -> #1"))
        .stdout(predicate::str::contains("ground/Floor -> #3"));
}

#[test]
fn solve_again_reuses_entities() {
    let dir = TempDir::new().unwrap();
    solve(&dir);
    let stdout = solve(&dir);
    assert!(!stdout.contains("expired:"), "{stdout}");
    assert!(stdout.contains(r#"ground/Floor: #3 "Floor""#), "{stdout}");

    let output = recon_cmd(&dir).arg("list").output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().filter(|l| l.starts_with('#')).count(), 3);
    assert!(stdout.contains("level = \"L1\""), "{stdout}");
}

#[test]
fn external_delete_expires_and_recreates() {
    let dir = TempDir::new().unwrap();
    solve(&dir);

    recon_cmd(&dir)
        .args(["delete", "#1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("deleted #1"));
    recon_cmd(&dir)
        .arg("slots")
        .assert()
        .success()
        .stdout(predicate::str::contains("levels/L1 -> #1 (deleted)"));

    let stdout = solve(&dir);
    assert!(stdout.contains("expired: levels"), "{stdout}");
    assert!(stdout.contains(r#"levels/L1: #4 "Level""#), "{stdout}");
    assert!(stdout.contains(r#"levels/L2: #2 "Level 2""#), "{stdout}");
}

#[test]
fn unpinned_entity_is_left_alone() {
    let dir = TempDir::new().unwrap();
    solve(&dir);
    recon_cmd(&dir)
        .args(["unpin", "3"])
        .assert()
        .success();
    recon_cmd(&dir)
        .args(["rename", "3", "Site Slab"])
        .assert()
        .success();

    let stdout = solve(&dir);
    assert!(stdout.contains(r#"ground/Floor: #3 "Site Slab""#), "{stdout}");
    assert!(stdout.contains("ignored because it is unpinned"), "{stdout}");
}

#[test]
fn set_attribute_on_missing_entity_fails() {
    let dir = TempDir::new().unwrap();
    recon_cmd(&dir)
        .args(["set", "99", "comments", "hello"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn set_read_only_attribute_fails() {
    let dir = TempDir::new().unwrap();
    solve(&dir);
    recon_cmd(&dir)
        .args(["set", "3", "area", "12"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("read-only"));
}

#[test]
fn rename_to_taken_name_fails() {
    let dir = TempDir::new().unwrap();
    solve(&dir);
    recon_cmd(&dir)
        .args(["rename", "2", "level"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already in use"));
}

#[test]
fn invalid_node_reports_failure() {
    let dir = TempDir::new().unwrap();
    let graph = write_graph(
        &dir,
        r#"
[[nodes]]
id = "bad"
kind = "grid"

[[nodes.outputs]]
geometry = { curve = [[0.0, 0.0, 0.0]] }
"#,
    );
    recon_cmd(&dir)
        .arg("solve")
        .arg(&graph)
        .assert()
        .failure()
        .stdout(predicate::str::contains("bad/Grid").not())
        .stdout(predicate::str::contains("[error]"))
        .stderr(predicate::str::contains("1 node(s) failed"));
}

#[test]
fn malformed_graph_is_rejected() {
    let dir = TempDir::new().unwrap();
    let graph = write_graph(&dir, "[[nodes]]\nid = 3\n");
    recon_cmd(&dir)
        .arg("solve")
        .arg(&graph)
        .assert()
        .failure()
        .stderr(predicate::str::contains("malformed graph definition"));
}

#[test]
fn documents_are_isolated() {
    let dir = TempDir::new().unwrap();
    solve(&dir);
    recon_cmd(&dir)
        .args(["list", "--document", "other"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no entities"));
}

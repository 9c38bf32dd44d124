#![cfg(unix)]

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn project(taskfile: &str) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("takt.toml"), taskfile).unwrap();
    dir
}

fn takt(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("takt").unwrap();
    cmd.current_dir(dir)
        .arg("--no-color")
        .timeout(Duration::from_secs(30));
    cmd
}

#[test]
fn runs_dependency_before_dependent() {
    let dir = project(
        r#"
        [tasks.a]
        run = ["sleep 0.2", "echo a >> order.txt"]

        [tasks.b]
        depends = ["a"]
        run = ["echo b >> order.txt"]
        "#,
    );

    takt(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("starting"))
        .stdout(predicate::str::contains("done"))
        .stdout(predicate::str::contains("2 succeeded, 0 failed"));

    let order = std::fs::read_to_string(dir.path().join("order.txt")).unwrap();
    assert_eq!(order, "a\nb\n");
}

#[test]
fn failed_dependency_skips_dependent() {
    let dir = project(
        r#"
        [tasks.a]
        run = ["exit 1"]

        [tasks.b]
        depends = ["a"]
        run = ["touch b-ran"]
        "#,
    );

    takt(dir.path())
        .assert()
        .failure()
        .stdout(predicate::str::contains("skipped: dependency 'a' failed"))
        .stderr(predicate::str::contains("exited with status 1"));

    assert!(!dir.path().join("b-ran").exists());
}

#[test]
fn unresolved_dependency_fails_before_running() {
    let dir = project(
        r#"
        [tasks.a]
        depends = ["x"]
        run = ["touch a-ran"]

        [tasks.c]
        run = ["touch c-ran"]
        "#,
    );

    takt(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a known task"));

    assert!(!dir.path().join("a-ran").exists());
    assert!(!dir.path().join("c-ran").exists());
}

#[test]
fn failure_stops_long_running_task() {
    let dir = project(
        r#"
        [tasks.slow]
        run = ["sleep 60"]

        [tasks.broken]
        run = ["sleep 0.2", "exit 2"]
        "#,
    );

    let started = Instant::now();
    takt(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("broken"));

    assert!(started.elapsed() < Duration::from_secs(20));
}

#[test]
fn interrupt_is_a_clean_exit() {
    let dir = project(
        r#"
        [tasks.a]
        run = ["sleep 60"]

        [tasks.b]
        depends = ["a"]
        run = ["sleep 60"]
        "#,
    );

    let child = std::process::Command::new(assert_cmd::cargo::cargo_bin("takt"))
        .current_dir(dir.path())
        .arg("--no-color")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    std::thread::sleep(Duration::from_secs(1));
    // SAFETY: plain signal delivery to a child we own
    unsafe {
        libc::kill(child.id() as libc::pid_t, libc::SIGINT);
    }

    let started = Instant::now();
    let output = child.wait_with_output().unwrap();
    assert!(started.elapsed() < Duration::from_secs(20));
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("0 failed, 1 canceled, 1 skipped"), "{stdout}");
    assert!(!String::from_utf8_lossy(&output.stderr).contains("failed:"));
}

#[test]
fn only_runs_tagged_tasks() {
    let dir = project(
        r#"
        [tasks.lint]
        run = ["touch lint-ran"]
        tags = ["ci"]

        [tasks.serve]
        run = ["touch serve-ran"]
        "#,
    );

    takt(dir.path())
        .args(["--only", "ci"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 filtered"));

    assert!(dir.path().join("lint-ran").exists());
    assert!(!dir.path().join("serve-ran").exists());
}

#[test]
fn only_before_run_subcommand_still_filters() {
    let dir = project(
        r#"
        [tasks.lint]
        run = ["touch lint-ran"]
        tags = ["ci"]

        [tasks.serve]
        run = ["touch serve-ran"]
        "#,
    );

    takt(dir.path())
        .args(["--only", "ci", "run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 filtered"));

    assert!(dir.path().join("lint-ran").exists());
    assert!(!dir.path().join("serve-ran").exists());
}

#[test]
fn dependency_on_filtered_task_is_reported() {
    let dir = project(
        r#"
        [tasks.setup]
        run = ["true"]

        [tasks.test]
        depends = ["setup"]
        run = ["true"]
        tags = ["ci"]
        "#,
    );

    takt(dir.path())
        .args(["run", "--only", "ci"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("excluded by --only"));
}

#[test]
fn task_env_reaches_steps() {
    let dir = project(
        r#"
        [env]
        GREETING = "hello"

        [tasks.a]
        run = ["echo \"$GREETING $TARGET\" > env.txt"]
        env = { TARGET = "world" }
        "#,
    );

    takt(dir.path()).assert().success();

    let written = std::fs::read_to_string(dir.path().join("env.txt")).unwrap();
    assert_eq!(written.trim(), "hello world");
}

#[test]
fn timeout_cancels_run() {
    let dir = project(
        r#"
        [tasks.a]
        run = ["sleep 60"]
        "#,
    );

    takt(dir.path())
        .args(["--timeout", "1"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("✗ 0 succeeded, 0 failed, 1 canceled"))
        .stderr(predicate::str::contains("deadline"));
}

#[test]
fn check_reports_cycles() {
    let dir = project(
        r#"
        [tasks.a]
        depends = ["b"]

        [tasks.b]
        depends = ["a"]
        "#,
    );

    takt(dir.path())
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("cycle"));
}

#[test]
fn list_plain() {
    let dir = project(
        r#"
        [tasks.build]
        run = ["true"]

        [tasks.test]
        run = ["true"]
        "#,
    );

    takt(dir.path())
        .args(["list", "--format", "plain"])
        .assert()
        .success()
        .stdout("build\ntest\n");
}

#[test]
fn missing_task_file() {
    let dir = tempfile::tempdir().unwrap();

    takt(dir.path())
        .args(["--file", "nope.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Task file not found"));
}

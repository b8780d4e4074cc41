use assert_fs::TempDir;
use predicates::prelude::*;
use std::path::Path;

mod common;

fn stdout_of(root: &Path, args: &[&str]) -> String {
    let output = common::run_cli(root, args).assert().success().get_output().stdout.clone();
    String::from_utf8(output).expect("stdout is not UTF-8")
}

fn all_files(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            files.extend(all_files(&path));
        } else {
            files.push(path);
        }
    }
    files
}

#[test]
fn secrets_are_written_read_and_listed() {
    let root = TempDir::new().unwrap();

    common::run_cli(root.path(), &["create", "team"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("team "));
    common::run_cli(root.path(), &["write", "team", "db/password", "hunter2"])
        .assert()
        .success()
        .stdout(predicate::str::is_match("^[0-9a-f]{40}\n$").unwrap());
    common::run_cli(root.path(), &["write", "team", "token", "abc"])
        .assert()
        .success();

    common::run_cli(root.path(), &["cat", "team", "db/password"])
        .assert()
        .success()
        .stdout("hunter2\n");
    common::run_cli(root.path(), &["ls", "team"])
        .assert()
        .success()
        .stdout("db/password\ntoken\n");
    common::run_cli(root.path(), &["list"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("team "));
}

#[test]
fn rewriting_the_same_value_commits_nothing() {
    let root = TempDir::new().unwrap();
    common::run_cli(root.path(), &["create", "team"]).assert().success();
    common::run_cli(root.path(), &["write", "team", "token", "abc"])
        .assert()
        .success();

    common::run_cli(root.path(), &["write", "team", "token", "abc"])
        .assert()
        .success()
        .stdout("nothing changed\n");
    assert_eq!(
        stdout_of(root.path(), &["log", "team", "--oneline"]).lines().count(),
        2
    );
}

#[test]
fn log_and_version_walk_the_history() {
    let root = TempDir::new().unwrap();
    common::run_cli(root.path(), &["create", "team"]).assert().success();
    let first = stdout_of(root.path(), &["write", "team", "a", "1"]);
    common::run_cli(root.path(), &["write", "team", "b", "2"])
        .assert()
        .success();

    let log = stdout_of(root.path(), &["log", "team", "--oneline"]);
    let lines = log.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].ends_with("added: b"));
    assert!(lines[1].ends_with("added: a"));
    assert!(lines[2].ends_with("Initial commit"));

    common::run_cli(root.path(), &["log", "team", "-n", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Author: Test Author <author@example.com>"))
        .stdout(predicate::str::contains("    added: b"))
        .stdout(predicate::str::contains("added: a").not());

    common::run_cli(root.path(), &["version", "team", first.trim()])
        .assert()
        .success()
        .stdout(predicate::str::diff(first.clone()));
    common::run_cli(root.path(), &["ls", "team"])
        .assert()
        .success()
        .stdout("a\n");
    common::run_cli(root.path(), &["version", "team", "latest"])
        .assert()
        .success()
        .stdout(predicate::str::diff(first));
}

#[test]
fn removed_secrets_disappear() {
    let root = TempDir::new().unwrap();
    common::run_cli(root.path(), &["create", "team"]).assert().success();
    common::run_cli(root.path(), &["write", "team", "db/user", "admin"])
        .assert()
        .success();
    common::run_cli(root.path(), &["write", "team", "token", "abc"])
        .assert()
        .success();

    common::run_cli(root.path(), &["rm", "team", "db"]).assert().success();

    common::run_cli(root.path(), &["ls", "team"])
        .assert()
        .success()
        .stdout("token\n");
    common::run_cli(root.path(), &["log", "team", "-n", "1", "--oneline"])
        .assert()
        .success()
        .stdout(predicate::str::contains("deleted: db/user"));
}

#[test]
fn vaults_can_be_renamed_and_destroyed() {
    let root = TempDir::new().unwrap();
    common::run_cli(root.path(), &["create", "team"]).assert().success();

    common::run_cli(root.path(), &["rename", "team", "ops"])
        .assert()
        .success();
    common::run_cli(root.path(), &["ls", "team"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("vault team does not exist"));

    common::run_cli(root.path(), &["destroy", "ops"])
        .assert()
        .success();
    common::run_cli(root.path(), &["list"])
        .assert()
        .success()
        .stdout("");
}

#[test]
fn secrets_are_encrypted_on_disk() {
    let root = TempDir::new().unwrap();
    common::run_cli(root.path(), &["create", "team"]).assert().success();
    common::run_cli(root.path(), &["write", "team", "token", "correct-horse-battery"])
        .assert()
        .success();

    let files = all_files(root.path());
    assert!(files.iter().any(|file| file.ends_with("vaults.json")));
    for file in files {
        let content = std::fs::read(&file).unwrap();
        assert!(
            !content
                .windows(b"correct-horse-battery".len())
                .any(|window| window == b"correct-horse-battery"),
            "{} holds the secret in plain text",
            file.display()
        );
    }
}

#[test]
fn clones_are_read_only_and_pull_updates() {
    let root = TempDir::new().unwrap();
    common::run_cli(root.path(), &["create", "origin"]).assert().success();
    common::run_cli(root.path(), &["write", "origin", "token", "v1"])
        .assert()
        .success();

    common::run_cli(root.path(), &["clone", "origin", "copy"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("copy "));
    common::run_cli(root.path(), &["cat", "copy", "token"])
        .assert()
        .success()
        .stdout("v1\n");
    common::run_cli(root.path(), &["write", "copy", "token", "local"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("remote"));
    common::run_cli(root.path(), &["pull", "copy"])
        .assert()
        .success()
        .stdout("already up to date\n");

    let tip = stdout_of(root.path(), &["write", "origin", "token", "v2"]);
    common::run_cli(root.path(), &["pull", "copy"])
        .assert()
        .success()
        .stdout(predicate::str::diff(tip));
    common::run_cli(root.path(), &["cat", "copy", "token"])
        .assert()
        .success()
        .stdout("v2\n");
}

#[test]
fn mistakes_are_reported() {
    let root = TempDir::new().unwrap();
    common::run_cli(root.path(), &["create", "team"]).assert().success();

    common::run_cli(root.path(), &["create", "team"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("vault team already exists"));
    common::run_cli(root.path(), &["create", "a/b"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid vault name"));
    common::run_cli(root.path(), &["cat", "team", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("secret missing does not exist"));
    common::run_cli(root.path(), &["version", "team", "nowhere"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not point to a commit"));
    common::run_cli(root.path(), &["pull", "team"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("has no remote"));
}

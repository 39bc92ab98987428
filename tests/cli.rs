use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

fn write_config(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("config.yaml");
    let media = dir.join("media");
    let content = format!(
        "storage:\n  media_root: {media}\n  articles_path: {articles}\ntranscription:\n  assemblyai:\n    api_key: test-key\n",
        media = media.display(),
        articles = media.join("articles.json").display(),
    );
    std::fs::write(&path, content).unwrap();
    path
}

fn blogscribe() -> Command {
    let mut cmd = Command::cargo_bin("blogscribe").unwrap();
    cmd.env_remove("BLOGSCRIBE_CONFIG")
        .env_remove("ASSEMBLYAI_API_KEY")
        .env("RUST_LOG", "off");
    cmd
}

#[test]
fn help_lists_commands() {
    blogscribe()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("generate"))
        .stdout(predicate::str::contains("doctor"));
}

#[test]
fn config_show_reads_explicit_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    blogscribe()
        .args(["config", "--show", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Current Configuration"))
        .stdout(predicate::str::contains("AssemblyAI Key: set"))
        .stdout(predicate::str::contains("test-key").not());
}

#[test]
fn config_path_from_env() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    blogscribe()
        .arg("config")
        .env("BLOGSCRIBE_CONFIG", &config)
        .assert()
        .success()
        .stdout(predicate::str::contains(config.display().to_string()));
}

#[test]
fn missing_explicit_config_fails() {
    let dir = tempfile::tempdir().unwrap();

    blogscribe()
        .args(["config", "--show", "--config"])
        .arg(dir.path().join("absent.yaml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config file not found"));
}

#[test]
fn generate_rejects_non_http_link() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    blogscribe()
        .args(["--quiet", "generate", "ftp://example.com/video", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid data sent"));

    assert!(!dir.path().join("media").join("articles.json").exists());
}

#[test]
fn articles_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    blogscribe()
        .args(["articles", "--user", "alice", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("No articles for alice"));
}

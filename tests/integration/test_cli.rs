use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const CIRCLE_CONFIG: &str = r#"
version: 2.1
jobs:
  build:
    docker:
      - image: cimg/base:stable
    steps:
      - checkout
      - run: make
workflows:
  main:
    jobs: [build]
"#;

const CIRCLE_WITH_ORB_STEP: &str = r#"
version: 2.1
jobs:
  build:
    docker:
      - image: cimg/base:stable
    steps:
      - aws-cli/setup
      - run: make
workflows:
  main:
    jobs: [build]
"#;

const HARNESS_PIPELINE: &str = r#"
pipeline:
  identifier: svc
  stages:
    - stage:
        identifier: build
        type: CI
        spec:
          execution:
            steps:
              - step:
                  type: Run
                  identifier: compile
                  spec:
                    command: cargo build
"#;

fn workspace(file: &str, contents: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(file), contents).unwrap();
    dir
}

fn convert_cmd(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("pipeline-convert").unwrap();
    cmd.current_dir(dir)
        .env_remove("PIPELINE_CONVERT_LOG")
        .env_remove("RUST_LOG")
        .env_remove("PIPELINE_CONVERT_UNKNOWN_STEPS");
    cmd
}

#[test]
fn test_help_lists_source_formats() {
    let mut cmd = Command::cargo_bin("pipeline-convert").unwrap();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("SOURCE FORMATS"))
        .stdout(predicate::str::contains("circle"))
        .stdout(predicate::str::contains("harness"));
}

#[test]
fn test_convert_help_groups_options() {
    let mut cmd = Command::cargo_bin("pipeline-convert").unwrap();
    cmd.arg("circle").arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Storage Backend"))
        .stdout(predicate::str::contains("--drop-unknown"))
        .stdout(predicate::str::contains("--strict"));
}

#[test]
fn test_version_flag() {
    let mut cmd = Command::cargo_bin("pipeline-convert").unwrap();
    cmd.arg("--version");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_circle_document_goes_to_stdout() {
    let dir = workspace("config.yml", CIRCLE_CONFIG);
    convert_cmd(dir.path())
        .args(["circle", "config.yml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("kind: pipeline"))
        .stdout(predicate::str::contains("id: build"))
        .stdout(predicate::str::contains("script: make"));
}

#[test]
fn test_output_flag_writes_file() {
    let dir = workspace("config.yml", CIRCLE_CONFIG);
    convert_cmd(dir.path())
        .args(["circle", "config.yml", "--output", "out/harness.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let written = fs::read_to_string(dir.path().join("out/harness.yaml")).unwrap();
    assert!(written.starts_with("version: 1"));
}

#[test]
fn test_warnings_are_logged_but_not_fatal() {
    let dir = workspace("config.yml", CIRCLE_WITH_ORB_STEP);
    convert_cmd(dir.path())
        .args(["circle", "config.yml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("type: template"))
        .stderr(predicate::str::contains("CONV-STEP-001"));
}

#[test]
fn test_strict_fails_on_warnings() {
    let dir = workspace("config.yml", CIRCLE_WITH_ORB_STEP);
    convert_cmd(dir.path())
        .args(["circle", "config.yml", "--strict"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--strict"));
}

#[test]
fn test_strict_passes_clean_conversion() {
    let dir = workspace("config.yml", CIRCLE_CONFIG);
    convert_cmd(dir.path())
        .args(["circle", "config.yml", "--strict"])
        .assert()
        .success();
}

#[test]
fn test_drop_unknown_omits_placeholders() {
    let dir = workspace("config.yml", CIRCLE_WITH_ORB_STEP);
    convert_cmd(dir.path())
        .args(["circle", "config.yml", "--drop-unknown"])
        .assert()
        .success()
        .stdout(predicate::str::contains("type: template").not())
        .stdout(predicate::str::contains("script: make"));
}

#[test]
fn test_harness_subcommand() {
    let dir = workspace("pipeline.yaml", HARNESS_PIPELINE);
    convert_cmd(dir.path())
        .args(["harness", "pipeline.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("id: compile"))
        .stdout(predicate::str::contains("script: cargo build"));
}

#[test]
fn test_config_file_in_workdir_sets_bucket() {
    let dir = workspace(
        "config.yml",
        r#"
jobs:
  build:
    docker:
      - image: cimg/base:stable
    steps:
      - store_artifacts:
          path: dist
workflows:
  main:
    jobs: [build]
"#,
    );
    fs::write(
        dir.path().join("pipeline-convert.toml"),
        "[backend]\nbucket = \"artifacts-bucket\"\n",
    )
    .unwrap();
    convert_cmd(dir.path())
        .env_remove("PIPELINE_CONVERT_BUCKET")
        .args(["circle", "config.yml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("bucket: artifacts-bucket"));
}

#[test]
fn test_backend_flag_overrides_config() {
    let dir = workspace(
        "config.yml",
        r#"
jobs:
  build:
    docker:
      - image: cimg/base:stable
    steps:
      - store_artifacts:
          path: dist
workflows:
  main:
    jobs: [build]
"#,
    );
    convert_cmd(dir.path())
        .env_remove("PIPELINE_CONVERT_BACKEND")
        .args(["circle", "config.yml", "--backend", "gcs", "--bucket", "flag-bucket"])
        .assert()
        .success()
        .stdout(predicate::str::contains("image: plugins/gcs"))
        .stdout(predicate::str::contains("bucket: flag-bucket"));
}

#[test]
fn test_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    convert_cmd(dir.path())
        .args(["circle", "missing.yml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read"));
}

#[test]
fn test_malformed_yaml_fails() {
    let dir = workspace("config.yml", "jobs: [unclosed");
    convert_cmd(dir.path())
        .args(["circle", "config.yml"])
        .assert()
        .failure();
}

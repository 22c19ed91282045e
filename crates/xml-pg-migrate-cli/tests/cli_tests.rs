//! CLI integration tests for xml-pg-migrate.
//!
//! These tests verify command-line argument parsing, help output,
//! exit codes, and the subcommands that never touch the database.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

/// Get a command for the xml-pg-migrate binary.
fn cmd() -> Command {
    Command::cargo_bin("xml-pg-migrate").unwrap()
}

/// Dump directory, DDL and config for a small Users/Posts dataset.
fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    let dumps = dir.path().join("dumps");
    fs::create_dir(&dumps).unwrap();
    fs::write(
        dumps.join("Users.xml"),
        r#"<?xml version="1.0" encoding="utf-8"?>
<users>
  <row Id="1" DisplayName="Ann" />
  <row Id="2" DisplayName="Bob" />
</users>"#,
    )
    .unwrap();
    fs::write(
        dumps.join("Posts.xml"),
        r#"<posts><row Id="10" OwnerUserId="1" Title="Hello"/></posts>"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("schema.sql"),
        "CREATE TABLE Users (\n    Id int NOT NULL,\n    DisplayName nvarchar(40),\n    AboutMe nvarchar(max),\n    PRIMARY KEY (Id)\n);\n\
         CREATE TABLE Posts (\n    Id int NOT NULL,\n    OwnerUserId int\n);\n\
         CREATE TABLE Votes (\n    Id int NOT NULL\n);\n\
         ALTER TABLE Posts ADD CONSTRAINT FK_Posts_Users FOREIGN KEY (OwnerUserId) REFERENCES Users(Id);\n",
    )
    .unwrap();
    write_config(dir.path(), "");
    dir
}

fn write_config(root: &Path, extra_target: &str) {
    let yaml = format!(
        "target:\n  host: localhost\n  database: stack\n  user: postgres\n{}\
         paths:\n  xml_dumps_dir: {}\n  schema_file: {}\n  output_sql_file: {}\n",
        extra_target,
        root.join("dumps").display(),
        root.join("schema.sql").display(),
        root.join("filtered_schema.sql").display()
    );
    fs::write(root.join("config.yaml"), yaml).unwrap();
}

fn config_arg(dir: &TempDir) -> String {
    dir.path().join("config.yaml").to_str().unwrap().to_string()
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("inspect"))
        .stdout(predicate::str::contains("generate"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_run_subcommand_help() {
    cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--target-schema"))
        .stdout(predicate::str::contains("--workers"))
        .stdout(predicate::str::contains("--batch-size"))
        .stdout(predicate::str::contains("--fail-on-table-error"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("xml-pg-migrate"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_global_flag_defaults() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--shutdown-timeout"))
        .stdout(predicate::str::contains("[default: 60]"))
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("[default: text]"))
        .stdout(predicate::str::contains("[default: info]"))
        .stdout(predicate::str::contains("[default: config.yaml]"));
}

#[test]
fn test_short_config_flag() {
    cmd()
        .args(["-c", "some_config.yaml", "--help"])
        .assert()
        .success();
}

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

// =============================================================================
// Exit Code Tests
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_7() {
    // Missing file is an IO error (code 7), not config error (code 1)
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "health-check"])
        .assert()
        .code(7);
}

#[test]
fn test_invalid_yaml_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "invalid: yaml: content: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1);
}

#[test]
fn test_missing_required_fields_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "target:").unwrap();
    writeln!(file, "  host: localhost").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "inspect"])
        .assert()
        .code(1);
}

#[test]
fn test_invalid_ssl_mode_exits_with_code_1() {
    let dir = workspace();
    write_config(dir.path(), "  ssl_mode: sometimes\n");

    cmd()
        .args(["--config", &config_arg(&dir), "inspect"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("ssl_mode"));
}

#[test]
fn test_zero_batch_size_override_exits_with_code_1() {
    let dir = workspace();
    cmd()
        .args(["--config", &config_arg(&dir), "run", "--dry-run", "--batch-size", "0"])
        .assert()
        .code(1);
}

#[test]
fn test_missing_schema_file_exits_with_code_7() {
    let dir = workspace();
    fs::remove_file(dir.path().join("schema.sql")).unwrap();

    cmd()
        .args(["--config", &config_arg(&dir), "generate"])
        .assert()
        .code(7);
}

#[test]
fn test_ddl_without_tables_exits_with_code_2() {
    let dir = workspace();
    fs::write(dir.path().join("schema.sql"), "-- nothing here\n").unwrap();

    cmd()
        .args(["--config", &config_arg(&dir), "generate"])
        .assert()
        .code(2);
}

// =============================================================================
// Offline Subcommands
// =============================================================================

#[test]
fn test_inspect_prints_plan_as_json() {
    let dir = workspace();

    cmd()
        .args(["--config", &config_arg(&dir), "--output-json", "inspect"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"schema\": \"dumps\""))
        .stdout(predicate::str::contains("\"action\": \"import\""))
        .stdout(predicate::str::contains("\"action\": \"no_dump\""));
}

#[test]
fn test_generate_writes_filtered_schema() {
    let dir = workspace();

    cmd()
        .args(["--config", &config_arg(&dir), "generate", "--target-schema", "archive"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Filtered schema written to"));

    let sql = fs::read_to_string(dir.path().join("filtered_schema.sql")).unwrap();
    assert!(sql.contains("CREATE SCHEMA IF NOT EXISTS \"archive\";"));
    assert!(sql.contains("\"Id\" INTEGER PRIMARY KEY"));
    assert!(sql.contains("\"DisplayName\" VARCHAR(40)"));
    assert!(!sql.contains("AboutMe"));
    assert!(!sql.contains("\"Votes\""));
    assert!(sql.contains("ADD CONSTRAINT \"FK_Posts_Users\""));
}

#[test]
fn test_dry_run_reports_json_result() {
    let dir = workspace();

    cmd()
        .args(["--config", &config_arg(&dir), "--output-json", "run", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"dry_run\""))
        .stdout(predicate::str::contains("\"tables_declared\": 3"))
        .stdout(predicate::str::contains("\"tables_discovered\": 2"));

    assert!(dir.path().join("filtered_schema.sql").exists());
}

#[test]
fn test_invalid_target_schema_override_exits_with_code_1() {
    let dir = workspace();
    cmd()
        .args([
            "--config",
            &config_arg(&dir),
            "generate",
            "--target-schema",
            "bad-name",
        ])
        .assert()
        .code(1);
}

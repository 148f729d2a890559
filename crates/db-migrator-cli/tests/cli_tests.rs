//! CLI integration tests for db-migrator.
//!
//! These tests verify command-line argument parsing, help output,
//! and exit codes for error conditions that need no database.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the db-migrator binary.
fn cmd() -> Command {
    Command::cargo_bin("db-migrator").unwrap()
}

fn config_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
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
        .stdout(predicate::str::contains("dump"))
        .stdout(predicate::str::contains("load"))
        .stdout(predicate::str::contains("schema"))
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_dump_subcommand_help() {
    cmd()
        .args(["dump", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-dir"))
        .stdout(predicate::str::contains("--format"))
        .stdout(predicate::str::contains("--table"))
        .stdout(predicate::str::contains("--query"))
        .stdout(predicate::str::contains("--threads"))
        .stdout(predicate::str::contains("--query-limit"))
        .stdout(predicate::str::contains("--time-zone"))
        .stdout(predicate::str::contains("--mode"));
}

#[test]
fn test_load_subcommand_help() {
    cmd()
        .args(["load", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--input-dir"))
        .stdout(predicate::str::contains("--batch-size"))
        .stdout(predicate::str::contains("--insert-type"));
}

#[test]
fn test_schema_subcommand_help() {
    cmd()
        .args(["schema", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--dialect"))
        .stdout(predicate::str::contains("--from-catalog"))
        .stdout(predicate::str::contains("--script-type"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("db-migrator"));
}

#[test]
fn test_global_flags() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: config.yaml]"));
}

// =============================================================================
// Argument Errors
// =============================================================================

#[test]
fn test_no_subcommand_is_usage_error() {
    cmd().assert().failure().code(2);
}

#[test]
fn test_unknown_format_is_usage_error() {
    cmd()
        .args(["dump", "--format", "parquet"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown format"));
}

#[test]
fn test_unknown_mode_is_usage_error() {
    cmd()
        .args(["load", "--mode", "everything"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown migration mode"));
}

#[test]
fn test_empty_table_spec_is_usage_error() {
    cmd().args(["dump", "--table", ":id"]).assert().code(2);
}

#[test]
fn test_execute_conflicts_with_output() {
    cmd()
        .args(["schema", "--execute", "--output", "out.sql"])
        .assert()
        .code(2);
}

// =============================================================================
// Configuration Errors
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
    let file = config_file("source: [unclosed");
    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1);
}

#[test]
fn test_health_check_without_connections_exits_with_code_1() {
    let file = config_file("dump:\n  threads: 2\n");
    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no source or target"));
}

#[test]
fn test_dump_without_source_exits_with_code_1() {
    let file = config_file("dump:\n  format: xml\n");
    cmd()
        .args(["--config", file.path().to_str().unwrap(), "dump"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("source connection is required"));
}

#[test]
fn test_zero_threads_override_exits_with_code_1() {
    let file = config_file("{}\n");
    cmd()
        .args(["--config", file.path().to_str().unwrap(), "dump", "--threads", "0"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("dump.threads"));
}

// =============================================================================
// Schema From Catalog
// =============================================================================

#[test]
fn test_schema_from_catalog_without_document_exits_with_code_5() {
    let catalog = tempfile::tempdir().unwrap();
    let file = config_file("{}\n");
    cmd()
        .args([
            "--config",
            file.path().to_str().unwrap(),
            "schema",
            "--dialect",
            "postgres",
            "--from-catalog",
            catalog.path().to_str().unwrap(),
        ])
        .assert()
        .code(5);
}

#[test]
fn test_schema_from_catalog_writes_ddl() {
    let catalog = tempfile::tempdir().unwrap();
    std::fs::write(catalog.path().join("catalog.xml"), r#"<catalog version="1.0"/>"#).unwrap();
    std::fs::write(
        catalog.path().join("schema.json"),
        r#"{
            "info": {"product_name": "PostgreSQL", "product_version": "16.2"},
            "catalogs": [{
                "schemas": [{
                    "name": "shop",
                    "tables": [{
                        "schema": "shop",
                        "name": "orders",
                        "columns": [{
                            "name": "id",
                            "type_desc": {"type_code": 4},
                            "nullable": false,
                            "position": 1
                        }]
                    }]
                }]
            }]
        }"#,
    )
    .unwrap();
    let file = config_file("{}\n");
    cmd()
        .args([
            "--config",
            file.path().to_str().unwrap(),
            "schema",
            "--dialect",
            "mysql",
            "--script-type",
            "create",
            "--from-catalog",
            catalog.path().to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("CREATE TABLE"));
}

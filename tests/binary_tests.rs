//! Integration tests for the query-risk-analyzer binary.

use std::{fs, io::Write};

use assert_cmd::{Command, cargo::cargo_bin_cmd};
use predicates::prelude::*;
use tempfile::{Builder, NamedTempFile};

const SCHEMA: &str = r#"
tables:
  - name: Order
    columns:
      - { name: code, type: string }
      - { name: user, type: numeric }
    indexes:
      - { name: idx_order_code, columns: [code], unique: true }
"#;

const UNINDEXED_FILTER: &str = r#"
queries:
  - id: OrderDao.BY_USER
    template: "SELECT {o.pk} FROM {Order AS o} WHERE {o.user} = ?user"
call_sites:
  - query_id: OrderDao.BY_USER
    caller: OrderDao.findByUser
    cap_applied: true
    params:
      - { name: user, type: numeric }
"#;

const IN_LOOP: &str = r#"
queries:
  - id: OrderDao.BY_CODE
    template: "SELECT {o.pk} FROM {Order AS o} WHERE {o.code} = ?code"
call_sites:
  - query_id: OrderDao.BY_CODE
    caller: OrderDao.refresh
    cap_applied: true
    invocation_context: loop
"#;

const CLEAN: &str = r#"
queries:
  - id: OrderDao.BY_CODE
    template: "SELECT {o.pk} FROM {Order AS o} WHERE {o.code} = ?code"
call_sites:
  - query_id: OrderDao.BY_CODE
    caller: OrderDao.findByCode
    consumer_shape: single_entity
    params:
      - { name: code, type: string }
"#;

const DAO: &str = r#"
public class DefaultOrderDao {
    private static final String BY_CODE = "SELECT {o.pk} FROM {Order AS o} WHERE {o.code} = ?code";

    public void refresh(final List<String> codes) {
        for (final String code : codes) {
            final FlexibleSearchQuery query = new FlexibleSearchQuery(BY_CODE);
            query.addQueryParameter("code", code);
            getFlexibleSearchService().searchUnique(query);
        }
    }
}
"#;

fn cmd() -> Command {
    cargo_bin_cmd!("query-risk-analyzer")
}

fn temp(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
    write!(file, "{}", content).unwrap();
    file
}

fn analyze(schema: &NamedTempFile, corpus: &NamedTempFile) -> Command {
    let mut command = cmd();
    command.args([
        "analyze",
        "-s",
        schema.path().to_str().unwrap(),
        "-q",
        corpus.path().to_str().unwrap(),
        "--no-color"
    ]);
    command
}

#[test]
fn test_analyze_clean_corpus() {
    let schema = temp(".yaml", SCHEMA);
    let corpus = temp(".yaml", CLEAN);
    analyze(&schema, &corpus)
        .assert()
        .success()
        .stdout(predicate::str::contains("No issues found."));
}

#[test]
fn test_analyze_medium_exits_one() {
    let schema = temp(".yaml", SCHEMA);
    let corpus = temp(".yaml", UNINDEXED_FILTER);
    analyze(&schema, &corpus)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("[MEDIUM] INDEX002"))
        .stdout(predicate::str::contains("Order.user"));
}

#[test]
fn test_analyze_high_exits_two() {
    let schema = temp(".yaml", SCHEMA);
    let corpus = temp(".yaml", IN_LOOP);
    analyze(&schema, &corpus)
        .assert()
        .code(2)
        .stdout(predicate::str::contains("CALL003"))
        .stdout(predicate::str::contains("OrderDao.refresh"));
}

#[test]
fn test_analyze_json_output() {
    let schema = temp(".yaml", SCHEMA);
    let corpus = temp(".yaml", UNINDEXED_FILTER);
    let output = analyze(&schema, &corpus)
        .args(["-f", "json"])
        .output()
        .unwrap();
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["queries_count"], 1);
    assert_eq!(report["findings"][0]["rule_id"], "INDEX002");
    assert_eq!(report["findings"][0]["query_id"], "OrderDao.BY_USER");
}

#[test]
fn test_analyze_sarif_output() {
    let schema = temp(".yaml", SCHEMA);
    let corpus = temp(".yaml", IN_LOOP);
    analyze(&schema, &corpus)
        .args(["-f", "sarif"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("\"version\": \"2.1.0\""))
        .stdout(predicate::str::contains("\"ruleId\": \"CALL003\""));
}

#[test]
fn test_analyze_corpus_from_stdin() {
    let schema = temp(".yaml", SCHEMA);
    cmd()
        .args(["analyze", "-s", schema.path().to_str().unwrap(), "-q", "-", "--no-color"])
        .write_stdin(UNINDEXED_FILTER)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("INDEX002"));
}

#[test]
fn test_analyze_ddl_schema() {
    let schema = temp(
        ".sql",
        "CREATE TABLE Item (code VARCHAR(16), owner INT);\nCREATE INDEX idx_item_code ON Item(code);"
    );
    let corpus = temp(
        ".json",
        r#"{"queries":[{"id":"ItemDao.BY_OWNER","template":"SELECT {i.pk} FROM {Item AS i} WHERE {i.owner} = ?owner"}],
            "call_sites":[{"query_id":"ItemDao.BY_OWNER","cap_applied":true}]}"#
    );
    analyze(&schema, &corpus)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Item.owner"));
}

#[test]
fn test_analyze_scanned_sources() {
    let schema = temp(".yaml", SCHEMA);
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("DefaultOrderDao.java"), DAO).unwrap();
    cmd()
        .args([
            "analyze",
            "-s",
            schema.path().to_str().unwrap(),
            "--sources",
            dir.path().to_str().unwrap(),
            "--no-color"
        ])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("CALL003"))
        .stdout(predicate::str::contains("DefaultOrderDao.refresh"));
}

#[test]
fn test_config_disables_rule() {
    let schema = temp(".yaml", SCHEMA);
    let corpus = temp(".yaml", UNINDEXED_FILTER);
    let config = temp(".toml", "[rules]\ndisabled = [\"INDEX002\"]\n");
    analyze(&schema, &corpus)
        .args(["--config", config.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("13 rules"));
}

#[test]
fn test_invalid_in_limit_fails() {
    let schema = temp(".yaml", SCHEMA);
    let corpus = temp(".yaml", CLEAN);
    analyze(&schema, &corpus)
        .args(["--in-limit", "0"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn test_missing_schema_fails() {
    let corpus = temp(".yaml", CLEAN);
    cmd()
        .args([
            "analyze",
            "-s",
            "/nonexistent/schema.yaml",
            "-q",
            corpus.path().to_str().unwrap()
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn test_scan_command() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("DefaultOrderDao.java"), DAO).unwrap();
    cmd()
        .args(["scan", "--sources", dir.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("DefaultOrderDao.BY_CODE"))
        .stdout(predicate::str::contains("invocation_context: loop"));
}

#[test]
fn test_catalog_command() {
    let schema = temp(".yaml", SCHEMA);
    cmd()
        .args(["catalog", "-s", schema.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Table: Order"))
        .stdout(predicate::str::contains("idx_order_code"));
}

#[test]
fn test_help() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("analyze"))
        .stdout(predicate::str::contains("scan"));
}

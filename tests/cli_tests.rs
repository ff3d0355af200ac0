// SPDX-FileCopyrightText: 2025 RAprogramm
// SPDX-License-Identifier: MIT

use std::path::PathBuf;

use clap::Parser;
use query_risk_analyzer::cli::{Cli, Commands, Format};

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(args).unwrap()
}

#[test]
fn test_format_variants() {
    let _text = Format::Text;
    let _json = Format::Json;
    let _yaml = Format::Yaml;
    let _sarif = Format::Sarif;
}

#[test]
fn test_analyze_defaults() {
    let cli = parse(&["query-risk-analyzer", "analyze", "-s", "schema.yaml", "-q", "q.yaml"]);
    let Commands::Analyze(args) = cli.command else {
        panic!("expected analyze");
    };
    assert_eq!(args.schema, PathBuf::from("schema.yaml"));
    assert_eq!(args.queries, Some(PathBuf::from("q.yaml")));
    assert!(matches!(args.output_format, Format::Text));
    assert!(!args.verbose);
    assert!(args.watched.is_empty());
    assert!(args.in_limit.is_none());
}

#[test]
fn test_analyze_overrides() {
    let cli = parse(&[
        "query-risk-analyzer",
        "analyze",
        "-s",
        "schema.sql",
        "--sources",
        "src/main/java",
        "-f",
        "sarif",
        "--watched",
        "Order,Cart",
        "--watched",
        "Promotion",
        "--in-limit",
        "500",
        "--max-depth",
        "3",
        "--deadline-ms",
        "1000",
        "--config",
        "ci.toml"
    ]);
    assert_eq!(cli.config, Some(PathBuf::from("ci.toml")));
    let Commands::Analyze(args) = cli.command else {
        panic!("expected analyze");
    };
    assert!(args.queries.is_none());
    assert_eq!(args.sources, Some(PathBuf::from("src/main/java")));
    assert!(matches!(args.output_format, Format::Sarif));
    assert_eq!(args.watched, vec!["Order", "Cart", "Promotion"]);
    assert_eq!(args.in_limit, Some(500));
    assert_eq!(args.max_depth, Some(3));
    assert_eq!(args.deadline_ms, Some(1000));
}

#[test]
fn test_analyze_requires_an_input() {
    assert!(Cli::try_parse_from(["query-risk-analyzer", "analyze", "-s", "schema.yaml"]).is_err());
}

#[test]
fn test_scan_defaults_to_yaml() {
    let cli = parse(&["query-risk-analyzer", "scan", "--sources", "dao"]);
    let Commands::Scan {
        sources,
        output_format,
        no_color
    } = cli.command
    else {
        panic!("expected scan");
    };
    assert_eq!(sources, PathBuf::from("dao"));
    assert!(matches!(output_format, Format::Yaml));
    assert!(!no_color);
}

#[test]
fn test_catalog_command() {
    let cli = parse(&["query-risk-analyzer", "catalog", "-s", "schema.json"]);
    assert!(matches!(
        cli.command,
        Commands::Catalog { schema } if schema == PathBuf::from("schema.json")
    ));
}

#[test]
fn test_unknown_format_rejected() {
    let result = Cli::try_parse_from([
        "query-risk-analyzer",
        "analyze",
        "-s",
        "s.yaml",
        "-q",
        "q.yaml",
        "-f",
        "xml"
    ]);
    assert!(result.is_err());
}

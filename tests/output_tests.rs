// SPDX-FileCopyrightText: 2025 RAprogramm
// SPDX-License-Identifier: MIT

use query_risk_analyzer::{
    catalog::SchemaCatalog,
    config::AnalyzerSettings,
    corpus::{CallSite, Corpus, InvocationContext, QueryDefinition},
    document::DocumentFormat,
    output::{OutputFormat, OutputOptions, format_corpus, format_report},
    rules::{AnalysisReport, Finding, Location, RuleId, RuleRunner, Severity}
};

fn opts(format: OutputFormat) -> OutputOptions {
    OutputOptions {
        format,
        colored: false,
        verbose: false
    }
}

fn sample_corpus() -> Corpus {
    let mut site = CallSite::new("OrderDao.BY_CODE");
    site.caller = Some("OrderDao.findByCode".to_string());
    site.invocation_context = InvocationContext::Loop;
    site.cap_applied = true;
    Corpus {
        queries:    vec![QueryDefinition::new(
            "OrderDao.BY_CODE",
            "SELECT {o.pk} FROM {Order AS o} WHERE {o.code} = ?code AND {o.user} = ?user"
        )],
        call_sites: vec![site]
    }
}

fn sample_report() -> AnalysisReport {
    let catalog = SchemaCatalog::parse(
        "tables:\n  - name: Order\n    columns:\n      - { name: code, type: string }\n      \
         - { name: user, type: numeric }\n    indexes:\n      \
         - { name: idx_order_user, columns: [user] }\n",
        DocumentFormat::Yaml
    )
    .unwrap();
    RuleRunner::new(&catalog, AnalyzerSettings::default()).analyze(&sample_corpus())
}

fn in_list_report() -> AnalysisReport {
    let mut report = AnalysisReport::new(1, 14, 1);
    let mut finding = Finding::new(RuleId::UnboundedInList, "ProductDao.BY_CODES", "Too many")
        .at(Location::in_template("SELECT {p.pk}", 7))
        .with_column("Product", "code")
        .with_suggestion("Execute in 3 batches of at most 1000 elements")
        .with_batches(vec![1000, 1000, 500]);
    finding.severity = Severity::High;
    report.findings.push(finding);
    report
}

#[test]
fn test_output_format_default() {
    let format = OutputFormat::default();
    assert!(matches!(format, OutputFormat::Text));
}

#[test]
fn test_output_options_default() {
    let opts = OutputOptions::default();
    assert!(matches!(opts.format, OutputFormat::Text));
    assert!(opts.colored);
    assert!(!opts.verbose);
}

#[test]
fn test_format_report_text() {
    let output = format_report(&sample_report(), &opts(OutputFormat::Text));
    assert!(output.contains("=== Query Risk Analysis (1 queries, 14 rules) ==="));
    assert!(output.contains("Query OrderDao.BY_CODE:"));
    assert!(output.contains("[HIGH] CALL003"));
    assert!(output.contains("(called from OrderDao.findByCode)"));
    assert!(output.contains("[MEDIUM] INDEX002"));
    assert!(output.contains("Columns: Order.code"));
    assert!(output.contains("Summary: 0 critical, 1 high, 1 medium, 0 low"));
    assert!(!output.contains("Index coverage:"));
}

#[test]
fn test_format_report_text_verbose_coverage() {
    let mut options = opts(OutputFormat::Text);
    options.verbose = true;
    let output = format_report(&sample_report(), &options);
    assert!(output.contains("Index coverage:"));
    assert!(output.contains("o.user → Order.user"));
    assert!(output.contains("idx_order_user"));
}

#[test]
fn test_format_report_text_batches() {
    let output = format_report(&in_list_report(), &opts(OutputFormat::Text));
    assert!(output.contains("Batches: 1000 / 1000 / 500"));
    assert!(output.contains("→ Execute in 3 batches"));
    assert!(output.contains("at line 1, column 8"));
}

#[test]
fn test_format_report_text_empty() {
    let report = AnalysisReport::new(3, 14, 1);
    let output = format_report(&report, &opts(OutputFormat::Text));
    assert!(output.contains("No issues found."));
    assert!(!output.contains("Summary"));
}

#[test]
fn test_format_report_text_truncated() {
    let mut report = AnalysisReport::new(3, 14, 1);
    report.truncated = true;
    report.skipped = 2;
    let output = format_report(&report, &opts(OutputFormat::Text));
    assert!(output.contains("deadline expired with 2 queries not analyzed"));
}

#[test]
fn test_format_report_colored_still_contains_codes() {
    let mut options = opts(OutputFormat::Text);
    options.colored = true;
    let output = format_report(&in_list_report(), &options);
    assert!(output.contains("PATTERN003"));
}

#[test]
fn test_format_report_json() {
    let output = format_report(&sample_report(), &opts(OutputFormat::Json));
    let value: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(value["queries_count"], 1);
    assert_eq!(value["truncated"], false);
    let findings = value["findings"].as_array().unwrap();
    assert_eq!(findings[0]["rule_id"], "CALL003");
    assert_eq!(findings[0]["severity"], "high");
    assert!(value["coverage"][0]["columns"].as_array().unwrap().len() >= 2);
}

#[test]
fn test_format_report_yaml() {
    let output = format_report(&in_list_report(), &opts(OutputFormat::Yaml));
    assert!(output.contains("rule_id: PATTERN003"));
    assert!(output.contains("severity: high"));
    assert!(output.contains("- 500"));
}

#[test]
fn test_format_report_sarif() {
    let output = format_report(&in_list_report(), &opts(OutputFormat::Sarif));
    let sarif: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(sarif["version"], "2.1.0");
    let run = &sarif["runs"][0];
    assert_eq!(run["tool"]["driver"]["name"], "query-risk-analyzer");
    assert_eq!(
        run["tool"]["driver"]["rules"].as_array().unwrap().len(),
        RuleId::ALL.len()
    );
    let result = &run["results"][0];
    assert_eq!(result["ruleId"], "PATTERN003");
    assert_eq!(result["level"], "error");
    let index = result["ruleIndex"].as_u64().unwrap() as usize;
    assert_eq!(run["tool"]["driver"]["rules"][index]["id"], "PATTERN003");
    assert_eq!(
        result["locations"][0]["logicalLocations"][0]["fullyQualifiedName"],
        "ProductDao.BY_CODES"
    );
    assert_eq!(result["properties"]["batches"][2], 500);
}

#[test]
fn test_format_corpus_text() {
    let output = format_corpus(&sample_corpus(), &opts(OutputFormat::Text));
    assert!(output.contains("Query OrderDao.BY_CODE:"));
    assert!(output.contains("call site: OrderDao.findByCode (RawRows, Loop, capped)"));
    assert!(output.contains("1 queries, 1 call sites"));
}

#[test]
fn test_format_corpus_yaml_round_trips() {
    let corpus = sample_corpus();
    let output = format_corpus(&corpus, &opts(OutputFormat::Yaml));
    let decoded: Corpus = serde_yaml::from_str(&output).unwrap();
    assert_eq!(decoded, corpus);
}

#[test]
fn test_format_corpus_json() {
    let output = format_corpus(&sample_corpus(), &opts(OutputFormat::Json));
    assert!(output.trim_start().starts_with('{'));
    assert!(output.contains("\"invocation_context\": \"loop\""));
}

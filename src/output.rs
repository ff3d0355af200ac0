use colored::Colorize;
use serde_json::{Value, json};

use crate::{
    corpus::Corpus,
    rules::{AnalysisReport, ColumnRole, Finding, RuleId, Severity, Verdict}
};

const SARIF_SCHEMA: &str = "https://json.schemastore.org/sarif-2.1.0.json";
const TOOL_NAME: &str = "query-risk-analyzer";

/// Output format for results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml,
    Sarif
}

/// Output options
#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub format:  OutputFormat,
    pub colored: bool,
    /// Include the per-query index coverage table in text output
    pub verbose: bool
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            format:  OutputFormat::Text,
            colored: true,
            verbose: false
        }
    }
}

/// Format an analysis report based on output options
pub fn format_report(report: &AnalysisReport, opts: &OutputOptions) -> String {
    match opts.format {
        OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
        OutputFormat::Yaml => serde_yaml::to_string(report).unwrap_or_default(),
        OutputFormat::Sarif => {
            serde_json::to_string_pretty(&sarif_document(report)).unwrap_or_default()
        }
        OutputFormat::Text => format_text_report(report, opts)
    }
}

/// Format a scanned corpus. Text and SARIF fall back to a summary and JSON.
pub fn format_corpus(corpus: &Corpus, opts: &OutputOptions) -> String {
    match opts.format {
        OutputFormat::Yaml => serde_yaml::to_string(corpus).unwrap_or_default(),
        OutputFormat::Json | OutputFormat::Sarif => {
            serde_json::to_string_pretty(corpus).unwrap_or_default()
        }
        OutputFormat::Text => format_corpus_summary(corpus, opts)
    }
}

fn paint(text: &str, severity: Severity, colored: bool) -> String {
    if !colored {
        return text.to_string();
    }
    match severity {
        Severity::Critical => text.red().bold().to_string(),
        Severity::High => text.red().to_string(),
        Severity::Medium => text.yellow().to_string(),
        Severity::Low => text.blue().to_string()
    }
}

fn format_text_report(report: &AnalysisReport, opts: &OutputOptions) -> String {
    let mut output = String::new();
    let header = format!(
        "=== Query Risk Analysis ({} queries, {} rules) ===",
        report.queries_count, report.rules_count
    );
    if opts.colored {
        output.push_str(&header.bold().to_string());
    } else {
        output.push_str(&header);
    }
    output.push_str("\n\n");

    if report.findings.is_empty() {
        let msg = "No issues found.";
        if opts.colored {
            output.push_str(&msg.green().to_string());
        } else {
            output.push_str(msg);
        }
        output.push('\n');
    }

    let mut current_query: Option<&str> = None;
    for finding in &report.findings {
        if current_query != Some(finding.query_id.as_str()) {
            let title = format!("Query {}:", finding.query_id);
            if opts.colored {
                output.push_str(&title.cyan().bold().to_string());
            } else {
                output.push_str(&title);
            }
            output.push('\n');
            current_query = Some(finding.query_id.as_str());
        }
        output.push_str(&format_finding(finding, opts.colored));
    }

    if opts.verbose && !report.coverage.is_empty() {
        output.push_str(&format_coverage(report, opts.colored));
    }

    if !report.findings.is_empty() {
        output.push_str(&format!(
            "\nSummary: {} critical, {} high, {} medium, {} low\n",
            report.count(Severity::Critical),
            report.count(Severity::High),
            report.count(Severity::Medium),
            report.count(Severity::Low)
        ));
    }
    if report.truncated {
        let msg = format!(
            "Analysis truncated: deadline expired with {} queries not analyzed\n",
            report.skipped
        );
        output.push_str(&paint(&msg, Severity::Medium, opts.colored));
    }
    output
}

fn format_finding(finding: &Finding, colored: bool) -> String {
    let mut out = String::new();
    let label = format!("[{}]", finding.severity);
    out.push_str(&format!(
        "  {} {} {}\n",
        paint(&label, finding.severity, colored),
        finding.rule_id,
        finding.rule_name
    ));
    out.push_str(&format!(
        "    at line {}, column {}",
        finding.location.line, finding.location.column
    ));
    if let Some(caller) = &finding.caller {
        out.push_str(&format!(" (called from {})", caller));
    }
    out.push('\n');
    out.push_str(&format!("    {}\n", finding.message));
    if !finding.columns.is_empty() {
        let columns: Vec<String> = finding
            .columns
            .iter()
            .map(|c| format!("{}.{}", c.table, c.column))
            .collect();
        out.push_str(&format!("    Columns: {}\n", columns.join(", ")));
    } else if !finding.tables.is_empty() {
        out.push_str(&format!("    Tables: {}\n", finding.tables.join(", ")));
    }
    if let Some(batches) = &finding.batches {
        let sizes: Vec<String> = batches.iter().map(|b| b.to_string()).collect();
        out.push_str(&format!("    Batches: {}\n", sizes.join(" / ")));
    }
    if let Some(suggestion) = &finding.suggestion {
        let line = format!("    → {}", suggestion);
        if colored {
            out.push_str(&line.green().to_string());
        } else {
            out.push_str(&line);
        }
        out.push('\n');
    }
    out
}

fn format_coverage(report: &AnalysisReport, colored: bool) -> String {
    let mut out = String::from("\nIndex coverage:\n");
    for query in &report.coverage {
        out.push_str(&format!("  {}\n", query.query_id));
        if query.columns.is_empty() {
            out.push_str("    (no join or filter columns)\n");
        }
        for column in &query.columns {
            let role = match column.role {
                ColumnRole::Join => "join",
                ColumnRole::Filter => "filter"
            };
            let verdict = match &column.verdict {
                Verdict::Indexed { index_names } => {
                    format!("{} ({})", column.verdict.label(), index_names.join(", "))
                }
                Verdict::NotIndexed => column.verdict.label().to_string(),
                Verdict::Unverified { reason } => {
                    format!("{}: {}", column.verdict.label(), reason)
                }
            };
            let verdict = match (&column.verdict, colored) {
                (_, false) => verdict,
                (Verdict::Indexed { .. }, true) => verdict.green().to_string(),
                (Verdict::NotIndexed, true) => verdict.red().to_string(),
                (Verdict::Unverified { .. }, true) => verdict.yellow().to_string()
            };
            let depth = if column.depth > 0 {
                format!(" [subquery {}]", column.depth)
            } else {
                String::new()
            };
            out.push_str(&format!(
                "    {:<6} {}.{} → {}.{}{}: {}\n",
                role, column.alias, column.column, column.table, column.column, depth, verdict
            ));
        }
    }
    out
}

fn format_corpus_summary(corpus: &Corpus, opts: &OutputOptions) -> String {
    let mut out = String::new();
    for query in &corpus.queries {
        let title = format!("Query {}:", query.id);
        if opts.colored {
            out.push_str(&title.cyan().bold().to_string());
        } else {
            out.push_str(&title);
        }
        out.push('\n');
        out.push_str(&format!("  {}\n", query.template));
        for site in corpus.call_sites_for(&query.id) {
            out.push_str(&format!(
                "  call site: {} ({:?}, {:?}{})\n",
                site.caller.as_deref().unwrap_or("unknown caller"),
                site.consumer_shape,
                site.invocation_context,
                if site.cap_applied { ", capped" } else { "" }
            ));
            for param in &site.params {
                let collection = if param.collection.is_some() { " collection" } else { "" };
                out.push_str(&format!(
                    "    ?{}: {}{}\n",
                    param.name, param.value_type, collection
                ));
            }
        }
        out.push('\n');
    }
    out.push_str(&format!(
        "{} queries, {} call sites\n",
        corpus.queries.len(),
        corpus.call_sites.len()
    ));
    out
}

fn sarif_level(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical | Severity::High => "error",
        Severity::Medium => "warning",
        Severity::Low => "note"
    }
}

fn sarif_document(report: &AnalysisReport) -> Value {
    let rules: Vec<Value> = RuleId::ALL
        .iter()
        .map(|rule| {
            let info = rule.info();
            json!({
                "id": info.id,
                "name": info.name,
                "shortDescription": { "text": info.name },
                "defaultConfiguration": { "level": sarif_level(info.severity) },
                "properties": { "category": info.category.to_string() }
            })
        })
        .collect();

    let results: Vec<Value> = report
        .findings
        .iter()
        .map(|finding| {
            let rule_index = RuleId::ALL
                .iter()
                .position(|r| *r == finding.rule_id)
                .unwrap_or_default();
            let mut message = finding.message.clone();
            if let Some(suggestion) = &finding.suggestion {
                message.push_str("\nSuggestion: ");
                message.push_str(suggestion);
            }
            json!({
                "ruleId": finding.rule_id.code(),
                "ruleIndex": rule_index,
                "level": sarif_level(finding.severity),
                "message": { "text": message },
                "locations": [{
                    "logicalLocations": [{
                        "fullyQualifiedName": finding.query_id,
                        "kind": "member"
                    }],
                    "properties": {
                        "line": finding.location.line,
                        "column": finding.location.column
                    }
                }],
                "properties": {
                    "severity": finding.severity,
                    "tables": finding.tables,
                    "columns": finding.columns,
                    "caller": finding.caller,
                    "batches": finding.batches
                }
            })
        })
        .collect();

    json!({
        "$schema": SARIF_SCHEMA,
        "version": "2.1.0",
        "runs": [{
            "tool": {
                "driver": {
                    "name": TOOL_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                    "rules": rules
                }
            },
            "results": results,
            "invocations": [{
                "executionSuccessful": true,
                "properties": {
                    "truncated": report.truncated,
                    "skipped": report.skipped
                }
            }]
        }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Location;

    fn report_with(finding: Finding) -> AnalysisReport {
        let mut report = AnalysisReport::new(1, 14, 1);
        report.findings.push(finding);
        report
    }

    #[test]
    fn test_sarif_levels() {
        assert_eq!(sarif_level(Severity::Critical), "error");
        assert_eq!(sarif_level(Severity::High), "error");
        assert_eq!(sarif_level(Severity::Medium), "warning");
        assert_eq!(sarif_level(Severity::Low), "note");
    }

    #[test]
    fn test_sarif_rule_index_matches_registry() {
        let report = report_with(Finding::new(RuleId::TypeMismatch, "q", "mismatch"));
        let doc = sarif_document(&report);
        let result = &doc["runs"][0]["results"][0];
        let index = result["ruleIndex"].as_u64().unwrap() as usize;
        assert_eq!(doc["runs"][0]["tool"]["driver"]["rules"][index]["id"], "TYPE001");
        assert_eq!(result["level"], "warning");
    }

    #[test]
    fn test_text_finding_lines() {
        let finding = Finding::new(RuleId::UnboundedInList, "Dao.Q", "too many")
            .at(Location {
                offset: 10,
                line:   2,
                column: 4
            })
            .with_batches(vec![1000, 1000, 500])
            .with_suggestion("batch it");
        let text = format_finding(&finding, false);
        assert!(text.contains("[HIGH] PATTERN003"));
        assert!(text.contains("line 2, column 4"));
        assert!(text.contains("Batches: 1000 / 1000 / 500"));
        assert!(text.contains("→ batch it"));
    }
}

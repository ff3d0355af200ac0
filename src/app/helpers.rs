//! Helper functions for CLI operations.

use std::{
    fs::read_to_string,
    io::{self, Read},
    path::Path
};

use super::convert::convert_format;
use crate::{
    cli::Format,
    corpus::{Corpus, load_corpus},
    document::DocumentFormat,
    error::{AppResult, config_error, file_read_error},
    output::OutputOptions,
    rules::{AnalysisReport, Severity},
    scan::scan_sources
};

/// Calculates the process exit code from the highest finding severity:
/// - `0` - No findings or only Low ones
/// - `1` - At least one Medium finding
/// - `2` - At least one High or Critical finding
///
/// # Example
///
/// ```
/// use query_risk_analyzer::{app::calculate_exit_code, rules::AnalysisReport};
///
/// let report = AnalysisReport::new(1, 14, 1);
/// assert_eq!(calculate_exit_code(&report), 0);
/// ```
pub fn calculate_exit_code(report: &AnalysisReport) -> i32 {
    match report.highest_severity() {
        Some(Severity::Critical | Severity::High) => 2,
        Some(Severity::Medium) => 1,
        Some(Severity::Low) | None => 0
    }
}

/// Reads a file, or standard input when the path is "-".
///
/// # Errors
///
/// Returns an error if the file cannot be read or stdin fails.
pub fn read_input(path: &Path) -> AppResult<String> {
    if path.as_os_str() == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .map_err(|e| file_read_error("stdin", e))?;
        Ok(buffer)
    } else {
        read_to_string(path).map_err(|e| file_read_error(&path.display().to_string(), e))
    }
}

/// Builds the corpus from a corpus file and/or a source scan.
///
/// Corpus documents read from stdin are decoded as YAML, which also
/// accepts JSON.
///
/// # Errors
///
/// Unreadable inputs, undecodable corpus, duplicate query ids, or neither
/// input given.
pub fn load_corpus_inputs(queries: Option<&Path>, sources: Option<&Path>) -> AppResult<Corpus> {
    let mut corpus = match queries {
        Some(path) if path.as_os_str() == "-" => {
            Corpus::parse(&read_input(path)?, DocumentFormat::Yaml)?
        }
        Some(path) => load_corpus(path)?,
        None => Corpus::default()
    };
    match sources {
        Some(root) => corpus.merge(scan_sources(root)?)?,
        None if queries.is_none() => {
            return Err(config_error("either --queries or --sources is required"));
        }
        None => {}
    }
    Ok(corpus)
}

/// Creates output options from CLI parameters.
pub fn create_output_options(format: Format, no_color: bool, verbose: bool) -> OutputOptions {
    OutputOptions {
        format: convert_format(format),
        colored: !no_color,
        verbose
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::{
        output::OutputFormat,
        rules::{Finding, RuleId}
    };

    fn report_with(rule: RuleId) -> AnalysisReport {
        let mut report = AnalysisReport::new(1, 14, 1);
        report.findings.push(Finding::new(rule, "q", "finding"));
        report
    }

    #[test]
    fn test_calculate_exit_code() {
        assert_eq!(calculate_exit_code(&AnalysisReport::new(1, 14, 1)), 0);
        assert_eq!(calculate_exit_code(&report_with(RuleId::UnverifiedColumn)), 0);
        assert_eq!(calculate_exit_code(&report_with(RuleId::TypeMismatch)), 1);
        assert_eq!(calculate_exit_code(&report_with(RuleId::QueryInLoop)), 2);
        assert_eq!(calculate_exit_code(&report_with(RuleId::UnanalyzableQuery)), 2);
    }

    #[test]
    fn test_create_output_options() {
        let opts = create_output_options(Format::Json, true, false);
        assert_eq!(opts.format, OutputFormat::Json);
        assert!(!opts.colored);
        assert!(!opts.verbose);
    }

    #[test]
    fn test_load_corpus_inputs_requires_input() {
        assert!(load_corpus_inputs(None, None).is_err());
    }

    #[test]
    fn test_load_corpus_inputs_merges_scan() {
        let dir = tempfile::tempdir().unwrap();
        let corpus_path = dir.path().join("corpus.json");
        fs::write(
            &corpus_path,
            r#"{"queries":[{"id":"manual","template":"SELECT {pk} FROM {Order}"}]}"#
        )
        .unwrap();
        let sources = dir.path().join("src");
        fs::create_dir(&sources).unwrap();
        fs::write(
            sources.join("OrderDao.java"),
            "public class OrderDao {\n    private static final String ALL = \"SELECT {pk} FROM {Order}\";\n}\n"
        )
        .unwrap();
        let corpus = load_corpus_inputs(Some(&corpus_path), Some(&sources)).unwrap();
        let ids: Vec<_> = corpus.queries.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["manual", "OrderDao.ALL"]);
    }
}

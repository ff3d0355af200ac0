//! Command execution: analyze, scan and catalog.

use std::{path::Path, time::Duration};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use super::{
    helpers::{calculate_exit_code, create_output_options, load_corpus_inputs},
    types::{AnalyzeParams, AnalyzeResult, CommandOutput}
};
use crate::{
    catalog::load_catalog,
    cli::Format,
    config::Config,
    error::AppResult,
    output::{format_corpus, format_report},
    rules::RuleRunner,
    scan::scan_sources
};

/// Executes the analysis pipeline.
///
/// 1. **Settings**: validates the configuration; invalid values fail here,
///    before any input is read
/// 2. **Catalog**: loads the schema metadata once
/// 3. **Corpus**: decodes the corpus file and/or scans sources
/// 4. **Analysis**: runs every enabled rule over every query in parallel
///
/// # Errors
///
/// Returns an error if the configuration is invalid or an input cannot be
/// read or decoded. Malformed queries are findings, not errors.
///
/// # Example
///
/// ```no_run
/// use std::path::PathBuf;
///
/// use query_risk_analyzer::{
///     app::{AnalyzeParams, run_analyze},
///     cli::Format,
///     config::Config
/// };
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let params = AnalyzeParams {
///     schema_path:   PathBuf::from("schema.yaml"),
///     queries_path:  Some(PathBuf::from("queries.yaml")),
///     sources:       None,
///     output_format: Format::Text,
///     verbose:       false,
///     no_color:      false
/// };
/// let result = run_analyze(params, Config::default())?;
/// println!("Exit code: {}", result.exit_code);
/// # Ok(())
/// # }
/// ```
pub fn run_analyze(params: AnalyzeParams, config: Config) -> AppResult<AnalyzeResult> {
    let settings = config.settings()?;
    let catalog = load_catalog(&params.schema_path)?;
    let corpus = load_corpus_inputs(params.queries_path.as_deref(), params.sources.as_deref())?;
    let output_opts = create_output_options(params.output_format, params.no_color, params.verbose);

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(format!("Analyzing {} queries...", corpus.queries.len()));
    pb.enable_steady_tick(Duration::from_millis(100));

    let runner = RuleRunner::new(&catalog, settings);
    let report = runner.analyze(&corpus);
    pb.finish_and_clear();

    let output = format_report(&report, &output_opts);
    let exit_code = calculate_exit_code(&report);
    Ok(AnalyzeResult {
        exit_code,
        output,
        report
    })
}

/// Scans sources and renders the extracted corpus.
pub fn run_scan(sources: &Path, format: Format, no_color: bool) -> AppResult<CommandOutput> {
    let corpus = scan_sources(sources)?;
    let opts = create_output_options(format, no_color, false);
    Ok(CommandOutput {
        exit_code: 0,
        stdout:    vec![format_corpus(&corpus, &opts)]
    })
}

/// Loads metadata and renders the catalog summary.
pub fn run_catalog(schema: &Path) -> AppResult<CommandOutput> {
    let catalog = load_catalog(schema)?;
    info!(tables = catalog.table_count(), "catalog loaded");
    Ok(CommandOutput {
        exit_code: 0,
        stdout:    vec![catalog.to_summary()]
    })
}

#[cfg(test)]
mod tests {
    use std::{fs, path::PathBuf};

    use super::*;

    const SCHEMA: &str = r#"
tables:
  - name: Order
    columns:
      - { name: code, type: string }
      - { name: user, type: numeric }
    indexes:
      - { name: idx_order_code, columns: [code] }
"#;

    const CORPUS: &str = r#"
queries:
  - id: OrderDao.BY_USER
    template: "SELECT {o.pk} FROM {Order AS o} WHERE {o.user} = ?user"
call_sites:
  - query_id: OrderDao.BY_USER
    caller: OrderDao.findByUser
    params:
      - { name: user, type: numeric }
"#;

    fn write_inputs(dir: &Path) -> (PathBuf, PathBuf) {
        let schema = dir.join("schema.yaml");
        let corpus = dir.join("corpus.yaml");
        fs::write(&schema, SCHEMA).unwrap();
        fs::write(&corpus, CORPUS).unwrap();
        (schema, corpus)
    }

    #[test]
    fn test_run_analyze_reports_unindexed_filter() {
        let dir = tempfile::tempdir().unwrap();
        let (schema, corpus) = write_inputs(dir.path());
        let params = AnalyzeParams {
            schema_path:   schema,
            queries_path:  Some(corpus),
            sources:       None,
            output_format: Format::Json,
            verbose:       false,
            no_color:      true
        };
        let result = run_analyze(params, Config::default()).unwrap();
        assert!(result.output.contains("INDEX002"));
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.report.queries_count, 1);
    }

    #[test]
    fn test_run_analyze_invalid_config_fails_first() {
        let mut config = Config::default();
        config.analysis.in_clause_size_limit = 0;
        let params = AnalyzeParams {
            schema_path:   PathBuf::from("/nonexistent/schema.yaml"),
            queries_path:  None,
            sources:       None,
            output_format: Format::Text,
            verbose:       false,
            no_color:      true
        };
        assert!(run_analyze(params, config).is_err());
    }

    #[test]
    fn test_run_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let (schema, _) = write_inputs(dir.path());
        let output = run_catalog(&schema).unwrap();
        assert_eq!(output.exit_code, 0);
        assert!(output.stdout[0].contains("Table: Order"));
    }
}

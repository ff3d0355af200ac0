//! Application types for CLI commands.

use std::path::PathBuf;

use crate::{cli::Format, rules::AnalysisReport};

/// Parameters for the analyze command.
///
/// At least one of `queries_path` and `sources` must be present; both
/// are merged into one corpus when given together.
///
/// # Example
///
/// ```
/// use std::path::PathBuf;
///
/// use query_risk_analyzer::{app::AnalyzeParams, cli::Format};
///
/// let params = AnalyzeParams {
///     schema_path:   PathBuf::from("schema.yaml"),
///     queries_path:  Some(PathBuf::from("queries.yaml")),
///     sources:       None,
///     output_format: Format::Text,
///     verbose:       false,
///     no_color:      false
/// };
/// assert!(params.sources.is_none());
/// ```
#[derive(Debug, Clone)]
pub struct AnalyzeParams {
    /// Metadata file: JSON, YAML, TOML or SQL DDL.
    pub schema_path:   PathBuf,
    /// Corpus file or "-" for stdin.
    pub queries_path:  Option<PathBuf>,
    /// Data-access source file or directory to scan.
    pub sources:       Option<PathBuf>,
    pub output_format: Format,
    /// Include the index coverage table in text output.
    pub verbose:       bool,
    pub no_color:      bool
}

/// Result of analysis.
#[derive(Debug, Clone)]
pub struct AnalyzeResult {
    /// Exit code based on the highest severity (0, 1, or 2).
    pub exit_code: i32,
    /// Formatted report.
    pub output:    String,
    pub report:    AnalysisReport
}

/// Output from CLI command execution.
///
/// # Example
///
/// ```
/// use query_risk_analyzer::app::CommandOutput;
///
/// let output = CommandOutput {
///     exit_code: 0,
///     stdout:    vec!["No issues found.".to_string()]
/// };
/// assert_eq!(output.stdout.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code for the process (0=success, 1=medium, 2=high or critical).
    pub exit_code: i32,
    /// Lines to print to stdout.
    pub stdout:    Vec<String>
}

impl From<AnalyzeResult> for CommandOutput {
    fn from(result: AnalyzeResult) -> Self {
        Self {
            exit_code: result.exit_code,
            stdout:    vec![result.output]
        }
    }
}

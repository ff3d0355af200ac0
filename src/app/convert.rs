//! Conversions from CLI-facing types to internal types.

use crate::{
    app::AnalyzeParams,
    cli::{AnalyzeArgs, Format},
    config::Config,
    output::OutputFormat
};

/// Converts a CLI format enum to the internal output format type.
///
/// # Example
///
/// ```
/// use query_risk_analyzer::{app::convert_format, cli::Format, output::OutputFormat};
///
/// assert_eq!(convert_format(Format::Sarif), OutputFormat::Sarif);
/// ```
pub fn convert_format(format: Format) -> OutputFormat {
    match format {
        Format::Text => OutputFormat::Text,
        Format::Json => OutputFormat::Json,
        Format::Yaml => OutputFormat::Yaml,
        Format::Sarif => OutputFormat::Sarif
    }
}

/// Layer command-line flags over the loaded configuration. Watched tables
/// given on the command line are added to the configured ones.
pub fn apply_overrides(config: &mut Config, args: &AnalyzeArgs) {
    let analysis = &mut config.analysis;
    if let Some(limit) = args.in_limit {
        analysis.in_clause_size_limit = limit;
    }
    if let Some(depth) = args.max_depth {
        analysis.max_subquery_depth = depth;
    }
    if let Some(deadline) = args.deadline_ms {
        analysis.deadline_ms = Some(deadline);
    }
    for table in &args.watched {
        let table = table.trim();
        if !table.is_empty() && !analysis.tables_requiring_extra_scrutiny.iter().any(|t| t == table) {
            analysis.tables_requiring_extra_scrutiny.push(table.to_string());
        }
    }
}

impl From<AnalyzeArgs> for AnalyzeParams {
    fn from(args: AnalyzeArgs) -> Self {
        Self {
            schema_path:   args.schema,
            queries_path:  args.queries,
            sources:       args.sources,
            output_format: args.output_format,
            verbose:       args.verbose,
            no_color:      args.no_color
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn args() -> AnalyzeArgs {
        AnalyzeArgs {
            schema:        PathBuf::from("schema.yaml"),
            queries:       Some(PathBuf::from("queries.yaml")),
            sources:       None,
            output_format: Format::Json,
            verbose:       true,
            no_color:      true,
            watched:       vec!["Order".to_string(), " ".to_string()],
            in_limit:      Some(500),
            max_depth:     None,
            deadline_ms:   Some(250)
        }
    }

    #[test]
    fn test_convert_format() {
        assert_eq!(convert_format(Format::Text), OutputFormat::Text);
        assert_eq!(convert_format(Format::Json), OutputFormat::Json);
        assert_eq!(convert_format(Format::Yaml), OutputFormat::Yaml);
        assert_eq!(convert_format(Format::Sarif), OutputFormat::Sarif);
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = Config::default();
        config.analysis.tables_requiring_extra_scrutiny = vec!["Order".to_string()];
        apply_overrides(&mut config, &args());
        assert_eq!(config.analysis.in_clause_size_limit, 500);
        assert_eq!(config.analysis.max_subquery_depth, 5);
        assert_eq!(config.analysis.deadline_ms, Some(250));
        assert_eq!(config.analysis.tables_requiring_extra_scrutiny, vec!["Order".to_string()]);
    }

    #[test]
    fn test_params_from_args() {
        let params = AnalyzeParams::from(args());
        assert_eq!(params.schema_path, PathBuf::from("schema.yaml"));
        assert!(params.verbose);
        assert!(params.no_color);
    }
}

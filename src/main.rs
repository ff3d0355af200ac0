//! # Query Risk Analyzer
//!
//! Static detection of performance risks in templated data-access queries.
//!
//! `query-risk-analyzer` parses query definitions written in a templated
//! dialect (`{alias.column}` tokens, `?name` placeholders, `{{ ... }}`
//! subqueries), cross-references them with table, column and index
//! metadata, and reports typed findings with a severity and a single rule
//! attribution.
//!
//! # Quick Start
//!
//! ```bash
//! # Analyze a corpus file against YAML metadata
//! query-risk-analyzer analyze -s schema.yaml -q queries.yaml
//!
//! # Extract the corpus straight from data-access sources
//! query-risk-analyzer analyze -s schema.sql --sources src/main/java
//!
//! # CI/CD integration with SARIF output
//! query-risk-analyzer analyze -s schema.yaml -q queries.yaml -f sarif > results.sarif
//!
//! # Inspect what the scanner extracts
//! query-risk-analyzer scan --sources src/main/java -f yaml
//! ```
//!
//! # Rules
//!
//! | ID | Name | Default |
//! |----|------|---------|
//! | PARSE001 | Unanalyzable query | Critical |
//! | PARSE002 | Unresolved alias | Critical |
//! | PATTERN001 | Multi-join correlated subquery | High |
//! | PATTERN002 | Aggregate with nullable OR | High |
//! | PATTERN003 | Unbounded IN-list | High |
//! | PATTERN004 | Cartesian join | High |
//! | INDEX001 | Unindexed join column | High |
//! | INDEX002 | Unindexed filter column | Medium |
//! | INDEX003 | Composite index gap | Medium |
//! | INDEX004 | Column requires verification | Low |
//! | TYPE001 | Parameter type mismatch | Medium |
//! | CALL001 | Unbounded result | Medium |
//! | CALL002 | Client-side aggregation | High |
//! | CALL003 | Query in loop | High |
//!
//! # Exit Codes
//!
//! - `0` - No findings, or only Low ones
//! - `1` - Medium findings
//! - `2` - High or Critical findings
//!
//! # Logging
//!
//! Diagnostics go to stderr, filtered by `QUERY_RISK_LOG` (default `warn`),
//! e.g. `QUERY_RISK_LOG=query_risk_analyzer=debug`.

use std::{io, process};

use clap::Parser;
use query_risk_analyzer::{
    app::{CommandOutput, apply_overrides, run_analyze, run_catalog, run_scan},
    cli::{Cli, Commands},
    config::Config,
    error::AppResult
};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "QUERY_RISK_LOG";

fn main() {
    init_tracing();
    match run() {
        Ok(output) => {
            for line in output.stdout {
                println!("{}", line);
            }
            process::exit(output.exit_code);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run() -> AppResult<CommandOutput> {
    let cli = Cli::parse();
    let mut config = Config::load_from(cli.config.as_deref())?;

    match cli.command {
        Commands::Analyze(args) => {
            apply_overrides(&mut config, &args);
            run_analyze(args.into(), config).map(CommandOutput::from)
        }
        Commands::Scan {
            sources,
            output_format,
            no_color
        } => run_scan(&sources, output_format, no_color),
        Commands::Catalog { schema } => run_catalog(&schema)
    }
}

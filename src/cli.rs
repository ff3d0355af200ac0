use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Query Risk Analyzer - Detect performance risks in templated queries
#[derive(Parser, Debug)]
#[command(name = "query-risk-analyzer")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to ./.query-risk.toml)
    #[arg(long, global = true, env = "QUERY_RISK_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze query definitions against schema metadata
    Analyze(AnalyzeArgs),

    /// Scan data-access sources and print the extracted query corpus
    Scan {
        /// Source file or directory
        #[arg(long)]
        sources: PathBuf,

        /// Output format (json, yaml or text)
        #[arg(short = 'f', long, value_enum, default_value = "yaml")]
        output_format: Format,

        /// Disable colored output
        #[arg(long)]
        no_color: bool
    },

    /// Load schema metadata and print the indexed catalog
    Catalog {
        /// Path to metadata file (JSON, YAML, TOML or SQL DDL)
        #[arg(short, long)]
        schema: PathBuf
    }
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Path to metadata file (JSON, YAML, TOML or SQL DDL)
    #[arg(short, long)]
    pub schema: PathBuf,

    /// Path to query corpus file (JSON, YAML or TOML; use - for stdin)
    #[arg(short, long, required_unless_present = "sources")]
    pub queries: Option<PathBuf>,

    /// Data-access source file or directory to scan for queries
    #[arg(long)]
    pub sources: Option<PathBuf>,

    /// Output format
    #[arg(short = 'f', long, value_enum, default_value = "text")]
    pub output_format: Format,

    /// Include the index coverage table
    #[arg(short, long)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Tables whose findings get a raised severity floor (repeatable)
    #[arg(long = "watched", value_delimiter = ',')]
    pub watched: Vec<String>,

    /// Largest acceptable IN-list size
    #[arg(long)]
    pub in_limit: Option<usize>,

    /// Maximum subquery nesting depth
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Stop starting new queries after this many milliseconds
    #[arg(long)]
    pub deadline_ms: Option<u64>
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Format {
    Text,
    Json,
    Yaml,
    Sarif
}

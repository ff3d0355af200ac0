//! Application logic for the Query Risk Analyzer CLI.
//!
//! This module contains the command implementations separated from the
//! main entry point to enable testing.
//!
//! - [`run_analyze`] - load inputs, analyze, format, compute the exit code
//! - [`run_scan`] - extract a corpus from data-access sources
//! - [`run_catalog`] - print the indexed schema catalog

mod analyze;
mod convert;
mod helpers;
mod types;

pub use analyze::{run_analyze, run_catalog, run_scan};
pub use convert::{apply_overrides, convert_format};
pub use helpers::{calculate_exit_code, create_output_options, load_corpus_inputs, read_input};
pub use types::{AnalyzeParams, AnalyzeResult, CommandOutput};

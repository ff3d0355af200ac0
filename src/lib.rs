//! # Query Risk Analyzer Library
//!
//! Rule-based detection of performance risks in templated queries,
//! cross-referenced against schema and index metadata.
//!
//! ```text
//! corpus ─┐                      ┌─ pattern rules ─┐
//!         ├─ parse ─ QueryModel ─┼─ index rules   ─┼─ aggregate ─ AnalysisReport
//! catalog ┘                      ├─ type rules    ─┤
//!                                └─ call-site     ─┘
//! ```
//!
//! - [`catalog`] - Schema catalog built from metadata documents or DDL
//! - [`corpus`] - Query definitions and call-site records
//! - [`scan`] - Corpus extraction from data-access sources
//! - [`query`] - Templated query lexer, parser and model
//! - [`rules`] - Rule engine and built-in rules
//! - [`config`] - Layered configuration and validated settings
//! - [`output`] - Text, JSON, YAML and SARIF rendering

pub mod app;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod corpus;
pub mod document;
pub mod error;
pub mod output;
pub mod query;
pub mod rules;
pub mod scan;

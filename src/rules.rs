//! Risk rule engine for templated queries.
//!
//! This module runs every enabled rule against each parsed query and merges
//! the results into an [`AnalysisReport`]. Rules are implemented as types
//! that implement the [`Rule`] trait.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐     ┌─────────────┐
//! │  Corpus     │────▶│ Query parser │────▶│  RuleRunner  │────▶│   Report    │
//! └─────────────┘     └──────────────┘     └──────────────┘     └─────────────┘
//!                                                 │
//!                                          ┌──────┴──────┐
//!                                          │   Rules     │
//!                                          │  (parallel) │
//!                                          └─────────────┘
//! ```
//!
//! Queries are analyzed independently on [`rayon`] workers; the schema
//! catalog and settings are shared read-only. A query that fails to parse
//! yields a `PARSE001`/`PARSE002` finding instead of aborting the run.
//!
//! # Rule Categories
//!
//! - **Parse** (`PARSE001`-`PARSE002`) - Unanalyzable queries
//! - **Pattern** (`PATTERN001`-`PATTERN004`) - Structural signatures
//! - **Index** (`INDEX001`-`INDEX004`) - Index coverage
//! - **Type** (`TYPE001`) - Parameter type mismatches
//! - **CallSite** (`CALL001`-`CALL003`) - How results are consumed
//!
//! # Severity
//!
//! Final severity is the highest of the configured override (or the rule
//! default), the escalation the rule mandates for the finding, and the
//! watched-table floor, which lifts Low findings on watched tables to Medium.

mod call_site;
mod context;
mod index;
mod patterns;
mod typing;
mod types;

use std::{collections::HashSet, time::Instant};

pub use context::QueryContext;
pub use index::coverage_table;
pub use patterns::plan_batches;
use rayon::prelude::*;
use tracing::{debug, info, warn};
pub use typing::is_compatible;
pub use types::{
    AnalysisReport, ColumnRole, ColumnVerdict, EvidenceColumn, Finding, Location, QueryCoverage,
    RuleCategory, RuleId, RuleInfo, Severity, Verdict
};

use crate::{
    catalog::SchemaCatalog,
    config::AnalyzerSettings,
    corpus::{Corpus, QueryDefinition},
    query::{ParseError, parse_query}
};

/// Trait for implementing query risk rules.
///
/// Rules are stateless analyzers that examine a single query and return any
/// findings. They must be `Send + Sync` for parallel execution.
///
/// # Example
///
/// ```
/// use query_risk_analyzer::rules::{Finding, QueryContext, Rule, RuleId, RuleInfo};
///
/// struct DistinctRule;
///
/// impl Rule for DistinctRule {
///     fn info(&self) -> RuleInfo {
///         RuleId::UnboundedResult.info()
///     }
///
///     fn check(&self, ctx: &QueryContext<'_>) -> Vec<Finding> {
///         if ctx.model.distinct {
///             vec![Finding::new(RuleId::UnboundedResult, ctx.id(), "DISTINCT over raw rows")]
///         } else {
///             vec![]
///         }
///     }
/// }
/// ```
pub trait Rule: Send + Sync {
    /// Returns metadata about this rule.
    fn info(&self) -> RuleInfo;

    /// Analyzes one parsed query and returns any findings.
    fn check(&self, ctx: &QueryContext<'_>) -> Vec<Finding>;
}

/// Result of analyzing one query definition.
enum QueryOutcome {
    Analyzed {
        findings: Vec<Finding>,
        coverage: Option<QueryCoverage>
    },
    /// Not started because the run deadline expired
    Skipped
}

/// Parallel rule execution engine.
///
/// # Example
///
/// ```
/// use query_risk_analyzer::{
///     catalog::SchemaCatalog,
///     config::AnalyzerSettings,
///     corpus::{Corpus, QueryDefinition},
///     rules::{RuleId, RuleRunner}
/// };
///
/// let corpus = Corpus {
///     queries:    vec![QueryDefinition::new("broken", "SELECT {p.pk} FROM {Promotion AS p")],
///     call_sites: vec![]
/// };
/// let catalog = SchemaCatalog::default();
/// let runner = RuleRunner::new(&catalog, AnalyzerSettings::default());
/// let report = runner.analyze(&corpus);
///
/// assert_eq!(report.findings[0].rule_id, RuleId::UnanalyzableQuery);
/// ```
pub struct RuleRunner<'a> {
    rules:    Vec<Box<dyn Rule>>,
    catalog:  &'a SchemaCatalog,
    settings: AnalyzerSettings
}

impl<'a> RuleRunner<'a> {
    /// Create a runner with every rule the settings leave enabled.
    pub fn new(catalog: &'a SchemaCatalog, settings: AnalyzerSettings) -> Self {
        let all_rules: Vec<Box<dyn Rule>> = vec![
            Box::new(patterns::MultiJoinCorrelatedSubquery),
            Box::new(patterns::AggregateWithNullableOr),
            Box::new(patterns::UnboundedInList),
            Box::new(patterns::CartesianJoin),
            Box::new(index::UnindexedJoinColumn),
            Box::new(index::UnindexedFilterColumn),
            Box::new(index::CompositeIndexGap),
            Box::new(index::UnverifiedColumn),
            Box::new(typing::TypeMismatch),
            Box::new(call_site::UnboundedResult),
            Box::new(call_site::ClientSideAggregation),
            Box::new(call_site::QueryInLoop),
        ];
        let rules = all_rules
            .into_iter()
            .filter(|r| settings.is_enabled(r.info().rule))
            .collect();
        Self {
            rules,
            catalog,
            settings
        }
    }

    pub fn settings(&self) -> &AnalyzerSettings {
        &self.settings
    }

    /// Number of enabled rules, parse rules included.
    pub fn rules_count(&self) -> usize {
        RuleId::ALL
            .iter()
            .filter(|r| self.settings.is_enabled(**r))
            .count()
    }

    /// Analyze every query of the corpus (parallel execution).
    pub fn analyze(&self, corpus: &Corpus) -> AnalysisReport {
        let started = Instant::now();
        let outcomes: Vec<QueryOutcome> = corpus
            .queries
            .par_iter()
            .map(|definition| {
                if let Some(deadline) = self.settings.deadline
                    && started.elapsed() >= deadline
                {
                    return QueryOutcome::Skipped;
                }
                self.analyze_query(definition, corpus)
            })
            .collect();

        let mut report = AnalysisReport::new(
            corpus.queries.len(),
            self.rules_count(),
            self.settings.version
        );
        let mut findings = Vec::new();
        for outcome in outcomes {
            match outcome {
                QueryOutcome::Analyzed {
                    findings: found,
                    coverage
                } => {
                    findings.extend(found);
                    report.coverage.extend(coverage);
                }
                QueryOutcome::Skipped => report.skipped += 1
            }
        }
        report.truncated = report.skipped > 0;
        if report.truncated {
            warn!(
                skipped = report.skipped,
                "run deadline exceeded, report is partial"
            );
        }
        report.findings = aggregate(findings);
        info!(
            queries = report.queries_count,
            findings = report.findings.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "analysis finished"
        );
        report
    }

    fn analyze_query(&self, definition: &QueryDefinition, corpus: &Corpus) -> QueryOutcome {
        let model = match parse_query(
            &definition.template,
            &definition.aliases,
            self.settings.max_subquery_depth
        ) {
            Ok(model) => model,
            Err(error) => {
                warn!(query = %definition.id, %error, "query could not be parsed");
                let findings = self
                    .parse_failure(definition, &error)
                    .into_iter()
                    .collect();
                return QueryOutcome::Analyzed {
                    findings,
                    coverage: None
                };
            }
        };

        let ctx = QueryContext::new(
            definition,
            &model,
            self.catalog,
            &self.settings,
            corpus.call_sites_for(&definition.id).collect()
        );
        let watched = ctx.touches_watched();
        let findings: Vec<Finding> = self
            .rules
            .par_iter()
            .flat_map(|rule| rule.check(&ctx))
            .map(|finding| self.finalize(finding, watched))
            .collect();
        debug!(
            query = %definition.id,
            tables = model.table_count(),
            findings = findings.len(),
            "query analyzed"
        );
        QueryOutcome::Analyzed {
            findings,
            coverage: Some(QueryCoverage {
                query_id: definition.id.clone(),
                columns:  ctx.coverage().to_vec()
            })
        }
    }

    fn parse_failure(&self, definition: &QueryDefinition, error: &ParseError) -> Option<Finding> {
        let rule = if error.is_alias_error() {
            RuleId::UnresolvedAlias
        } else {
            RuleId::UnanalyzableQuery
        };
        if !self.settings.is_enabled(rule) {
            return None;
        }
        let location = Location::in_template(&definition.template, error.position());
        let finding = Finding::new(
            rule,
            &definition.id,
            format!(
                "Query could not be analyzed (line {}, column {}): {}",
                location.line, location.column, error
            )
        )
        .at(location)
        .with_suggestion("Fix the template; no other rule ran for this query");
        Some(self.finalize(finding, false))
    }

    /// Apply override, mandated escalation and the watched floor.
    fn finalize(&self, mut finding: Finding, watched: bool) -> Finding {
        let base = self
            .settings
            .severity_overrides
            .get(&finding.rule_id)
            .copied()
            .unwrap_or(finding.severity);
        let mut severity = finding.floor.map_or(base, |floor| base.max(floor));
        if watched && severity == Severity::Low {
            severity = severity.raised();
        }
        finding.severity = severity;
        finding
    }
}

/// Deterministic order: severity (highest first), query id, rule id, then
/// position and evidence.
fn compare(a: &Finding, b: &Finding) -> std::cmp::Ordering {
    b.severity
        .cmp(&a.severity)
        .then_with(|| a.query_id.cmp(&b.query_id))
        .then_with(|| a.rule_id.code().cmp(b.rule_id.code()))
        .then_with(|| a.location.cmp(&b.location))
        .then_with(|| a.columns.cmp(&b.columns))
        .then_with(|| a.caller.cmp(&b.caller))
        .then_with(|| a.message.cmp(&b.message))
}

/// Sort findings and keep one per rule, query and subject; the survivor is
/// the highest-severity one.
pub fn aggregate(mut findings: Vec<Finding>) -> Vec<Finding> {
    findings.sort_by(compare);
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(findings.len());
    for finding in findings {
        let key = (
            finding.rule_id,
            finding.query_id.clone(),
            finding.columns.clone(),
            finding.caller.clone()
        );
        if seen.insert(key) {
            kept.push(finding);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(rule: RuleId, query: &str, severity: Severity) -> Finding {
        let mut finding = Finding::new(rule, query, "m");
        finding.severity = severity;
        finding
    }

    #[test]
    fn test_aggregate_orders_and_deduplicates() {
        let findings = vec![
            finding(RuleId::TypeMismatch, "b", Severity::Medium),
            finding(RuleId::UnboundedResult, "a", Severity::Critical),
            finding(RuleId::TypeMismatch, "b", Severity::High),
            finding(RuleId::QueryInLoop, "a", Severity::High),
        ];
        let out = aggregate(findings);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].rule_id, RuleId::UnboundedResult);
        assert_eq!(out[1].query_id, "a");
        assert_eq!(out[2].severity, Severity::High);
        assert_eq!(out[2].rule_id, RuleId::TypeMismatch);
    }

    #[test]
    fn test_finalize_never_lowers_mandated_escalation() {
        let catalog = SchemaCatalog::default();
        let mut settings = AnalyzerSettings::default();
        settings
            .severity_overrides
            .insert(RuleId::UnboundedResult, Severity::Low);
        let runner = RuleRunner::new(&catalog, settings);
        let escalated = Finding::new(RuleId::UnboundedResult, "q", "m").escalate_to(Severity::Critical);
        assert_eq!(runner.finalize(escalated, false).severity, Severity::Critical);
        let plain = Finding::new(RuleId::UnboundedResult, "q", "m");
        assert_eq!(runner.finalize(plain.clone(), false).severity, Severity::Low);
        assert_eq!(runner.finalize(plain, true).severity, Severity::Medium);
    }

    #[test]
    fn test_disabled_rules_are_not_counted() {
        let catalog = SchemaCatalog::default();
        let mut settings = AnalyzerSettings::default();
        settings.disabled_rules.insert(RuleId::UnverifiedColumn);
        let runner = RuleRunner::new(&catalog, settings);
        assert_eq!(runner.rules_count(), RuleId::ALL.len() - 1);
        assert_eq!(runner.rules.len(), 11);
    }
}

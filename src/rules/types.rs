//! Type definitions for the risk rule system.
//!
//! - [`Severity`] - Finding severity levels (Low, Medium, High, Critical)
//! - [`RuleCategory`] - Component that owns a rule
//! - [`RuleId`] - Fixed rule identifiers
//! - [`Finding`] - One attributed risk with its evidence
//! - [`ColumnVerdict`] - One row of the index coverage table
//! - [`AnalysisReport`] - Complete analysis results

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::query::line_column;

/// Severity level of a finding.
///
/// Ordered from lowest to highest so that `max` implements escalation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Style only
    Low,
    /// Suboptimal: missing composite index, avoidable coercion (exit code 1)
    Medium,
    /// Significant degradation: client-side aggregation, Cartesian joins,
    /// N+1 (exit code 2)
    High,
    /// Outage, OOM or data-loss capable (exit code 2)
    Critical
}

impl Severity {
    /// One level up, saturating at Critical.
    pub fn raised(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High | Self::Critical => Self::Critical
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL")
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "info" => Ok(Self::Low),
            "medium" | "warning" | "warn" => Ok(Self::Medium),
            "high" | "error" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(format!("unknown severity '{}'", s))
        }
    }
}

/// Component that owns a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleCategory {
    Parse,
    Pattern,
    Index,
    Type,
    CallSite
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse => write!(f, "Parse"),
            Self::Pattern => write!(f, "Pattern"),
            Self::Index => write!(f, "Index"),
            Self::Type => write!(f, "Type"),
            Self::CallSite => write!(f, "CallSite")
        }
    }
}

/// Fixed rule identifiers. Serialized as their codes (`PATTERN001`, ...).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum RuleId {
    #[serde(rename = "CALL001")]
    UnboundedResult,
    #[serde(rename = "CALL002")]
    ClientSideAggregation,
    #[serde(rename = "CALL003")]
    QueryInLoop,
    #[serde(rename = "INDEX001")]
    UnindexedJoinColumn,
    #[serde(rename = "INDEX002")]
    UnindexedFilterColumn,
    #[serde(rename = "INDEX003")]
    CompositeIndexGap,
    #[serde(rename = "INDEX004")]
    UnverifiedColumn,
    #[serde(rename = "PARSE001")]
    UnanalyzableQuery,
    #[serde(rename = "PARSE002")]
    UnresolvedAlias,
    #[serde(rename = "PATTERN001")]
    MultiJoinCorrelatedSubquery,
    #[serde(rename = "PATTERN002")]
    AggregateWithNullableOr,
    #[serde(rename = "PATTERN003")]
    UnboundedInList,
    #[serde(rename = "PATTERN004")]
    CartesianJoin,
    #[serde(rename = "TYPE001")]
    TypeMismatch
}

impl RuleId {
    pub const ALL: [RuleId; 14] = [
        Self::UnboundedResult,
        Self::ClientSideAggregation,
        Self::QueryInLoop,
        Self::UnindexedJoinColumn,
        Self::UnindexedFilterColumn,
        Self::CompositeIndexGap,
        Self::UnverifiedColumn,
        Self::UnanalyzableQuery,
        Self::UnresolvedAlias,
        Self::MultiJoinCorrelatedSubquery,
        Self::AggregateWithNullableOr,
        Self::UnboundedInList,
        Self::CartesianJoin,
        Self::TypeMismatch
    ];

    pub fn code(self) -> &'static str {
        self.info().id
    }

    pub fn info(self) -> RuleInfo {
        let (id, name, severity, category) = match self {
            Self::UnboundedResult => (
                "CALL001",
                "Unbounded result set",
                Severity::Medium,
                RuleCategory::CallSite
            ),
            Self::ClientSideAggregation => (
                "CALL002",
                "Client-side aggregation",
                Severity::High,
                RuleCategory::CallSite
            ),
            Self::QueryInLoop => (
                "CALL003",
                "Query executed in a loop (N+1)",
                Severity::High,
                RuleCategory::CallSite
            ),
            Self::UnindexedJoinColumn => (
                "INDEX001",
                "Join column without index",
                Severity::High,
                RuleCategory::Index
            ),
            Self::UnindexedFilterColumn => (
                "INDEX002",
                "Filter column without index",
                Severity::Medium,
                RuleCategory::Index
            ),
            Self::CompositeIndexGap => (
                "INDEX003",
                "Composite index does not cover filter",
                Severity::Medium,
                RuleCategory::Index
            ),
            Self::UnverifiedColumn => (
                "INDEX004",
                "Column requires verification",
                Severity::Low,
                RuleCategory::Index
            ),
            Self::UnanalyzableQuery => (
                "PARSE001",
                "Unanalyzable query",
                Severity::Critical,
                RuleCategory::Parse
            ),
            Self::UnresolvedAlias => (
                "PARSE002",
                "Unresolved alias",
                Severity::Critical,
                RuleCategory::Parse
            ),
            Self::MultiJoinCorrelatedSubquery => (
                "PATTERN001",
                "Multi-join with correlated subqueries",
                Severity::High,
                RuleCategory::Pattern
            ),
            Self::AggregateWithNullableOr => (
                "PATTERN002",
                "Aggregate over OR / IS NULL filter",
                Severity::High,
                RuleCategory::Pattern
            ),
            Self::UnboundedInList => (
                "PATTERN003",
                "Unbounded IN list",
                Severity::High,
                RuleCategory::Pattern
            ),
            Self::CartesianJoin => (
                "PATTERN004",
                "Cartesian join",
                Severity::High,
                RuleCategory::Pattern
            ),
            Self::TypeMismatch => (
                "TYPE001",
                "Parameter type mismatch",
                Severity::Medium,
                RuleCategory::Type
            )
        };
        RuleInfo {
            rule: self,
            id,
            name,
            severity,
            category
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for RuleId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        Self::ALL
            .into_iter()
            .find(|r| r.code().eq_ignore_ascii_case(code))
            .ok_or_else(|| format!("unknown rule id '{}'", s))
    }
}

/// Metadata about a rule for identification and configuration.
#[derive(Debug, Clone)]
pub struct RuleInfo {
    pub rule:     RuleId,
    /// Rule code (e.g., "INDEX001")
    pub id:       &'static str,
    pub name:     &'static str,
    /// Default severity level
    pub severity: Severity,
    pub category: RuleCategory
}

/// Approximate position of a finding inside its query template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    /// Byte offset
    pub offset: usize,
    pub line:   usize,
    pub column: usize
}

impl Location {
    pub fn in_template(template: &str, offset: usize) -> Self {
        let (line, column) = line_column(template, offset);
        Self {
            offset,
            line,
            column
        }
    }
}

/// Table and column a finding points at.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EvidenceColumn {
    pub table:  String,
    pub column: String
}

/// A single attributed risk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub rule_id:    RuleId,
    pub rule_name:  String,
    pub severity:   Severity,
    pub category:   RuleCategory,
    pub query_id:   String,
    pub location:   Location,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tables:     Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns:    Vec<EvidenceColumn>,
    /// DAO method for call-site findings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller:     Option<String>,
    pub message:    String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Chunk sizes for splitting an oversized IN list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batches:    Option<Vec<usize>>,
    /// Severity the rule mandates regardless of overrides
    #[serde(skip)]
    pub floor:      Option<Severity>
}

impl Finding {
    pub fn new(rule: RuleId, query_id: &str, message: impl Into<String>) -> Self {
        let info = rule.info();
        Self {
            rule_id:    rule,
            rule_name:  info.name.to_string(),
            severity:   info.severity,
            category:   info.category,
            query_id:   query_id.to_string(),
            location:   Location::default(),
            tables:     Vec::new(),
            columns:    Vec::new(),
            caller:     None,
            message:    message.into(),
            suggestion: None,
            batches:    None,
            floor:      None
        }
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    pub fn with_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>
    {
        self.tables = tables.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_column(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.columns.push(EvidenceColumn {
            table:  table.into(),
            column: column.into()
        });
        self
    }

    pub fn with_caller(mut self, caller: Option<&str>) -> Self {
        self.caller = caller.map(str::to_string);
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_batches(mut self, batches: Vec<usize>) -> Self {
        self.batches = Some(batches);
        self
    }

    /// Mandate at least `severity` for this finding.
    pub fn escalate_to(mut self, severity: Severity) -> Self {
        self.floor = Some(self.floor.map_or(severity, |f| f.max(severity)));
        self
    }

    /// Identity used for deduplication: one finding per rule, query and
    /// subject (columns or caller).
    pub fn dedup_key(&self) -> (RuleId, &str, &[EvidenceColumn], Option<&str>) {
        (
            self.rule_id,
            self.query_id.as_str(),
            self.columns.as_slice(),
            self.caller.as_deref()
        )
    }
}

/// Role of a column reference in the coverage table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnRole {
    Join,
    Filter
}

/// Index coverage of a single column reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    Indexed { index_names: Vec<String> },
    NotIndexed,
    Unverified { reason: String }
}

impl Verdict {
    pub fn is_indexed(&self) -> bool {
        matches!(self, Self::Indexed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Indexed { .. } => "indexed",
            Self::NotIndexed => "not indexed",
            Self::Unverified { .. } => "requires verification"
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnVerdict {
    pub table:    String,
    pub alias:    String,
    pub column:   String,
    pub role:     ColumnRole,
    pub verdict:  Verdict,
    /// Subquery nesting level of the reference
    pub depth:    usize,
    #[serde(skip)]
    pub position: usize
}

/// Exhaustive verdict table for one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryCoverage {
    pub query_id: String,
    pub columns:  Vec<ColumnVerdict>
}

/// Complete analysis results.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub findings:         Vec<Finding>,
    pub coverage:         Vec<QueryCoverage>,
    /// Number of query definitions supplied
    pub queries_count:    usize,
    /// Number of enabled rules
    pub rules_count:      usize,
    /// The run deadline expired before every query was analyzed
    pub truncated:        bool,
    /// Queries not analyzed because of the deadline
    pub skipped:          usize,
    pub settings_version: u32
}

impl AnalysisReport {
    pub fn new(queries_count: usize, rules_count: usize, settings_version: u32) -> Self {
        Self {
            findings: Vec::new(),
            coverage: Vec::new(),
            queries_count,
            rules_count,
            truncated: false,
            skipped: 0,
            settings_version
        }
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == severity)
            .count()
    }

    pub fn highest_severity(&self) -> Option<Severity> {
        self.findings.iter().map(|f| f.severity).max()
    }
}

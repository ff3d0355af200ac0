//! Configuration loading and validation.
//!
//! Configuration is loaded from multiple sources with the following precedence
//! (highest to lowest):
//!
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. `.query-risk.toml` in current directory (or `--config PATH`)
//! 4. `~/.config/query-risk/config.toml`
//! 5. Default values
//!
//! The raw [`Config`] is then validated into an immutable [`AnalyzerSettings`]
//! that the analyzer receives at construction.
//!
//! # Configuration File Format
//!
//! ```toml
//! [analysis]
//! max_subquery_depth = 5
//! in_clause_size_limit = 1000
//! tables_requiring_extra_scrutiny = ["Order", "LoyaltyStampTransaction"]
//! nullable_guard = "date-columns"   # or "any-column"
//! deadline_ms = 30000
//!
//! [rules]
//! disabled = ["INDEX004"]
//!
//! [rules.severity]
//! CALL003 = "critical"
//! INDEX003 = "low"
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Description |
//! |----------|-------------|
//! | `QUERY_RISK_MAX_SUBQUERY_DEPTH` | Subquery nesting bound |
//! | `QUERY_RISK_IN_CLAUSE_LIMIT` | IN-list size limit |
//! | `QUERY_RISK_WATCHED_TABLES` | Comma-separated watched tables |
//! | `QUERY_RISK_DEADLINE_MS` | Per-run deadline in milliseconds |

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    env, fs,
    path::{Path, PathBuf},
    time::Duration
};

use compact_str::CompactString;
use serde::Deserialize;

use crate::{
    error::{AppResult, config_error},
    query::DEFAULT_MAX_SUBQUERY_DEPTH,
    rules::{RuleId, Severity}
};

/// Version stamped on every [`AnalyzerSettings`].
pub const CONFIG_VERSION: u32 = 1;

pub const DEFAULT_IN_CLAUSE_SIZE_LIMIT: usize = 1000;

const MAX_SUBQUERY_DEPTH_BOUND: usize = 64;

const LOCAL_CONFIG: &str = ".query-risk.toml";

/// Application configuration as written in files
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub rules:    RulesConfig
}

/// Analysis thresholds
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    #[serde(alias = "maxSubqueryDepth")]
    pub max_subquery_depth:              usize,
    #[serde(alias = "inClauseSizeLimit")]
    pub in_clause_size_limit:            usize,
    #[serde(alias = "tablesRequiringExtraScrutiny", alias = "watched_tables")]
    pub tables_requiring_extra_scrutiny: Vec<String>,
    #[serde(alias = "nullableGuard")]
    pub nullable_guard:                  NullableGuard,
    #[serde(alias = "deadlineMs")]
    pub deadline_ms:                     Option<u64>
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_subquery_depth:              DEFAULT_MAX_SUBQUERY_DEPTH,
            in_clause_size_limit:            DEFAULT_IN_CLAUSE_SIZE_LIMIT,
            tables_requiring_extra_scrutiny: Vec::new(),
            nullable_guard:                  NullableGuard::default(),
            deadline_ms:                     None
        }
    }
}

/// Which `col IS NULL OR col <range> ?x` pairings count as a deliberate
/// open-ended bound rather than an aggregate risk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NullableGuard {
    /// Only range comparisons on DATE columns (or DATE-typed parameters)
    #[default]
    DateColumns,
    /// Range comparisons on any column
    AnyColumn
}

/// Rules configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RulesConfig {
    /// Disabled rule IDs
    #[serde(default)]
    pub disabled: Vec<String>,
    /// Severity overrides (rule_id -> severity)
    #[serde(default, alias = "severityOverrides")]
    pub severity: HashMap<String, String>
}

impl Config {
    /// Load configuration from the default file locations and environment.
    pub fn load() -> AppResult<Self> {
        Self::load_from(None)
    }

    /// Load configuration, using `explicit` instead of `.query-risk.toml` when
    /// given.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. `explicit` or config file in current directory (.query-risk.toml)
    /// 3. Config file in home directory (~/.config/query-risk/config.toml)
    /// 4. Default values
    pub fn load_from(explicit: Option<&Path>) -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(home) = env::var_os("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("query-risk")
                .join("config.toml");
            if home_config.exists() {
                config = Self::from_file(&home_config)?;
            }
        }

        match explicit {
            Some(path) => config = Self::from_file(path)?,
            None => {
                let local_config = PathBuf::from(LOCAL_CONFIG);
                if local_config.exists() {
                    config = Self::from_file(&local_config)?;
                }
            }
        }

        config.apply_env_from(|key| env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> AppResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            config_error(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> AppResult<Self> {
        toml::from_str(content).map_err(|e| config_error(format!("Invalid config file: {}", e)))
    }

    /// Override values from `QUERY_RISK_*` variables supplied by `lookup`.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> AppResult<()> {
        if let Some(value) = lookup("QUERY_RISK_MAX_SUBQUERY_DEPTH") {
            self.analysis.max_subquery_depth = parse_number("QUERY_RISK_MAX_SUBQUERY_DEPTH", &value)?;
        }
        if let Some(value) = lookup("QUERY_RISK_IN_CLAUSE_LIMIT") {
            self.analysis.in_clause_size_limit = parse_number("QUERY_RISK_IN_CLAUSE_LIMIT", &value)?;
        }
        if let Some(value) = lookup("QUERY_RISK_WATCHED_TABLES") {
            self.analysis.tables_requiring_extra_scrutiny = value
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(value) = lookup("QUERY_RISK_DEADLINE_MS") {
            self.analysis.deadline_ms = Some(parse_number("QUERY_RISK_DEADLINE_MS", &value)?);
        }
        Ok(())
    }

    /// Validate into the immutable settings the analyzer runs with.
    ///
    /// # Errors
    ///
    /// Any out-of-range threshold, unknown rule id or unknown severity.
    pub fn settings(&self) -> AppResult<AnalyzerSettings> {
        let analysis = &self.analysis;
        if analysis.max_subquery_depth == 0 || analysis.max_subquery_depth > MAX_SUBQUERY_DEPTH_BOUND
        {
            return Err(config_error(format!(
                "max_subquery_depth must be between 1 and {}, got {}",
                MAX_SUBQUERY_DEPTH_BOUND, analysis.max_subquery_depth
            )));
        }
        if analysis.in_clause_size_limit == 0 {
            return Err(config_error("in_clause_size_limit must be greater than 0"));
        }
        if analysis.deadline_ms == Some(0) {
            return Err(config_error("deadline_ms must be greater than 0"));
        }

        let mut disabled_rules = BTreeSet::new();
        for id in &self.rules.disabled {
            disabled_rules.insert(id.parse::<RuleId>().map_err(config_error)?);
        }

        let mut severity_overrides = BTreeMap::new();
        for (id, severity) in &self.rules.severity {
            let rule = id.parse::<RuleId>().map_err(config_error)?;
            let severity = severity.parse::<Severity>().map_err(config_error)?;
            severity_overrides.insert(rule, severity);
        }

        Ok(AnalyzerSettings {
            version: CONFIG_VERSION,
            max_subquery_depth: analysis.max_subquery_depth,
            in_clause_size_limit: analysis.in_clause_size_limit,
            watched_tables: analysis
                .tables_requiring_extra_scrutiny
                .iter()
                .map(|t| CompactString::from(t.trim().to_ascii_lowercase()))
                .filter(|t| !t.is_empty())
                .collect(),
            nullable_guard: analysis.nullable_guard,
            deadline: analysis.deadline_ms.map(Duration::from_millis),
            disabled_rules,
            severity_overrides
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> AppResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| config_error(format!("{} must be a positive integer, got '{}'", key, value)))
}

/// Validated, immutable analyzer configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerSettings {
    pub version:              u32,
    pub max_subquery_depth:   usize,
    pub in_clause_size_limit: usize,
    /// Lowercase table names
    pub watched_tables:       BTreeSet<CompactString>,
    pub nullable_guard:       NullableGuard,
    pub deadline:             Option<Duration>,
    pub disabled_rules:       BTreeSet<RuleId>,
    pub severity_overrides:   BTreeMap<RuleId, Severity>
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            version:              CONFIG_VERSION,
            max_subquery_depth:   DEFAULT_MAX_SUBQUERY_DEPTH,
            in_clause_size_limit: DEFAULT_IN_CLAUSE_SIZE_LIMIT,
            watched_tables:       BTreeSet::new(),
            nullable_guard:       NullableGuard::default(),
            deadline:             None,
            disabled_rules:       BTreeSet::new(),
            severity_overrides:   BTreeMap::new()
        }
    }
}

impl AnalyzerSettings {
    pub fn is_watched(&self, table: &str) -> bool {
        self.watched_tables
            .contains(table.to_ascii_lowercase().as_str())
    }

    pub fn is_enabled(&self, rule: RuleId) -> bool {
        !self.disabled_rules.contains(&rule)
    }

    pub fn watch(mut self, tables: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        self.watched_tables.extend(
            tables
                .into_iter()
                .map(|t| CompactString::from(t.as_ref().to_ascii_lowercase()))
        );
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_file() {
        let config = Config::parse(
            r#"
            [analysis]
            maxSubqueryDepth = 3
            in_clause_size_limit = 500
            tables_requiring_extra_scrutiny = ["Order"]
            nullable_guard = "any-column"
            deadline_ms = 2000

            [rules]
            disabled = ["INDEX004"]

            [rules.severity]
            CALL003 = "critical"
            "#
        )
        .unwrap();
        let settings = config.settings().unwrap();
        assert_eq!(settings.max_subquery_depth, 3);
        assert_eq!(settings.in_clause_size_limit, 500);
        assert!(settings.is_watched("ORDER"));
        assert_eq!(settings.nullable_guard, NullableGuard::AnyColumn);
        assert_eq!(settings.deadline, Some(Duration::from_millis(2000)));
        assert!(!settings.is_enabled(RuleId::UnverifiedColumn));
        assert_eq!(
            settings.severity_overrides.get(&RuleId::QueryInLoop),
            Some(&Severity::Critical)
        );
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env_from(|key| match key {
                "QUERY_RISK_IN_CLAUSE_LIMIT" => Some("250".to_string()),
                "QUERY_RISK_WATCHED_TABLES" => Some("Order, Product ,".to_string()),
                _ => None
            })
            .unwrap();
        assert_eq!(config.analysis.in_clause_size_limit, 250);
        assert_eq!(
            config.analysis.tables_requiring_extra_scrutiny,
            vec!["Order", "Product"]
        );
        assert_eq!(config.analysis.max_subquery_depth, DEFAULT_MAX_SUBQUERY_DEPTH);
    }

    #[test]
    fn test_env_rejects_garbage() {
        let mut config = Config::default();
        let result = config.apply_env_from(|key| {
            (key == "QUERY_RISK_MAX_SUBQUERY_DEPTH").then(|| "deep".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_failures() {
        let mut config = Config::default();
        config.analysis.max_subquery_depth = 65;
        assert!(config.settings().is_err());

        let mut config = Config::default();
        config.analysis.in_clause_size_limit = 0;
        assert!(config.settings().is_err());

        let mut config = Config::default();
        config.rules.disabled.push("PERF001".to_string());
        assert!(config.settings().is_err());

        let mut config = Config::default();
        config
            .rules
            .severity
            .insert("TYPE001".to_string(), "severe".to_string());
        assert!(config.settings().is_err());
    }

    #[test]
    fn test_unknown_nullable_guard_is_rejected() {
        assert!(Config::parse("[analysis]\nnullable_guard = \"strings\"").is_err());
    }
}

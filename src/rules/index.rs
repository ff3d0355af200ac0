//! Index advisor: per-column coverage verdicts and composite index checks.

use std::collections::BTreeSet;

use compact_str::CompactString;
use indexmap::IndexMap;

use super::{
    QueryContext, Rule,
    types::{ColumnRole, ColumnVerdict, Finding, RuleId, RuleInfo, Severity, Verdict}
};
use crate::{
    catalog::{ColumnLookup, SchemaCatalog, ValueType},
    query::{ColumnRef, CompareOp, InOperand, Operand, Predicate, QueryModel}
};

/// Verdict for every column referenced by a join edge or a filter leaf, in
/// this query and all of its subqueries.
pub fn coverage_table(model: &QueryModel, catalog: &SchemaCatalog) -> Vec<ColumnVerdict> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for scope in model.scopes() {
        let mut push = |column: &ColumnRef, role: ColumnRole| {
            let key = (
                scope.depth,
                column.alias.clone(),
                column.column.to_ascii_lowercase(),
                role
            );
            if seen.insert(key) {
                out.push(ColumnVerdict {
                    table: column.table.to_string(),
                    alias: column.alias.to_string(),
                    column: column.column.to_string(),
                    role,
                    verdict: verdict(catalog, column),
                    depth: scope.depth,
                    position: column.position
                });
            }
        };
        for edge in &scope.joins {
            push(&edge.left, ColumnRole::Join);
            push(&edge.right, ColumnRole::Join);
        }
        let filters = scope.join_filters.iter().chain(scope.where_clause.as_ref());
        for predicate in filters {
            for leaf in predicate.leaves() {
                visit_leaf(leaf, &mut push);
            }
        }
    }
    out
}

fn visit_leaf(leaf: &Predicate, push: &mut impl FnMut(&ColumnRef, ColumnRole)) {
    match leaf {
        Predicate::Comparison {
            column,
            operand: Operand::Column(other),
            ..
        } => {
            let role = if column.alias != other.alias || column.correlated || other.correlated {
                ColumnRole::Join
            } else {
                ColumnRole::Filter
            };
            push(column, role);
            push(other, role);
        }
        Predicate::Comparison { column, .. } | Predicate::Null { column, .. } => {
            push(column, ColumnRole::Filter)
        }
        Predicate::In {
            column, operand, ..
        } => {
            push(column, ColumnRole::Filter);
            if let InOperand::List(items) = operand {
                for item in items {
                    if let Operand::Column(other) = item {
                        push(other, ColumnRole::Filter);
                    }
                }
            }
        }
        Predicate::Exists { .. } | Predicate::Logical { .. } => {}
    }
}

fn verdict(catalog: &SchemaCatalog, column: &ColumnRef) -> Verdict {
    match catalog.column_info(&column.table, &column.column) {
        ColumnLookup::Found(info) if info.indexed => Verdict::Indexed {
            index_names: info.index_names.iter().map(|n| n.to_string()).collect()
        },
        ColumnLookup::Found(_) => Verdict::NotIndexed,
        ColumnLookup::UnknownTable => Verdict::Unverified {
            reason: format!("table '{}' is not in the supplied metadata", column.table)
        },
        ColumnLookup::UnknownColumn => Verdict::Unverified {
            reason: format!(
                "column '{}' is not declared on '{}'",
                column.column, column.table
            )
        }
    }
}

fn index_statement(table: &str, columns: &[&str]) -> String {
    format!(
        "CREATE INDEX idx_{}_{} ON {} ({})",
        table.to_ascii_lowercase(),
        columns
            .iter()
            .map(|c| c.to_ascii_lowercase())
            .collect::<Vec<_>>()
            .join("_"),
        table,
        columns.join(", ")
    )
}

/// Not-indexed columns with the given role, one per table and column.
fn unindexed<'c>(ctx: &'c QueryContext<'_>, role: ColumnRole) -> Vec<&'c ColumnVerdict> {
    let mut seen = BTreeSet::new();
    ctx.coverage()
        .iter()
        .filter(|v| v.role == role && v.verdict == Verdict::NotIndexed)
        .filter(|v| {
            seen.insert((
                v.table.to_ascii_lowercase(),
                v.column.to_ascii_lowercase()
            ))
        })
        .collect()
}

/// Join column without a usable index
pub struct UnindexedJoinColumn;

impl Rule for UnindexedJoinColumn {
    fn info(&self) -> RuleInfo {
        RuleId::UnindexedJoinColumn.info()
    }

    fn check(&self, ctx: &QueryContext<'_>) -> Vec<Finding> {
        unindexed(ctx, ColumnRole::Join)
            .into_iter()
            .map(|v| {
                let finding = Finding::new(
                    RuleId::UnindexedJoinColumn,
                    ctx.id(),
                    format!(
                        "Join column {}.{} has no index; every joined row triggers a scan",
                        v.table, v.column
                    )
                )
                .at(ctx.location(v.position))
                .with_tables([v.table.as_str()])
                .with_column(&v.table, &v.column)
                .with_suggestion(index_statement(&v.table, &[v.column.as_str()]));
                if ctx.settings.is_watched(&v.table) {
                    finding.escalate_to(Severity::Critical)
                } else {
                    finding
                }
            })
            .collect()
    }
}

/// Filter column without a usable index
pub struct UnindexedFilterColumn;

impl Rule for UnindexedFilterColumn {
    fn info(&self) -> RuleInfo {
        RuleId::UnindexedFilterColumn.info()
    }

    fn check(&self, ctx: &QueryContext<'_>) -> Vec<Finding> {
        unindexed(ctx, ColumnRole::Filter)
            .into_iter()
            .map(|v| {
                let finding = Finding::new(
                    RuleId::UnindexedFilterColumn,
                    ctx.id(),
                    format!("Filter column {}.{} has no index", v.table, v.column)
                )
                .at(ctx.location(v.position))
                .with_tables([v.table.as_str()])
                .with_column(&v.table, &v.column)
                .with_suggestion(index_statement(&v.table, &[v.column.as_str()]));
                if ctx.settings.is_watched(&v.table) {
                    finding.escalate_to(Severity::High)
                } else {
                    finding
                }
            })
            .collect()
    }
}

/// Column whose table or declaration is outside the supplied metadata
pub struct UnverifiedColumn;

impl Rule for UnverifiedColumn {
    fn info(&self) -> RuleInfo {
        RuleId::UnverifiedColumn.info()
    }

    fn check(&self, ctx: &QueryContext<'_>) -> Vec<Finding> {
        let mut seen = BTreeSet::new();
        let mut findings = Vec::new();
        for v in ctx.coverage() {
            let Verdict::Unverified { reason } = &v.verdict else {
                continue;
            };
            if !seen.insert((
                v.table.to_ascii_lowercase(),
                v.column.to_ascii_lowercase()
            )) {
                continue;
            }
            findings.push(
                Finding::new(
                    RuleId::UnverifiedColumn,
                    ctx.id(),
                    format!("{}.{} requires verification: {}", v.table, v.column, reason)
                )
                .at(ctx.location(v.position))
                .with_tables([v.table.as_str()])
                .with_column(&v.table, &v.column)
                .with_suggestion(
                    "Confirm the column and its index against the platform type definitions"
                )
            );
        }
        findings
    }
}

/// Selectivity class used to order suggested composite index columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum FilterClass {
    Equality,
    Range,
    /// Enum and boolean filters go last
    LowCardinality
}

fn filter_class(leaf: &Predicate) -> Option<FilterClass> {
    match leaf {
        Predicate::Comparison {
            operand: Operand::Column(_),
            ..
        } => None,
        Predicate::Comparison { op, .. } if *op == CompareOp::Eq => Some(FilterClass::Equality),
        Predicate::Comparison { .. } => Some(FilterClass::Range),
        Predicate::In { negated, .. } | Predicate::Null { negated, .. } => Some(if *negated {
            FilterClass::Range
        } else {
            FilterClass::Equality
        }),
        Predicate::Exists { .. } | Predicate::Logical { .. } => None
    }
}

/// Composite index that only partially covers an AND-ed filter
pub struct CompositeIndexGap;

impl CompositeIndexGap {
    fn check_scope(&self, ctx: &QueryContext<'_>, scope: &QueryModel, out: &mut Vec<Finding>) {
        let Some(where_clause) = &scope.where_clause else {
            return;
        };
        let conjuncts = where_clause.conjuncts();
        if conjuncts.len() < 2 {
            return;
        }

        let mut by_alias: IndexMap<&str, Vec<(&ColumnRef, FilterClass)>> = IndexMap::new();
        for leaf in conjuncts {
            let (Some(column), Some(class)) = (leaf.column(), filter_class(leaf)) else {
                continue;
            };
            if column.correlated {
                continue;
            }
            let class = match ctx.declared_type(column) {
                Some(ValueType::Enum | ValueType::Boolean) => FilterClass::LowCardinality,
                _ => class
            };
            let entry = by_alias.entry(column.alias.as_str()).or_default();
            match entry
                .iter_mut()
                .find(|(c, _)| c.column.eq_ignore_ascii_case(&column.column))
            {
                Some(existing) => existing.1 = existing.1.min(class),
                None => entry.push((column, class))
            }
        }

        for columns in by_alias.into_values() {
            if columns.len() < 2 {
                continue;
            }
            let table = columns[0].0.table.as_str();
            let names: Vec<CompactString> = columns.iter().map(|(c, _)| c.column.clone()).collect();
            let candidates: Vec<_> = ctx
                .catalog
                .composite_indexes(table)
                .map(|index| (index, index.prefix_len(&names)))
                .filter(|(_, prefix)| *prefix > 0)
                .collect();
            if candidates.is_empty() || candidates.iter().any(|(_, p)| *p == names.len()) {
                continue;
            }
            let Some((partial, prefix)) = candidates.iter().max_by_key(|(_, p)| *p) else {
                continue;
            };

            let mut ordered = columns.clone();
            ordered.sort_by_key(|(_, class)| *class);
            let order: Vec<&str> = ordered.iter().map(|(c, _)| c.column.as_str()).collect();

            let mut finding = Finding::new(
                RuleId::CompositeIndexGap,
                ctx.id(),
                format!(
                    "Composite index {} covers {} of {} filtered columns on {}",
                    partial.name,
                    prefix,
                    names.len(),
                    table
                )
            )
            .at(ctx.location(columns[0].0.position))
            .with_tables([table])
            .with_suggestion(index_statement(table, &order));
            for column in order {
                finding = finding.with_column(table, column);
            }
            out.push(finding);
        }
    }
}

impl Rule for CompositeIndexGap {
    fn info(&self) -> RuleInfo {
        RuleId::CompositeIndexGap.info()
    }

    fn check(&self, ctx: &QueryContext<'_>) -> Vec<Finding> {
        let mut findings = Vec::new();
        for scope in ctx.model.scopes() {
            self.check_scope(ctx, scope, &mut findings);
        }
        findings
    }
}

//! Structural signatures matched against a query's shape.
//!
//! Every signature looks at the parsed [`QueryModel`] only, never at the
//! template text, and emits at most one finding per query.

use std::collections::BTreeMap;

use super::{
    QueryContext, Rule,
    types::{Finding, RuleId, RuleInfo, Severity}
};
use crate::{
    catalog::ValueType,
    config::NullableGuard,
    query::{
        ColumnRef, CompareOp, InOperand, Literal, LogicalOp, Operand, Predicate, QueryModel,
        SubqueryKind
    }
};

/// Leaf predicates at which a multi-join query starts to hurt.
const MIN_LEAVES_FOR_CORRELATED_JOIN: usize = 5;

/// Split `total` elements into chunks of at most `limit`.
///
/// ```
/// use query_risk_analyzer::rules::plan_batches;
///
/// assert_eq!(plan_batches(2500, 1000), vec![1000, 1000, 500]);
/// assert!(plan_batches(0, 1000).is_empty());
/// ```
pub fn plan_batches(total: usize, limit: usize) -> Vec<usize> {
    if limit == 0 {
        return vec![total];
    }
    (0..total)
        .step_by(limit)
        .map(|start| limit.min(total - start))
        .collect()
}

/// Two or more sources combined with correlated or aggregate subqueries
/// over a wide predicate tree
pub struct MultiJoinCorrelatedSubquery;

impl Rule for MultiJoinCorrelatedSubquery {
    fn info(&self) -> RuleInfo {
        RuleId::MultiJoinCorrelatedSubquery.info()
    }

    fn check(&self, ctx: &QueryContext<'_>) -> Vec<Finding> {
        let model = ctx.model;
        // comma-separated sources without an ON edge are PATTERN004's concern
        if model.table_count() < 2 || model.joins.is_empty() {
            return vec![];
        }
        let Some(trigger) = model.subqueries.iter().find(|sub| match sub.kind {
            SubqueryKind::Exists | SubqueryKind::NotExists => true,
            SubqueryKind::In | SubqueryKind::NotIn => sub.is_correlated(),
            SubqueryKind::Scalar => sub.is_scalar_aggregate()
        }) else {
            return vec![];
        };
        let leaves = model.where_leaf_count();
        if leaves < MIN_LEAVES_FOR_CORRELATED_JOIN {
            return vec![];
        }

        let subquery_count = model
            .subqueries
            .iter()
            .filter(|s| s.kind.is_semi_join() || s.is_scalar_aggregate())
            .count();
        let finding = Finding::new(
            RuleId::MultiJoinCorrelatedSubquery,
            ctx.id(),
            format!(
                "{}-table join with {} correlated/aggregate subquer{} over {} predicates; \
                 subqueries are re-evaluated per joined row",
                model.table_count(),
                subquery_count,
                if subquery_count == 1 { "y" } else { "ies" },
                leaves
            )
        )
        .at(ctx.location(trigger.position))
        .with_tables(model.sources.iter().map(|s| s.table.as_str()))
        .with_suggestion(
            "Rewrite EXISTS / IN subqueries as LEFT JOINs with IS NULL checks, or split the \
             query and pre-filter the driving table"
        );
        if ctx.touches_watched() {
            vec![finding.escalate_to(Severity::Critical)]
        } else {
            vec![finding]
        }
    }
}

/// Aggregate over a filter that ORs a column with its own IS NULL and has an
/// inequality elsewhere
pub struct AggregateWithNullableOr;

impl AggregateWithNullableOr {
    /// `(col <op> x OR col IS NULL)` where the comparison is an open-ended
    /// bound the guard accepts.
    fn is_guarded(
        ctx: &QueryContext<'_>,
        column: &ColumnRef,
        op: CompareOp,
        operand: &Operand
    ) -> bool {
        if !op.is_range() {
            return false;
        }
        match ctx.settings.nullable_guard {
            NullableGuard::AnyColumn => true,
            NullableGuard::DateColumns => {
                let bound: Vec<ValueType> = match operand {
                    Operand::Param(name) => ctx.bindings(name).map(|b| b.value_type).collect(),
                    _ => Vec::new()
                };
                match ctx.column_type(column) {
                    Some(ValueType::Date) => true,
                    Some(_) => bound.contains(&ValueType::Date),
                    // unverified column: only contrary evidence breaks the guard
                    None => {
                        let non_date_literal = matches!(
                            operand,
                            Operand::Literal(Literal::Number(_) | Literal::Boolean(_))
                        );
                        !non_date_literal && bound.iter().all(|t| *t == ValueType::Date)
                    }
                }
            }
        }
    }

    /// First unguarded OR node pairing a column's IS NULL with a comparison
    /// on the same column.
    fn nullable_or<'m>(
        ctx: &QueryContext<'_>,
        where_clause: &'m Predicate
    ) -> Option<(&'m Predicate, &'m ColumnRef)> {
        for node in where_clause.logical_nodes() {
            let Predicate::Logical {
                op: LogicalOp::Or,
                children
            } = node
            else {
                continue;
            };
            let nulls = children.iter().filter_map(|c| match c {
                Predicate::Null {
                    column,
                    negated: false
                } => Some(column),
                _ => None
            });
            for null_column in nulls {
                let comparisons: Vec<_> = children
                    .iter()
                    .filter_map(|c| match c {
                        Predicate::Comparison {
                            column,
                            op,
                            operand
                        } if same_column(column, null_column) => Some((column, *op, operand)),
                        _ => None
                    })
                    .collect();
                if comparisons.is_empty() {
                    continue;
                }
                if comparisons
                    .iter()
                    .all(|(column, op, operand)| Self::is_guarded(ctx, column, *op, operand))
                {
                    continue;
                }
                return Some((node, null_column));
            }
        }
        None
    }
}

fn same_column(a: &ColumnRef, b: &ColumnRef) -> bool {
    a.alias == b.alias && a.column.eq_ignore_ascii_case(&b.column)
}

fn has_inequality_outside(tree: &Predicate, excluded: &Predicate) -> bool {
    if std::ptr::eq(tree, excluded) {
        return false;
    }
    match tree {
        Predicate::Logical { children, .. } => {
            children.iter().any(|c| has_inequality_outside(c, excluded))
        }
        Predicate::Comparison { op, .. } => op.is_inequality(),
        _ => false
    }
}

impl Rule for AggregateWithNullableOr {
    fn info(&self) -> RuleInfo {
        RuleId::AggregateWithNullableOr.info()
    }

    fn check(&self, ctx: &QueryContext<'_>) -> Vec<Finding> {
        let model = ctx.model;
        if !model.has_aggregate() {
            return vec![];
        }
        let Some(where_clause) = &model.where_clause else {
            return vec![];
        };
        let Some((or_node, column)) = Self::nullable_or(ctx, where_clause) else {
            return vec![];
        };
        if !has_inequality_outside(where_clause, or_node) {
            return vec![];
        }
        vec![
            Finding::new(
                RuleId::AggregateWithNullableOr,
                ctx.id(),
                format!(
                    "Aggregate over a filter combining {} with its IS NULL branch and an \
                     inequality; the OR defeats index use and the aggregate scans every \
                     surviving row",
                    column
                )
            )
            .at(ctx.location(column.position))
            .with_tables([column.table.as_str()])
            .with_column(column.table.as_str(), column.column.as_str())
            .with_suggestion(format!(
                "Use COALESCE({}, <default>) or split into two aggregates combined with UNION ALL",
                column.qualified()
            ))
        ]
    }
}

/// IN list bound to a collection with no evident size cap
pub struct UnboundedInList;

/// Why an IN predicate is considered unbounded, with the element count when
/// known.
struct Unbounded<'m> {
    column: &'m ColumnRef,
    reason: String,
    total:  Option<usize>
}

impl UnboundedInList {
    fn classify<'m>(
        ctx: &QueryContext<'_>,
        column: &'m ColumnRef,
        operand: &InOperand
    ) -> Option<Unbounded<'m>> {
        let limit = ctx.settings.in_clause_size_limit;
        let InOperand::List(items) = operand else {
            return None;
        };
        let Some(param) = operand.lone_param() else {
            return (items.len() > limit).then(|| Unbounded {
                column,
                reason: format!("literal list of {} elements exceeds {}", items.len(), limit),
                total: Some(items.len())
            });
        };

        let bindings: Vec<_> = ctx.bindings(param).collect();
        if bindings.is_empty() {
            return Some(Unbounded {
                column,
                reason: format!("?{} has no recorded producer or size cap", param),
                total: None
            });
        }
        let collections: Vec<_> = bindings.iter().filter_map(|b| b.collection).collect();
        if collections.is_empty() {
            return None;
        }
        let total = collections.iter().filter_map(|c| c.size.or(c.max_size)).max();
        let uncapped = collections.iter().any(|c| match c.max_size {
            Some(cap) => cap > limit,
            None => true
        });
        let oversized = total.is_some_and(|t| t > limit);
        if !uncapped && !oversized {
            return None;
        }
        let reason = match total {
            Some(t) if t > limit => format!("?{} carries {} elements, limit is {}", param, t, limit),
            _ => format!("?{} is bound to a collection without a size cap", param)
        };
        Some(Unbounded {
            column,
            reason,
            total
        })
    }
}

impl Rule for UnboundedInList {
    fn info(&self) -> RuleInfo {
        RuleId::UnboundedInList.info()
    }

    fn check(&self, ctx: &QueryContext<'_>) -> Vec<Finding> {
        let limit = ctx.settings.in_clause_size_limit;
        let hit = ctx.model.scopes().into_iter().find_map(|scope| {
            scope
                .where_clause
                .iter()
                .chain(scope.join_filters.iter())
                .flat_map(|p| p.leaves())
                .find_map(|leaf| match leaf {
                    Predicate::In {
                        column, operand, ..
                    } => Self::classify(ctx, column, operand),
                    _ => None
                })
        });
        let Some(hit) = hit else {
            return vec![];
        };

        let mut finding = Finding::new(
            RuleId::UnboundedInList,
            ctx.id(),
            format!("Unbounded IN list on {}: {}", hit.column, hit.reason)
        )
        .at(ctx.location(hit.column.position))
        .with_tables([hit.column.table.as_str()])
        .with_column(hit.column.table.as_str(), hit.column.column.as_str());
        finding = match hit.total {
            Some(total) => {
                let batches = plan_batches(total, limit);
                finding
                    .with_suggestion(format!(
                        "Execute in {} batches of at most {} elements and merge the results",
                        batches.len(),
                        limit
                    ))
                    .with_batches(batches)
            }
            None => finding.with_suggestion(format!(
                "Cap the collection or execute in batches of at most {} elements",
                limit
            ))
        };
        vec![finding]
    }
}

/// Joined source with no join condition linking it to the rest
pub struct CartesianJoin;

impl CartesianJoin {
    /// Sources not connected to the first one through join edges or
    /// column-to-column equalities.
    fn disconnected(scope: &QueryModel) -> Vec<&str> {
        if scope.table_count() < 2 {
            return vec![];
        }
        const OUTER: &str = "";
        let mut groups = DisjointSet::default();
        for source in &scope.sources {
            groups.add(source.alias.as_str());
        }
        let mut pairs: Vec<(&ColumnRef, &ColumnRef)> =
            scope.joins.iter().map(|e| (&e.left, &e.right)).collect();
        let filters = scope.where_clause.iter().chain(scope.join_filters.iter());
        for conjunct in filters.flat_map(|p| p.conjuncts()) {
            if let Predicate::Comparison {
                column,
                op: CompareOp::Eq,
                operand: Operand::Column(other)
            } = conjunct
            {
                pairs.push((column, other));
            }
        }
        for (a, b) in pairs {
            let left = if a.correlated { OUTER } else { a.alias.as_str() };
            let right = if b.correlated { OUTER } else { b.alias.as_str() };
            groups.union(left, right);
        }
        let root = groups.find(scope.sources[0].alias.as_str());
        scope
            .sources
            .iter()
            .skip(1)
            .filter(|s| groups.find(s.alias.as_str()) != root)
            .map(|s| s.table.as_str())
            .collect()
    }
}

#[derive(Default)]
struct DisjointSet<'a> {
    parent: BTreeMap<&'a str, &'a str>
}

impl<'a> DisjointSet<'a> {
    fn add(&mut self, key: &'a str) {
        self.parent.entry(key).or_insert(key);
    }

    fn find(&mut self, key: &'a str) -> &'a str {
        let mut current = key;
        while let Some(&parent) = self.parent.get(current) {
            if parent == current {
                break;
            }
            current = parent;
        }
        current
    }

    fn union(&mut self, a: &'a str, b: &'a str) {
        self.add(a);
        self.add(b);
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent.insert(rb, ra);
        }
    }
}

impl Rule for CartesianJoin {
    fn info(&self) -> RuleInfo {
        RuleId::CartesianJoin.info()
    }

    fn check(&self, ctx: &QueryContext<'_>) -> Vec<Finding> {
        let Some((scope, tables)) = ctx
            .model
            .scopes()
            .into_iter()
            .map(|scope| (scope, Self::disconnected(scope)))
            .find(|(_, tables)| !tables.is_empty())
        else {
            return vec![];
        };
        let position = scope
            .sources
            .iter()
            .find(|s| s.table.as_str() == tables[0])
            .map(|s| s.position)
            .unwrap_or(0);
        vec![
            Finding::new(
                RuleId::CartesianJoin,
                ctx.id(),
                format!(
                    "{} joined without a join condition; the result is a cross product",
                    tables.join(", ")
                )
            )
            .at(ctx.location(position))
            .with_tables(tables.iter().copied())
            .with_suggestion("Add an ON condition linking the source to the rest of the FROM clause")
        ]
    }
}

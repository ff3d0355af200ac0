use super::{
    QueryContext, Rule,
    types::{Finding, RuleId, RuleInfo, Severity}
};
use crate::corpus::{ConsumerShape, InvocationContext};

/// Tables (base included) at which an uncapped multi-row result is
/// outage-capable.
const CRITICAL_TABLE_COUNT: usize = 3;

/// Multi-row result without LIMIT or caller-side cap
pub struct UnboundedResult;

impl Rule for UnboundedResult {
    fn info(&self) -> RuleInfo {
        RuleId::UnboundedResult.info()
    }

    fn check(&self, ctx: &QueryContext<'_>) -> Vec<Finding> {
        let model = ctx.model;
        if model.has_limit || model.is_pure_aggregate() {
            return vec![];
        }
        let tables = model.table_count();
        ctx.call_sites
            .iter()
            .filter(|site| !site.cap_applied && site.consumer_shape != ConsumerShape::SingleEntity)
            .map(|site| {
                let finding = Finding::new(
                    RuleId::UnboundedResult,
                    ctx.id(),
                    format!(
                        "{}-table query returns every matching row: no LIMIT and no row cap at \
                         the call site",
                        tables
                    )
                )
                .at(ctx.location(0))
                .with_tables(model.sources.iter().map(|s| s.table.as_str()))
                .with_caller(site.caller.as_deref())
                .with_suggestion(
                    "Apply a row cap (setCount / LIMIT) or page through the result with a \
                     keyset condition"
                );
                if tables >= CRITICAL_TABLE_COUNT {
                    finding.escalate_to(Severity::Critical)
                } else {
                    finding
                }
            })
            .collect()
    }
}

/// Raw rows grouped, summed, counted or de-duplicated by the caller
pub struct ClientSideAggregation;

impl Rule for ClientSideAggregation {
    fn info(&self) -> RuleInfo {
        RuleId::ClientSideAggregation.info()
    }

    fn check(&self, ctx: &QueryContext<'_>) -> Vec<Finding> {
        let model = ctx.model;
        if model.has_aggregate() || !model.group_by.is_empty() {
            return vec![];
        }
        ctx.call_sites
            .iter()
            .filter(|site| site.consumer_shape == ConsumerShape::Aggregated)
            .map(|site| {
                Finding::new(
                    RuleId::ClientSideAggregation,
                    ctx.id(),
                    "Raw rows are transferred and aggregated in application code"
                )
                .at(ctx.location(0))
                .with_tables(model.sources.iter().map(|s| s.table.as_str()))
                .with_caller(site.caller.as_deref())
                .with_suggestion(
                    "Move the grouping into the query (GROUP BY with COUNT/SUM) and return \
                     one row per group"
                )
            })
            .collect()
    }
}

/// Query executed once per element of an enclosing loop (N+1)
pub struct QueryInLoop;

impl Rule for QueryInLoop {
    fn info(&self) -> RuleInfo {
        RuleId::QueryInLoop.info()
    }

    fn check(&self, ctx: &QueryContext<'_>) -> Vec<Finding> {
        ctx.call_sites
            .iter()
            .filter(|site| site.invocation_context == InvocationContext::Loop)
            .map(|site| {
                Finding::new(
                    RuleId::QueryInLoop,
                    ctx.id(),
                    "Query is executed inside a loop, one round trip per iteration"
                )
                .at(ctx.location(0))
                .with_tables(ctx.model.sources.iter().map(|s| s.table.as_str()))
                .with_caller(site.caller.as_deref())
                .with_suggestion(
                    "Collect the loop keys and run one query with a batched IN list"
                )
            })
            .collect()
    }
}

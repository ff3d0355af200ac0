//! Templated query parsing.
//!
//! Turns a query template into a [`QueryModel`]: sources with aliases, join
//! edges, the WHERE predicate tree, projection, ordering, limit presence and
//! nested subqueries (each itself a [`QueryModel`]).
//!
//! # Example
//!
//! ```
//! use query_risk_analyzer::query::{AliasMap, parse_query};
//!
//! let model = parse_query(
//!     "SELECT {p.pk} FROM {Promotion AS p JOIN Bucket AS b ON {b.promotion} = {p.pk}} \
//!      WHERE {p.code} = ?code",
//!     &AliasMap::new(),
//!     5
//! )
//! .unwrap();
//!
//! assert_eq!(model.table_count(), 2);
//! assert_eq!(model.joins.len(), 1);
//! assert_eq!(model.joins[0].right.table, "Promotion");
//! ```

mod error;
mod lexer;
mod parser;
mod resolve;
mod types;

pub use error::{ParseError, line_column};
pub use types::{
    AggregateFn, AliasMap, ColumnRef, CompareOp, InOperand, JoinEdge, JoinKind, Literal,
    LogicalOp, Operand, OrderItem, Predicate, Projection, QueryModel, Subquery, SubqueryKind,
    TableSource
};

/// Default bound on `{{ }}` nesting.
pub const DEFAULT_MAX_SUBQUERY_DEPTH: usize = 5;

/// Parse and resolve one query template.
///
/// `declared` holds aliases supplied with the query definition; a template
/// alias that points at a different type is an alias error.
///
/// # Errors
///
/// Malformed text, subquery nesting beyond `max_depth` and unresolvable
/// aliases are reported as [`ParseError`].
pub fn parse_query(
    template: &str,
    declared: &AliasMap,
    max_depth: usize
) -> Result<QueryModel, ParseError> {
    let tokens = lexer::tokenize(template)?;
    let mut parser = parser::Parser::new(tokens, max_depth, template.len());
    let mut model = parser.parse_statement()?;
    resolve::resolve(&mut model, declared)?;
    Ok(model)
}

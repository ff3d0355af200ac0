use std::fmt;

use compact_str::CompactString;
use indexmap::IndexMap;
use serde::Serialize;
use smallvec::SmallVec;

/// Alias scope: lowercase alias → declared table name.
pub type AliasMap = IndexMap<CompactString, CompactString>;

/// Reference to `{alias.column}` inside a template.
///
/// `table` is empty until the alias resolver has run; after a successful
/// parse every reference in a [`QueryModel`] is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnRef {
    /// Lowercase alias; empty for an unqualified `{column}` before resolution
    pub alias:      CompactString,
    pub column:     CompactString,
    pub table:      CompactString,
    /// Resolved against an enclosing query's scope
    pub correlated: bool,
    /// Byte offset in the template
    pub position:   usize
}

impl ColumnRef {
    pub fn new(alias: Option<&str>, column: &str, position: usize) -> Self {
        Self {
            alias: alias.map(|a| a.to_ascii_lowercase().into()).unwrap_or_default(),
            column: column.into(),
            table: CompactString::default(),
            correlated: false,
            position
        }
    }

    pub fn is_resolved(&self) -> bool {
        !self.table.is_empty()
    }

    /// `alias.column` as written after resolution.
    pub fn qualified(&self) -> String {
        if self.alias.is_empty() {
            self.column.to_string()
        } else {
            format!("{}.{}", self.alias, self.column)
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.qualified())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JoinKind {
    /// First source of a FROM clause
    Base,
    Inner,
    Left,
    Right,
    Cross
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSource {
    pub table:    CompactString,
    /// Lowercase alias (the table name when none is declared)
    pub alias:    CompactString,
    pub join:     JoinKind,
    pub position: usize
}

/// Column-to-column equality taken from a JOIN ... ON condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinEdge {
    pub left:  ColumnRef,
    pub right: ColumnRef,
    pub kind:  JoinKind
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
    NotLike
}

impl CompareOp {
    pub fn is_range(self) -> bool {
        matches!(self, Self::Lt | Self::LtEq | Self::Gt | Self::GtEq)
    }

    pub fn is_inequality(self) -> bool {
        matches!(self, Self::NotEq)
    }

    /// Operator with both operands swapped.
    pub fn flipped(self) -> Option<Self> {
        match self {
            Self::Eq | Self::NotEq => Some(self),
            Self::Lt => Some(Self::Gt),
            Self::LtEq => Some(Self::GtEq),
            Self::Gt => Some(Self::Lt),
            Self::GtEq => Some(Self::LtEq),
            Self::Like | Self::NotLike => None
        }
    }

    /// Logical complement, used to push `NOT` down to the leaves.
    pub fn negated(self) -> Self {
        match self {
            Self::Eq => Self::NotEq,
            Self::NotEq => Self::Eq,
            Self::Lt => Self::GtEq,
            Self::LtEq => Self::Gt,
            Self::Gt => Self::LtEq,
            Self::GtEq => Self::Lt,
            Self::Like => Self::NotLike,
            Self::NotLike => Self::Like
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE"
        };
        f.write_str(op)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Literal {
    Number(CompactString),
    String(String),
    Boolean(bool),
    Null
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Operand {
    Param(CompactString),
    Literal(Literal),
    Column(ColumnRef),
    /// Index into [`QueryModel::subqueries`]
    Subquery(usize),
    /// Function call or keyword value such as `CURRENT_DATE`
    Expression
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum InOperand {
    /// Parenthesised list of literals and/or scalar parameters
    List(Vec<Operand>),
    Subquery(usize)
}

impl InOperand {
    /// The parameter name when the list is a single `?param`, which binds a
    /// whole collection.
    pub fn lone_param(&self) -> Option<&str> {
        match self {
            Self::List(items) if items.len() == 1 => match &items[0] {
                Operand::Param(name) => Some(name.as_str()),
                _ => None
            },
            _ => None
        }
    }

    pub fn params(&self) -> SmallVec<[&str; 4]> {
        match self {
            Self::List(items) => items
                .iter()
                .filter_map(|o| match o {
                    Operand::Param(name) => Some(name.as_str()),
                    _ => None
                })
                .collect(),
            Self::Subquery(_) => SmallVec::new()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogicalOp {
    And,
    Or
}

/// WHERE / ON predicate tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Predicate {
    Comparison {
        column:  ColumnRef,
        op:      CompareOp,
        operand: Operand
    },
    Logical {
        op:       LogicalOp,
        children: Vec<Predicate>
    },
    Null {
        column:  ColumnRef,
        negated: bool
    },
    In {
        column:   ColumnRef,
        negated:  bool,
        operand:  InOperand,
        position: usize
    },
    Exists {
        negated:  bool,
        subquery: usize
    }
}

impl Predicate {
    pub fn is_leaf(&self) -> bool {
        !matches!(self, Self::Logical { .. })
    }

    /// Leaf predicates of this tree, depth first.
    pub fn leaves(&self) -> Vec<&Predicate> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Predicate>) {
        match self {
            Self::Logical { children, .. } => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
            leaf => out.push(leaf)
        }
    }

    /// Children of a top-level AND, or the predicate itself.
    pub fn conjuncts(&self) -> Vec<&Predicate> {
        match self {
            Self::Logical {
                op: LogicalOp::And,
                children
            } => children.iter().collect(),
            other => vec![other]
        }
    }

    pub fn into_conjuncts(self) -> Vec<Predicate> {
        match self {
            Self::Logical {
                op: LogicalOp::And,
                children
            } => children,
            other => vec![other]
        }
    }

    /// Every logical node (including `self`), depth first.
    pub fn logical_nodes(&self) -> Vec<&Predicate> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if let Self::Logical { children, .. } = node {
                out.push(node);
                stack.extend(children.iter().rev());
            }
        }
        out
    }

    /// Column the leaf constrains, when it has one.
    pub fn column(&self) -> Option<&ColumnRef> {
        match self {
            Self::Comparison { column, .. } | Self::Null { column, .. } | Self::In { column, .. } => {
                Some(column)
            }
            _ => None
        }
    }

    /// Push a `NOT` down to the leaves (De Morgan).
    pub fn negate(self) -> Self {
        match self {
            Self::Comparison {
                column,
                op,
                operand
            } => Self::Comparison {
                column,
                op: op.negated(),
                operand
            },
            Self::Logical { op, children } => Self::Logical {
                op:       match op {
                    LogicalOp::And => LogicalOp::Or,
                    LogicalOp::Or => LogicalOp::And
                },
                children: children.into_iter().map(Self::negate).collect()
            },
            Self::Null { column, negated } => Self::Null {
                column,
                negated: !negated
            },
            Self::In {
                column,
                negated,
                operand,
                position
            } => Self::In {
                column,
                negated: !negated,
                operand,
                position
            },
            Self::Exists { negated, subquery } => Self::Exists {
                negated: !negated,
                subquery
            }
        }
    }

    pub(crate) fn for_each_ref_mut<E>(
        &mut self,
        f: &mut impl FnMut(&mut ColumnRef) -> Result<(), E>
    ) -> Result<(), E> {
        match self {
            Self::Comparison {
                column, operand, ..
            } => {
                f(column)?;
                if let Operand::Column(other) = operand {
                    f(other)?;
                }
            }
            Self::Logical { children, .. } => {
                for child in children {
                    child.for_each_ref_mut(f)?;
                }
            }
            Self::Null { column, .. } => f(column)?,
            Self::In {
                column, operand, ..
            } => {
                f(column)?;
                if let InOperand::List(items) = operand {
                    for item in items {
                        if let Operand::Column(other) = item {
                            f(other)?;
                        }
                    }
                }
            }
            Self::Exists { .. } => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max
}

impl AggregateFn {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "COUNT" => Some(Self::Count),
            "SUM" => Some(Self::Sum),
            "AVG" => Some(Self::Avg),
            "MIN" => Some(Self::Min),
            "MAX" => Some(Self::Max),
            _ => None
        }
    }
}

impl fmt::Display for AggregateFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX"
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Projection {
    Star,
    Column(ColumnRef),
    Aggregate {
        function: AggregateFn,
        /// `None` for `COUNT(*)` or non-column arguments
        column:   Option<ColumnRef>,
        distinct: bool
    },
    Subquery(usize),
    /// Literal, parameter or non-aggregate function
    Expression
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderItem {
    pub column:     ColumnRef,
    pub descending: bool
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SubqueryKind {
    Scalar,
    Exists,
    NotExists,
    In,
    NotIn
}

impl SubqueryKind {
    /// EXISTS-like: explicit EXISTS, or an IN subquery acting as a semi-join.
    pub fn is_semi_join(self) -> bool {
        !matches!(self, Self::Scalar)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subquery {
    pub kind:         SubqueryKind,
    pub model:        QueryModel,
    /// References into an enclosing scope
    pub correlations: Vec<ColumnRef>,
    pub position:     usize
}

impl Subquery {
    pub fn is_correlated(&self) -> bool {
        !self.correlations.is_empty()
    }

    pub fn is_scalar_aggregate(&self) -> bool {
        self.kind == SubqueryKind::Scalar && self.model.has_aggregate()
    }
}

/// Parsed representation of one query definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryModel {
    pub aliases:      AliasMap,
    pub sources:      Vec<TableSource>,
    pub joins:        Vec<JoinEdge>,
    /// Non-equality ON conditions
    pub join_filters: Vec<Predicate>,
    pub where_clause: Option<Predicate>,
    pub having:       Option<Predicate>,
    pub projection:   Vec<Projection>,
    pub distinct:     bool,
    pub group_by:     Vec<ColumnRef>,
    pub order_by:     Vec<OrderItem>,
    pub has_limit:    bool,
    pub subqueries:   Vec<Subquery>,
    /// Nesting level, 0 for the outermost query
    pub depth:        usize
}

impl QueryModel {
    /// Number of FROM sources, base table included.
    pub fn table_count(&self) -> usize {
        self.sources.len()
    }

    pub fn join_count(&self) -> usize {
        self.sources.len().saturating_sub(1)
    }

    pub fn has_aggregate(&self) -> bool {
        self.projection
            .iter()
            .any(|p| matches!(p, Projection::Aggregate { .. }))
    }

    /// Single-row result: only aggregates projected and no GROUP BY.
    pub fn is_pure_aggregate(&self) -> bool {
        !self.projection.is_empty()
            && self.group_by.is_empty()
            && self
                .projection
                .iter()
                .all(|p| matches!(p, Projection::Aggregate { .. }))
    }

    /// Number of WHERE leaves (subquery internals excluded).
    pub fn where_leaf_count(&self) -> usize {
        self.where_clause
            .as_ref()
            .map(|w| w.leaves().len())
            .unwrap_or(0)
    }

    /// Tables referenced by this query and all nested subqueries.
    pub fn all_tables(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.sources.iter().map(|s| s.table.as_str()).collect();
        for sub in &self.subqueries {
            out.extend(sub.model.all_tables());
        }
        out
    }

    /// This model followed by every nested subquery model, depth first.
    pub fn scopes(&self) -> Vec<&QueryModel> {
        let mut out = vec![self];
        for sub in &self.subqueries {
            out.extend(sub.model.scopes());
        }
        out
    }

    pub fn table_for_alias(&self, alias: &str) -> Option<&str> {
        self.aliases
            .get(alias.to_ascii_lowercase().as_str())
            .map(|t| t.as_str())
    }

    /// Visit every column reference owned by this model, excluding those
    /// inside subqueries.
    pub(crate) fn for_each_ref_mut<E>(
        &mut self,
        f: &mut impl FnMut(&mut ColumnRef) -> Result<(), E>
    ) -> Result<(), E> {
        for item in &mut self.projection {
            match item {
                Projection::Column(column) => f(column)?,
                Projection::Aggregate {
                    column: Some(column),
                    ..
                } => f(column)?,
                _ => {}
            }
        }
        for edge in &mut self.joins {
            f(&mut edge.left)?;
            f(&mut edge.right)?;
        }
        for filter in &mut self.join_filters {
            filter.for_each_ref_mut(f)?;
        }
        if let Some(predicate) = &mut self.where_clause {
            predicate.for_each_ref_mut(f)?;
        }
        if let Some(predicate) = &mut self.having {
            predicate.for_each_ref_mut(f)?;
        }
        for column in &mut self.group_by {
            f(column)?;
        }
        for item in &mut self.order_by {
            f(&mut item.column)?;
        }
        Ok(())
    }
}

use compact_str::CompactString;

use super::{
    error::ParseError,
    lexer::{Token, TokenKind},
    types::{
        AggregateFn, ColumnRef, CompareOp, InOperand, JoinEdge, JoinKind, Literal, LogicalOp,
        Operand, OrderItem, Predicate, Projection, QueryModel, Subquery, SubqueryKind,
        TableSource
    }
};

/// Parenthesis nesting guard, independent of the subquery depth limit.
const MAX_GROUP_NESTING: usize = 128;

const RESERVED: &[&str] = &[
    "SELECT", "FROM", "WHERE", "AND", "OR", "NOT", "IN", "IS", "NULL", "EXISTS", "JOIN", "LEFT",
    "RIGHT", "INNER", "OUTER", "CROSS", "FULL", "ON", "AS", "GROUP", "BY", "ORDER", "HAVING",
    "LIMIT", "OFFSET", "UNION", "ASC", "DESC", "LIKE", "BETWEEN", "DISTINCT", "ALL"
];

fn is_reserved(word: &str) -> bool {
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(word))
}

/// Intermediate expression form; only what the model needs survives.
#[derive(Debug, Clone)]
enum Expr {
    Column(ColumnRef),
    Param(CompactString),
    Literal(Literal),
    Subquery(usize),
    Aggregate {
        function: AggregateFn,
        column:   Option<ColumnRef>,
        distinct: bool
    },
    /// Function call or arithmetic; keeps the first column argument
    Computed(Option<ColumnRef>),
    Keyword
}

impl Expr {
    fn column(&self) -> Option<&ColumnRef> {
        match self {
            Self::Column(c) => Some(c),
            Self::Aggregate { column, .. } | Self::Computed(column) => column.as_ref(),
            _ => None
        }
    }

    fn into_column(self) -> Option<ColumnRef> {
        match self {
            Self::Column(c) => Some(c),
            Self::Aggregate { column, .. } | Self::Computed(column) => column,
            _ => None
        }
    }

    fn into_operand(self) -> Operand {
        match self {
            Self::Column(c) => Operand::Column(c),
            Self::Param(p) => Operand::Param(p),
            Self::Literal(l) => Operand::Literal(l),
            Self::Subquery(i) => Operand::Subquery(i),
            _ => Operand::Expression
        }
    }
}

pub(super) struct Parser {
    tokens:    Vec<Token>,
    pos:       usize,
    max_depth: usize,
    end:       usize,
    nesting:   usize
}

impl Parser {
    pub(super) fn new(tokens: Vec<Token>, max_depth: usize, end: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            max_depth,
            end,
            nesting: 0
        }
    }

    /// Parse a complete statement: one SELECT and an optional `;`.
    pub(super) fn parse_statement(&mut self) -> Result<QueryModel, ParseError> {
        let model = self.parse_select(0)?;
        while self.eat(&TokenKind::Semicolon) {}
        match self.peek() {
            None => Ok(model),
            Some(_) => Err(self.expected("end of query"))
        }
    }

    // token cursor

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn peek_kind_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn position(&self) -> usize {
        self.peek().map(|t| t.position).unwrap_or(self.end)
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        self.peek_kind().is_some_and(|k| k.is_keyword(keyword))
    }

    fn at_keyword_at(&self, offset: usize, keyword: &str) -> bool {
        self.peek_kind_at(offset)
            .is_some_and(|k| k.is_keyword(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.at_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<usize, ParseError> {
        let position = self.position();
        if self.eat_keyword(keyword) {
            Ok(position)
        } else {
            Err(self.expected(keyword))
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<usize, ParseError> {
        let position = self.position();
        if self.eat(kind) {
            Ok(position)
        } else {
            Err(self.expected(&kind.to_string()))
        }
    }

    fn expected(&self, expected: &str) -> ParseError {
        match self.peek() {
            Some(token) => ParseError::UnexpectedToken {
                expected: expected.to_string(),
                found:    token.kind.to_string(),
                position: token.position
            },
            None => ParseError::UnexpectedEnd {
                expected: expected.to_string(),
                position: self.end
            }
        }
    }

    fn enter_group(&mut self) -> Result<(), ParseError> {
        self.nesting += 1;
        if self.nesting > MAX_GROUP_NESTING {
            return Err(ParseError::Unsupported {
                construct: format!("more than {} nested parentheses", MAX_GROUP_NESTING),
                position:  self.position()
            });
        }
        Ok(())
    }

    fn leave_group(&mut self) {
        self.nesting = self.nesting.saturating_sub(1);
    }

    // statements

    fn parse_select(&mut self, depth: usize) -> Result<QueryModel, ParseError> {
        self.expect_keyword("SELECT")?;
        let mut model = QueryModel {
            depth,
            ..Default::default()
        };
        model.distinct = self.eat_keyword("DISTINCT");
        if !model.distinct {
            self.eat_keyword("ALL");
        }
        let projection = self.parse_projection(&mut model, depth)?;
        model.projection = projection;

        self.expect_keyword("FROM")?;
        self.parse_from(&mut model, depth)?;

        if self.eat_keyword("WHERE") {
            model.where_clause = Some(self.parse_or(&mut model, depth)?);
        }
        if self.eat_keyword("GROUP") {
            self.expect_keyword("BY")?;
            loop {
                if let Some(column) = self.parse_expr(&mut model, depth)?.into_column() {
                    model.group_by.push(column);
                }
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        if self.eat_keyword("HAVING") {
            model.having = Some(self.parse_or(&mut model, depth)?);
        }
        if self.eat_keyword("ORDER") {
            self.expect_keyword("BY")?;
            loop {
                let expr = self.parse_expr(&mut model, depth)?;
                let descending = if self.eat_keyword("DESC") {
                    true
                } else {
                    self.eat_keyword("ASC");
                    false
                };
                if self.eat_keyword("NULLS") && !self.eat_keyword("FIRST") {
                    self.expect_keyword("LAST")?;
                }
                if let Some(column) = expr.into_column() {
                    model.order_by.push(OrderItem { column, descending });
                }
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        if self.eat_keyword("LIMIT") {
            self.parse_row_count()?;
            model.has_limit = true;
            if self.eat(&TokenKind::Comma) {
                self.parse_row_count()?;
            }
        }
        if self.eat_keyword("OFFSET") {
            self.parse_row_count()?;
            self.eat_keyword("ROWS");
        }
        if self.at_keyword("UNION") {
            return Err(ParseError::Unsupported {
                construct: "UNION".into(),
                position:  self.position()
            });
        }
        Ok(model)
    }

    fn parse_row_count(&mut self) -> Result<(), ParseError> {
        match self.peek_kind() {
            Some(TokenKind::Number(_)) | Some(TokenKind::Param(_)) => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(self.expected("row count"))
        }
    }

    fn parse_projection(
        &mut self,
        model: &mut QueryModel,
        depth: usize
    ) -> Result<Vec<Projection>, ParseError> {
        let mut items = Vec::new();
        loop {
            if self.eat(&TokenKind::Star) {
                items.push(Projection::Star);
            } else {
                let item = match self.parse_expr(model, depth)? {
                    Expr::Column(c) => Projection::Column(c),
                    Expr::Aggregate {
                        function,
                        column,
                        distinct
                    } => Projection::Aggregate {
                        function,
                        column,
                        distinct
                    },
                    Expr::Subquery(i) => Projection::Subquery(i),
                    _ => Projection::Expression
                };
                items.push(item);
                self.skip_column_alias()?;
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(items)
    }

    fn skip_column_alias(&mut self) -> Result<(), ParseError> {
        if self.eat_keyword("AS") {
            return match self.next() {
                Some(Token {
                    kind: TokenKind::Word(_),
                    ..
                }) => Ok(()),
                _ => {
                    self.pos = self.pos.saturating_sub(1);
                    Err(self.expected("column alias"))
                }
            };
        }
        if let Some(TokenKind::Word(w)) = self.peek_kind()
            && !is_reserved(w)
        {
            self.pos += 1;
        }
        Ok(())
    }

    // FROM clause

    fn parse_from(&mut self, model: &mut QueryModel, depth: usize) -> Result<(), ParseError> {
        let mut kind = JoinKind::Base;
        loop {
            if self.eat(&TokenKind::LBrace) {
                self.parse_source_list(model, depth, kind)?;
                self.expect(&TokenKind::RBrace)?;
            } else if let Some(TokenKind::ColRef { alias: None, .. }) = self.peek_kind() {
                // `{Type}` lexes like an unqualified column
                self.parse_table_ref(model, kind)?;
            } else {
                self.parse_source_list(model, depth, kind)?;
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
            kind = JoinKind::Cross;
        }
        Ok(())
    }

    fn parse_source_list(
        &mut self,
        model: &mut QueryModel,
        depth: usize,
        kind: JoinKind
    ) -> Result<(), ParseError> {
        self.parse_table_ref(model, kind)?;
        while let Some(kind) = self.parse_join_keyword()? {
            self.parse_table_ref(model, kind)?;
            if self.eat_keyword("ON") {
                let condition = self.parse_or(model, depth)?;
                for conjunct in condition.into_conjuncts() {
                    match conjunct {
                        Predicate::Comparison {
                            column,
                            op: CompareOp::Eq,
                            operand: Operand::Column(other)
                        } => model.joins.push(JoinEdge {
                            left: column,
                            right: other,
                            kind
                        }),
                        other => model.join_filters.push(other)
                    }
                }
            }
        }
        Ok(())
    }

    fn parse_join_keyword(&mut self) -> Result<Option<JoinKind>, ParseError> {
        let kind = if self.at_keyword("JOIN") {
            JoinKind::Inner
        } else if self.at_keyword("INNER") {
            self.pos += 1;
            JoinKind::Inner
        } else if self.at_keyword("LEFT") {
            self.pos += 1;
            self.eat_keyword("OUTER");
            JoinKind::Left
        } else if self.at_keyword("RIGHT") {
            self.pos += 1;
            self.eat_keyword("OUTER");
            JoinKind::Right
        } else if self.at_keyword("CROSS") {
            self.pos += 1;
            JoinKind::Cross
        } else {
            return Ok(None);
        };
        self.expect_keyword("JOIN")?;
        Ok(Some(kind))
    }

    /// Types such as `Order` or `Group` collide with clause keywords; they
    /// are type names unless followed by `BY`.
    fn keyword_as_type_name(&self) -> bool {
        let Some(TokenKind::Word(w)) = self.peek_kind() else {
            return false;
        };
        let clashes = ["ORDER", "GROUP"].iter().any(|k| k.eq_ignore_ascii_case(w));
        clashes && !matches!(self.peek_kind_at(1), Some(TokenKind::Word(next)) if next.eq_ignore_ascii_case("BY"))
    }

    fn parse_table_ref(&mut self, model: &mut QueryModel, kind: JoinKind) -> Result<(), ParseError> {
        let position = self.position();
        let table = match self.peek_kind() {
            Some(TokenKind::Word(w)) if !is_reserved(w) || self.keyword_as_type_name() => w.clone(),
            Some(TokenKind::ColRef {
                alias: None,
                column
            }) => column.clone(),
            Some(TokenKind::SubOpen) | Some(TokenKind::LParen) => {
                return Err(ParseError::Unsupported {
                    construct: "derived table in FROM".into(),
                    position
                });
            }
            _ => return Err(self.expected("type name"))
        };
        self.pos += 1;
        // `Type!` exact type, `Type*` including subtypes
        if !self.eat(&TokenKind::Bang) {
            self.eat(&TokenKind::Star);
        }
        let alias = if self.eat_keyword("AS") {
            match self.peek_kind() {
                Some(TokenKind::Word(w)) if !is_reserved(w) => {
                    let alias = w.clone();
                    self.pos += 1;
                    alias
                }
                _ => return Err(self.expected("alias"))
            }
        } else {
            match self.peek_kind() {
                Some(TokenKind::Word(w)) if !is_reserved(w) => {
                    let alias = w.clone();
                    self.pos += 1;
                    alias
                }
                _ => table.clone()
            }
        };
        model.sources.push(TableSource {
            table,
            alias: alias.to_ascii_lowercase().into(),
            join: kind,
            position
        });
        Ok(())
    }

    // predicates

    fn parse_or(&mut self, model: &mut QueryModel, depth: usize) -> Result<Predicate, ParseError> {
        let mut items = vec![self.parse_and(model, depth)?];
        while self.eat_keyword("OR") {
            items.push(self.parse_and(model, depth)?);
        }
        Ok(combine(LogicalOp::Or, items))
    }

    fn parse_and(&mut self, model: &mut QueryModel, depth: usize) -> Result<Predicate, ParseError> {
        let mut items = vec![self.parse_not(model, depth)?];
        while self.eat_keyword("AND") {
            items.push(self.parse_not(model, depth)?);
        }
        Ok(combine(LogicalOp::And, items))
    }

    fn parse_not(&mut self, model: &mut QueryModel, depth: usize) -> Result<Predicate, ParseError> {
        if self.at_keyword("NOT") {
            if self.at_keyword_at(1, "EXISTS") {
                self.pos += 1;
                return self.parse_exists(model, depth, true);
            }
            self.pos += 1;
            self.enter_group()?;
            let inner = self.parse_not(model, depth);
            self.leave_group();
            return inner.map(Predicate::negate);
        }
        if self.at_keyword("EXISTS") {
            return self.parse_exists(model, depth, false);
        }
        if self.peek_kind() == Some(&TokenKind::LParen)
            && self.peek_kind_at(1) != Some(&TokenKind::SubOpen)
        {
            self.pos += 1;
            self.enter_group()?;
            let inner = self.parse_or(model, depth);
            self.leave_group();
            let inner = inner?;
            self.expect(&TokenKind::RParen)?;
            return Ok(inner);
        }
        let left = self.parse_expr(model, depth)?;
        self.parse_comparison_tail(model, depth, left)
    }

    fn parse_exists(
        &mut self,
        model: &mut QueryModel,
        depth: usize,
        negated: bool
    ) -> Result<Predicate, ParseError> {
        self.expect_keyword("EXISTS")?;
        let parenthesised = self.eat(&TokenKind::LParen);
        let position = self.expect(&TokenKind::SubOpen)?;
        let index = self.parse_subquery_body(model, depth, position)?;
        if parenthesised {
            self.expect(&TokenKind::RParen)?;
        }
        model.subqueries[index].kind = if negated {
            SubqueryKind::NotExists
        } else {
            SubqueryKind::Exists
        };
        Ok(Predicate::Exists {
            negated,
            subquery: index
        })
    }

    fn parse_comparison_tail(
        &mut self,
        model: &mut QueryModel,
        depth: usize,
        left: Expr
    ) -> Result<Predicate, ParseError> {
        let position = self.position();
        if self.eat_keyword("IS") {
            let negated = self.eat_keyword("NOT");
            self.expect_keyword("NULL")?;
            let column = require_column(left, position)?;
            return Ok(Predicate::Null { column, negated });
        }
        let negated = self.at_keyword("NOT")
            && (self.at_keyword_at(1, "IN")
                || self.at_keyword_at(1, "LIKE")
                || self.at_keyword_at(1, "BETWEEN"));
        if negated {
            self.pos += 1;
        }
        if self.eat_keyword("IN") {
            let operand = self.parse_in_operand(model, depth, negated)?;
            let column = require_column(left, position)?;
            return Ok(Predicate::In {
                column,
                negated,
                operand,
                position
            });
        }
        if self.eat_keyword("LIKE") {
            let right = self.parse_expr(model, depth)?;
            let op = if negated {
                CompareOp::NotLike
            } else {
                CompareOp::Like
            };
            return comparison(left, op, right, position);
        }
        if self.eat_keyword("BETWEEN") {
            let low = self.parse_expr(model, depth)?;
            self.expect_keyword("AND")?;
            let high = self.parse_expr(model, depth)?;
            let range = Predicate::Logical {
                op:       LogicalOp::And,
                children: vec![
                    comparison(left.clone(), CompareOp::GtEq, low, position)?,
                    comparison(left, CompareOp::LtEq, high, position)?,
                ]
            };
            return Ok(if negated { range.negate() } else { range });
        }
        let op = match self.peek_kind() {
            Some(TokenKind::Eq) => CompareOp::Eq,
            Some(TokenKind::NotEq) => CompareOp::NotEq,
            Some(TokenKind::Lt) => CompareOp::Lt,
            Some(TokenKind::LtEq) => CompareOp::LtEq,
            Some(TokenKind::Gt) => CompareOp::Gt,
            Some(TokenKind::GtEq) => CompareOp::GtEq,
            _ => return Err(self.expected("comparison operator"))
        };
        self.pos += 1;
        let right = self.parse_expr(model, depth)?;
        comparison(left, op, right, position)
    }

    fn parse_in_operand(
        &mut self,
        model: &mut QueryModel,
        depth: usize,
        negated: bool
    ) -> Result<InOperand, ParseError> {
        let position = self.position();
        if let Some(TokenKind::Param(name)) = self.peek_kind() {
            let name = name.clone();
            self.pos += 1;
            return Ok(InOperand::List(vec![Operand::Param(name)]));
        }
        if !self.eat(&TokenKind::LParen) {
            return Err(ParseError::MalformedInList {
                reason: "expected '(' after IN".into(),
                position
            });
        }
        if self.peek_kind() == Some(&TokenKind::SubOpen) {
            let sub_position = self.position();
            self.pos += 1;
            let index = self.parse_subquery_body(model, depth, sub_position)?;
            self.expect(&TokenKind::RParen)?;
            model.subqueries[index].kind = if negated {
                SubqueryKind::NotIn
            } else {
                SubqueryKind::In
            };
            return Ok(InOperand::Subquery(index));
        }
        let mut items = Vec::new();
        loop {
            match self.peek_kind() {
                Some(TokenKind::Comma) | Some(TokenKind::RParen) => {
                    let reason = if items.is_empty() && self.peek_kind() == Some(&TokenKind::RParen) {
                        "empty list"
                    } else {
                        "missing list element"
                    };
                    return Err(ParseError::MalformedInList {
                        reason: reason.into(),
                        position: self.position()
                    });
                }
                None => {
                    return Err(ParseError::MalformedInList {
                        reason: "list is not closed".into(),
                        position
                    });
                }
                _ => {}
            }
            items.push(self.parse_expr(model, depth)?.into_operand());
            if self.eat(&TokenKind::Comma) {
                continue;
            }
            if self.eat(&TokenKind::RParen) {
                break;
            }
            return Err(ParseError::MalformedInList {
                reason: format!(
                    "expected ',' or ')', found {}",
                    self.peek_kind()
                        .map(|k| k.to_string())
                        .unwrap_or_else(|| "end of query".into())
                ),
                position: self.position()
            });
        }
        Ok(InOperand::List(items))
    }

    // expressions

    fn parse_expr(&mut self, model: &mut QueryModel, depth: usize) -> Result<Expr, ParseError> {
        let first = self.parse_primary(model, depth)?;
        let is_operator = |k: Option<&TokenKind>| {
            matches!(
                k,
                Some(TokenKind::Plus)
                    | Some(TokenKind::Minus)
                    | Some(TokenKind::Star)
                    | Some(TokenKind::Slash)
                    | Some(TokenKind::Concat)
            )
        };
        if !is_operator(self.peek_kind()) {
            return Ok(first);
        }
        let mut column = first.into_column();
        while is_operator(self.peek_kind()) {
            self.pos += 1;
            let rhs = self.parse_primary(model, depth)?;
            if column.is_none() {
                column = rhs.into_column();
            }
        }
        Ok(Expr::Computed(column))
    }

    fn parse_primary(&mut self, model: &mut QueryModel, depth: usize) -> Result<Expr, ParseError> {
        let Some(token) = self.next() else {
            return Err(self.expected("expression"));
        };
        match token.kind {
            TokenKind::ColRef { alias, column } => Ok(Expr::Column(ColumnRef::new(
                alias.as_deref(),
                &column,
                token.position
            ))),
            TokenKind::Param(name) => Ok(Expr::Param(name)),
            TokenKind::Str(value) => Ok(Expr::Literal(Literal::String(value))),
            TokenKind::Number(value) => Ok(Expr::Literal(Literal::Number(value))),
            TokenKind::Minus => match self.next() {
                Some(Token {
                    kind: TokenKind::Number(value),
                    ..
                }) => Ok(Expr::Literal(Literal::Number(format!("-{}", value).into()))),
                _ => {
                    self.pos = self.pos.saturating_sub(1);
                    Err(self.expected("number"))
                }
            },
            TokenKind::SubOpen => {
                let index = self.parse_subquery_body(model, depth, token.position)?;
                Ok(Expr::Subquery(index))
            }
            TokenKind::LParen => {
                if self.peek_kind() == Some(&TokenKind::SubOpen) {
                    let position = self.position();
                    self.pos += 1;
                    let index = self.parse_subquery_body(model, depth, position)?;
                    self.expect(&TokenKind::RParen)?;
                    return Ok(Expr::Subquery(index));
                }
                self.enter_group()?;
                let inner = self.parse_expr(model, depth);
                self.leave_group();
                let inner = inner?;
                self.expect(&TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Word(word) => {
                if word.eq_ignore_ascii_case("TRUE") || word.eq_ignore_ascii_case("FALSE") {
                    return Ok(Expr::Literal(Literal::Boolean(
                        word.eq_ignore_ascii_case("TRUE")
                    )));
                }
                if word.eq_ignore_ascii_case("NULL") {
                    return Ok(Expr::Literal(Literal::Null));
                }
                if self.peek_kind() == Some(&TokenKind::LParen) {
                    return self.parse_call(model, depth, &word);
                }
                if is_reserved(&word) {
                    self.pos -= 1;
                    return Err(self.expected("expression"));
                }
                Ok(Expr::Keyword)
            }
            _ => {
                self.pos -= 1;
                Err(self.expected("expression"))
            }
        }
    }

    fn parse_call(
        &mut self,
        model: &mut QueryModel,
        depth: usize,
        name: &str
    ) -> Result<Expr, ParseError> {
        self.expect(&TokenKind::LParen)?;
        self.enter_group()?;
        let result = self.parse_call_args(model, depth);
        self.leave_group();
        let (column, distinct) = result?;
        self.expect(&TokenKind::RParen)?;
        Ok(match AggregateFn::from_name(name) {
            Some(function) => Expr::Aggregate {
                function,
                column,
                distinct
            },
            None => Expr::Computed(column)
        })
    }

    fn parse_call_args(
        &mut self,
        model: &mut QueryModel,
        depth: usize
    ) -> Result<(Option<ColumnRef>, bool), ParseError> {
        let distinct = self.eat_keyword("DISTINCT");
        if self.eat(&TokenKind::Star) || self.peek_kind() == Some(&TokenKind::RParen) {
            return Ok((None, distinct));
        }
        let mut column = None;
        loop {
            let arg = self.parse_expr(model, depth)?;
            if column.is_none() {
                column = arg.column().cloned();
            }
            // CAST(x AS type), EXTRACT(x FROM y)
            if self.eat_keyword("AS") || self.eat_keyword("FROM") {
                self.parse_expr(model, depth)?;
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok((column, distinct))
    }

    /// Called after `{{`; parses the nested SELECT and the closing `}}`.
    fn parse_subquery_body(
        &mut self,
        model: &mut QueryModel,
        depth: usize,
        position: usize
    ) -> Result<usize, ParseError> {
        if depth + 1 > self.max_depth {
            return Err(ParseError::DepthExceeded {
                limit: self.max_depth,
                position
            });
        }
        let nested = self.parse_select(depth + 1)?;
        self.expect(&TokenKind::SubClose)?;
        model.subqueries.push(Subquery {
            kind: SubqueryKind::Scalar,
            model: nested,
            correlations: Vec::new(),
            position
        });
        Ok(model.subqueries.len() - 1)
    }
}

fn combine(op: LogicalOp, items: Vec<Predicate>) -> Predicate {
    if items.len() == 1 {
        return items.into_iter().next().unwrap_or(Predicate::Logical {
            op,
            children: Vec::new()
        });
    }
    let mut children = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Predicate::Logical {
                op: inner,
                children: nested
            } if inner == op => children.extend(nested),
            other => children.push(other)
        }
    }
    Predicate::Logical { op, children }
}

fn require_column(expr: Expr, position: usize) -> Result<ColumnRef, ParseError> {
    expr.into_column()
        .ok_or_else(|| ParseError::Unsupported {
            construct: "predicate without a column reference".into(),
            position
        })
}

/// Build a comparison with the column on the left.
fn comparison(left: Expr, op: CompareOp, right: Expr, position: usize) -> Result<Predicate, ParseError> {
    if left.column().is_some() {
        let column = require_column(left, position)?;
        return Ok(Predicate::Comparison {
            column,
            op,
            operand: right.into_operand()
        });
    }
    if right.column().is_some() {
        let Some(flipped) = op.flipped() else {
            return Err(ParseError::Unsupported {
                construct: format!("{} with the column on the right", op),
                position
            });
        };
        let column = require_column(right, position)?;
        return Ok(Predicate::Comparison {
            column,
            op: flipped,
            operand: left.into_operand()
        });
    }
    Err(ParseError::Unsupported {
        construct: "comparison without a column reference".into(),
        position
    })
}

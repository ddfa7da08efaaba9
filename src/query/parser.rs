// Copyright (c) 2026-present, the sysdb authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Recursive-descent parser for the `query`/`matcher`/`expr` grammars
//! (spec.md §4.F).
//!
//! Grounded on `original_source/src/frontend/parser.c`'s three entry modes
//! (full query, condition-only, expression-only) and structured the way
//! `examples/quarylabs-sqruff`'s `parser-core` crate builds its hand-rolled
//! recursive-descent parser: a flat token buffer, a cursor, and one function
//! per grammar production.

use super::ast::Stmt;
use crate::matcher::{self, BinOp, CmpOp as MCmpOp, Expression, Matcher};
use crate::query::lexer::{CmpOp, Keyword, Lexer, Token};
use crate::store::object::{Field, ObjectType};
use crate::values::{self, DataValue};

/// Diagnostics accumulated while parsing. Every production appends rather
/// than failing fast on the first token it doesn't like, so a caller gets
/// more than "unexpected token" for a malformed query (spec.md §4.F:
/// "errors are reported through an error buffer, never signaled through the
/// return value alone").
#[derive(Default)]
pub struct ErrorBuf(Vec<String>);

impl ErrorBuf {
    fn push(&mut self, msg: impl Into<String>) {
        self.0.push(msg.into());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn into_messages(self) -> Vec<String> {
        self.0
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    pub errors: ErrorBuf,
}

type PResult<T> = Result<T, ()>;

impl Parser {
    /// Tokenizes `input` fully before parsing begins (query strings are
    /// short; this keeps lookahead trivial).
    ///
    /// # Errors
    ///
    /// Returns a lexer error message if `input` contains a malformed token.
    pub fn new(input: &str) -> Result<Self, String> {
        let mut lexer = Lexer::new(input);
        let mut tokens = Vec::new();
        loop {
            let tok = lexer.next_token()?;
            let done = tok == Token::Eof;
            tokens.push(tok);
            if done {
                break;
            }
        }
        Ok(Self {
            tokens,
            pos: 0,
            errors: ErrorBuf::default(),
        })
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    #[must_use]
    pub fn peek_is_eof(&self) -> bool {
        self.peek() == &Token::Eof
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn expect_kw(&mut self, kw: Keyword) -> PResult<()> {
        if self.peek() == &Token::Kw(kw) {
            self.advance();
            Ok(())
        } else {
            self.errors.push(format!("expected keyword {kw:?}, found {:?}", self.peek()));
            Err(())
        }
    }

    fn eat_kw(&mut self, kw: Keyword) -> bool {
        if self.peek() == &Token::Kw(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_str(&mut self) -> PResult<String> {
        match self.advance() {
            Token::Str(s) => Ok(s),
            other => {
                self.errors.push(format!("expected string literal, found {other:?}"));
                Err(())
            }
        }
    }

    fn expect_ident(&mut self) -> PResult<String> {
        match self.advance() {
            Token::Ident(s) => Ok(s),
            other => {
                self.errors.push(format!("expected identifier, found {other:?}"));
                Err(())
            }
        }
    }

    /// `query := stmt (';' stmt)* ';'?`
    pub fn parse_query(&mut self) -> PResult<Vec<Stmt>> {
        let mut stmts = vec![self.parse_stmt()?];
        while self.peek() == &Token::Semicolon {
            self.advance();
            if self.peek() == &Token::Eof {
                break;
            }
            stmts.push(self.parse_stmt()?);
        }
        if self.peek() != &Token::Eof {
            self.errors.push(format!("unexpected trailing token {:?}", self.peek()));
            return Err(());
        }
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> PResult<Stmt> {
        match self.peek().clone() {
            Token::Kw(Keyword::List) => {
                self.advance();
                match self.advance() {
                    Token::Kw(Keyword::Hosts) => Ok(Stmt::ListHosts),
                    Token::Kw(Keyword::Services) => Ok(Stmt::ListServices),
                    Token::Kw(Keyword::Metrics) => Ok(Stmt::ListMetrics),
                    other => {
                        self.errors.push(format!("expected hosts/services/metrics after LIST, found {other:?}"));
                        Err(())
                    }
                }
            }
            Token::Kw(Keyword::Fetch) => {
                self.advance();
                let kind = self.advance();
                let first = self.expect_str()?;
                let second = if self.peek() == &Token::Dot {
                    self.advance();
                    Some(self.expect_str()?)
                } else {
                    None
                };
                match (kind, second) {
                    (Token::Kw(Keyword::Host), None) => Ok(Stmt::FetchHost(first)),
                    (Token::Kw(Keyword::Service), Some(name)) => Ok(Stmt::FetchService(first, name)),
                    (Token::Kw(Keyword::Metric), Some(name)) => Ok(Stmt::FetchMetric(first, name)),
                    (other, _) => {
                        self.errors.push(format!("malformed FETCH statement near {other:?}"));
                        Err(())
                    }
                }
            }
            Token::Kw(Keyword::Lookup) => {
                self.advance();
                let object_type = match self.advance() {
                    Token::Kw(Keyword::Hosts) => ObjectType::Host,
                    Token::Kw(Keyword::Services) => ObjectType::Service,
                    Token::Kw(Keyword::Metrics) => ObjectType::Metric,
                    other => {
                        self.errors.push(format!("expected hosts/services/metrics after LOOKUP, found {other:?}"));
                        return Err(());
                    }
                };
                let matching = if self.eat_kw(Keyword::Matching) {
                    Some(self.parse_matcher_or()?)
                } else {
                    None
                };
                let filter = if self.eat_kw(Keyword::Filter) {
                    Some(self.parse_matcher_or()?)
                } else {
                    None
                };
                Ok(Stmt::Lookup {
                    object_type,
                    matching,
                    filter,
                })
            }
            Token::Kw(Keyword::Timeseries) => {
                self.advance();
                let host = self.expect_str()?;
                if self.advance() != Token::Dot {
                    self.errors.push("expected '.' in TIMESERIES host.metric".to_string());
                    return Err(());
                }
                let metric = self.expect_str()?;
                let start = if self.eat_kw(Keyword::Start) {
                    Some(self.expect_datetime()?)
                } else {
                    None
                };
                let end = if self.eat_kw(Keyword::End) {
                    Some(self.expect_datetime()?)
                } else {
                    None
                };
                Ok(Stmt::Timeseries { host, metric, start, end })
            }
            other => {
                self.errors.push(format!("expected a statement, found {other:?}"));
                Err(())
            }
        }
    }

    fn expect_datetime(&mut self) -> PResult<crate::time::SdbTime> {
        match self.advance() {
            Token::DateTime(s) => match values::parse_datetime(&s) {
                Ok(DataValue::DateTime(ts)) => Ok(ts),
                _ => {
                    self.errors.push(format!("invalid datetime literal '{s}'"));
                    Err(())
                }
            },
            other => {
                self.errors.push(format!("expected datetime literal, found {other:?}"));
                Err(())
            }
        }
    }

    /// `matcher := matcher 'OR' matcher | ...` (OR is lowest precedence).
    pub fn parse_matcher_or(&mut self) -> PResult<Matcher> {
        let mut left = self.parse_matcher_and()?;
        while self.eat_kw(Keyword::Or) {
            let right = self.parse_matcher_and()?;
            left = Matcher::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_matcher_and(&mut self) -> PResult<Matcher> {
        let mut left = self.parse_matcher_unary()?;
        while self.eat_kw(Keyword::And) {
            let right = self.parse_matcher_unary()?;
            left = Matcher::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_matcher_unary(&mut self) -> PResult<Matcher> {
        if self.eat_kw(Keyword::Not) {
            return Ok(Matcher::Not(Box::new(self.parse_matcher_unary()?)));
        }
        self.parse_matcher_primary()
    }

    fn parse_matcher_primary(&mut self) -> PResult<Matcher> {
        match self.peek().clone() {
            Token::LParen => {
                self.advance();
                let m = self.parse_matcher_or()?;
                if self.advance() != Token::RParen {
                    self.errors.push("expected ')'".to_string());
                    return Err(());
                }
                Ok(m)
            }
            Token::Kw(Keyword::Any) | Token::Kw(Keyword::All) => {
                let is_any = self.advance() == Token::Kw(Keyword::Any);
                let child_type = match self.advance() {
                    Token::Kw(Keyword::Service) => ObjectType::Service,
                    Token::Kw(Keyword::Metric) => ObjectType::Metric,
                    Token::Kw(Keyword::Attribute) => ObjectType::Attribute,
                    other => {
                        self.errors
                            .push(format!("expected service/metric/attribute after ANY/ALL, found {other:?}"));
                        return Err(());
                    }
                };
                let inner = self.parse_matcher_unary()?;
                let wrap = |m: Matcher| match child_type {
                    ObjectType::Service => Matcher::AnyService(Box::new(m)),
                    ObjectType::Metric => Matcher::AnyMetric(Box::new(m)),
                    ObjectType::Attribute => Matcher::AnyAttribute(Box::new(m)),
                    ObjectType::Host => unreachable!("rejected above"),
                };
                if is_any {
                    Ok(wrap(inner))
                } else {
                    // ALL x m  ==  NOT ANY x (NOT m)
                    Ok(Matcher::Not(Box::new(wrap(Matcher::Not(Box::new(inner))))))
                }
            }
            Token::Kw(Keyword::Is) => {
                self.advance();
                let name = self.expect_ident()?;
                self.expect_kw(Keyword::Null)?;
                Ok(Matcher::IsNull(name))
            }
            Token::Ident(_) => {
                let name = self.expect_ident()?;
                if self.peek() == &Token::Dot {
                    self.advance();
                    let attr = self.expect_ident()?;
                    let op = self.expect_cmp()?;
                    let expr = self.parse_expr()?;
                    matcher::parse_cmp(&name, &attr, convert_cmp(op), expr).map_err(|e| {
                        self.errors.push(e.to_string());
                    })
                } else {
                    let op = self.expect_cmp()?;
                    let expr = self.parse_expr()?;
                    matcher::parse_field_cmp(&name, convert_cmp(op), expr).map_err(|e| {
                        self.errors.push(e.to_string());
                    })
                }
            }
            other => {
                self.errors.push(format!("expected a matcher, found {other:?}"));
                Err(())
            }
        }
    }

    fn expect_cmp(&mut self) -> PResult<CmpOp> {
        match self.advance() {
            Token::Cmp(op) => Ok(op),
            other => {
                self.errors.push(format!("expected a comparison operator, found {other:?}"));
                Err(())
            }
        }
    }

    /// `expr := expr ('+'|'-') term | term`
    pub fn parse_expr(&mut self) -> PResult<Expression> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            left = Expression::BinOp(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    /// `term := term ('*'|'/'|'%') factor | factor`
    fn parse_term(&mut self) -> PResult<Expression> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_factor()?;
            left = Expression::BinOp(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    /// `factor := STRING | INTEGER | DECIMAL | DATETIME | IDENT
    ///         | obj_type '.' IDENT | '(' expr ')'`
    fn parse_factor(&mut self) -> PResult<Expression> {
        match self.advance() {
            Token::Str(s) => Ok(Expression::Const(DataValue::String(s))),
            Token::Integer(i) => Ok(Expression::Const(DataValue::Integer(i))),
            Token::Decimal(d) => Ok(Expression::Const(DataValue::Decimal(d))),
            Token::DateTime(s) => values::parse_datetime(&s)
                .map(Expression::Const)
                .map_err(|e| self.errors.push(e.to_string())),
            Token::Ident(name) => {
                if self.peek() == &Token::Dot {
                    self.advance();
                    let attr = self.expect_ident()?;
                    Ok(Expression::AttrRef(attr))
                } else {
                    Ok(resolve_ident_expr(&name))
                }
            }
            Token::LParen => {
                let e = self.parse_expr()?;
                if self.advance() != Token::RParen {
                    self.errors.push("expected ')'".to_string());
                    return Err(());
                }
                Ok(e)
            }
            other => {
                self.errors.push(format!("expected an expression, found {other:?}"));
                Err(())
            }
        }
    }
}

fn resolve_ident_expr(name: &str) -> Expression {
    match name.to_ascii_lowercase().as_str() {
        "last-update" | "last_update" => Expression::FieldRef(Field::LastUpdate),
        "age" => Expression::FieldRef(Field::Age),
        "interval" => Expression::FieldRef(Field::Interval),
        "backend" => Expression::FieldRef(Field::Backend),
        "name" => Expression::FieldRef(Field::Name),
        _ => Expression::AttrRef(name.to_string()),
    }
}

fn convert_cmp(op: CmpOp) -> MCmpOp {
    match op {
        CmpOp::Eq => MCmpOp::Eq,
        CmpOp::Ne => MCmpOp::Ne,
        CmpOp::Lt => MCmpOp::Lt,
        CmpOp::Le => MCmpOp::Le,
        CmpOp::Ge => MCmpOp::Ge,
        CmpOp::Gt => MCmpOp::Gt,
        CmpOp::Match => MCmpOp::Match,
        CmpOp::NotMatch => MCmpOp::NotMatch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stmts(input: &str) -> Vec<Stmt> {
        let mut parser = Parser::new(input).unwrap();
        parser.parse_query().unwrap()
    }

    #[test]
    fn parses_list_and_fetch() {
        let s = stmts("LIST hosts; FETCH service 'a'.'s1'");
        assert!(matches!(s[0], Stmt::ListHosts));
        match &s[1] {
            Stmt::FetchService(host, svc) => {
                assert_eq!(host, "a");
                assert_eq!(svc, "s1");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_lookup_with_matching_and_filter() {
        let s = stmts("LOOKUP hosts MATCHING host.name = 'a' FILTER NOT IS shell NULL");
        match &s[0] {
            Stmt::Lookup { object_type, matching, filter } => {
                assert_eq!(*object_type, ObjectType::Host);
                assert!(matching.is_some());
                assert!(matches!(filter, Some(Matcher::Not(_))));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_any_and_all_sugar() {
        let s = stmts("LOOKUP hosts MATCHING ANY service service.name = 's1' OR ALL metric metric.name =~ 'm.*'");
        let Stmt::Lookup { matching: Some(m), .. } = &s[0] else {
            panic!("expected lookup with matcher")
        };
        assert!(matches!(m, Matcher::Or(..)));
    }

    #[test]
    fn parses_arithmetic_precedence() {
        let mut parser = Parser::new("1 + 2 * 3").unwrap();
        let expr = parser.parse_expr().unwrap();
        assert!(matches!(expr, Expression::BinOp(BinOp::Add, _, _)));
    }

    #[test]
    fn rejects_unsupported_host_attr_cmp() {
        let mut parser = Parser::new("host.shell = 'bash'").unwrap();
        assert!(parser.parse_matcher_or().is_err());
        assert!(!parser.errors.is_empty());
    }

    #[test]
    fn parses_timeseries_with_bounds() {
        let s = stmts("TIMESERIES 'a'.'load' START 2023-01-01T00:00:00Z END 2023-01-02T00:00:00Z");
        match &s[0] {
            Stmt::Timeseries { host, metric, start, end } => {
                assert_eq!(host, "a");
                assert_eq!(metric, "load");
                assert!(start.is_some());
                assert!(end.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

// Copyright (c) 2026-present, the sysdb authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The query language: lexer, grammar, and the parse-tree types it
//! produces (spec.md §4.F).
//!
//! Three entry points mirror the original front-end's three parse modes
//! (`original_source/src/frontend/parser.c`: full query, standalone
//! condition, standalone expression) — a client can send a whole `query`
//! statement, or the matcher/expression language can be reused standalone
//! wherever spec.md calls for "the same grammar as the `MATCHING` clause".

pub mod ast;
mod lexer;
mod parser;

pub use ast::Stmt;

use crate::matcher::{Expression, Matcher};

/// A query/matcher/expression failed to parse.
///
/// Carries every diagnostic the parser accumulated rather than just the
/// first (spec.md §4.F: "errors are reported through an error buffer,
/// never signaled through the return value alone").
#[derive(Debug)]
pub struct ParseError {
    messages: Vec<String>,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.messages.join("; "))
    }
}

impl std::error::Error for ParseError {}

impl ParseError {
    fn lex(msg: String) -> Self {
        Self { messages: vec![msg] }
    }

    fn from_buf(messages: Vec<String>) -> Self {
        let messages = if messages.is_empty() {
            vec!["parse failed with no diagnostic".to_string()]
        } else {
            messages
        };
        Self { messages }
    }

    /// The individual diagnostic messages, in the order they were raised.
    #[must_use]
    pub fn messages(&self) -> &[String] {
        &self.messages
    }
}

/// Parses a full `query` statement list (spec.md §4.F `query`).
///
/// # Errors
///
/// Returns [`ParseError`] on any lexical or grammatical error.
pub fn parse_query(input: &str) -> Result<Vec<Stmt>, ParseError> {
    let mut p = parser::Parser::new(input).map_err(ParseError::lex)?;
    p.parse_query().map_err(|()| ParseError::from_buf(p.errors.into_messages()))
}

/// Parses a standalone `matcher` expression, the same grammar used after
/// `MATCHING`/`FILTER` in a `LOOKUP` statement.
///
/// # Errors
///
/// Returns [`ParseError`] on any lexical or grammatical error.
pub fn parse_matcher(input: &str) -> Result<Matcher, ParseError> {
    let mut p = parser::Parser::new(input).map_err(ParseError::lex)?;
    let m = p.parse_matcher_or().map_err(|()| ParseError::from_buf(std::mem::take(&mut p.errors).into_messages()))?;
    if !p.peek_is_eof() {
        return Err(ParseError::from_buf(vec!["trailing input after matcher".to_string()]));
    }
    Ok(m)
}

/// Parses a standalone arithmetic/string `expr`.
///
/// # Errors
///
/// Returns [`ParseError`] on any lexical or grammatical error.
pub fn parse_expr(input: &str) -> Result<Expression, ParseError> {
    let mut p = parser::Parser::new(input).map_err(ParseError::lex)?;
    let e = p.parse_expr().map_err(|()| ParseError::from_buf(std::mem::take(&mut p.errors).into_messages()))?;
    if !p.peek_is_eof() {
        return Err(ParseError::from_buf(vec!["trailing input after expression".to_string()]));
    }
    Ok(e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_query_roundtrip() {
        let stmts = parse_query("LIST hosts;").unwrap();
        assert!(matches!(stmts[0], Stmt::ListHosts));
    }

    #[test]
    fn parse_matcher_standalone() {
        let m = parse_matcher("host.name = 'a'").unwrap();
        assert!(matches!(m, Matcher::NameMatch(..)));
    }

    #[test]
    fn parse_expr_standalone() {
        let e = parse_expr("1 + 2").unwrap();
        assert!(matches!(e, Expression::BinOp(..)));
    }

    #[test]
    fn parse_query_reports_error() {
        let err = parse_query("LIST bogus").unwrap_err();
        assert!(!err.messages().is_empty());
    }
}

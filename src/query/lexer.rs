// Copyright (c) 2026-present, the sysdb authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Tokenizer for the query language (spec.md §4.F).
//!
//! Grounded on `original_source/src/frontend/parser.c`'s scanner (single-
//! quoted strings with `''` escape, `--`/`/* */` comments, numeric and
//! ISO-8601-datetime literals) with the token-kind-enum shape enriched from
//! `examples/quarylabs-sqruff`'s hand-rolled lexer, the closest pack example
//! for a dedicated SQL-ish scanner.

use std::iter::Peekable;
use std::str::Chars;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Ge,
    Gt,
    Match,
    NotMatch,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Keyword {
    List,
    Fetch,
    Lookup,
    Timeseries,
    Matching,
    Filter,
    Start,
    End,
    And,
    Or,
    Not,
    Any,
    All,
    Is,
    Null,
    Hosts,
    Services,
    Metrics,
    Host,
    Service,
    Metric,
    Attribute,
    Attributes,
}

fn keyword(word: &str) -> Option<Keyword> {
    Some(match word.to_ascii_uppercase().as_str() {
        "LIST" => Keyword::List,
        "FETCH" => Keyword::Fetch,
        "LOOKUP" => Keyword::Lookup,
        "TIMESERIES" => Keyword::Timeseries,
        "MATCHING" => Keyword::Matching,
        "FILTER" => Keyword::Filter,
        "START" => Keyword::Start,
        "END" => Keyword::End,
        "AND" => Keyword::And,
        "OR" => Keyword::Or,
        "NOT" => Keyword::Not,
        "ANY" => Keyword::Any,
        "ALL" => Keyword::All,
        "IS" => Keyword::Is,
        "NULL" => Keyword::Null,
        "HOSTS" => Keyword::Hosts,
        "SERVICES" => Keyword::Services,
        "METRICS" => Keyword::Metrics,
        "HOST" => Keyword::Host,
        "SERVICE" => Keyword::Service,
        "METRIC" => Keyword::Metric,
        "ATTRIBUTE" => Keyword::Attribute,
        "ATTRIBUTES" => Keyword::Attributes,
        _ => return None,
    })
}

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Ident(String),
    Str(String),
    Integer(i64),
    Decimal(f64),
    DateTime(String),
    Kw(Keyword),
    Cmp(CmpOp),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Dot,
    LParen,
    RParen,
    Semicolon,
    Eof,
}

pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    #[must_use]
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
        }
    }

    fn skip_trivia(&mut self) -> Result<(), String> {
        loop {
            match self.chars.peek() {
                Some(c) if c.is_whitespace() => {
                    self.chars.next();
                }
                Some('-') => {
                    let mut clone = self.chars.clone();
                    clone.next();
                    if clone.peek() == Some(&'-') {
                        self.chars.next();
                        self.chars.next();
                        for c in self.chars.by_ref() {
                            if c == '\n' {
                                break;
                            }
                        }
                    } else {
                        return Ok(());
                    }
                }
                Some('/') => {
                    let mut clone = self.chars.clone();
                    clone.next();
                    if clone.peek() == Some(&'*') {
                        self.chars.next();
                        self.chars.next();
                        let mut closed = false;
                        while let Some(c) = self.chars.next() {
                            if c == '*' && self.chars.peek() == Some(&'/') {
                                self.chars.next();
                                closed = true;
                                break;
                            }
                        }
                        if !closed {
                            return Err("unterminated block comment".to_string());
                        }
                    } else {
                        return Ok(());
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn read_string(&mut self) -> Result<String, String> {
        let mut s = String::new();
        loop {
            match self.chars.next() {
                Some('\'') => {
                    if self.chars.peek() == Some(&'\'') {
                        self.chars.next();
                        s.push('\'');
                    } else {
                        return Ok(s);
                    }
                }
                Some(c) => s.push(c),
                None => return Err("unterminated string literal".to_string()),
            }
        }
    }

    fn read_number_or_datetime(&mut self, first: char) -> Result<Token, String> {
        let mut s = String::new();
        s.push(first);
        let mut is_decimal = false;
        let mut is_datetime = false;

        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() {
                s.push(c);
                self.chars.next();
            } else if c == '.' && !is_decimal && !is_datetime {
                is_decimal = true;
                s.push(c);
                self.chars.next();
            } else if (c == '-' || c == ':' || c == 'T' || c == '+' || c == 'Z') && s.len() >= 4 {
                is_datetime = true;
                s.push(c);
                self.chars.next();
            } else {
                break;
            }
        }

        if is_datetime {
            return Ok(Token::DateTime(s));
        }
        if is_decimal {
            return s
                .parse::<f64>()
                .map(Token::Decimal)
                .map_err(|e| format!("invalid decimal literal '{s}': {e}"));
        }
        s.parse::<i64>()
            .map(Token::Integer)
            .map_err(|e| format!("invalid integer literal '{s}': {e}"))
    }

    fn read_ident(&mut self, first: char) -> String {
        let mut s = String::new();
        s.push(first);
        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                s.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        s
    }

    /// Reads the next token.
    ///
    /// # Errors
    ///
    /// Returns a human-readable message on unterminated strings/comments or
    /// malformed numeric literals.
    pub fn next_token(&mut self) -> Result<Token, String> {
        self.skip_trivia()?;
        let Some(c) = self.chars.next() else {
            return Ok(Token::Eof);
        };

        Ok(match c {
            '\'' => Token::Str(self.read_string()?),
            '.' => Token::Dot,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '(' => Token::LParen,
            ')' => Token::RParen,
            ';' => Token::Semicolon,
            '=' => {
                if self.chars.peek() == Some(&'~') {
                    self.chars.next();
                    Token::Cmp(CmpOp::Match)
                } else {
                    Token::Cmp(CmpOp::Eq)
                }
            }
            '!' => match self.chars.peek() {
                Some(&'=') => {
                    self.chars.next();
                    Token::Cmp(CmpOp::Ne)
                }
                Some(&'~') => {
                    self.chars.next();
                    Token::Cmp(CmpOp::NotMatch)
                }
                _ => return Err("expected '=' or '~' after '!'".to_string()),
            },
            '<' => {
                if self.chars.peek() == Some(&'=') {
                    self.chars.next();
                    Token::Cmp(CmpOp::Le)
                } else {
                    Token::Cmp(CmpOp::Lt)
                }
            }
            '>' => {
                if self.chars.peek() == Some(&'=') {
                    self.chars.next();
                    Token::Cmp(CmpOp::Ge)
                } else {
                    Token::Cmp(CmpOp::Gt)
                }
            }
            c if c.is_ascii_digit() => self.read_number_or_datetime(c)?,
            c if c.is_alphabetic() || c == '_' => {
                let word = self.read_ident(c);
                keyword(&word).map_or_else(|| Token::Ident(word.clone()), Token::Kw)
            }
            other => return Err(format!("unexpected character '{other}'")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(input);
        let mut out = Vec::new();
        loop {
            let t = lexer.next_token().unwrap();
            if t == Token::Eof {
                break;
            }
            out.push(t);
        }
        out
    }

    #[test]
    fn lexes_keywords_and_string() {
        let toks = tokens("LOOKUP hosts MATCHING 'it''s a test'");
        assert_eq!(
            toks,
            vec![
                Token::Kw(Keyword::Lookup),
                Token::Kw(Keyword::Hosts),
                Token::Kw(Keyword::Matching),
                Token::Str("it's a test".to_string()),
            ]
        );
    }

    #[test]
    fn lexes_comments() {
        let toks = tokens("LIST hosts -- a comment\n /* block */ ;");
        assert_eq!(
            toks,
            vec![Token::Kw(Keyword::List), Token::Kw(Keyword::Hosts), Token::Semicolon]
        );
    }

    #[test]
    fn lexes_cmp_operators() {
        let toks = tokens("=~ !~ != <= >=");
        assert_eq!(
            toks,
            vec![
                Token::Cmp(CmpOp::Match),
                Token::Cmp(CmpOp::NotMatch),
                Token::Cmp(CmpOp::Ne),
                Token::Cmp(CmpOp::Le),
                Token::Cmp(CmpOp::Ge),
            ]
        );
    }

    #[test]
    fn lexes_numbers() {
        let toks = tokens("47 11.5");
        assert_eq!(toks, vec![Token::Integer(47), Token::Decimal(11.5)]);
    }
}

//! Tokenizer for templated queries.
//!
//! Braces are context sensitive: `{alias.column}` and `{column}` become a
//! single [`TokenKind::ColRef`], `{{` always opens a subquery, and `}}` only
//! closes one when the innermost open brace is a subquery. Any other brace
//! delimits a FROM clause.

use std::{fmt, sync::LazyLock};

use compact_str::CompactString;
use regex::Regex;

use super::error::ParseError;

/// `alias.column`, `alias:column`, `column`, optionally with a language
/// qualifier such as `name[en]`.
static COLUMN_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z_][\w$]*)(?:\s*[.:]\s*([A-Za-z_][\w$]*))?\s*(?:\[\s*[\w]+\s*\])?\s*$")
        .expect("valid regex")
});

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Word(CompactString),
    ColRef {
        alias:  Option<CompactString>,
        column: CompactString
    },
    Param(CompactString),
    Str(String),
    Number(CompactString),
    LBrace,
    RBrace,
    SubOpen,
    SubClose,
    LParen,
    RParen,
    Comma,
    Dot,
    Star,
    Semicolon,
    Bang,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Slash,
    Concat
}

impl TokenKind {
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Self::Word(w) if w.eq_ignore_ascii_case(keyword))
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Word(w) => write!(f, "'{}'", w),
            Self::ColRef {
                alias: Some(alias),
                column
            } => write!(f, "'{{{}.{}}}'", alias, column),
            Self::ColRef {
                alias: None,
                column
            } => write!(f, "'{{{}}}'", column),
            Self::Param(p) => write!(f, "'?{}'", p),
            Self::Str(_) => write!(f, "string literal"),
            Self::Number(n) => write!(f, "'{}'", n),
            Self::LBrace => write!(f, "'{{'"),
            Self::RBrace => write!(f, "'}}'"),
            Self::SubOpen => write!(f, "'{{{{'"),
            Self::SubClose => write!(f, "'}}}}'"),
            Self::LParen => write!(f, "'('"),
            Self::RParen => write!(f, "')'"),
            Self::Comma => write!(f, "','"),
            Self::Dot => write!(f, "'.'"),
            Self::Star => write!(f, "'*'"),
            Self::Semicolon => write!(f, "';'"),
            Self::Bang => write!(f, "'!'"),
            Self::Eq => write!(f, "'='"),
            Self::NotEq => write!(f, "'<>'"),
            Self::Lt => write!(f, "'<'"),
            Self::LtEq => write!(f, "'<='"),
            Self::Gt => write!(f, "'>'"),
            Self::GtEq => write!(f, "'>='"),
            Self::Plus => write!(f, "'+'"),
            Self::Minus => write!(f, "'-'"),
            Self::Slash => write!(f, "'/'"),
            Self::Concat => write!(f, "'||'")
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind:     TokenKind,
    /// Byte offset of the first character
    pub position: usize
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Open {
    Brace,
    Subquery
}

pub fn tokenize(src: &str) -> Result<Vec<Token>, ParseError> {
    Lexer {
        src,
        pos: 0,
        tokens: Vec::new(),
        stack: Vec::new()
    }
    .run()
}

struct Lexer<'a> {
    src:    &'a str,
    pos:    usize,
    tokens: Vec<Token>,
    stack:  Vec<(Open, usize)>
}

impl<'a> Lexer<'a> {
    fn run(mut self) -> Result<Vec<Token>, ParseError> {
        while let Some(c) = self.peek() {
            let start = self.pos;
            match c {
                c if c.is_whitespace() => {
                    self.bump();
                }
                '-' if self.peek_at(1) == Some('-') => self.skip_line(),
                '/' if self.peek_at(1) == Some('*') => self.skip_block(start)?,
                '{' => self.open_brace(start)?,
                '}' => self.close_brace(start)?,
                '\'' => self.string(start)?,
                '"' | '`' => self.quoted_ident(c, start)?,
                '?' => self.param(start)?,
                c if c.is_ascii_digit() => self.number(start),
                c if c.is_alphabetic() || c == '_' => self.word(start),
                _ => self.punct(c, start)?
            }
        }
        if let Some(&(open, position)) = self.stack.last() {
            return Err(match open {
                Open::Subquery => ParseError::UnterminatedSubquery { position },
                Open::Brace => self
                    .stack
                    .iter()
                    .rev()
                    .find(|(o, _)| *o == Open::Subquery)
                    .map(|&(_, position)| ParseError::UnterminatedSubquery { position })
                    .unwrap_or(ParseError::UnbalancedBrace { position })
            });
        }
        Ok(self.tokens)
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn push(&mut self, kind: TokenKind, position: usize) {
        self.tokens.push(Token { kind, position });
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.bump() {
            if c == '\n' {
                break;
            }
        }
    }

    fn skip_block(&mut self, start: usize) -> Result<(), ParseError> {
        match self.src[self.pos + 2..].find("*/") {
            Some(end) => {
                self.pos += 2 + end + 2;
                Ok(())
            }
            None => Err(ParseError::UnexpectedEnd {
                expected: "'*/'".into(),
                position: start
            })
        }
    }

    fn open_brace(&mut self, start: usize) -> Result<(), ParseError> {
        if self.peek_at(1) == Some('{') {
            self.pos += 2;
            self.stack.push((Open::Subquery, start));
            self.push(TokenKind::SubOpen, start);
            return Ok(());
        }
        let body_start = start + 1;
        let rest = &self.src[body_start..];
        if let Some(end) = rest.find(|c: char| c == '{' || c == '}')
            && rest.as_bytes()[end] == b'}'
            && let Some(caps) = COLUMN_TOKEN.captures(&rest[..end])
        {
            let first = CompactString::from(&caps[1]);
            let kind = match caps.get(2) {
                Some(column) => TokenKind::ColRef {
                    alias:  Some(first),
                    column: column.as_str().into()
                },
                None => TokenKind::ColRef {
                    alias:  None,
                    column: first
                }
            };
            self.pos = body_start + end + 1;
            self.push(kind, start);
            return Ok(());
        }
        self.pos += 1;
        self.stack.push((Open::Brace, start));
        self.push(TokenKind::LBrace, start);
        Ok(())
    }

    fn close_brace(&mut self, start: usize) -> Result<(), ParseError> {
        match self.stack.last() {
            Some((Open::Brace, _)) => {
                self.pos += 1;
                self.stack.pop();
                self.push(TokenKind::RBrace, start);
                Ok(())
            }
            Some((Open::Subquery, _)) if self.peek_at(1) == Some('}') => {
                self.pos += 2;
                self.stack.pop();
                self.push(TokenKind::SubClose, start);
                Ok(())
            }
            _ => Err(ParseError::UnbalancedBrace { position: start })
        }
    }

    fn string(&mut self, start: usize) -> Result<(), ParseError> {
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                Some('\'') if self.peek() == Some('\'') => {
                    self.bump();
                    value.push('\'');
                }
                Some('\'') => break,
                Some(c) => value.push(c),
                None => return Err(ParseError::UnterminatedString { position: start })
            }
        }
        self.push(TokenKind::Str(value), start);
        Ok(())
    }

    fn quoted_ident(&mut self, quote: char, start: usize) -> Result<(), ParseError> {
        self.bump();
        let body = self.pos;
        match self.src[body..].find(quote) {
            Some(end) => {
                self.pos = body + end + 1;
                let word = CompactString::from(&self.src[body..body + end]);
                self.push(TokenKind::Word(word), start);
                Ok(())
            }
            None => Err(ParseError::UnterminatedString { position: start })
        }
    }

    fn param(&mut self, start: usize) -> Result<(), ParseError> {
        self.bump();
        // `?{{ ... }}` is a subquery placeholder; the `{{` lexes as SubOpen
        if self.src[self.pos..].starts_with("{{") {
            return Ok(());
        }
        let name_start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || (c == '.' && self.pos > name_start) {
                self.bump();
            } else {
                break;
            }
        }
        let name = self.src[name_start..self.pos].trim_end_matches('.');
        self.pos = name_start + name.len();
        if name.is_empty() {
            return Err(ParseError::InvalidParameter { position: start });
        }
        self.push(TokenKind::Param(name.into()), start);
        Ok(())
    }

    fn number(&mut self, start: usize) {
        while let Some(c) = self.peek() {
            let fraction = c == '.' && self.peek_at(1).is_some_and(|n| n.is_ascii_digit());
            if c.is_ascii_digit() || fraction {
                self.bump();
            } else {
                break;
            }
        }
        let text = CompactString::from(&self.src[start..self.pos]);
        self.push(TokenKind::Number(text), start);
    }

    fn word(&mut self, start: usize) {
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '$' {
                self.bump();
            } else {
                break;
            }
        }
        let text = CompactString::from(&self.src[start..self.pos]);
        self.push(TokenKind::Word(text), start);
    }

    fn punct(&mut self, c: char, start: usize) -> Result<(), ParseError> {
        let next = self.peek_at(1);
        let (kind, len) = match (c, next) {
            ('<', Some('>')) => (TokenKind::NotEq, 2),
            ('!', Some('=')) => (TokenKind::NotEq, 2),
            ('<', Some('=')) => (TokenKind::LtEq, 2),
            ('>', Some('=')) => (TokenKind::GtEq, 2),
            ('|', Some('|')) => (TokenKind::Concat, 2),
            ('=', _) => (TokenKind::Eq, 1),
            ('<', _) => (TokenKind::Lt, 1),
            ('>', _) => (TokenKind::Gt, 1),
            ('!', _) => (TokenKind::Bang, 1),
            ('(', _) => (TokenKind::LParen, 1),
            (')', _) => (TokenKind::RParen, 1),
            (',', _) => (TokenKind::Comma, 1),
            ('.', _) => (TokenKind::Dot, 1),
            ('*', _) => (TokenKind::Star, 1),
            (';', _) => (TokenKind::Semicolon, 1),
            ('+', _) => (TokenKind::Plus, 1),
            ('-', _) => (TokenKind::Minus, 1),
            ('/', _) => (TokenKind::Slash, 1),
            _ => {
                return Err(ParseError::UnexpectedChar {
                    found:    c,
                    position: start
                });
            }
        };
        self.pos += len;
        self.push(kind, start);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_column_tokens() {
        let tokens = kinds("{p.code} = {pk}");
        assert_eq!(
            tokens[0],
            TokenKind::ColRef {
                alias:  Some("p".into()),
                column: "code".into()
            }
        );
        assert_eq!(tokens[1], TokenKind::Eq);
        assert_eq!(
            tokens[2],
            TokenKind::ColRef {
                alias:  None,
                column: "pk".into()
            }
        );
    }

    #[test]
    fn test_from_clause_braces() {
        let tokens = kinds("FROM {A AS a JOIN B AS b ON {b.x} = {a.y}}");
        assert_eq!(tokens[1], TokenKind::LBrace);
        assert_eq!(tokens.last(), Some(&TokenKind::RBrace));
    }

    #[test]
    fn test_subquery_braces() {
        let tokens = kinds("IN ({{ SELECT {r.x} FROM {R AS r}}})");
        assert!(tokens.contains(&TokenKind::SubOpen));
        assert!(tokens.contains(&TokenKind::SubClose));
        assert_eq!(tokens.last(), Some(&TokenKind::RParen));
    }

    #[test]
    fn test_subquery_placeholder() {
        let tokens = kinds("= ?{{ SELECT {r.x} FROM {R AS r} }}");
        assert_eq!(tokens[1], TokenKind::SubOpen);
        assert_eq!(tokens.last(), Some(&TokenKind::SubClose));
        assert!(!tokens.iter().any(|t| matches!(t, TokenKind::Param(_))));
    }

    #[test]
    fn test_params_and_literals() {
        let tokens = kinds("?status 'it''s' 12.5 ?session.user");
        assert_eq!(tokens[0], TokenKind::Param("status".into()));
        assert_eq!(tokens[1], TokenKind::Str("it's".into()));
        assert_eq!(tokens[2], TokenKind::Number("12.5".into()));
        assert_eq!(tokens[3], TokenKind::Param("session.user".into()));
    }

    #[test]
    fn test_operators() {
        let tokens = kinds("<> != <= >= < > =");
        assert_eq!(
            tokens,
            vec![
                TokenKind::NotEq,
                TokenKind::NotEq,
                TokenKind::LtEq,
                TokenKind::GtEq,
                TokenKind::Lt,
                TokenKind::Gt,
                TokenKind::Eq,
            ]
        );
    }

    #[test]
    fn test_unterminated_subquery() {
        let err = tokenize("SELECT {p.pk} FROM {P AS p} WHERE EXISTS ({{ SELECT 1").unwrap_err();
        assert!(matches!(err, ParseError::UnterminatedSubquery { position: 42 }));
    }

    #[test]
    fn test_unterminated_subquery_with_open_from_brace() {
        let err = tokenize("EXISTS ({{ SELECT 1 FROM {R AS r").unwrap_err();
        assert!(matches!(err, ParseError::UnterminatedSubquery { .. }));
    }

    #[test]
    fn test_stray_closing_brace() {
        let err = tokenize("SELECT {p.pk} FROM P }").unwrap_err();
        assert!(matches!(err, ParseError::UnbalancedBrace { .. }));
    }

    #[test]
    fn test_bare_question_mark() {
        assert!(matches!(
            tokenize("WHERE {p.a} = ? AND").unwrap_err(),
            ParseError::InvalidParameter { .. }
        ));
    }

    #[test]
    fn test_comments_are_skipped() {
        let tokens = kinds("SELECT -- note\n /* block */ {p.pk}");
        assert_eq!(tokens.len(), 2);
    }
}

//! The lexer: turns source text into an on-demand token stream.
//!
//! The parser pulls one token at a time; nothing is buffered here. Lexing
//! never fails: unrecognized input becomes an `Illegal` token.

use crate::lexer::token::{Token, TokenKind};
use crate::span::Span;

pub struct Scanner<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    current_pos: usize,
    line: usize,
    column: usize,
    start_pos: usize,
    start_line: usize,
    start_column: usize,
    /// The previously produced token kind, consulted to decide whether a
    /// `/` starts a regexp literal or divides.
    prev: Option<TokenKind>,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            current_pos: 0,
            line: 1,
            column: 1,
            start_pos: 0,
            start_line: 1,
            start_column: 1,
            prev: None,
        }
    }

    /// Scan every remaining token, ending with `Eof`. Test convenience;
    /// the parser calls `scan_token` directly.
    pub fn scan_tokens(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.scan_token();
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        tokens
    }

    /// Scan the next token.
    pub fn scan_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();
        self.mark_start();

        let Some((_, c)) = self.advance() else {
            return Token::eof(self.current_pos, self.line, self.column);
        };

        let token = match c {
            '(' => self.make_token(TokenKind::LeftParen),
            ')' => self.make_token(TokenKind::RightParen),
            '{' => self.make_token(TokenKind::LeftBrace),
            '}' => self.make_token(TokenKind::RightBrace),
            '[' => self.make_token(TokenKind::LeftBracket),
            ']' => self.make_token(TokenKind::RightBracket),
            ',' => self.make_token(TokenKind::Comma),
            ';' => self.make_token(TokenKind::Semicolon),
            '+' => self.make_token(TokenKind::Plus),
            '-' => self.make_token(TokenKind::Minus),
            '%' => self.make_token(TokenKind::Percent),
            '√' => self.make_token(TokenKind::Root),
            '*' => {
                if self.match_char('*') {
                    self.make_token(TokenKind::Power)
                } else {
                    self.make_token(TokenKind::Star)
                }
            }
            '/' => {
                if self.regexp_allowed() {
                    self.scan_regexp()
                } else {
                    self.make_token(TokenKind::Slash)
                }
            }
            '=' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::EqualEqual)
                } else {
                    self.make_token(TokenKind::Equal)
                }
            }
            '!' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::BangEqual)
                } else if self.match_char('~') {
                    self.make_token(TokenKind::NotMatches)
                } else {
                    self.make_token(TokenKind::Bang)
                }
            }
            '<' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::LessEqual)
                } else {
                    self.make_token(TokenKind::Less)
                }
            }
            '>' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::GreaterEqual)
                } else {
                    self.make_token(TokenKind::Greater)
                }
            }
            '~' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::Matches)
                } else {
                    self.make_token(TokenKind::Illegal('~'))
                }
            }
            '&' => {
                if self.match_char('&') {
                    self.make_token(TokenKind::And)
                } else {
                    self.make_token(TokenKind::Illegal('&'))
                }
            }
            '|' => {
                if self.match_char('|') {
                    self.make_token(TokenKind::Or)
                } else {
                    self.make_token(TokenKind::Illegal('|'))
                }
            }
            '"' => self.scan_string(),
            c if c.is_ascii_digit() => self.scan_number(c),
            c if c.is_alphabetic() || c == '_' => self.scan_identifier(c),
            c => self.make_token(TokenKind::Illegal(c)),
        };

        self.prev = Some(token.kind.clone());
        token
    }

    /// A `/` opens a regexp unless the previous token could end an
    /// expression, in which case it divides.
    fn regexp_allowed(&self) -> bool {
        match &self.prev {
            None => true,
            Some(kind) => !kind.ends_expression(),
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(' ' | '\t' | '\r') => {
                    self.advance();
                }
                Some('\n') => {
                    self.advance();
                    self.line += 1;
                    self.column = 1;
                }
                Some('/') if self.peek_next() == Some('/') => {
                    while self.peek().is_some() && self.peek() != Some('\n') {
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn scan_string(&mut self) -> Token {
        let mut value = String::new();

        loop {
            match self.peek() {
                None => {
                    // Unterminated: surface the opening quote as illegal.
                    return self.make_token(TokenKind::Illegal('"'));
                }
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.peek() {
                        Some('n') => {
                            self.advance();
                            value.push('\n');
                        }
                        Some('t') => {
                            self.advance();
                            value.push('\t');
                        }
                        Some('r') => {
                            self.advance();
                            value.push('\r');
                        }
                        Some('\\') => {
                            self.advance();
                            value.push('\\');
                        }
                        Some('"') => {
                            self.advance();
                            value.push('"');
                        }
                        // Unknown escapes keep the escaped character.
                        Some(c) => {
                            self.advance();
                            value.push(c);
                        }
                        None => {
                            return self.make_token(TokenKind::Illegal('"'));
                        }
                    }
                }
                Some('\n') => {
                    self.advance();
                    self.line += 1;
                    self.column = 1;
                    value.push('\n');
                }
                Some(c) => {
                    self.advance();
                    value.push(c);
                }
            }
        }

        self.make_token(TokenKind::String(value))
    }

    /// Scan the body of a `/pattern/flags` literal. The opening `/` is
    /// already consumed; flags are the letter run after the closing `/`.
    fn scan_regexp(&mut self) -> Token {
        let mut pattern = String::new();

        loop {
            match self.peek() {
                None => {
                    return self.make_token(TokenKind::Illegal('/'));
                }
                Some('/') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.peek() {
                        // An escaped delimiter is a literal slash.
                        Some('/') => {
                            self.advance();
                            pattern.push('/');
                        }
                        // Other escapes belong to the regexp engine.
                        Some(c) => {
                            self.advance();
                            pattern.push('\\');
                            pattern.push(c);
                        }
                        None => {
                            return self.make_token(TokenKind::Illegal('/'));
                        }
                    }
                }
                Some('\n') => {
                    self.advance();
                    self.line += 1;
                    self.column = 1;
                    pattern.push('\n');
                }
                Some(c) => {
                    self.advance();
                    pattern.push(c);
                }
            }
        }

        let mut flags = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphabetic() {
                flags.push(c);
                self.advance();
            } else {
                break;
            }
        }

        self.make_token(TokenKind::Regexp { pattern, flags })
    }

    fn scan_number(&mut self, first: char) -> Token {
        let mut value = String::from(first);
        let mut is_float = false;

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                value.push(c);
                self.advance();
            } else if c == '.' && !is_float {
                match self.peek_next() {
                    Some(next) if next.is_ascii_digit() => {
                        is_float = true;
                        value.push(c);
                        self.advance();
                    }
                    _ => break,
                }
            } else {
                break;
            }
        }

        if is_float {
            match value.parse::<f64>() {
                Ok(n) => self.make_token(TokenKind::Float(n)),
                Err(_) => self.make_token(TokenKind::Illegal(first)),
            }
        } else {
            match value.parse::<i64>() {
                Ok(n) => self.make_token(TokenKind::Int(n)),
                Err(_) => self.make_token(TokenKind::Illegal(first)),
            }
        }
    }

    fn scan_identifier(&mut self, first: char) -> Token {
        let mut value = String::from(first);

        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                value.push(c);
                self.advance();
            } else {
                break;
            }
        }

        let kind = TokenKind::keyword(&value).unwrap_or(TokenKind::Identifier(value));
        self.make_token(kind)
    }

    fn advance(&mut self) -> Option<(usize, char)> {
        if let Some((pos, c)) = self.chars.next() {
            self.current_pos = pos + c.len_utf8();
            self.column += 1;
            Some((pos, c))
        } else {
            None
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn peek_next(&self) -> Option<char> {
        let mut iter = self.source[self.current_pos..].chars();
        iter.next();
        iter.next()
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn mark_start(&mut self) {
        self.start_pos = self.current_pos;
        self.start_line = self.line;
        self.start_column = self.column;
    }

    fn current_span(&self) -> Span {
        Span::new(
            self.start_pos,
            self.current_pos,
            self.start_line,
            self.start_column,
        )
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.current_span())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(source: &str) -> Vec<TokenKind> {
        Scanner::new(source)
            .scan_tokens()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            scan("(){}[],;"),
            vec![
                TokenKind::LeftParen,
                TokenKind::RightParen,
                TokenKind::LeftBrace,
                TokenKind::RightBrace,
                TokenKind::LeftBracket,
                TokenKind::RightBracket,
                TokenKind::Comma,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            scan("42 3.14"),
            vec![TokenKind::Int(42), TokenKind::Float(3.14), TokenKind::Eof]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            scan("== != <= >= ~= !~ && || ** ="),
            vec![
                TokenKind::EqualEqual,
                TokenKind::BangEqual,
                TokenKind::LessEqual,
                TokenKind::GreaterEqual,
                TokenKind::Matches,
                TokenKind::NotMatches,
                TokenKind::And,
                TokenKind::Or,
                TokenKind::Power,
                TokenKind::Equal,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_keywords_and_identifiers() {
        assert_eq!(
            scan("if else while return true false in Name"),
            vec![
                TokenKind::If,
                TokenKind::Else,
                TokenKind::While,
                TokenKind::Return,
                TokenKind::True,
                TokenKind::False,
                TokenKind::In,
                TokenKind::Identifier("Name".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            scan(r#""a\tb\nc\"d""#),
            vec![
                TokenKind::String("a\tb\nc\"d".to_string()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_unknown_escape_kept() {
        assert_eq!(
            scan(r#""a\qb""#),
            vec![TokenKind::String("aqb".to_string()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_unterminated_string_is_illegal() {
        assert_eq!(
            scan(r#""open"#),
            vec![TokenKind::Illegal('"'), TokenKind::Eof]
        );
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(
            scan("1 // trailing\n2"),
            vec![TokenKind::Int(1), TokenKind::Int(2), TokenKind::Eof]
        );
    }

    #[test]
    fn test_regexp_literal() {
        assert_eq!(
            scan("/^he/"),
            vec![
                TokenKind::Regexp {
                    pattern: "^he".to_string(),
                    flags: String::new()
                },
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_regexp_with_flags() {
        assert_eq!(
            scan("Name ~= /alice/i"),
            vec![
                TokenKind::Identifier("Name".to_string()),
                TokenKind::Matches,
                TokenKind::Regexp {
                    pattern: "alice".to_string(),
                    flags: "i".to_string()
                },
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_regexp_escaped_delimiter() {
        assert_eq!(
            scan(r"/a\/b\d/"),
            vec![
                TokenKind::Regexp {
                    pattern: r"a/b\d".to_string(),
                    flags: String::new()
                },
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_slash_after_value_divides() {
        assert_eq!(
            scan("6 / 2"),
            vec![
                TokenKind::Int(6),
                TokenKind::Slash,
                TokenKind::Int(2),
                TokenKind::Eof
            ]
        );
        assert_eq!(
            scan("(a) / 2"),
            vec![
                TokenKind::LeftParen,
                TokenKind::Identifier("a".to_string()),
                TokenKind::RightParen,
                TokenKind::Slash,
                TokenKind::Int(2),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_root_prefix() {
        assert_eq!(
            scan("√9"),
            vec![TokenKind::Root, TokenKind::Int(9), TokenKind::Eof]
        );
    }

    #[test]
    fn test_illegal_character() {
        assert_eq!(scan("@"), vec![TokenKind::Illegal('@'), TokenKind::Eof]);
        assert_eq!(scan("&"), vec![TokenKind::Illegal('&'), TokenKind::Eof]);
    }

    #[test]
    fn test_line_tracking() {
        let tokens = Scanner::new("1\n  2").scan_tokens();
        assert_eq!(tokens[0].span.line, 1);
        assert_eq!(tokens[1].span.line, 2);
        assert_eq!(tokens[1].span.column, 3);
    }
}

use std::{fmt::Display, iter::Peekable, str::Chars};

use crate::color;

/// A minimal struct to track location in the source file for better errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// Tracks token location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub span: Span,
}

impl Position {
    /// Builds a position from a zero-based line and column.
    pub fn new(line: usize, column: usize) -> Self {
        Position {
            line,
            span: Span {
                start: column,
                end: column,
            },
        }
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.span.start + 1)
    }
}

// The core token definition for the IDL.
#[derive(Debug, PartialEq, Clone)]
pub enum TokenKind {
    // Keywords
    Interface,
    Enum,
    Attribute,
    Sequence,
    Translatable,
    // Delimiters and Operators
    OpenBrace,    // {
    CloseBrace,   // }
    OpenBracket,  // [
    CloseBracket, // ]
    OpenParen,    // (
    CloseParen,   // )
    Less,         // <
    Greater,      // >
    Comma,        // ,
    Colon,        // :
    Semicolon,    // ;
    Assign,       // =
    Question,     // ?
    /// Type, member or extension attribute name.
    Identifier(String),
    /// Integer literal (i.e. 123)
    LiteralInt(u64),
    /// String literal; holds the unquoted contents.
    LiteralString(String),
    /// End of File
    Eof,
    /// Error token with a message
    Error(String),
}

// A full token, including its kind and its location (span).
#[derive(Debug, PartialEq, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub position: Position,
    /// The exact source text of the token.
    pub code: String,
}

pub struct Lexer<'a> {
    source: &'a str,
    chars: Peekable<Chars<'a>>,
    start_line_indices: Vec<usize>,
    absolute_pos: usize,
    current_line: usize,
    current_col: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a new Lexer from the input source string.
    pub fn new(source: &'a str) -> Self {
        Lexer {
            source,
            chars: source.chars().peekable(),
            start_line_indices: vec![0],
            absolute_pos: 0,
            current_line: 0,
            current_col: 0,
        }
    }

    /// Renders up to four lines of source before the position, the offending
    /// line with a caret underline, and a few lines after it.
    pub fn display_in_context(&self, position: &Position) -> String {
        let Some(&line_start) = self.start_line_indices.get(position.line) else {
            return String::new();
        };
        let left_index = if position.line > 3 {
            self.start_line_indices[position.line - 4]
        } else {
            0
        };
        let right_index = (line_start + position.span.end).min(self.source.len());

        let mut result = self.source.get(left_index..right_index).unwrap_or_default().to_string();
        let token_size = position.span.end.saturating_sub(position.span.start).max(1);
        let point_str = "^".repeat(token_size);
        let space_str = " ".repeat(position.span.start);

        let right_slice = self.source.get(right_index..).unwrap_or_default();
        let mut underlined = false;
        for (index, slice) in right_slice.lines().enumerate() {
            if index == 0 {
                result.push_str(slice);
                result.push_str(&format!("\n{space_str}{}{point_str}{}", color::RED, color::END));
                underlined = true;
            } else if index <= 4 {
                result.push('\n');
                result.push_str(slice);
            } else {
                break;
            }
        }
        if !underlined {
            result.push_str(&format!("\n{space_str}{}{point_str}{}", color::RED, color::END));
        }

        result
    }

    /// Advances the internal position and consumes the current character.
    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.absolute_pos += c.len_utf8();
        self.current_col += 1;
        Some(c)
    }

    /// Consumes a newline and records the start of the next line.
    fn advance_new_line(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.current_col = 0;
        self.absolute_pos += c.len_utf8();
        self.current_line += 1;
        self.start_line_indices.push(self.absolute_pos);
        Some(c)
    }

    /// Peeks at the next character without consuming it.
    fn peek(&mut self) -> Option<&char> {
        self.chars.peek()
    }

    /// Skips whitespace and `//` line comments.
    fn skip_whitespace(&mut self) {
        while let Some(&c) = self.peek() {
            if c == '\n' {
                self.advance_new_line();
            } else if c.is_whitespace() {
                self.advance();
            } else if c == '/' && self.source[self.absolute_pos..].starts_with("//") {
                while let Some(&c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else {
                break;
            }
        }
    }

    /// Parses an identifier or keyword.
    fn take_identifier(&mut self) -> TokenKind {
        let start = self.absolute_pos;
        while let Some(&c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
        let ident_str = &self.source[start..self.absolute_pos];

        match ident_str {
            "interface" => TokenKind::Interface,
            "enum" => TokenKind::Enum,
            "attribute" => TokenKind::Attribute,
            "sequence" => TokenKind::Sequence,
            "translatable" => TokenKind::Translatable,
            _ => TokenKind::Identifier(ident_str.to_string()),
        }
    }

    /// Parses an integer literal.
    fn take_number(&mut self) -> TokenKind {
        let start = self.absolute_pos;
        while let Some(&c) = self.peek() {
            if c.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }
        let num_str = &self.source[start..self.absolute_pos];

        match num_str.parse::<u64>() {
            Ok(val) => TokenKind::LiteralInt(val),
            Err(_) => TokenKind::Error(format!("invalid or oversized integer literal: {num_str}")),
        }
    }

    /// Parses a double-quoted string literal with `\"` and `\\` escapes.
    fn take_string(&mut self) -> TokenKind {
        self.advance(); // opening quote
        let mut value = String::new();
        loop {
            match self.peek() {
                Some('"') => {
                    self.advance();
                    return TokenKind::LiteralString(value);
                }
                Some('\\') => {
                    self.advance();
                    match self.advance() {
                        Some(c) => value.push(c),
                        None => break,
                    }
                }
                Some('\n') | None => break,
                Some(_) => {
                    if let Some(c) = self.advance() {
                        value.push(c);
                    }
                }
            }
        }
        TokenKind::Error("unterminated string literal".to_string())
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }
}

impl<'a> From<&'a str> for Lexer<'a> {
    fn from(source: &'a str) -> Self {
        Lexer::new(source)
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_whitespace();

        let start_pos = self.absolute_pos;
        let start_col = self.current_col;
        let kind = match self.peek() {
            Some('{') => self.single(TokenKind::OpenBrace),
            Some('}') => self.single(TokenKind::CloseBrace),
            Some('[') => self.single(TokenKind::OpenBracket),
            Some(']') => self.single(TokenKind::CloseBracket),
            Some('(') => self.single(TokenKind::OpenParen),
            Some(')') => self.single(TokenKind::CloseParen),
            Some('<') => self.single(TokenKind::Less),
            Some('>') => self.single(TokenKind::Greater),
            Some(',') => self.single(TokenKind::Comma),
            Some(':') => self.single(TokenKind::Colon),
            Some(';') => self.single(TokenKind::Semicolon),
            Some('=') => self.single(TokenKind::Assign),
            Some('?') => self.single(TokenKind::Question),
            Some('"') => self.take_string(),

            Some(c) if c.is_ascii_alphabetic() || *c == '_' => self.take_identifier(),

            Some(c) if c.is_ascii_digit() => self.take_number(),

            // End of file is reported once, then the iterator is exhausted.
            None => {
                if start_pos > self.source.len() {
                    return None;
                }
                self.absolute_pos += 1;
                return Some(Token {
                    kind: TokenKind::Eof,
                    position: Position::new(self.current_line, start_col),
                    code: String::new(),
                });
            }

            Some(&c) => {
                self.advance();
                TokenKind::Error(format!("unrecognized character: '{c}'"))
            }
        };

        Some(Token {
            kind,
            position: Position {
                line: self.current_line,
                span: Span {
                    start: start_col,
                    end: self.current_col,
                },
            },
            code: self.source[start_pos..self.absolute_pos].to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source).map(|t| t.kind).collect()
    }

    #[test]
    fn test_keywords_and_punctuation() {
        assert_eq!(
            kinds("[static] interface X { attribute sequence<int>? a; };"),
            vec![
                TokenKind::OpenBracket,
                TokenKind::Identifier("static".to_string()),
                TokenKind::CloseBracket,
                TokenKind::Interface,
                TokenKind::Identifier("X".to_string()),
                TokenKind::OpenBrace,
                TokenKind::Attribute,
                TokenKind::Sequence,
                TokenKind::Less,
                TokenKind::Identifier("int".to_string()),
                TokenKind::Greater,
                TokenKind::Question,
                TokenKind::Identifier("a".to_string()),
                TokenKind::Semicolon,
                TokenKind::CloseBrace,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_literal_keeps_code() {
        let tokens: Vec<Token> = Lexer::new(r#"guard="HAS_\"X""#).collect();
        assert_eq!(tokens[2].kind, TokenKind::LiteralString("HAS_\"X".to_string()));
        assert_eq!(tokens[2].code, r#""HAS_\"X""#);
    }

    #[test]
    fn test_comments_and_positions() {
        let tokens: Vec<Token> = Lexer::new("// header\n  enum E").collect();
        assert_eq!(tokens[0].kind, TokenKind::Enum);
        assert_eq!(tokens[0].position.line, 1);
        assert_eq!(tokens[0].position.span, Span { start: 2, end: 6 });
        assert_eq!(tokens[0].position.to_string(), "2:3");
    }

    #[test]
    fn test_unterminated_string() {
        assert!(matches!(kinds("\"abc")[0], TokenKind::Error(_)));
    }

    #[test]
    fn test_unrecognized_character() {
        assert_eq!(
            kinds("@"),
            vec![
                TokenKind::Error("unrecognized character: '@'".to_string()),
                TokenKind::Eof
            ]
        );
    }
}

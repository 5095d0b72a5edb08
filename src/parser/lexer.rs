//! Tokenizer for the spec language body.
//!
//! Produces identifiers, punctuation, and block comments (kept as tokens so
//! the parser can attach them as descriptions and `@id` annotations).

use super::errors::{SpecParseError, SpecParseResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Ident(String),
    Comment(String),
    LBrace,
    RBrace,
    LParen,
    RParen,
    LAngle,
    RAngle,
    Semi,
    Comma,
    Dot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

/// Tokenize a spec body (the text after the include header).
///
/// `first_line` is the 1-based line number the body starts at, so errors
/// report positions within the original document.
pub fn tokenize(body: &str, first_line: usize) -> SpecParseResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = body.char_indices().peekable();
    let bytes = body.as_bytes();
    let mut line = first_line;
    while let Some((pos, c)) = chars.next() {
        match c {
            '\n' => line += 1,
            c if c.is_whitespace() => {}
            '/' => {
                if chars.peek().map(|&(_, c)| c) != Some('*') {
                    return Err(SpecParseError::Syntax {
                        line,
                        message: "expected '/*' to open a comment".into(),
                    });
                }
                chars.next();
                let start_line = line;
                let mut text = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    if c == '\n' {
                        line += 1;
                    }
                    if c == '*' && chars.peek().map(|&(_, c)| c) == Some('/') {
                        chars.next();
                        closed = true;
                        break;
                    }
                    text.push(c);
                }
                if !closed {
                    return Err(SpecParseError::Syntax {
                        line: start_line,
                        message: "unterminated comment".into(),
                    });
                }
                tokens.push(Token {
                    kind: TokenKind::Comment(text),
                    line: start_line,
                });
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = pos;
                let mut end = pos + c.len_utf8();
                while let Some(&(p, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        end = p + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let text = std::str::from_utf8(&bytes[start..end])
                    .map_err(|e| SpecParseError::Internal(e.to_string()))?;
                tokens.push(Token {
                    kind: TokenKind::Ident(text.to_string()),
                    line,
                });
            }
            _ => {
                let kind = match c {
                    '{' => TokenKind::LBrace,
                    '}' => TokenKind::RBrace,
                    '(' => TokenKind::LParen,
                    ')' => TokenKind::RParen,
                    '<' => TokenKind::LAngle,
                    '>' => TokenKind::RAngle,
                    ';' => TokenKind::Semi,
                    ',' => TokenKind::Comma,
                    '.' => TokenKind::Dot,
                    other => {
                        return Err(SpecParseError::Syntax {
                            line,
                            message: format!("unexpected character '{other}'"),
                        })
                    }
                };
                tokens.push(Token { kind, line });
            }
        }
    }
    Ok(tokens)
}

//! SQL lexer
//!
//! Just enough tokenization to tell keywords from string literals, quoted
//! identifiers and comments. No grammar is applied here.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Bare keyword or identifier
    Word,
    /// `"name"`, `` `name` `` or `[name]`; `text` holds the unquoted name
    QuotedIdent,
    /// Single-quoted string literal, quotes included in `text`
    Str,
    Number,
    Symbol,
    Semicolon,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Byte span in the source
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }

    pub fn is_symbol(&self, symbol: &str) -> bool {
        self.kind == TokenKind::Symbol && self.text == symbol
    }

    pub fn upper(&self) -> String {
        self.text.to_ascii_uppercase()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub message: String,
    pub position: usize,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at byte {}", self.message, self.position)
    }
}

const OPERATORS: &[&str] = &["->>", "->", "<=", ">=", "<>", "!=", "==", "||", "<<", ">>"];

pub fn tokenize(sql: &str) -> Result<Vec<Token>, LexError> {
    let chars: Vec<(usize, char)> = sql.char_indices().collect();
    let byte_at = |i: usize| chars.get(i).map(|(b, _)| *b).unwrap_or(sql.len());
    let char_at = |i: usize| chars.get(i).map(|(_, c)| *c);

    let mut tokens = Vec::new();
    let mut i = 0;

    while let Some(c) = char_at(i) {
        let start = i;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // -- line comment
        if c == '-' && char_at(i + 1) == Some('-') {
            while let Some(c) = char_at(i) {
                if c == '\n' {
                    break;
                }
                i += 1;
            }
            continue;
        }

        // /* block comment */
        if c == '/' && char_at(i + 1) == Some('*') {
            i += 2;
            loop {
                match char_at(i) {
                    Some('*') if char_at(i + 1) == Some('/') => {
                        i += 2;
                        break;
                    }
                    Some(_) => i += 1,
                    None => {
                        return Err(LexError {
                            message: "unterminated block comment".to_string(),
                            position: byte_at(start),
                        })
                    }
                }
            }
            continue;
        }

        if c == '\'' {
            i = scan_quoted(&chars, i, '\'', '\'').ok_or_else(|| LexError {
                message: "unterminated string literal".to_string(),
                position: byte_at(start),
            })?;
            tokens.push(Token {
                kind: TokenKind::Str,
                text: sql[byte_at(start)..byte_at(i)].to_string(),
                start: byte_at(start),
                end: byte_at(i),
            });
            continue;
        }

        if c == '"' || c == '`' || c == '[' {
            let close = if c == '[' { ']' } else { c };
            i = scan_quoted(&chars, i, c, close).ok_or_else(|| LexError {
                message: "unterminated quoted identifier".to_string(),
                position: byte_at(start),
            })?;
            let raw = &sql[byte_at(start + 1)..byte_at(i - 1)];
            let doubled = format!("{}{}", close, close);
            tokens.push(Token {
                kind: TokenKind::QuotedIdent,
                text: raw.replace(&doubled, &close.to_string()),
                start: byte_at(start),
                end: byte_at(i),
            });
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && char_at(i + 1).is_some_and(|n| n.is_ascii_digit())) {
            i += 1;
            while let Some(n) = char_at(i) {
                let exponent_sign = (n == '+' || n == '-')
                    && matches!(char_at(i - 1), Some('e') | Some('E'))
                    && !sql[byte_at(start)..byte_at(i)].to_ascii_lowercase().starts_with("0x");
                if n.is_ascii_alphanumeric() || n == '.' || n == '_' || exponent_sign {
                    i += 1;
                } else {
                    break;
                }
            }
            tokens.push(Token {
                kind: TokenKind::Number,
                text: sql[byte_at(start)..byte_at(i)].to_string(),
                start: byte_at(start),
                end: byte_at(i),
            });
            continue;
        }

        if c.is_alphabetic() || c == '_' || !c.is_ascii() {
            i += 1;
            while let Some(n) = char_at(i) {
                if n.is_alphanumeric() || n == '_' || n == '$' || !n.is_ascii() {
                    i += 1;
                } else {
                    break;
                }
            }
            tokens.push(Token {
                kind: TokenKind::Word,
                text: sql[byte_at(start)..byte_at(i)].to_string(),
                start: byte_at(start),
                end: byte_at(i),
            });
            continue;
        }

        if c == ';' {
            i += 1;
            tokens.push(Token {
                kind: TokenKind::Semicolon,
                text: ";".to_string(),
                start: byte_at(start),
                end: byte_at(i),
            });
            continue;
        }

        let rest = &sql[byte_at(start)..];
        let op_len = OPERATORS
            .iter()
            .find(|op| rest.starts_with(*op))
            .map(|op| op.chars().count())
            .unwrap_or(1);
        i += op_len;
        tokens.push(Token {
            kind: TokenKind::Symbol,
            text: sql[byte_at(start)..byte_at(i)].to_string(),
            start: byte_at(start),
            end: byte_at(i),
        });
    }

    Ok(tokens)
}

/// Index just past the closing quote; a doubled closing quote is an escape
fn scan_quoted(chars: &[(usize, char)], open_at: usize, open: char, close: char) -> Option<usize> {
    debug_assert_eq!(chars.get(open_at).map(|(_, c)| *c), Some(open));
    let mut i = open_at + 1;
    loop {
        let (_, c) = *chars.get(i)?;
        if c == close {
            if open != '[' && chars.get(i + 1).map(|(_, n)| *n) == Some(close) {
                i += 2;
                continue;
            }
            return Some(i + 1);
        }
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(sql: &str) -> Vec<(TokenKind, String)> {
        tokenize(sql).unwrap().into_iter().map(|t| (t.kind, t.text)).collect()
    }

    #[test]
    fn test_strings_hide_keywords_and_semicolons() {
        let tokens = kinds("SELECT 'drop; it''s' FROM t");
        assert_eq!(tokens[1], (TokenKind::Str, "'drop; it''s'".to_string()));
        assert_eq!(tokens.len(), 4);
    }

    #[test]
    fn test_comments_are_skipped() {
        let tokens = kinds("SELECT 1 -- DROP TABLE x\n/* ; DELETE */ FROM t");
        let words: Vec<String> = tokens.into_iter().map(|(_, t)| t).collect();
        assert_eq!(words, vec!["SELECT", "1", "FROM", "t"]);
    }

    #[test]
    fn test_quoted_identifiers() {
        let tokens = kinds(r#"SELECT "order""s", `x`, [my table] FROM t"#);
        assert_eq!(tokens[1], (TokenKind::QuotedIdent, "order\"s".to_string()));
        assert_eq!(tokens[3], (TokenKind::QuotedIdent, "x".to_string()));
        assert_eq!(tokens[5], (TokenKind::QuotedIdent, "my table".to_string()));
    }

    #[test]
    fn test_numbers_and_operators() {
        let tokens = kinds("a>=1.5e-3<>.5");
        assert_eq!(
            tokens,
            vec![
                (TokenKind::Word, "a".to_string()),
                (TokenKind::Symbol, ">=".to_string()),
                (TokenKind::Number, "1.5e-3".to_string()),
                (TokenKind::Symbol, "<>".to_string()),
                (TokenKind::Number, ".5".to_string()),
            ]
        );
    }

    #[test]
    fn test_unterminated_input_is_an_error() {
        assert!(tokenize("SELECT 'abc").is_err());
        assert!(tokenize("SELECT /* abc").is_err());
        assert!(tokenize("SELECT \"abc").is_err());
    }
}

//! Tokenizer of the expression language.

use super::ElError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    /// `#name`
    Root(String),
    Ident(String),
    Str(String),
    Num(f64),
    True,
    False,
    Null,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    Matches,
    Dot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>, ElError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '#' => {
                let (name, next) = read_ident(&chars, i + 1);
                if name.is_empty() {
                    return Err(ElError::Lex {
                        position: i,
                        reason: "expected a variable name after '#'".into(),
                    });
                }
                tokens.push(Token::Root(name));
                i = next;
            }
            '\'' | '"' => {
                let (literal, next) = read_string(&chars, i)?;
                tokens.push(Token::Str(literal));
                i = next;
            }
            '0'..='9' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    // `1.foo` is a member access on a number, not a decimal.
                    if chars[i] == '.' && !chars.get(i + 1).is_some_and(|n| n.is_ascii_digit()) {
                        break;
                    }
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text.parse::<f64>().map_err(|_| ElError::Lex {
                    position: start,
                    reason: format!("invalid number '{text}'"),
                })?;
                tokens.push(Token::Num(value));
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Le);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            c if c.is_alphabetic() || c == '_' => {
                let (word, next) = read_ident(&chars, i);
                tokens.push(match word.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "matches" => Token::Matches,
                    "eq" => Token::Eq,
                    "ne" => Token::Ne,
                    "lt" => Token::Lt,
                    "le" => Token::Le,
                    "gt" => Token::Gt,
                    "ge" => Token::Ge,
                    _ => Token::Ident(word),
                });
                i = next;
            }
            other => {
                return Err(ElError::Lex {
                    position: i,
                    reason: format!("unexpected character '{other}'"),
                });
            }
        }
    }
    Ok(tokens)
}

fn read_ident(chars: &[char], start: usize) -> (String, usize) {
    let mut end = start;
    while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
        end += 1;
    }
    (chars[start..end].iter().collect(), end)
}

/// Quoted literal; a doubled quote escapes the quote character.
fn read_string(chars: &[char], start: usize) -> Result<(String, usize), ElError> {
    let quote = chars[start];
    let mut out = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                out.push(quote);
                i += 2;
                continue;
            }
            return Ok((out, i + 1));
        }
        out.push(chars[i]);
        i += 1;
    }
    Err(ElError::Lex {
        position: start,
        reason: "unterminated string literal".into(),
    })
}

//! Expression language used by flow-step conditions, plan selection rules
//! and response templates.
//!
//! Expressions read a JSON view of the execution context:
//!
//! ```text
//! {#request.headers['x-tenant'][0] == 'acme' && #request.method != 'GET'}
//! #context.attributes['plan'] matches 'gold-.*'
//! {#api.properties['backend']}/items
//! ```
//!
//! Roots are written `#name` (`request`, `response`, `context`, `message`,
//! `api`, plus any provider contribution); bare identifiers resolve on the
//! evaluation subject first.

mod eval;
mod lexer;
mod parser;

use eval::Scope;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum ElError {
    #[error("syntax error at {position}: {reason}")]
    Lex { position: usize, reason: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("evaluation error: {0}")]
    Eval(String),
}

/// Parsed expression, reusable across evaluations.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    ast: parser::Expr,
}

impl Expression {
    /// Parse an expression, with or without the `{ }` delimiters.
    pub fn parse(source: &str) -> Result<Self, ElError> {
        let body = strip_delimiters(source);
        let ast = parser::parse(lexer::tokenize(body)?)?;
        Ok(Self {
            source: source.to_string(),
            ast,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn evaluate(&self, variables: &Value, subject: &Value) -> Result<Value, ElError> {
        eval::eval(&self.ast, &Scope { variables, subject })
    }

    /// Evaluate a guard; non-boolean results are errors.
    pub fn evaluate_bool(&self, variables: &Value, subject: &Value) -> Result<bool, ElError> {
        match self.evaluate(variables, subject)? {
            Value::Bool(b) => Ok(b),
            other => Err(ElError::Eval(format!(
                "condition '{}' did not evaluate to a boolean (got {other})",
                self.source
            ))),
        }
    }
}

fn strip_delimiters(source: &str) -> &str {
    let trimmed = source.trim();
    trimmed
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .unwrap_or(trimmed)
}

/// Replace every `{#...}` placeholder of `template` by its value.
///
/// Strings are inserted verbatim, `null` as nothing and any other value as
/// its JSON text.
pub fn render(template: &str, variables: &Value) -> Result<String, ElError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{#") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = placeholder_end(after).ok_or_else(|| {
            ElError::Parse(format!("unterminated placeholder in '{template}'"))
        })?;
        let expression = Expression::parse(&after[..end])?;
        match expression.evaluate(variables, &Value::Null)? {
            Value::String(s) => out.push_str(&s),
            Value::Null => {}
            other => out.push_str(&other.to_string()),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Byte offset of the `}` closing a placeholder body, skipping quoted text
/// and nested braces.
fn placeholder_end(body: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in body.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '{') => depth += 1,
            (None, '}') if depth == 0 => return Some(i),
            (None, '}') => depth -= 1,
            _ => {}
        }
    }
    None
}

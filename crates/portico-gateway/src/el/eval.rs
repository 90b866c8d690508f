//! Tree-walking evaluator.

use super::ElError;
use super::parser::{BinaryOp, Expr};
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;

/// Evaluation scope: root variables (`#name`) and the subject bare
/// identifiers resolve against.
pub(crate) struct Scope<'a> {
    pub variables: &'a Value,
    pub subject: &'a Value,
}

pub(crate) fn eval(expr: &Expr, scope: &Scope<'_>) -> Result<Value, ElError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Root(name) => Ok(scope.variables.get(name).cloned().unwrap_or(Value::Null)),
        Expr::Ident(name) => Ok(scope
            .subject
            .get(name)
            .or_else(|| scope.variables.get(name))
            .cloned()
            .unwrap_or(Value::Null)),
        Expr::Member(target, name) => {
            let target = eval(target, scope)?;
            Ok(member(&target, name))
        }
        Expr::Index(target, index) => {
            let target = eval(target, scope)?;
            let index = eval(index, scope)?;
            Ok(match (&target, &index) {
                (Value::Array(items), Value::Number(n)) => n
                    .as_u64()
                    .and_then(|i| items.get(i as usize))
                    .cloned()
                    .unwrap_or(Value::Null),
                (_, Value::String(key)) => member(&target, key),
                _ => Value::Null,
            })
        }
        Expr::Call(target, method, args) => {
            let target = eval(target, scope)?;
            let args = args
                .iter()
                .map(|a| eval(a, scope))
                .collect::<Result<Vec<_>, _>>()?;
            call(&target, method, &args)
        }
        Expr::Not(inner) => {
            let value = eval(inner, scope)?;
            Ok(Value::Bool(!as_bool(&value, "!")?))
        }
        Expr::Binary(BinaryOp::And, left, right) => {
            if !as_bool(&eval(left, scope)?, "&&")? {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(as_bool(&eval(right, scope)?, "&&")?))
        }
        Expr::Binary(BinaryOp::Or, left, right) => {
            if as_bool(&eval(left, scope)?, "||")? {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(as_bool(&eval(right, scope)?, "||")?))
        }
        Expr::Binary(op, left, right) => {
            let left = eval(left, scope)?;
            let right = eval(right, scope)?;
            binary(*op, &left, &right)
        }
    }
}

/// Property access; header arrays resolve case-insensitively.
fn member(target: &Value, name: &str) -> Value {
    match target {
        Value::Object(map) => map
            .get(name)
            .or_else(|| map.get(&name.to_ascii_lowercase()))
            .cloned()
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn as_bool(value: &Value, op: &str) -> Result<bool, ElError> {
    value
        .as_bool()
        .ok_or_else(|| ElError::Eval(format!("operator '{op}' expects a boolean, got {value}")))
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(_), Value::Number(_)) => compare(left, right) == Some(Ordering::Equal),
        _ => left == right,
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ElError> {
    let ordering = || {
        compare(left, right).ok_or_else(|| {
            ElError::Eval(format!("cannot compare {left} with {right}"))
        })
    };
    let result = match op {
        BinaryOp::Eq => equals(left, right),
        BinaryOp::Ne => !equals(left, right),
        BinaryOp::Lt => ordering()? == Ordering::Less,
        BinaryOp::Le => ordering()? != Ordering::Greater,
        BinaryOp::Gt => ordering()? == Ordering::Greater,
        BinaryOp::Ge => ordering()? != Ordering::Less,
        BinaryOp::Matches => {
            let (Value::String(text), Value::String(pattern)) = (left, right) else {
                return Err(ElError::Eval("'matches' expects two strings".into()));
            };
            let regex = Regex::new(&format!("^(?:{pattern})$"))
                .map_err(|e| ElError::Eval(format!("invalid pattern '{pattern}': {e}")))?;
            regex.is_match(text)
        }
        BinaryOp::And => as_bool(left, "&&")? && as_bool(right, "&&")?,
        BinaryOp::Or => as_bool(left, "||")? || as_bool(right, "||")?,
    };
    Ok(Value::Bool(result))
}

fn call(target: &Value, method: &str, args: &[Value]) -> Result<Value, ElError> {
    let string_arg = |i: usize| -> Result<&str, ElError> {
        args.get(i)
            .and_then(Value::as_str)
            .ok_or_else(|| ElError::Eval(format!("'{method}' expects a string argument")))
    };
    match (method, target) {
        ("contains", Value::String(s)) => Ok(Value::Bool(s.contains(string_arg(0)?))),
        ("contains", Value::Array(items)) => {
            let needle = args
                .first()
                .ok_or_else(|| ElError::Eval("'contains' expects an argument".into()))?;
            Ok(Value::Bool(items.iter().any(|item| equals(item, needle))))
        }
        ("containsKey", Value::Object(map)) => Ok(Value::Bool(
            map.contains_key(string_arg(0)?) || map.contains_key(&string_arg(0)?.to_ascii_lowercase()),
        )),
        ("startsWith", Value::String(s)) => Ok(Value::Bool(s.starts_with(string_arg(0)?))),
        ("endsWith", Value::String(s)) => Ok(Value::Bool(s.ends_with(string_arg(0)?))),
        ("toUpperCase", Value::String(s)) => Ok(Value::String(s.to_uppercase())),
        ("toLowerCase", Value::String(s)) => Ok(Value::String(s.to_lowercase())),
        ("size" | "length", Value::String(s)) => Ok(Value::from(s.chars().count())),
        ("size" | "length", Value::Array(items)) => Ok(Value::from(items.len())),
        ("size" | "length", Value::Object(map)) => Ok(Value::from(map.len())),
        ("isEmpty", Value::String(s)) => Ok(Value::Bool(s.is_empty())),
        ("isEmpty", Value::Array(items)) => Ok(Value::Bool(items.is_empty())),
        (_, Value::Null) => Err(ElError::Eval(format!("cannot call '{method}' on null"))),
        (_, other) => Err(ElError::Eval(format!("unknown method '{method}' on {other}"))),
    }
}

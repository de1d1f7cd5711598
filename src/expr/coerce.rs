// Coercion rules shared by the evaluator and the built-in functions
//
// Every implicit conversion the language performs goes through one of
// these functions.

use super::ast::BinOp;
use super::value::{
    parse_date, parse_datetime, parse_time, Type, Value, DATETIME_FORMAT, DATE_FORMAT,
    TIME_FORMAT,
};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::cmp::Ordering;

/// Read a value as a number. Numeric-looking strings coerce; "inf" and
/// "nan" do not.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => Some(*n),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

/// Truthiness in a logical context. `None` is the unknown of
/// three-valued logic and only comes from null.
pub fn as_boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Null(_) => None,
        Value::Boolean(b) => Some(*b),
        Value::Number(n) => Some(*n != 0.0),
        Value::String(s) => Some(!s.is_empty()),
        Value::List(items) => Some(is_populated(items)),
        Value::Date(_) | Value::Time(_) | Value::DateTime(_) => Some(true),
    }
}

/// True only for values whose truthiness is known and true
pub fn is_truthy(value: &Value) -> bool {
    as_boolean(value) == Some(true)
}

/// A list is populated when it holds at least one non-null element
pub fn is_populated(items: &[Value]) -> bool {
    items.iter().any(|item| !item.is_null())
}

/// "exists" reduction of a list: populated, with at least one truthy item
pub fn exists(items: &[Value]) -> bool {
    is_populated(items) && items.iter().any(is_truthy)
}

/// Collapse a result to a single truth value. Lists reduce with `exists`;
/// scalars are returned unchanged.
pub fn as_condition(value: Value) -> Value {
    match value {
        Value::List(items) => Value::Boolean(exists(&items)),
        other => other,
    }
}

/// Result type of an arithmetic operator over two scalar types. Shared by
/// the checker and by the evaluator when it types a null result.
pub fn arithmetic_type(op: BinOp, left: Type, right: Type) -> Option<Type> {
    use Type::*;

    match (left, right) {
        (Untyped, Untyped) => Some(Untyped),
        (String, String) if op == BinOp::Add => Some(String),
        (String, t) | (t, String) if op == BinOp::Add && t.is_temporal() => Some(String),
        (Untyped, String) | (String, Untyped) if op == BinOp::Add => Some(String),
        (Untyped | Number | String, Untyped | Number | String) => Some(Number),
        _ => None,
    }
}

/// Read a value as text. Numbers and temporal values use their canonical
/// textual form.
pub fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Date(d) => Some(d.format(DATE_FORMAT).to_string()),
        Value::Time(t) => Some(t.format(TIME_FORMAT).to_string()),
        Value::DateTime(dt) => Some(dt.format(DATETIME_FORMAT).to_string()),
        Value::Boolean(_) | Value::List(_) | Value::Null(_) => None,
    }
}

/// Operand pair brought to a common orderable domain
#[derive(Debug, Clone, PartialEq)]
pub enum Orderable {
    Number(f64, f64),
    String(String, String),
    Date(NaiveDate, NaiveDate),
    Time(NaiveTime, NaiveTime),
    DateTime(NaiveDateTime, NaiveDateTime),
}

impl Orderable {
    pub fn ordering(&self) -> Option<Ordering> {
        match self {
            Orderable::Number(a, b) => a.partial_cmp(b),
            Orderable::String(a, b) => Some(a.cmp(b)),
            Orderable::Date(a, b) => Some(a.cmp(b)),
            Orderable::Time(a, b) => Some(a.cmp(b)),
            Orderable::DateTime(a, b) => Some(a.cmp(b)),
        }
    }
}

/// Bring two scalars to a common orderable type. Strings coerce toward the
/// other operand's type; a number against a non-numeric string falls back
/// to comparing text.
pub fn as_orderable(left: &Value, right: &Value) -> Option<Orderable> {
    if let Some(pair) = orderable_directed(left, right) {
        return Some(pair);
    }
    orderable_directed(right, left).map(|pair| match pair {
        Orderable::Number(a, b) => Orderable::Number(b, a),
        Orderable::String(a, b) => Orderable::String(b, a),
        Orderable::Date(a, b) => Orderable::Date(b, a),
        Orderable::Time(a, b) => Orderable::Time(b, a),
        Orderable::DateTime(a, b) => Orderable::DateTime(b, a),
    })
}

fn orderable_directed(left: &Value, right: &Value) -> Option<Orderable> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Some(Orderable::Number(*a, *b)),
        (Value::Number(a), Value::String(s)) => match as_number(right) {
            Some(b) => Some(Orderable::Number(*a, b)),
            None => Some(Orderable::String(a.to_string(), s.clone())),
        },
        (Value::String(a), Value::String(b)) => Some(Orderable::String(a.clone(), b.clone())),
        (Value::Date(a), Value::Date(b)) => Some(Orderable::Date(*a, *b)),
        (Value::Date(a), Value::String(s)) => match parse_date(s) {
            Some(b) => Some(Orderable::Date(*a, b)),
            None => parse_datetime(s).map(|b| Orderable::DateTime(midnight(*a), b)),
        },
        (Value::Date(a), Value::DateTime(b)) => Some(Orderable::DateTime(midnight(*a), *b)),
        (Value::Time(a), Value::Time(b)) => Some(Orderable::Time(*a, *b)),
        (Value::Time(a), Value::String(s)) => parse_time(s).map(|b| Orderable::Time(*a, b)),
        (Value::DateTime(a), Value::DateTime(b)) => Some(Orderable::DateTime(*a, *b)),
        (Value::DateTime(a), Value::String(s)) => parse_datetime(s)
            .or_else(|| parse_date(s).map(midnight))
            .map(|b| Orderable::DateTime(*a, b)),
        _ => None,
    }
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// Ordering of two scalars; `None` when either is null or they share no
/// orderable domain
pub fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    if left.is_null() || right.is_null() {
        return None;
    }
    as_orderable(left, right)?.ordering()
}

/// Equality of two values; `None` only when either side is null.
/// Incomparable scalars are unequal.
pub fn equals(left: &Value, right: &Value) -> Option<bool> {
    match (left, right) {
        (Value::Null(_), _) | (_, Value::Null(_)) => None,
        (Value::Boolean(a), Value::Boolean(b)) => Some(a == b),
        (Value::List(a), Value::List(b)) => {
            Some(a.len() == b.len() && a.iter().zip(b).all(|(x, y)| equals(x, y) == Some(true)))
        }
        _ => Some(
            as_orderable(left, right)
                .and_then(|pair| pair.ordering())
                .map(|ordering| ordering == Ordering::Equal)
                .unwrap_or(false),
        ),
    }
}

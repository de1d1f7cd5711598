// Built-in functions and regex matching

use super::ast::{BinOp, Expr};
use super::checker::{is_text_type, is_truthy_type, TypeError};
use super::coerce::{as_boolean, as_number, as_string, is_truthy};
use super::eval::Evaluator;
use super::value::{Type, Value};
use regex::{Regex, RegexBuilder};
use std::collections::HashMap;
use std::fmt;

/// Number of arguments a function accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{}", n),
            Arity::AtLeast(n) => write!(f, "at least {}", n),
        }
    }
}

/// Arity of a built-in, or `None` for an unknown name
pub fn arity(name: &str) -> Option<Arity> {
    let arity = match name {
        "true" | "false" | "null" | "today" | "pi" => Arity::Exact(0),
        "is_true" | "is_false" | "length" | "trim" => Arity::Exact(1),
        "count" | "exists" | "every" | "min" | "max" | "sum" | "avg" => Arity::Exact(1),
        "if" => Arity::Exact(3),
        "coalesce" | "count_true" => Arity::AtLeast(1),
        _ => return None,
    };
    Some(arity)
}

/// Type check a call given its already-checked argument types
pub(crate) fn check_call(name: &str, arg_types: &[Type]) -> Result<Type, TypeError> {
    let expected = arity(name).ok_or_else(|| TypeError::UnknownFunction(name.to_string()))?;
    if !expected.accepts(arg_types.len()) {
        return Err(TypeError::ArityMismatch {
            name: name.to_string(),
            expected,
            found: arg_types.len(),
        });
    }

    let incompatible = || TypeError::IncompatibleOperands {
        context: format!("function '{}'", name),
        types: arg_types.to_vec(),
    };

    match name {
        // if(condition, then, else) -> T
        "if" => {
            if !is_truthy_type(arg_types[0]) {
                return Err(incompatible());
            }
            arg_types[1].unify(arg_types[2]).ok_or_else(incompatible)
        }

        // coalesce(T...) -> T
        "coalesce" => arg_types
            .iter()
            .try_fold(Type::Untyped, |acc, t| acc.unify(*t))
            .ok_or_else(incompatible),

        "is_true" | "is_false" | "true" | "false" => Ok(Type::Boolean),
        "null" => Ok(Type::Untyped),
        "today" => Ok(Type::Date),
        "pi" => Ok(Type::Number),

        // length(string | list) -> number
        "length" => {
            if is_text_type(arg_types[0]) || arg_types[0] == Type::List {
                Ok(Type::Number)
            } else {
                Err(incompatible())
            }
        }

        // trim(string) -> string
        "trim" => {
            if is_text_type(arg_types[0]) {
                Ok(Type::String)
            } else {
                Err(incompatible())
            }
        }

        // Aggregates over a list
        "count" | "exists" | "every" | "min" | "max" | "sum" | "avg" => {
            if !matches!(arg_types[0], Type::List | Type::Untyped) {
                return Err(incompatible());
            }
            match name {
                "exists" | "every" => Ok(Type::Boolean),
                _ => Ok(Type::Number),
            }
        }

        // count_true(any...) -> number
        "count_true" => {
            if arg_types.iter().all(|t| is_truthy_type(*t)) {
                Ok(Type::Number)
            } else {
                Err(incompatible())
            }
        }

        _ => Err(TypeError::UnknownFunction(name.to_string())),
    }
}

/// Evaluate a call. Arguments are evaluated left to right; `if` and
/// `coalesce` evaluate only what they need.
pub(crate) fn call(ev: &Evaluator<'_>, name: &str, args: &[Expr]) -> Value {
    match arity(name) {
        Some(expected) if expected.accepts(args.len()) => {}
        Some(expected) => {
            tracing::warn!(
                function = name,
                expected = %expected,
                found = args.len(),
                "wrong number of arguments at evaluation"
            );
            return Value::null();
        }
        None => {
            tracing::warn!(function = name, "unknown function at evaluation");
            return Value::null();
        }
    }

    match name {
        "if" => {
            if is_truthy(&ev.eval(&args[0])) {
                ev.eval(&args[1])
            } else {
                ev.eval(&args[2])
            }
        }

        "coalesce" => args
            .iter()
            .map(|arg| ev.eval(arg))
            .find(|value| !value.is_null())
            .unwrap_or_else(Value::null),

        "is_true" => Value::Boolean(ev.eval(&args[0]) == Value::Boolean(true)),
        "is_false" => Value::Boolean(ev.eval(&args[0]) == Value::Boolean(false)),

        "true" => Value::Boolean(true),
        "false" => Value::Boolean(false),
        "null" => Value::null(),
        "today" => Value::Date(chrono::Local::now().date_naive()),
        "pi" => Value::Number(std::f64::consts::PI),

        "length" => length(ev.eval(&args[0])),
        "trim" => match ev.eval(&args[0]) {
            Value::Null(_) => Value::Null(Type::String),
            value => as_string(&value)
                .map(|s| Value::String(s.trim().to_string()))
                .unwrap_or(Value::Null(Type::String)),
        },

        "count_true" => {
            let count = args.iter().filter(|arg| is_truthy(&ev.eval(arg))).count();
            Value::Number(count as f64)
        }

        _ => aggregate(name, ev.eval(&args[0])),
    }
}

fn length(value: Value) -> Value {
    let n = match value {
        Value::Null(_) => 0,
        Value::List(items) => items.len(),
        other => as_string(&other).map(|s| s.chars().count()).unwrap_or(0),
    };
    Value::Number(n as f64)
}

/// Elements of a list argument. Null is the empty list and a scalar is a
/// one-element list.
fn elements(value: Value) -> Vec<Value> {
    match value {
        Value::List(items) => items,
        Value::Null(_) => Vec::new(),
        scalar => vec![scalar],
    }
}

fn aggregate(name: &str, value: Value) -> Value {
    let items = elements(value);
    let present = || items.iter().filter(|item| !item.is_null());

    match name {
        "count" => Value::Number(present().count() as f64),
        "exists" => Value::Boolean(present().any(is_truthy)),
        "every" => Value::Boolean(present().all(|item| as_boolean(item) == Some(true))),
        _ => {
            let numbers: Vec<f64> = present().filter_map(as_number).collect();
            if numbers.is_empty() {
                return Value::Null(Type::Number);
            }
            let result = match name {
                "min" => numbers.iter().copied().fold(f64::INFINITY, f64::min),
                "max" => numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                "sum" => numbers.iter().sum(),
                _ => numbers.iter().sum::<f64>() / numbers.len() as f64,
            };
            Value::Number(result)
        }
    }
}

/// Build a regex for `=~` (case-insensitive) or `=~~` (case-sensitive)
pub fn compile_pattern(pattern: &str, case_sensitive: bool) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .build()
}

/// Regexes for the string-literal patterns of a program, compiled once
#[derive(Debug, Clone, Default)]
pub struct PatternCache {
    patterns: HashMap<(String, bool), Regex>,
}

impl PatternCache {
    /// Collect and compile every literal regex operand in `expr`. Invalid
    /// patterns are skipped; they surface as type errors when checked and
    /// as null at evaluation.
    pub fn collect(expr: &Expr) -> Self {
        let mut cache = PatternCache::default();
        cache.visit(expr);
        cache
    }

    fn visit(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(_) | Expr::Ident(_) => {}
            Expr::Locator { key, .. } => self.visit(key),
            Expr::Unary { operand, .. } => self.visit(operand),
            Expr::BinaryOp { op, left, right } => {
                self.visit(left);
                self.visit(right);
                self.insert(*op, right);
            }
            Expr::ChainCompare { op, left, rights } => {
                self.visit(left);
                for right in rights {
                    self.visit(right);
                    self.insert(*op, right);
                }
            }
            Expr::FuncCall { args, .. } | Expr::List(args) => {
                for arg in args {
                    self.visit(arg);
                }
            }
        }
    }

    fn insert(&mut self, op: BinOp, operand: &Expr) {
        let Some(case_sensitive) = case_sensitivity(op) else {
            return;
        };
        if let Expr::Literal(Value::String(pattern)) = operand {
            let key = (pattern.clone(), case_sensitive);
            if self.patterns.contains_key(&key) {
                return;
            }
            if let Ok(regex) = compile_pattern(pattern, case_sensitive) {
                self.patterns.insert(key, regex);
            }
        }
    }

    pub fn get(&self, pattern: &str, case_sensitive: bool) -> Option<&Regex> {
        self.patterns.get(&(pattern.to_string(), case_sensitive))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// `Some(case_sensitive)` for regex operators
pub fn case_sensitivity(op: BinOp) -> Option<bool> {
    match op {
        BinOp::Match | BinOp::NotMatch => Some(false),
        BinOp::MatchCase | BinOp::NotMatchCase => Some(true),
        _ => None,
    }
}

/// Match `text` against `pattern`; `None` if either is null or the pattern
/// does not compile
pub(crate) fn regex_match(
    text: &Value,
    pattern: &Value,
    case_sensitive: bool,
    cache: Option<&PatternCache>,
) -> Option<bool> {
    let text = as_string(text)?;
    let pattern = as_string(pattern)?;

    if let Some(regex) = cache.and_then(|c| c.get(&pattern, case_sensitive)) {
        return Some(regex.is_match(&text));
    }

    match compile_pattern(&pattern, case_sensitive) {
        Ok(regex) => Some(regex.is_match(&text)),
        Err(e) => {
            tracing::warn!(pattern = %pattern, error = %e, "invalid regex pattern at evaluation");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parser::parse;

    fn list(items: Vec<Value>) -> Value {
        Value::List(items)
    }

    #[test]
    fn test_arity_table() {
        assert_eq!(arity("if"), Some(Arity::Exact(3)));
        assert_eq!(arity("coalesce"), Some(Arity::AtLeast(1)));
        assert_eq!(arity("pi"), Some(Arity::Exact(0)));
        assert_eq!(arity("nope"), None);
        assert!(Arity::AtLeast(1).accepts(4));
        assert!(!Arity::Exact(1).accepts(2));
    }

    #[test]
    fn test_check_call_if_unifies_branches() {
        assert_eq!(
            check_call("if", &[Type::Boolean, Type::Number, Type::Untyped]),
            Ok(Type::Number)
        );
        assert!(check_call("if", &[Type::Boolean, Type::Number, Type::String]).is_err());
        assert!(check_call("if", &[Type::Date, Type::Number, Type::Number]).is_err());
    }

    #[test]
    fn test_check_call_arity() {
        let err = check_call("length", &[Type::String, Type::String]).unwrap_err();
        assert!(matches!(err, TypeError::ArityMismatch { found: 2, .. }));
        assert!(err.to_string().contains("expects 1 argument"));
    }

    #[test]
    fn test_check_call_aggregate_requires_list() {
        assert_eq!(check_call("sum", &[Type::List]), Ok(Type::Number));
        assert_eq!(check_call("every", &[Type::Untyped]), Ok(Type::Boolean));
        assert!(check_call("sum", &[Type::Boolean]).is_err());
    }

    #[test]
    fn test_aggregates_skip_nulls() {
        let items = list(vec![Value::from(0), Value::null(), Value::from(1), Value::from(2)]);

        assert_eq!(aggregate("sum", items.clone()), Value::Number(3.0));
        assert_eq!(aggregate("avg", items.clone()), Value::Number(1.0));
        assert_eq!(aggregate("min", items.clone()), Value::Number(0.0));
        assert_eq!(aggregate("max", items.clone()), Value::Number(2.0));
        assert_eq!(aggregate("count", items), Value::Number(3.0));
    }

    #[test]
    fn test_aggregates_empty() {
        assert!(aggregate("avg", list(vec![])).is_null());
        assert!(aggregate("sum", list(vec![Value::null()])).is_null());
        assert_eq!(aggregate("exists", list(vec![])), Value::Boolean(false));
        assert_eq!(aggregate("every", list(vec![])), Value::Boolean(true));
        assert_eq!(aggregate("every", list(vec![Value::null()])), Value::Boolean(true));
        assert_eq!(aggregate("count", Value::Null(Type::List)), Value::Number(0.0));
    }

    #[test]
    fn test_exists_and_every() {
        let mixed = list(vec![Value::from(0), Value::from(1)]);
        assert_eq!(aggregate("exists", mixed.clone()), Value::Boolean(true));
        assert_eq!(aggregate("every", mixed), Value::Boolean(false));
    }

    #[test]
    fn test_length() {
        assert_eq!(length(Value::string("héllo")), Value::Number(5.0));
        assert_eq!(length(list(vec![Value::null(), Value::from(1)])), Value::Number(2.0));
        assert_eq!(length(Value::null()), Value::Number(0.0));
        assert_eq!(length(Value::string("")), Value::Number(0.0));
    }

    #[test]
    fn test_regex_match_case_sensitivity() {
        let text = Value::string("some string");
        let pattern = Value::string("^SOME");

        assert_eq!(regex_match(&text, &pattern, false, None), Some(true));
        assert_eq!(regex_match(&text, &pattern, true, None), Some(false));
        assert_eq!(regex_match(&Value::null(), &pattern, false, None), None);
        assert_eq!(
            regex_match(&text, &Value::string("[unclosed"), false, None),
            None
        );
    }

    #[test]
    fn test_pattern_cache_collects_literals() {
        let expr = parse("a =~ '^x' & b !=~~ '^y', '^z' & c =~ d & e == 'f'").unwrap();
        let cache = PatternCache::collect(&expr);

        assert_eq!(cache.len(), 3);
        assert!(cache.get("^x", false).is_some());
        assert!(cache.get("^x", true).is_none());
        assert!(cache.get("^z", true).is_some());
        assert!(cache.get("f", false).is_none());
    }
}

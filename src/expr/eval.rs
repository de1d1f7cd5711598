// Expression evaluator - runtime evaluation against a field resolver

use super::ast::{BinOp, Expr, KeyPath, UnaryOp};
use super::coerce::{
    arithmetic_type, as_boolean, as_condition, as_number, as_string, compare, equals, exists,
};
use super::compiler::Program;
use super::functions::{self, case_sensitivity, regex_match, PatternCache};
use super::value::{Type, Value};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Supplies the current value of an identifier. Must return a null for
/// anything it cannot satisfy.
pub trait Resolver {
    fn resolve(&self, path: &KeyPath) -> Value;
}

impl<F> Resolver for F
where
    F: Fn(&KeyPath) -> Value,
{
    fn resolve(&self, path: &KeyPath) -> Value {
        self(path)
    }
}

/// Keyed by the dotted path text
impl Resolver for HashMap<String, Value> {
    fn resolve(&self, path: &KeyPath) -> Value {
        self.get(&path.dotted()).cloned().unwrap_or_else(Value::null)
    }
}

impl Program {
    /// Evaluate the program against a resolver
    pub fn eval(&self, resolver: &dyn Resolver) -> Value {
        Evaluator::new(resolver)
            .with_patterns(self.patterns())
            .eval(self.root())
    }

    /// Evaluate as a condition. A list result reduces to one boolean the
    /// way `&` and `|` reduce a list operand.
    pub fn eval_condition(&self, resolver: &dyn Resolver) -> Value {
        as_condition(self.eval(resolver))
    }

    /// Evaluate as a validation condition. Only `false` fails; `true` and
    /// null both pass.
    pub fn validate(&self, resolver: &dyn Resolver) -> bool {
        !matches!(self.eval_condition(resolver), Value::Boolean(false))
    }
}

/// Evaluate a parsed expression without a pattern cache
pub fn evaluate(expr: &Expr, resolver: &dyn Resolver) -> Value {
    Evaluator::new(resolver).eval(expr)
}

/// Tree-walking evaluator. Holds no state between calls.
pub struct Evaluator<'a> {
    resolver: &'a dyn Resolver,
    patterns: Option<&'a PatternCache>,
}

impl<'a> Evaluator<'a> {
    pub fn new(resolver: &'a dyn Resolver) -> Self {
        Evaluator {
            resolver,
            patterns: None,
        }
    }

    /// Use precompiled regexes for literal patterns
    pub fn with_patterns(mut self, patterns: &'a PatternCache) -> Self {
        self.patterns = Some(patterns);
        self
    }

    /// Evaluate an expression recursively
    pub fn eval(&self, expr: &Expr) -> Value {
        match expr {
            Expr::Literal(value) => value.clone(),

            Expr::Ident(path) => self.resolver.resolve(path),

            Expr::Locator { table, key } => match as_string(&self.eval(key)) {
                Some(key) => self.resolver.resolve(&KeyPath::locator(table, key)),
                None => Value::null(),
            },

            Expr::Unary { op, operand } => unary(*op, self.eval(operand)),

            Expr::BinaryOp { op, left, right } => {
                let left = self.eval(left);
                let right = self.eval(right);
                self.binary(*op, left, right)
            }

            // The left operand is evaluated once and shared by every pair
            Expr::ChainCompare { op, left, rights } => {
                let left = self.eval(left);
                let mut result: Option<Value> = None;
                for right in rights {
                    let pair = self.binary(*op, left.clone(), self.eval(right));
                    result = Some(match result {
                        Some(acc) => self.binary(BinOp::And, acc, pair),
                        None => pair,
                    });
                }
                result.unwrap_or(Value::Null(Type::Boolean))
            }

            Expr::FuncCall { name, args } => functions::call(self, name, args),

            Expr::List(items) => Value::List(items.iter().map(|item| self.eval(item)).collect()),
        }
    }

    /// Apply a binary operator, broadcasting over lists
    fn binary(&self, op: BinOp, left: Value, right: Value) -> Value {
        match (left, right) {
            // Pairwise by index; the shorter side is padded with null
            (Value::List(l), Value::List(r)) => {
                let len = l.len().max(r.len());
                let mut l = l.into_iter();
                let mut r = r.into_iter();
                let items = (0..len)
                    .map(|_| {
                        let a = l.next().unwrap_or_else(Value::null);
                        let b = r.next().unwrap_or_else(Value::null);
                        self.binary(op, a, b)
                    })
                    .collect();
                Value::List(items)
            }

            // Logic reduces the list first; everything else broadcasts
            (Value::List(items), scalar) if op.is_logical() => {
                self.scalar(op, Value::Boolean(exists(&items)), scalar)
            }
            (scalar, Value::List(items)) if op.is_logical() => {
                self.scalar(op, scalar, Value::Boolean(exists(&items)))
            }
            (Value::List(items), scalar) => Value::List(
                items
                    .into_iter()
                    .map(|item| self.binary(op, item, scalar.clone()))
                    .collect(),
            ),
            (scalar, Value::List(items)) => Value::List(
                items
                    .into_iter()
                    .map(|item| self.binary(op, scalar.clone(), item))
                    .collect(),
            ),

            (left, right) => self.scalar(op, left, right),
        }
    }

    fn scalar(&self, op: BinOp, left: Value, right: Value) -> Value {
        match op {
            BinOp::And => kleene_and(as_boolean(&left), as_boolean(&right)),
            BinOp::Or => kleene_or(as_boolean(&left), as_boolean(&right)),

            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => arithmetic(op, left, right),

            BinOp::Eq => boolean(equals(&left, &right)),
            BinOp::Neq => boolean(equals(&left, &right).map(|eq| !eq)),

            BinOp::Lt => boolean(compare(&left, &right).map(Ordering::is_lt)),
            BinOp::Le => boolean(compare(&left, &right).map(Ordering::is_le)),
            BinOp::Gt => boolean(compare(&left, &right).map(Ordering::is_gt)),
            BinOp::Ge => boolean(compare(&left, &right).map(Ordering::is_ge)),

            BinOp::Match | BinOp::NotMatch | BinOp::MatchCase | BinOp::NotMatchCase => {
                let case_sensitive = case_sensitivity(op).unwrap_or(false);
                let matched = regex_match(&left, &right, case_sensitive, self.patterns);
                let negate = matches!(op, BinOp::NotMatch | BinOp::NotMatchCase);
                boolean(matched.map(|m| m != negate))
            }
        }
    }
}

fn boolean(value: Option<bool>) -> Value {
    value.map(Value::Boolean).unwrap_or(Value::Null(Type::Boolean))
}

fn kleene_and(left: Option<bool>, right: Option<bool>) -> Value {
    match (left, right) {
        (Some(false), _) | (_, Some(false)) => Value::Boolean(false),
        (Some(true), Some(true)) => Value::Boolean(true),
        _ => Value::Null(Type::Boolean),
    }
}

fn kleene_or(left: Option<bool>, right: Option<bool>) -> Value {
    match (left, right) {
        (Some(true), _) | (_, Some(true)) => Value::Boolean(true),
        (Some(false), Some(false)) => Value::Boolean(false),
        _ => Value::Null(Type::Boolean),
    }
}

fn unary(op: UnaryOp, operand: Value) -> Value {
    match (op, operand) {
        (_, Value::List(items)) => {
            Value::List(items.into_iter().map(|item| unary(op, item)).collect())
        }
        (UnaryOp::Not, value) => boolean(as_boolean(&value).map(|b| !b)),
        (UnaryOp::Neg, value) => as_number(&value)
            .map(|n| Value::Number(-n))
            .unwrap_or(Value::Null(Type::Number)),
    }
}

fn arithmetic(op: BinOp, left: Value, right: Value) -> Value {
    if left.is_null() || right.is_null() {
        let ty = arithmetic_type(op, left.ty(), right.ty()).unwrap_or(Type::Number);
        return Value::Null(ty);
    }

    if op == BinOp::Add && is_concatenation(&left, &right) {
        return match (as_string(&left), as_string(&right)) {
            (Some(l), Some(r)) => Value::String(l + &r),
            _ => Value::Null(Type::String),
        };
    }

    let (Some(l), Some(r)) = (as_number(&left), as_number(&right)) else {
        return Value::Null(Type::Number);
    };
    match op {
        BinOp::Add => Value::Number(l + r),
        BinOp::Sub => Value::Number(l - r),
        BinOp::Mul => Value::Number(l * r),
        _ if r == 0.0 => Value::Null(Type::Number),
        _ => Value::Number(l / r),
    }
}

/// `+` joins text when both sides are strings, or a string meets a
/// temporal value
fn is_concatenation(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::String(_), Value::String(_)) => true,
        (Value::String(_), other) | (other, Value::String(_)) => other.ty().is_temporal(),
        _ => false,
    }
}

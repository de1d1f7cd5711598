// Static type checker for the expression language

use super::ast::{BinOp, Expr, KeyPath, UnaryOp};
use super::coerce::arithmetic_type;
use super::functions::{self, compile_pattern, Arity};
use super::value::{Type, Value};
use std::collections::{BTreeSet, HashMap};

/// Static type error. Raised before evaluation; a program that fails
/// checking must not be evaluated.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TypeError {
    #[error("Type error: incompatible operand types for {context}: {}", join_types(.types))]
    IncompatibleOperands { context: String, types: Vec<Type> },

    #[error("Type error: unknown identifier '{0}'")]
    UnknownIdentifier(KeyPath),

    #[error("Type error: function '{name}' expects {expected} argument(s), found {found}")]
    ArityMismatch {
        name: String,
        expected: Arity,
        found: usize,
    },

    #[error("Type error: unknown function '{0}'")]
    UnknownFunction(String),

    #[error("Type error: invalid regex pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

fn join_types(types: &[Type]) -> String {
    types
        .iter()
        .map(Type::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Declared types of the identifiers an expression may reference
pub trait Schema {
    /// Type of the field at `path`, or `None` when the schema has no such
    /// field
    fn type_of(&self, path: &KeyPath) -> Option<Type>;
}

impl<F> Schema for F
where
    F: Fn(&KeyPath) -> Option<Type>,
{
    fn type_of(&self, path: &KeyPath) -> Option<Type> {
        self(path)
    }
}

/// Keyed by the dotted path text, e.g. `"household.age"`
impl Schema for HashMap<String, Type> {
    fn type_of(&self, path: &KeyPath) -> Option<Type> {
        self.get(&path.dotted()).copied()
    }
}

/// Infer the type of `expr` against `schema`
pub fn check(expr: &Expr, schema: &dyn Schema) -> Result<Type, TypeError> {
    match expr {
        Expr::Literal(value) => Ok(value.ty()),

        Expr::Ident(path) => schema
            .type_of(path)
            .ok_or_else(|| TypeError::UnknownIdentifier(path.clone())),

        // Locators are opaque references
        Expr::Locator { key, .. } => {
            check(key, schema)?;
            Ok(Type::Untyped)
        }

        Expr::Unary { op, operand } => {
            let operand_type = check(operand, schema)?;
            check_unary(*op, operand_type)
        }

        Expr::BinaryOp { op, left, right } => {
            let left_type = check(left, schema)?;
            let right_type = check(right, schema)?;
            check_pattern(*op, right)?;
            check_binary(*op, left_type, right_type)
        }

        Expr::ChainCompare { op, left, rights } => {
            let left_type = check(left, schema)?;
            let mut result: Option<Type> = None;
            for right in rights {
                let right_type = check(right, schema)?;
                check_pattern(*op, right)?;
                let pair = check_binary(*op, left_type, right_type)?;
                result = Some(match result {
                    Some(acc) => logical_result(acc, pair),
                    None => pair,
                });
            }
            Ok(result.unwrap_or(Type::Boolean))
        }

        Expr::FuncCall { name, args } => {
            // Report the name before looking at arguments
            if functions::arity(name).is_none() {
                return Err(TypeError::UnknownFunction(name.clone()));
            }
            let arg_types = args
                .iter()
                .map(|arg| check(arg, schema))
                .collect::<Result<Vec<_>, _>>()?;
            functions::check_call(name, &arg_types)
        }

        Expr::List(items) => {
            for item in items {
                check(item, schema)?;
            }
            Ok(Type::List)
        }
    }
}

fn check_unary(op: UnaryOp, operand: Type) -> Result<Type, TypeError> {
    match (op, operand) {
        (_, Type::List) => Ok(Type::List),
        (UnaryOp::Not, t) if is_truthy_type(t) => Ok(Type::Boolean),
        (UnaryOp::Neg, Type::Untyped | Type::Number | Type::String) => Ok(Type::Number),
        _ => Err(TypeError::IncompatibleOperands {
            context: format!("unary '{}'", op),
            types: vec![operand],
        }),
    }
}

/// Result type of a binary operator applied to already-checked operands
fn check_binary(op: BinOp, left: Type, right: Type) -> Result<Type, TypeError> {
    let incompatible = || TypeError::IncompatibleOperands {
        context: format!("operator '{}'", op),
        types: vec![left, right],
    };

    if op.is_logical() {
        if is_truthy_type(left) && is_truthy_type(right) {
            return Ok(logical_result(left, right));
        }
        return Err(incompatible());
    }

    // Everything else broadcasts over lists; elements are checked at
    // evaluation time.
    if left == Type::List || right == Type::List {
        return Ok(Type::List);
    }

    if op.is_arithmetic() {
        return arithmetic_type(op, left, right).ok_or_else(incompatible);
    }

    if op.is_regex() {
        if is_text_type(left) && is_text_type(right) {
            return Ok(Type::Boolean);
        }
        return Err(incompatible());
    }

    let compatible = if op.is_equality() {
        comparable(left, right) || (left == Type::Boolean && right == Type::Boolean)
    } else {
        comparable(left, right)
    };
    if compatible {
        Ok(Type::Boolean)
    } else {
        Err(incompatible())
    }
}

/// `&`/`|` of two lists is pairwise; anything else reduces to a boolean
fn logical_result(left: Type, right: Type) -> Type {
    if left == Type::List && right == Type::List {
        Type::List
    } else {
        Type::Boolean
    }
}

/// Types that have a truthiness
pub(crate) fn is_truthy_type(t: Type) -> bool {
    matches!(
        t,
        Type::Untyped | Type::Boolean | Type::Number | Type::String | Type::List
    )
}

/// Types that read as text
pub(crate) fn is_text_type(t: Type) -> bool {
    matches!(t, Type::Untyped | Type::String | Type::Number) || t.is_temporal()
}

/// Whether two scalar types share an orderable domain
fn comparable(left: Type, right: Type) -> bool {
    use Type::*;

    match (left, right) {
        (Untyped, _) | (_, Untyped) => true,
        (Number | String, Number | String) => true,
        (Date | DateTime, Date | DateTime) => true,
        (Time, Time) => true,
        (String, t) | (t, String) => t.is_temporal(),
        _ => false,
    }
}

/// Validate a literal regex operand
fn check_pattern(op: BinOp, pattern: &Expr) -> Result<(), TypeError> {
    let Some(case_sensitive) = functions::case_sensitivity(op) else {
        return Ok(());
    };
    if let Expr::Literal(Value::String(pattern)) = pattern {
        compile_pattern(pattern, case_sensitive).map_err(|e| TypeError::InvalidPattern {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;
    }
    Ok(())
}

/// Distinct identifiers referenced by `expr`, in sorted order. Locators
/// are not included.
pub fn names(expr: &Expr) -> BTreeSet<KeyPath> {
    let mut out = BTreeSet::new();
    collect_names(expr, &mut out);
    out
}

fn collect_names(expr: &Expr, out: &mut BTreeSet<KeyPath>) {
    match expr {
        Expr::Literal(_) => {}
        Expr::Ident(path) => {
            out.insert(path.clone());
        }
        Expr::Locator { key, .. } => collect_names(key, out),
        Expr::Unary { operand, .. } => collect_names(operand, out),
        Expr::BinaryOp { left, right, .. } => {
            collect_names(left, out);
            collect_names(right, out);
        }
        Expr::ChainCompare { left, rights, .. } => {
            collect_names(left, out);
            rights.iter().for_each(|right| collect_names(right, out));
        }
        Expr::FuncCall { args: items, .. } | Expr::List(items) => {
            items.iter().for_each(|item| collect_names(item, out));
        }
    }
}

// Abstract Syntax Tree (AST) for the expression language

use super::value::Value;
use std::fmt;

/// Dotted path naming a field, a record-list sub-field, or a parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyPath(Vec<String>);

impl KeyPath {
    pub fn new(segments: Vec<String>) -> Self {
        KeyPath(segments)
    }

    /// Path used to resolve `@table[key]`
    pub fn locator(table: &str, key: impl Into<String>) -> Self {
        KeyPath(vec![format!("@{}", table), key.into()])
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn first(&self) -> &str {
        self.0.first().map(String::as_str).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Segments joined with '.', unquoted
    pub fn dotted(&self) -> String {
        self.0.join(".")
    }

    /// Table name when this is a locator path
    pub fn locator_table(&self) -> Option<&str> {
        self.first().strip_prefix('@')
    }
}

impl From<&str> for KeyPath {
    fn from(path: &str) -> Self {
        KeyPath(path.split('.').map(str::to_string).collect())
    }
}

fn is_plain_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {
            chars.all(|ch| ch.is_alphanumeric() || ch == '_')
        }
        _ => false,
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            if is_plain_segment(segment) {
                write!(f, "{}", segment)?;
            } else {
                write!(f, "\"{}\"", segment.replace('\\', "\\\\").replace('"', "\\\""))?;
            }
        }
        Ok(())
    }
}

/// Expression AST node. Built once by the parser and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal value (number, string, date/time, or constant list)
    Literal(Value),

    /// Field reference by key path
    Ident(KeyPath),

    /// Reference into a table, `@table[key]`
    Locator { table: String, key: Box<Expr> },

    /// Unary operation (`!`, `-`)
    Unary { op: UnaryOp, operand: Box<Expr> },

    /// Binary operation
    BinaryOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// `left OP a, b, c`: the conjunction `left OP a & left OP b & left OP c`
    ChainCompare {
        op: BinOp,
        left: Box<Expr>,
        rights: Vec<Expr>,
    },

    /// Function call; method calls `x.f(a)` are stored as `f(x, a)`
    FuncCall { name: String, args: Vec<Expr> },

    /// List literal `[a, b, c]`
    List(Vec<Expr>),
}

/// Prints a fully parenthesised source form that parses back to an
/// equivalent tree.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(Value::Number(n)) if n.is_sign_negative() => write!(f, "({})", n),
            Expr::Literal(value) => write!(f, "{}", value),
            Expr::Ident(path) => write!(f, "{}", path),
            Expr::Locator { table, key } => write!(f, "@{}[{}]", table, key),
            Expr::Unary { op, operand } => write!(f, "({}{})", op, operand),
            Expr::BinaryOp { op, left, right } => write!(f, "({} {} {})", left, op, right),
            Expr::ChainCompare { op, left, rights } => {
                write!(f, "({} {} ", left, op)?;
                write_list(f, rights)?;
                write!(f, ")")
            }
            Expr::FuncCall { name, args } => {
                write!(f, "{}(", name)?;
                write_list(f, args)?;
                write!(f, ")")
            }
            Expr::List(items) => {
                write!(f, "[")?;
                write_list(f, items)?;
                write!(f, "]")
            }
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Logical negation (!)
    Not,
    /// Numeric negation (-)
    Neg,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Not => write!(f, "!"),
            UnaryOp::Neg => write!(f, "-"),
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Or,
    And,
    Eq,
    Neq,
    /// Case-insensitive regex match (=~)
    Match,
    /// Case-insensitive regex non-match (!=~)
    NotMatch,
    /// Case-sensitive regex match (=~~)
    MatchCase,
    /// Case-sensitive regex non-match (!=~~)
    NotMatchCase,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(self, BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div)
    }

    pub fn is_equality(self) -> bool {
        matches!(self, BinOp::Eq | BinOp::Neq)
    }

    pub fn is_relational(self) -> bool {
        matches!(self, BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge)
    }

    pub fn is_regex(self) -> bool {
        matches!(
            self,
            BinOp::Match | BinOp::NotMatch | BinOp::MatchCase | BinOp::NotMatchCase
        )
    }

    /// Operators that accept chained right-hand sides
    pub fn is_comparison(self) -> bool {
        self.is_equality() || self.is_relational() || self.is_regex()
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinOp::Or => "|",
            BinOp::And => "&",
            BinOp::Eq => "==",
            BinOp::Neq => "!=",
            BinOp::Match => "=~",
            BinOp::NotMatch => "!=~",
            BinOp::MatchCase => "=~~",
            BinOp::NotMatchCase => "!=~~",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
        };
        f.write_str(symbol)
    }
}

// Runtime values and the type tags of the expression language

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S";
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Type tag of a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    /// Type of `null()` and of unresolved identifiers
    Untyped,
    Boolean,
    Number,
    String,
    Date,
    Time,
    DateTime,
    /// Heterogeneous sequence of values
    List,
}

impl Type {
    /// Unify two types. `Untyped` yields the other side; otherwise both
    /// sides must agree.
    pub fn unify(self, other: Type) -> Option<Type> {
        match (self, other) {
            (Type::Untyped, t) | (t, Type::Untyped) => Some(t),
            (a, b) if a == b => Some(a),
            _ => None,
        }
    }

    pub fn is_temporal(self) -> bool {
        matches!(self, Type::Date | Type::Time | Type::DateTime)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Type::Untyped => "untyped",
            Type::Boolean => "boolean",
            Type::Number => "number",
            Type::String => "string",
            Type::Date => "date",
            Type::Time => "time",
            Type::DateTime => "dateTime",
            Type::List => "list",
        };
        f.write_str(name)
    }
}

/// Runtime value. `Null` is the unknown payload and keeps the type it
/// would have had.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null(Type),
    Boolean(bool),
    Number(f64),
    String(String),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    List(Vec<Value>),
}

impl Value {
    /// The untyped null, `null()`
    pub fn null() -> Self {
        Value::Null(Type::Untyped)
    }

    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(items.into_iter().collect())
    }

    pub fn ty(&self) -> Type {
        match self {
            Value::Null(t) => *t,
            Value::Boolean(_) => Type::Boolean,
            Value::Number(_) => Type::Number,
            Value::String(_) => Type::String,
            Value::Date(_) => Type::Date,
            Value::Time(_) => Type::Time,
            Value::DateTime(_) => Type::DateTime,
            Value::List(_) => Type::List,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null(_))
    }

    /// Structural equality where every null equals every other null,
    /// whatever type it carries.
    pub fn same_as(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null(_), Value::Null(_)) => true,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_as(y))
            }
            (a, b) => a == b,
        }
    }

    /// Convert a JSON answer into a value. `declared` is the field's type
    /// when known; it types nulls and decides how strings are read.
    pub fn from_json(json: &serde_json::Value, declared: Option<Type>) -> Value {
        use serde_json::Value as Json;

        match json {
            Json::Null => Value::Null(declared.unwrap_or(Type::Untyped)),
            Json::Bool(b) => Value::Boolean(*b),
            Json::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null(Type::Number)),
            Json::String(s) => {
                let parsed = match declared {
                    Some(Type::Date) => parse_date(s).map(Value::Date),
                    Some(Type::Time) => parse_time(s).map(Value::Time),
                    Some(Type::DateTime) => parse_datetime(s).map(Value::DateTime),
                    Some(Type::Number) => s.trim().parse::<f64>().ok().map(Value::Number),
                    _ => None,
                };
                parsed.unwrap_or_else(|| Value::String(s.clone()))
            }
            Json::Array(items) => {
                Value::List(items.iter().map(|item| Value::from_json(item, None)).collect())
            }
            Json::Object(_) => Value::null(),
        }
    }

    /// Convert to JSON for reporting. Temporal values print as ISO-8601.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            Value::Null(_) => Json::Null,
            Value::Boolean(b) => Json::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.clone()),
            Value::Date(d) => Json::String(d.format(DATE_FORMAT).to_string()),
            Value::Time(t) => Json::String(t.format(TIME_FORMAT).to_string()),
            Value::DateTime(dt) => Json::String(dt.format(DATETIME_FORMAT).to_string()),
            Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

/// Prints the value in source form, so a printed literal lexes back to
/// the same value.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null(_) => write!(f, "null()"),
            Value::Boolean(true) => write!(f, "true()"),
            Value::Boolean(false) => write!(f, "false()"),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => {
                write!(f, "'")?;
                for ch in s.chars() {
                    match ch {
                        '\'' => write!(f, "\\'")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        '\r' => write!(f, "\\r")?,
                        _ => write!(f, "{}", ch)?,
                    }
                }
                write!(f, "'")
            }
            Value::Date(d) => write!(f, "'{}'", d.format(DATE_FORMAT)),
            Value::Time(t) => write!(f, "'{}'", t.format(TIME_FORMAT)),
            Value::DateTime(dt) => write!(f, "'{}'", dt.format(DATETIME_FORMAT)),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok()
}

pub fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
}

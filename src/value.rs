use std::fmt;

use crate::common::sql_quote;

/// A single column value of a generated row.
#[derive(Debug, PartialEq, Clone)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    /// Renders the value as a SQL literal usable inside a statement text.
    #[must_use]
    pub fn to_sql_literal(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Integer(v) => v.to_string(),
            Self::Real(v) => real_literal(*v),
            Self::Text(v) => sql_quote(v),
        }
    }

    /// Renders the value as one CSV field, quoting when needed.
    #[must_use]
    pub fn to_csv_field(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Integer(v) => v.to_string(),
            Self::Real(v) => real_literal(*v),
            Self::Text(v) => {
                if v.contains([',', '"', '\n', '\r']) {
                    format!("\"{}\"", v.replace('"', "\"\""))
                } else {
                    v.clone()
                }
            }
        }
    }

    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_real(&self) -> Option<f64> {
        match self {
            Self::Real(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }
}

// Always keeps a decimal point so the engine sees a REAL literal.
fn real_literal(v: f64) -> String {
    let out = v.to_string();
    if out.contains(['.', 'e', 'E', 'N', 'i']) {
        out
    } else {
        format!("{out}.0")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<sqlite::Value> for Value {
    fn from(v: sqlite::Value) -> Self {
        match v {
            sqlite::Value::Null => Self::Null,
            sqlite::Value::Integer(i) => Self::Integer(i),
            sqlite::Value::Float(r) => Self::Real(r),
            sqlite::Value::String(s) => Self::Text(s),
            sqlite::Value::Binary(bytes) => Self::Text(String::from_utf8_lossy(&bytes).into_owned()),
        }
    }
}

/// One generated record, addressed to a table by name. Values follow the
/// table's column order.
#[derive(Debug, PartialEq, Clone)]
pub struct Row {
    pub table: &'static str,
    pub values: Vec<Value>,
}

impl Row {
    #[must_use]
    pub const fn new(table: &'static str, values: Vec<Value>) -> Self {
        Self { table, values }
    }

    #[must_use]
    pub fn to_csv_line(&self) -> String {
        self.values
            .iter()
            .map(Value::to_csv_field)
            .collect::<Vec<_>>()
            .join(",")
    }

    #[must_use]
    pub fn to_sql_tuple(&self) -> String {
        let literals: Vec<String> = self.values.iter().map(Value::to_sql_literal).collect();
        format!("({})", literals.join(", "))
    }
}

// src/value.rs

use std::fmt;

use thiserror::Error;

/// The closed set of scalar kinds a flag (or a list element) can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    Bool,
    Int,
    Uint,
    Float,
    Str,
}

impl Scalar {
    /// The kind's zero value, used to initialize storage slots that carry no
    /// explicit default.
    pub(crate) fn zero(self) -> Value {
        match self {
            Self::Bool => Value::Bool(false),
            Self::Int => Value::Int(0),
            Self::Uint => Value::Uint(0),
            Self::Float => Value::Float(0.0),
            Self::Str => Value::Str(String::new()),
        }
    }

    /// The type column token in help output. Booleans render as the bare flag
    /// by convention, so their token is empty.
    pub(crate) fn type_token(self) -> &'static str {
        match self {
            Self::Bool => "",
            Self::Int => "int",
            Self::Uint => "uint",
            Self::Float => "float",
            Self::Str => "string",
        }
    }

    fn kind_name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Uint => "uint",
            Self::Float => "float",
            Self::Str => "string",
        }
    }
}

/// One parsed flag value. List values hold homogeneous scalar elements.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Uint(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v}"),
            Self::List(vs) => {
                write!(f, "[")?;
                for (i, v) in vs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// A raw string failed to parse as the expected kind.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("invalid {kind} value '{raw}': {reason}")]
pub struct ValueError {
    pub(crate) kind: &'static str,
    pub(crate) raw: String,
    pub(crate) reason: String,
}

impl ValueError {
    fn new(kind: &'static str, raw: &str, reason: impl fmt::Display) -> Self {
        Self {
            kind,
            raw: raw.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Parses a single scalar value. Booleans accept only `true` / `false`;
/// numbers are base 10 and overflow is an error, never clamped.
pub(crate) fn parse_scalar(scalar: Scalar, raw: &str) -> Result<Value, ValueError> {
    match scalar {
        Scalar::Bool => raw
            .parse::<bool>()
            .map(Value::Bool)
            .map_err(|e| ValueError::new("bool", raw, e)),
        Scalar::Int => raw
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|e| ValueError::new("int", raw, e)),
        Scalar::Uint => raw
            .parse::<u64>()
            .map(Value::Uint)
            .map_err(|e| ValueError::new("uint", raw, e)),
        Scalar::Float => raw
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|e| ValueError::new("float", raw, e)),
        Scalar::Str => Ok(Value::Str(raw.to_string())),
    }
}

/// Parses a comma-separated list as a single CSV record, so quoting works the
/// way users expect (`a,"b,c"` is two elements). Elements are trimmed and
/// empty elements are dropped; the empty string is an empty list.
pub(crate) fn parse_list(scalar: Scalar, raw: &str) -> Result<Value, ValueError> {
    if raw.is_empty() {
        return Ok(Value::List(Vec::new()));
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(raw.as_bytes());
    let mut elements = Vec::new();
    if let Some(record) = reader.records().next() {
        let record = record.map_err(|e| ValueError::new(scalar.kind_name(), raw, e))?;
        for element in record.iter() {
            let element = element.trim();
            if element.is_empty() {
                continue;
            }
            elements.push(parse_scalar(scalar, element)?);
        }
    }
    Ok(Value::List(elements))
}

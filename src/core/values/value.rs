use crate::core::error::DataError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Dynamically tagged data value used for parameters, event payloads and
/// observation samples.
///
/// Containers own their children. Maps are ordered by key so that two runs
/// over the same input serialise identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Table(Table),
}

impl Value {
    /// Get a human-readable name of the variant
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Table(_) => "table",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of the value; integers are widened.
    pub fn to_double(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Value::Table(table) => Some(table),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NA"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Double(d) => write!(f, "{}", d),
            Value::String(s) => write!(f, "{}", s),
            Value::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            Value::Map(map) => {
                write!(f, "(")?;
                for (i, (key, item)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}:{}", key, item)?;
                }
                write!(f, ")")
            }
            Value::Table(table) => write!(f, "table({}x{})", table.width(), table.height()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl From<Table> for Value {
    fn from(value: Table) -> Self {
        Value::Table(value)
    }
}

/// Two-dimensional table of doubles stored row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TableRepr", into = "TableRepr")]
pub struct Table {
    width: usize,
    height: usize,
    data: Vec<f64>,
}

#[derive(Serialize, Deserialize)]
struct TableRepr {
    width: usize,
    height: usize,
    data: Vec<f64>,
}

impl TryFrom<TableRepr> for Table {
    type Error = DataError;

    fn try_from(repr: TableRepr) -> Result<Self, Self::Error> {
        if repr.data.len() != repr.width * repr.height {
            return Err(DataError::BadShape {
                width: repr.width,
                height: repr.height,
                expected: repr.width * repr.height,
                found: repr.data.len(),
            });
        }
        Ok(Table {
            width: repr.width,
            height: repr.height,
            data: repr.data,
        })
    }
}

impl From<Table> for TableRepr {
    fn from(table: Table) -> Self {
        TableRepr {
            width: table.width,
            height: table.height,
            data: table.data,
        }
    }
}

impl Table {
    /// Create a zero-filled table
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, column: usize, row: usize) -> Option<f64> {
        if column < self.width && row < self.height {
            Some(self.data[row * self.width + column])
        } else {
            None
        }
    }

    pub fn set(&mut self, column: usize, row: usize, value: f64) -> Result<(), DataError> {
        if column >= self.width || row >= self.height {
            return Err(DataError::OutOfBounds {
                column,
                row,
                width: self.width,
                height: self.height,
            });
        }
        self.data[row * self.width + column] = value;
        Ok(())
    }
}

//! Values, parameter identifiers, rows and bound variables.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// Driver options passed when connecting or preparing, keyed by option name.
pub type DriverOptions = BTreeMap<String, Value>;

/// A single SQL value.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    /// Returns true for SQL `NULL`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the integer payload, if this is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the text payload, if this is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Declared type of a bound parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ParamType {
    Null,
    Int,
    #[default]
    Str,
    Lob,
    Bool,
}

/// Identifies a placeholder or a result column: 1-based position or name.
///
/// Names are stored without the leading `:` so `":id"` and `"id"` refer to
/// the same placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParamId {
    Position(usize),
    Name(String),
}

impl ParamId {
    /// Creates a named identifier, stripping a leading `:`.
    pub fn name(name: impl AsRef<str>) -> Self {
        let name = name.as_ref();
        ParamId::Name(name.strip_prefix(':').unwrap_or(name).to_string())
    }
}

impl From<usize> for ParamId {
    fn from(position: usize) -> Self {
        ParamId::Position(position)
    }
}

impl From<&str> for ParamId {
    fn from(name: &str) -> Self {
        ParamId::name(name)
    }
}

impl From<String> for ParamId {
    fn from(name: String) -> Self {
        ParamId::name(name)
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamId::Position(p) => write!(f, "{p}"),
            ParamId::Name(n) => write!(f, ":{n}"),
        }
    }
}

/// Parameters supplied directly to `execute`.
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    Positional(Vec<Value>),
    Named(Vec<(String, Value)>),
}

impl Params {
    /// Builds a named parameter list.
    pub fn named<K, V, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        Params::Named(
            pairs
                .into_iter()
                .map(|(k, v)| {
                    let k = k.as_ref();
                    (k.strip_prefix(':').unwrap_or(k).to_string(), v.into())
                })
                .collect(),
        )
    }

    /// Looks up a parameter by identifier.
    pub fn get(&self, id: &ParamId) -> Option<&Value> {
        match (self, id) {
            (Params::Positional(values), ParamId::Position(p)) => {
                p.checked_sub(1).and_then(|i| values.get(i))
            }
            (Params::Named(pairs), ParamId::Name(name)) => {
                pairs.iter().find(|(k, _)| k == name).map(|(_, v)| v)
            }
            _ => None,
        }
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Params::Positional(values)
    }
}

/// A variable bound by reference.
///
/// Cloning a `BoundVar` shares the cell: the caller keeps one handle, the
/// statement (and its seed data) keeps another, so a value set after
/// `bind_param` is the one the driver sees at execute time, and a column
/// bound with `bind_column` is updated in place after every fetch.
#[derive(Clone, Default, PartialEq)]
pub struct BoundVar(Rc<RefCell<Value>>);

impl BoundVar {
    /// Creates a variable holding the given value.
    pub fn new(value: impl Into<Value>) -> Self {
        Self(Rc::new(RefCell::new(value.into())))
    }

    /// Returns a copy of the current value.
    pub fn get(&self) -> Value {
        self.0.borrow().clone()
    }

    /// Replaces the value.
    pub fn set(&self, value: impl Into<Value>) {
        *self.0.borrow_mut() = value.into();
    }

    /// Returns true if both handles share one cell.
    pub fn same_cell(&self, other: &BoundVar) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for BoundVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BoundVar").field(&*self.0.borrow()).finish()
    }
}

/// A fetched row with positional and named access.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    /// Creates a row; `values` are in column order.
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Returns the value at the 0-based index.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Returns the value of the named column.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == name)
            .and_then(|i| self.values.get(i))
    }

    /// Resolves a column identifier (1-based position or name).
    pub fn column(&self, id: &ParamId) -> Option<&Value> {
        match id {
            ParamId::Position(p) => p.checked_sub(1).and_then(|i| self.values.get(i)),
            ParamId::Name(name) => self.get_by_name(name),
        }
    }

    /// Returns the column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the values in column order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consumes the row, returning its values.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Conversion used by `fetch_object`.
pub trait FromRow: Sized {
    /// Builds the object from a fetched row.
    fn from_row(row: &Row) -> Self;
}

impl FromRow for Row {
    fn from_row(row: &Row) -> Self {
        row.clone()
    }
}

/// Column metadata reported by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnMeta {
    pub name: String,
    pub table: Option<String>,
    pub native_type: Option<String>,
    pub len: Option<i64>,
    pub precision: Option<i64>,
}

/// Extended error information for the last operation on a handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub sqlstate: String,
    pub code: Option<i64>,
    pub message: Option<String>,
}

impl Default for ErrorInfo {
    fn default() -> Self {
        Self {
            sqlstate: sql_reconnect_core::error::SUCCESS_SQLSTATE.to_string(),
            code: None,
            message: None,
        }
    }
}

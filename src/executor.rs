//! Statement execution interface and row values.
//!
//! The manager never runs SQL itself. Sessions that can do so implement
//! [`Executor`]; callers reach them through
//! [`ConnectionManager::session_mut`](crate::ConnectionManager::session_mut).

use crate::error::Result;
use chrono::NaiveDateTime;
use futures::Stream;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A single column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// NULL value.
    Null,
    /// String value (VARCHAR2, CHAR, etc.).
    String(String),
    /// Number value as string (preserves precision).
    Number(String),
    /// Date/time value (DATE type).
    Date(NaiveDateTime),
    /// Raw binary value (RAW type).
    Raw(Vec<u8>),
}

impl Value {
    /// Check if the value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get the value as a string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Number(s) => Some(s),
            _ => None,
        }
    }

    /// Try to convert to i64.
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Value::Number(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Try to convert to f64.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Value::Number(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Try to get the value as a NaiveDateTime.
    pub fn as_date(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Date(dt) => Some(*dt),
            _ => None,
        }
    }

    /// Try to get the value as raw bytes.
    pub fn as_raw(&self) -> Option<&[u8]> {
        match self {
            Value::Raw(bytes) => Some(bytes),
            _ => None,
        }
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

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n.to_string())
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Value::Date(dt)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::String(s) => write!(f, "{}", s),
            Value::Number(n) => write!(f, "{}", n),
            Value::Date(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            Value::Raw(bytes) => write!(f, "<RAW: {} bytes>", bytes.len()),
        }
    }
}

/// A row of query results.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Column values.
    values: Vec<Value>,
    /// Column names shared by every row of a result set.
    columns: Arc<[String]>,
}

impl Row {
    /// Create a new row with values and shared column names.
    pub fn new(values: Vec<Value>, columns: Arc<[String]>) -> Self {
        Self { values, columns }
    }

    /// Get value by column index (0-based).
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Get value by column name (case-insensitive).
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .and_then(|idx| self.values.get(idx))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }
}

impl IntoIterator for Row {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl<'a> IntoIterator for &'a Row {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

/// Statement execution with a single open cursor.
///
/// `execute` replaces whatever result set the previous statement left
/// behind. Fetch methods return rows of the current result set in order.
pub trait Executor: Send {
    /// Execute `sql` with positional (`:1`, `:2`, ...) and named binds.
    fn execute(
        &mut self,
        sql: &str,
        params: &[Value],
        named: &[(&str, Value)],
    ) -> impl Future<Output = Result<()>> + Send;

    /// Next row, or `None` when the result set is exhausted.
    fn fetch_one(&mut self) -> impl Future<Output = Result<Option<Row>>> + Send;

    /// Up to `n` rows; fewer only when the result set runs out.
    fn fetch_many(&mut self, n: usize) -> impl Future<Output = Result<Vec<Row>>> + Send {
        async move {
            let mut rows = Vec::with_capacity(n);
            while rows.len() < n {
                match self.fetch_one().await? {
                    Some(row) => rows.push(row),
                    None => break,
                }
            }
            Ok(rows)
        }
    }

    /// All remaining rows.
    fn fetch_all(&mut self) -> impl Future<Output = Result<Vec<Row>>> + Send {
        async move {
            let mut rows = Vec::new();
            while let Some(row) = self.fetch_one().await? {
                rows.push(row);
            }
            Ok(rows)
        }
    }
}

/// Extension trait for reading an executor's result set as a Stream.
pub trait ExecutorStreamExt: Executor + Sized {
    /// Stream the remaining rows of the current result set.
    ///
    /// The stream ends after the first error.
    fn into_rows(self) -> impl Stream<Item = Result<Row>>;
}

impl<E: Executor> ExecutorStreamExt for E {
    fn into_rows(self) -> impl Stream<Item = Result<Row>> {
        use futures::stream;

        stream::unfold(Some(self), |state| async move {
            let mut executor = state?;
            match executor.fetch_one().await {
                Ok(Some(row)) => Some((Ok(row), Some(executor))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

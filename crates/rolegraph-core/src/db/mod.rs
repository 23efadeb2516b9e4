//! Backing-engine handle and the row/statement types that cross it.
//!
//! Everything above this module speaks [`Backend`]: a synchronous handle
//! that runs parameterized [`Statement`]s and returns rows of [`Value`]s.
//! [`sqlite::SqliteBackend`] is the implementation shipped with the crate;
//! other engines plug in by implementing the trait over their own driver.

pub mod migrations;
pub mod schema;
pub mod sql;
pub mod sqlite;

use crate::error::{Result, StoreError};
use crate::model::{Assignment, Item};

/// A single bound parameter or result cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Integer(i64),
    Text(String),
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// SQL text plus its positional parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    /// Statement without parameters.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }
}

/// One result row.
pub type Row = Vec<Value>;

/// Synchronous handle to the backing engine.
///
/// Implementations must run every statement of one handle on the same
/// session: the session-variable traversal and the transaction coordinator
/// both rely on state that lives in the server session.
pub trait Backend {
    /// Driver name as reported by the connection layer (`sqlite`, `mysql`,
    /// `pgsql`, `sqlsrv`, `oci`, ...).
    fn driver_name(&self) -> &str;

    /// Server version string, read with a read-only query.
    ///
    /// # Errors
    ///
    /// Returns an error if the probe query fails.
    fn server_version(&self) -> Result<String>;

    /// Run a statement that returns rows.
    ///
    /// # Errors
    ///
    /// Returns the backend error unchanged.
    fn query(&self, stmt: &Statement) -> Result<Vec<Row>>;

    /// Run a statement that modifies rows and return the affected count.
    ///
    /// # Errors
    ///
    /// Returns the backend error unchanged.
    fn execute(&self, stmt: &Statement) -> Result<usize>;

    /// Open a transaction on this session.
    ///
    /// # Errors
    ///
    /// Returns the backend error unchanged.
    fn begin(&self) -> Result<()>;

    /// Commit the open transaction.
    ///
    /// # Errors
    ///
    /// Returns the backend error unchanged.
    fn commit(&self) -> Result<()>;

    /// Roll back the open transaction.
    ///
    /// # Errors
    ///
    /// Returns the backend error unchanged.
    fn rollback(&self) -> Result<()>;

    /// Whether a transaction is currently open on this session.
    fn in_transaction(&self) -> bool;

    /// Whether the engine currently enforces foreign keys (and therefore
    /// their referential actions).
    ///
    /// # Errors
    ///
    /// Returns an error if the probe query fails.
    fn enforces_foreign_keys(&self) -> Result<bool>;
}

/// Column-positional reader over a result row.
pub(crate) struct RowReader<'a> {
    row: &'a [Value],
    offset: usize,
}

impl<'a> RowReader<'a> {
    pub(crate) const fn new(row: &'a [Value]) -> Self {
        Self { row, offset: 0 }
    }

    /// Reader that starts at column `offset`.
    pub(crate) const fn at(row: &'a [Value], offset: usize) -> Self {
        Self { row, offset }
    }

    fn cell(&self, idx: usize) -> Result<&'a Value> {
        self.row.get(self.offset + idx).ok_or_else(|| {
            StoreError::Decode(format!(
                "expected at least {} columns, got {}",
                self.offset + idx + 1,
                self.row.len()
            ))
        })
    }

    pub(crate) fn text(&self, idx: usize) -> Result<String> {
        match self.cell(idx)? {
            Value::Text(s) => Ok(s.clone()),
            other => Err(StoreError::Decode(format!(
                "column {} is {other:?}, expected text",
                self.offset + idx
            ))),
        }
    }

    /// Text column where `NULL` and `''` both mean absent.
    pub(crate) fn opt_text(&self, idx: usize) -> Result<Option<String>> {
        match self.cell(idx)? {
            Value::Null => Ok(None),
            Value::Text(s) if s.is_empty() => Ok(None),
            Value::Text(s) => Ok(Some(s.clone())),
            Value::Integer(i) => Err(StoreError::Decode(format!(
                "column {} is integer {i}, expected text",
                self.offset + idx
            ))),
        }
    }

    pub(crate) fn integer(&self, idx: usize) -> Result<i64> {
        match self.cell(idx)? {
            Value::Integer(i) => Ok(*i),
            // Some drivers hand back numeric columns as strings.
            Value::Text(s) => s.parse().map_err(|_| {
                StoreError::Decode(format!(
                    "column {} is '{s}', expected integer",
                    self.offset + idx
                ))
            }),
            Value::Null => Err(StoreError::Decode(format!(
                "column {} is NULL, expected integer",
                self.offset + idx
            ))),
        }
    }
}

/// Decode a row produced by [`sql::SqlBuilder::item_columns`].
pub(crate) fn decode_item(reader: &RowReader<'_>) -> Result<Item> {
    Ok(Item {
        name: reader.text(0)?,
        item_type: reader.text(1)?.parse()?,
        description: reader.opt_text(2)?,
        rule_name: reader.opt_text(3)?,
        created_at: reader.integer(4)?,
        updated_at: reader.integer(5)?,
    })
}

pub(crate) fn decode_items(rows: &[Row]) -> Result<Vec<Item>> {
    rows.iter()
        .map(|row| decode_item(&RowReader::new(row)))
        .collect()
}

pub(crate) fn decode_assignment(row: &[Value]) -> Result<Assignment> {
    let reader = RowReader::new(row);
    Ok(Assignment {
        item_name: reader.text(0)?,
        user_id: reader.text(1)?,
        created_at: reader.integer(2)?,
    })
}

/// First column of every row, as text.
pub(crate) fn decode_names(rows: &[Row]) -> Result<Vec<String>> {
    rows.iter().map(|row| RowReader::new(row).text(0)).collect()
}

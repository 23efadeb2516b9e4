//! SQLite implementation of [`Backend`] over `rusqlite`.
//!
//! Runtime defaults:
//! - `journal_mode = WAL` to allow concurrent readers while a writer renames
//! - `busy_timeout = 5s` to reduce transient lock failures under contention
//! - `foreign_keys = ON` so referential actions declared by the schema fire
//!
//! Every connection also gets two application-defined functions,
//! `session_get(name)` and `session_set(name, value)`, backed by a map that
//! lives as long as the connection. They give SQLite the per-session user
//! variables the session-variable traversal is written against.

use anyhow::Context as _;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Connection, ToSql, params_from_iter};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::migrations;
use super::schema::ReferentialActions;
use super::{Backend, Row, Statement, Value};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};

/// Busy timeout used for backend connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Driver name reported by [`SqliteBackend`].
pub const DRIVER_NAME: &str = "sqlite";

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Self::Integer(i) => ToSqlOutput::from(*i),
            Self::Text(s) => ToSqlOutput::from(s.as_str()),
        })
    }
}

fn value_from_ref(value: ValueRef<'_>) -> Result<Value> {
    match value {
        ValueRef::Null => Ok(Value::Null),
        ValueRef::Integer(i) => Ok(Value::Integer(i)),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .map(|s| Value::Text(s.to_string()))
            .map_err(|e| StoreError::Decode(format!("text column is not UTF-8: {e}"))),
        ValueRef::Real(f) => Err(StoreError::Decode(format!(
            "unexpected real column value {f}"
        ))),
        ValueRef::Blob(_) => Err(StoreError::Decode("unexpected blob column".to_string())),
    }
}

/// A single SQLite connection acting as the backing engine.
#[derive(Debug)]
pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    /// Wrap an existing connection and register the session functions.
    ///
    /// # Errors
    ///
    /// Returns an error if the functions cannot be registered.
    pub fn new(conn: Connection) -> Result<Self> {
        register_session_functions(&conn)?;
        Ok(Self { conn })
    }

    /// Fresh in-memory database without any tables.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot open the database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        configure_connection(&conn)?;
        Self::new(conn)
    }

    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Create or upgrade the hierarchy tables described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub fn migrate(&mut self, config: &StoreConfig) -> Result<u32> {
        config.validate()?;
        let actions = if config.cascade {
            ReferentialActions::Cascade
        } else {
            ReferentialActions::Restrict
        };
        Ok(migrations::migrate(&mut self.conn, &config.tables, actions)?)
    }
}

impl Backend for SqliteBackend {
    fn driver_name(&self) -> &str {
        DRIVER_NAME
    }

    fn server_version(&self) -> Result<String> {
        Ok(self
            .conn
            .query_row("SELECT sqlite_version()", [], |row| row.get(0))?)
    }

    fn query(&self, stmt: &Statement) -> Result<Vec<Row>> {
        let mut prepared = self.conn.prepare_cached(&stmt.sql)?;
        let columns = prepared.column_count();
        let mut rows = prepared.query(params_from_iter(stmt.params.iter()))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns);
            for idx in 0..columns {
                values.push(value_from_ref(row.get_ref(idx)?)?);
            }
            out.push(values);
        }
        Ok(out)
    }

    fn execute(&self, stmt: &Statement) -> Result<usize> {
        let mut prepared = self.conn.prepare_cached(&stmt.sql)?;
        Ok(prepared.execute(params_from_iter(stmt.params.iter()))?)
    }

    fn begin(&self) -> Result<()> {
        // Take the write lock up front so a rename never upgrades mid-way.
        Ok(self.conn.execute_batch("BEGIN IMMEDIATE")?)
    }

    fn commit(&self) -> Result<()> {
        Ok(self.conn.execute_batch("COMMIT")?)
    }

    fn rollback(&self) -> Result<()> {
        Ok(self.conn.execute_batch("ROLLBACK")?)
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    fn enforces_foreign_keys(&self) -> Result<bool> {
        let enabled: i64 = self
            .conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))?;
        Ok(enabled == 1)
    }
}

/// Open (or create) a file-backed store, apply runtime pragmas, and migrate
/// the schema described by `config`.
///
/// # Errors
///
/// Returns an error if opening, configuring or migrating the database fails.
pub fn open(path: &Path, config: &StoreConfig) -> anyhow::Result<SqliteBackend> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create database directory {}", parent.display()))?;
    }

    let conn =
        Connection::open(path).with_context(|| format!("open database {}", path.display()))?;
    configure_connection(&conn).context("configure sqlite pragmas")?;

    let mut backend = SqliteBackend::new(conn).context("register session functions")?;
    backend.migrate(config).context("apply schema migrations")?;
    Ok(backend)
}

/// In-memory store with the schema described by `config` applied.
///
/// # Errors
///
/// Returns an error if the database cannot be created or migrated.
pub fn open_in_memory(config: &StoreConfig) -> anyhow::Result<SqliteBackend> {
    let mut backend = SqliteBackend::open_in_memory().context("open in-memory database")?;
    backend.migrate(config).context("apply schema migrations")?;
    Ok(backend)
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

type SessionVars = Arc<Mutex<HashMap<String, String>>>;

fn poisoned() -> rusqlite::Error {
    rusqlite::Error::UserFunctionError("session variable map poisoned".into())
}

fn register_session_functions(conn: &Connection) -> rusqlite::Result<()> {
    let vars: SessionVars = Arc::default();

    // Not deterministic: the planner must re-evaluate every call per row.
    let reader = Arc::clone(&vars);
    conn.create_scalar_function("session_get", 1, FunctionFlags::SQLITE_UTF8, move |ctx| {
        let key: String = ctx.get(0)?;
        let vars = reader.lock().map_err(|_| poisoned())?;
        Ok(vars.get(&key).cloned())
    })?;

    let writer = vars;
    conn.create_scalar_function("session_set", 2, FunctionFlags::SQLITE_UTF8, move |ctx| {
        let key: String = ctx.get(0)?;
        let value: Option<String> = ctx.get(1)?;
        let mut vars = writer.lock().map_err(|_| poisoned())?;
        match &value {
            Some(v) => {
                vars.insert(key, v.clone());
            }
            None => {
                vars.remove(&key);
            }
        }
        Ok(value)
    })
}

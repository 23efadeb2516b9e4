//! Shared fixtures for unit tests.

use std::cell::RefCell;

use crate::config::StoreConfig;
use crate::db::sqlite::SqliteBackend;
use crate::db::{Backend, Row, Statement};
use crate::error::{Result, StoreError};
use crate::model::Item;
use crate::store::GraphStore;

/// Backend that only answers the capability probes.
pub struct ProbeOnly {
    pub driver: &'static str,
    pub version: &'static str,
}

impl Backend for ProbeOnly {
    fn driver_name(&self) -> &str {
        self.driver
    }
    fn server_version(&self) -> Result<String> {
        Ok(self.version.to_string())
    }
    fn query(&self, _stmt: &Statement) -> Result<Vec<Row>> {
        Err(StoreError::Backend("probe-only backend".into()))
    }
    fn execute(&self, _stmt: &Statement) -> Result<usize> {
        Err(StoreError::Backend("probe-only backend".into()))
    }
    fn begin(&self) -> Result<()> {
        Ok(())
    }
    fn commit(&self) -> Result<()> {
        Ok(())
    }
    fn rollback(&self) -> Result<()> {
        Ok(())
    }
    fn in_transaction(&self) -> bool {
        false
    }
    fn enforces_foreign_keys(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Backend that records every statement and returns no rows.
#[derive(Default)]
pub struct Recording {
    pub statements: RefCell<Vec<Statement>>,
}

impl Recording {
    pub fn sql(&self) -> Vec<String> {
        self.statements.borrow().iter().map(|s| s.sql.clone()).collect()
    }
}

impl Backend for Recording {
    fn driver_name(&self) -> &str {
        "recording"
    }
    fn server_version(&self) -> Result<String> {
        Ok("0".into())
    }
    fn query(&self, stmt: &Statement) -> Result<Vec<Row>> {
        self.statements.borrow_mut().push(stmt.clone());
        Ok(Vec::new())
    }
    fn execute(&self, stmt: &Statement) -> Result<usize> {
        self.statements.borrow_mut().push(stmt.clone());
        Ok(0)
    }
    fn begin(&self) -> Result<()> {
        Ok(())
    }
    fn commit(&self) -> Result<()> {
        Ok(())
    }
    fn rollback(&self) -> Result<()> {
        Ok(())
    }
    fn in_transaction(&self) -> bool {
        false
    }
    fn enforces_foreign_keys(&self) -> Result<bool> {
        Ok(false)
    }
}

/// Route `tracing` output through the test harness. Later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Migrated in-memory SQLite backend with the default config.
pub fn memory_db() -> SqliteBackend {
    init_tracing();
    crate::db::sqlite::open_in_memory(&StoreConfig::default()).expect("open in-memory db")
}

/// Insert roles for every name in `roles`, then the given edges.
pub fn seed(store: &GraphStore<'_>, roles: &[&str], edges: &[(&str, &str)]) {
    for name in roles {
        store.add(&Item::role(*name)).expect("add role");
    }
    for (parent, child) in edges {
        store.add_child(parent, child).expect("add edge");
    }
}

/// Sorted names of `items`.
pub fn names(items: &[Item]) -> Vec<String> {
    let mut out: Vec<String> = items.iter().map(|i| i.name.clone()).collect();
    out.sort();
    out
}


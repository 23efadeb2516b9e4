//! User ↔ item assignments.

use tracing::debug;

use super::GraphStore;
use crate::capabilities::detect_capabilities;
use crate::config::StoreConfig;
use crate::db::sql::{ASSIGNMENT_COLUMNS, Dialect, SqlBuilder};
use crate::db::{self, Backend, RowReader, Statement};
use crate::error::{Result, StoreError};
use crate::graph::MAX_BIND_PARAMS;
use crate::model::Assignment;
use crate::model::name::{validate_item_name, validate_user_id};

/// Keyed CRUD over the assignments table.
pub struct AssignmentStore<'db> {
    db: &'db dyn Backend,
    config: StoreConfig,
    dialect: Dialect,
}

impl std::fmt::Debug for AssignmentStore<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssignmentStore")
            .field("driver", &self.db.driver_name())
            .field("table", &self.config.tables.assignments)
            .field("dialect", &self.dialect)
            .finish()
    }
}

impl<'db> AssignmentStore<'db> {
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for an invalid config and
    /// [`StoreError::UnsupportedEngine`] for an unknown backend.
    pub fn new(db: &'db dyn Backend, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let dialect = detect_capabilities(db)?.kind.dialect();
        Ok(Self {
            db,
            config,
            dialect,
        })
    }

    /// Assignment store sharing `graph`'s backend, tables and dialect.
    #[must_use]
    pub fn for_graph(graph: &GraphStore<'db>) -> Self {
        Self {
            db: graph.backend(),
            config: graph.config().clone(),
            dialect: graph.engine().context().dialect,
        }
    }

    fn table(&self) -> &str {
        &self.config.tables.assignments
    }

    const fn builder(&self) -> SqlBuilder {
        SqlBuilder::new(self.dialect)
    }

    fn select(&self) -> SqlBuilder {
        let mut b = self.builder();
        b.push("SELECT ")
            .column_list("a", &ASSIGNMENT_COLUMNS)
            .push(" FROM ")
            .ident(self.table())
            .push(" a");
        b
    }

    fn query(&self, stmt: &Statement) -> Result<Vec<Assignment>> {
        self.db
            .query(stmt)?
            .iter()
            .map(|row| db::decode_assignment(row))
            .collect()
    }

    fn count(&self, stmt: &Statement) -> Result<i64> {
        let rows = self.db.query(stmt)?;
        rows.first()
            .map_or(Ok(0), |row| RowReader::new(row).integer(0))
    }

    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn get_all(&self) -> Result<Vec<Assignment>> {
        self.query(&self.select().build())
    }

    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn get_by_user_id(&self, user_id: &str) -> Result<Vec<Assignment>> {
        let mut b = self.select();
        b.push(" WHERE ").column("a", "userId").push(" = ").bind(user_id);
        self.query(&b.build())
    }

    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn get_by_item_names(&self, item_names: &[&str]) -> Result<Vec<Assignment>> {
        let mut out = Vec::new();
        for chunk in item_names.chunks(MAX_BIND_PARAMS) {
            let mut b = self.select();
            b.push(" WHERE ").column("a", "itemName").push(" IN ").bind_list(chunk);
            out.extend(self.query(&b.build())?);
        }
        Ok(out)
    }

    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn get(&self, item_name: &str, user_id: &str) -> Result<Option<Assignment>> {
        let mut b = self.select();
        b.push(" WHERE ")
            .column("a", "itemName")
            .push(" = ")
            .bind(item_name)
            .push(" AND ")
            .column("a", "userId")
            .push(" = ")
            .bind(user_id);
        Ok(self.query(&b.build())?.into_iter().next())
    }

    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn exists(&self, item_name: &str, user_id: &str) -> Result<bool> {
        Ok(self.get(item_name, user_id)?.is_some())
    }

    /// Whether `user_id` holds at least one of `item_names`.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn user_has_item(&self, user_id: &str, item_names: &[&str]) -> Result<bool> {
        for chunk in item_names.chunks(MAX_BIND_PARAMS) {
            let mut b = self.builder();
            b.push("SELECT COUNT(*) FROM ")
                .ident(self.table())
                .push(" WHERE ")
                .ident("userId")
                .push(" = ")
                .bind(user_id)
                .push(" AND ")
                .ident("itemName")
                .push(" IN ")
                .bind_list(chunk);
            if self.count(&b.build())? > 0 {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// The subset of `item_names` assigned to `user_id`.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn filter_user_item_names(&self, user_id: &str, item_names: &[&str]) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for chunk in item_names.chunks(MAX_BIND_PARAMS) {
            let mut b = self.builder();
            b.push("SELECT ")
                .ident("itemName")
                .push(" FROM ")
                .ident(self.table())
                .push(" WHERE ")
                .ident("userId")
                .push(" = ")
                .bind(user_id)
                .push(" AND ")
                .ident("itemName")
                .push(" IN ")
                .bind_list(chunk);
            out.extend(db::decode_names(&self.db.query(&b.build())?)?);
        }
        Ok(out)
    }

    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for a bad user id or item name and
    /// [`StoreError::AlreadyExists`] for a duplicate grant.
    pub fn add(&self, assignment: &Assignment) -> Result<()> {
        validate_user_id(&assignment.user_id)?;
        validate_item_name(&assignment.item_name, self.config.separator)?;
        if self.exists(&assignment.item_name, &assignment.user_id)? {
            return Err(StoreError::AlreadyExists(format!(
                "{} -> {}",
                assignment.user_id, assignment.item_name
            )));
        }

        let mut b = self.builder();
        b.push("INSERT INTO ").ident(self.table()).push(" (");
        for (idx, column) in ASSIGNMENT_COLUMNS.iter().enumerate() {
            if idx > 0 {
                b.push(", ");
            }
            b.ident(column);
        }
        b.push(") VALUES (")
            .bind(assignment.item_name.as_str())
            .push(", ")
            .bind(assignment.user_id.as_str())
            .push(", ")
            .bind(assignment.created_at)
            .push(")");
        self.db.execute(&b.build())?;
        debug!(user_id = %assignment.user_id, item = %assignment.item_name, "added assignment");
        Ok(())
    }

    /// Whether anyone holds `item_name`.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn has_item(&self, item_name: &str) -> Result<bool> {
        let mut b = self.builder();
        b.push("SELECT COUNT(*) FROM ")
            .ident(self.table())
            .push(" WHERE ")
            .ident("itemName")
            .push(" = ")
            .bind(item_name);
        Ok(self.count(&b.build())? > 0)
    }

    /// Point every grant of `old` at `new`. Returns the number of rows moved.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] / [`StoreError::SeparatorCollision`]
    /// for an invalid `new`, and propagates backend errors.
    pub fn rename_item(&self, old: &str, new: &str) -> Result<usize> {
        validate_item_name(new, self.config.separator)?;
        let mut b = self.builder();
        b.push("UPDATE ")
            .ident(self.table())
            .push(" SET ")
            .ident("itemName")
            .push(" = ")
            .bind(new)
            .push(" WHERE ")
            .ident("itemName")
            .push(" = ")
            .bind(old);
        self.db.execute(&b.build())
    }

    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn remove(&self, item_name: &str, user_id: &str) -> Result<bool> {
        let mut b = self.builder();
        b.push("DELETE FROM ")
            .ident(self.table())
            .push(" WHERE ")
            .ident("itemName")
            .push(" = ")
            .bind(item_name)
            .push(" AND ")
            .ident("userId")
            .push(" = ")
            .bind(user_id);
        Ok(self.db.execute(&b.build())? > 0)
    }

    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn remove_by_user_id(&self, user_id: &str) -> Result<usize> {
        self.delete_where("userId", user_id)
    }

    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn remove_by_item_name(&self, item_name: &str) -> Result<usize> {
        self.delete_where("itemName", item_name)
    }

    fn delete_where(&self, column: &str, value: &str) -> Result<usize> {
        let mut b = self.builder();
        b.push("DELETE FROM ")
            .ident(self.table())
            .push(" WHERE ")
            .ident(column)
            .push(" = ")
            .bind(value);
        self.db.execute(&b.build())
    }

    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn clear(&self) -> Result<usize> {
        let mut b = self.builder();
        b.push("DELETE FROM ").ident(self.table());
        self.db.execute(&b.build())
    }
}

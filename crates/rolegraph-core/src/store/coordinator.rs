//! Atomic mutations that span items, edges and assignments.
//!
//! A rename changes the key that edges and assignments point at. When the
//! schema declares `ON UPDATE CASCADE` and the engine enforces it, updating
//! the item row is enough. Otherwise the dependent rows are moved
//! explicitly: the item is copied under the new name, edges and assignments
//! are repointed, then the old row is deleted. That order satisfies
//! non-deferred foreign keys at every statement.
//!
//! Either way the whole sequence runs in one transaction. On failure it is
//! rolled back and the original error is returned unchanged.

use tracing::{debug, info};

use super::{AssignmentStore, GraphStore, finish};
use crate::error::{Result, StoreError};
use crate::model::Item;
use crate::model::name::validate_item_name;

/// How dependent rows follow a changed or removed item key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferentialMode {
    /// The engine cascades key updates and deletes.
    Cascade,
    /// Dependent rows are rewritten by explicit statements.
    Explicit,
}

#[derive(Debug)]
pub struct TransactionCoordinator<'s, 'db> {
    items: &'s GraphStore<'db>,
    assignments: AssignmentStore<'db>,
    mode: ReferentialMode,
}

impl<'s, 'db> TransactionCoordinator<'s, 'db> {
    /// Coordinator whose mode is [`ReferentialMode::Cascade`] only when the
    /// config declares cascading keys and the backend enforces foreign keys.
    ///
    /// # Errors
    ///
    /// Propagates a failing foreign-key probe.
    pub fn new(items: &'s GraphStore<'db>) -> Result<Self> {
        let enforced = items.backend().enforces_foreign_keys()?;
        let mode = if items.config().cascade && enforced {
            ReferentialMode::Cascade
        } else {
            ReferentialMode::Explicit
        };
        debug!(?mode, cascade = items.config().cascade, enforced, "referential mode");
        Ok(Self::with_mode(items, mode))
    }

    #[must_use]
    pub fn with_mode(items: &'s GraphStore<'db>, mode: ReferentialMode) -> Self {
        Self {
            items,
            assignments: AssignmentStore::for_graph(items),
            mode,
        }
    }

    #[must_use]
    pub const fn mode(&self) -> ReferentialMode {
        self.mode
    }

    /// Rename `old` to `new`, carrying its edges and assignments along.
    /// Timestamps are preserved.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Validation`] / [`StoreError::SeparatorCollision`] for
    ///   an invalid `new`, before any I/O
    /// - [`StoreError::TransactionFailure`] when a transaction is already
    ///   open, or when rollback fails after an error
    /// - [`StoreError::NotFound`] / [`StoreError::AlreadyExists`] when `old`
    ///   is missing or `new` is taken
    /// - any backend error, after rollback
    pub fn rename_item(&self, old: &str, new: &str) -> Result<()> {
        validate_item_name(new, self.items.config().separator)?;
        self.run("rename item", || self.rename_in_tx(old, new, None))
    }

    /// Overwrite the attributes of `name` with `item`, renaming it when
    /// `item.name` differs.
    ///
    /// # Errors
    ///
    /// As [`TransactionCoordinator::rename_item`].
    pub fn update_item(&self, name: &str, item: &Item) -> Result<()> {
        item.validate(self.items.config().separator)?;
        if item.name == name {
            return self.run("update item", || self.items.update(name, item));
        }
        self.run("update item", || self.rename_in_tx(name, &item.name, Some(item)))
    }

    /// Remove `name` with its edges and assignments. Returns whether the
    /// item existed.
    ///
    /// # Errors
    ///
    /// [`StoreError::TransactionFailure`] when a transaction is already open
    /// or rollback fails, otherwise the backend error after rollback.
    pub fn remove_item(&self, name: &str) -> Result<bool> {
        self.run("remove item", || {
            let assignments = self.assignments.remove_by_item_name(name)?;
            let edges = self.items.delete_edges_of(name)?;
            let removed = self.items.delete_row(name)? > 0;
            info!(name, edges, assignments, removed, "removed item");
            Ok(removed)
        })
    }

    /// Run `op` in a fresh transaction. Never nests.
    fn run<T>(&self, operation: &str, op: impl FnOnce() -> Result<T>) -> Result<T> {
        let db = self.items.backend();
        if db.in_transaction() {
            return Err(StoreError::TransactionFailure {
                reason: format!("cannot {operation} inside an already open transaction"),
                cause: None,
            });
        }
        db.begin()?;
        finish(db, operation, op())
    }

    fn rename_in_tx(&self, old: &str, new: &str, attributes: Option<&Item>) -> Result<()> {
        let mut item = self
            .items
            .get(old)?
            .ok_or_else(|| StoreError::NotFound(old.to_string()))?;
        if self.items.exists(new)? {
            return Err(StoreError::AlreadyExists(new.to_string()));
        }

        let (edges, assignments) = match self.mode {
            ReferentialMode::Cascade => {
                self.items.rename_row(old, new)?;
                (None, None)
            }
            ReferentialMode::Explicit => {
                item.name = new.to_string();
                self.items.insert_row(&item)?;
                let edges = self.items.repoint_edges(old, new)?;
                let assignments = self.assignments.rename_item(old, new)?;
                self.items.delete_row(old)?;
                (Some(edges), Some(assignments))
            }
        };

        if let Some(attributes) = attributes {
            self.items.update_row(new, attributes)?;
        }
        info!(old, new, mode = ?self.mode, ?edges, ?assignments, "renamed item");
        Ok(())
    }
}

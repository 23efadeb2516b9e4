//! Items and the edges between them.
//!
//! Plain keyed reads and writes run directly against the backend. Closure
//! queries go through the [`TraversalEngine`] chosen when the store is built.
//! Edge insertion keeps the graph acyclic: [`GraphStore::add_child`] refuses
//! self-links and any link whose child already reaches its parent.

use tracing::{debug, info};

use super::{AssignmentStore, atomically};
use crate::config::StoreConfig;
use crate::db::sql::{ITEM_COLUMNS, SqlBuilder};
use crate::db::{self, Backend, RowReader, Statement};
use crate::error::{Result, StoreError};
use crate::graph::factory::TraversalFactory;
use crate::graph::{AccessTree, MAX_BIND_PARAMS, Strategy, TraversalEngine};
use crate::model::{Item, ItemType};

/// Items, edges and closure queries over one backend.
pub struct GraphStore<'db> {
    db: &'db dyn Backend,
    config: StoreConfig,
    engine: Box<dyn TraversalEngine>,
}

impl std::fmt::Debug for GraphStore<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore")
            .field("driver", &self.db.driver_name())
            .field("config", &self.config)
            .field("engine", &self.engine)
            .finish()
    }
}

impl<'db> GraphStore<'db> {
    /// Store whose traversal strategy is picked by probing `db`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for an invalid config and
    /// [`StoreError::UnsupportedEngine`] when no strategy fits the backend.
    pub fn new(db: &'db dyn Backend, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let engine = TraversalFactory::select(db, &config)?;
        Ok(Self { db, config, engine })
    }

    /// Store with an explicitly chosen engine.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for an invalid config.
    pub fn with_engine(
        db: &'db dyn Backend,
        config: StoreConfig,
        engine: Box<dyn TraversalEngine>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self { db, config, engine })
    }

    #[must_use]
    pub fn engine(&self) -> &dyn TraversalEngine {
        self.engine.as_ref()
    }

    #[must_use]
    pub fn strategy(&self) -> Strategy {
        self.engine.strategy()
    }

    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub(crate) fn backend(&self) -> &'db dyn Backend {
        self.db
    }

    pub(crate) fn builder(&self) -> SqlBuilder {
        self.engine.context().builder()
    }

    fn items_table(&self) -> &str {
        &self.config.tables.items
    }

    fn edges_table(&self) -> &str {
        &self.config.tables.children
    }

    fn select_items(&self) -> SqlBuilder {
        let mut b = self.builder();
        b.push("SELECT ")
            .item_columns("i")
            .push(" FROM ")
            .ident(self.items_table())
            .push(" i");
        b
    }

    fn query_items(&self, stmt: &Statement) -> Result<Vec<Item>> {
        db::decode_items(&self.db.query(stmt)?)
    }

    fn count(&self, stmt: &Statement) -> Result<i64> {
        let rows = self.db.query(stmt)?;
        rows.first()
            .map_or(Ok(0), |row| RowReader::new(row).integer(0))
    }

    // ---- reads ----------------------------------------------------------

    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn get(&self, name: &str) -> Result<Option<Item>> {
        let mut b = self.select_items();
        b.push(" WHERE ").column("i", "name").push(" = ").bind(name);
        Ok(self.query_items(&b.build())?.into_iter().next())
    }

    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn get_all(&self) -> Result<Vec<Item>> {
        self.get_all_of(None)
    }

    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn get_roles(&self) -> Result<Vec<Item>> {
        self.get_all_of(Some(ItemType::Role))
    }

    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn get_permissions(&self) -> Result<Vec<Item>> {
        self.get_all_of(Some(ItemType::Permission))
    }

    fn get_all_of(&self, item_type: Option<ItemType>) -> Result<Vec<Item>> {
        let mut b = self.select_items();
        if let Some(item_type) = item_type {
            b.push(" WHERE ").column("i", "type").push(" = ").bind(item_type.as_str());
        }
        self.query_items(&b.build())
    }

    /// Items whose names are in `names`; unknown names are skipped.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn get_by_names(&self, names: &[&str]) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        for chunk in names.chunks(MAX_BIND_PARAMS) {
            let mut b = self.select_items();
            b.push(" WHERE ").column("i", "name").push(" IN ").bind_list(chunk);
            items.extend(self.query_items(&b.build())?);
        }
        Ok(items)
    }

    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.get(name)?.is_some())
    }

    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn role_exists(&self, name: &str) -> Result<bool> {
        Ok(self.get_role(name)?.is_some())
    }

    /// `name` when it exists and is a role.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn get_role(&self, name: &str) -> Result<Option<Item>> {
        Ok(self.get(name)?.filter(|item| item.item_type == ItemType::Role))
    }

    /// `name` when it exists and is a permission.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn get_permission(&self, name: &str) -> Result<Option<Item>> {
        Ok(self
            .get(name)?
            .filter(|item| item.item_type == ItemType::Permission))
    }

    // ---- item writes ----------------------------------------------------

    /// Insert a new item.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] / [`StoreError::SeparatorCollision`]
    /// before any I/O, and [`StoreError::AlreadyExists`] when the name is
    /// taken.
    pub fn add(&self, item: &Item) -> Result<()> {
        item.validate(self.config.separator)?;
        if self.exists(&item.name)? {
            return Err(StoreError::AlreadyExists(item.name.clone()));
        }
        self.insert_row(item)?;
        debug!(name = %item.name, item_type = %item.item_type, "added item");
        Ok(())
    }

    /// Overwrite the attributes of `name` with those of `item`.
    ///
    /// Renames touch edges and assignments too and must go through
    /// [`super::TransactionCoordinator`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] when `item.name` differs from
    /// `name`, and [`StoreError::NotFound`] when `name` does not exist.
    pub fn update(&self, name: &str, item: &Item) -> Result<()> {
        if item.name != name {
            return Err(StoreError::validation(
                "name",
                "renaming requires TransactionCoordinator::rename_item",
            ));
        }
        item.validate(self.config.separator)?;
        if self.update_row(name, item)? == 0 {
            return Err(StoreError::NotFound(name.to_string()));
        }
        Ok(())
    }

    /// Remove `name` with every edge and assignment pointing at it.
    ///
    /// # Errors
    ///
    /// Propagates backend errors; nothing is removed on failure.
    pub fn remove(&self, name: &str) -> Result<bool> {
        atomically(self.db, "remove item", || {
            let assignments = AssignmentStore::for_graph(self).remove_by_item_name(name)?;
            let edges = self.delete_edges_of(name)?;
            let removed = self.delete_row(name)? > 0;
            debug!(name, edges, assignments, removed, "removed item");
            Ok(removed)
        })
    }

    /// Remove every item, edge and assignment.
    ///
    /// # Errors
    ///
    /// Propagates backend errors; nothing is removed on failure.
    pub fn clear(&self) -> Result<()> {
        self.clear_of(None)
    }

    /// Remove every role with its edges and assignments.
    ///
    /// # Errors
    ///
    /// Propagates backend errors; nothing is removed on failure.
    pub fn clear_roles(&self) -> Result<()> {
        self.clear_of(Some(ItemType::Role))
    }

    /// Remove every permission with its edges and assignments.
    ///
    /// # Errors
    ///
    /// Propagates backend errors; nothing is removed on failure.
    pub fn clear_permissions(&self) -> Result<()> {
        self.clear_of(Some(ItemType::Permission))
    }

    fn clear_of(&self, item_type: Option<ItemType>) -> Result<()> {
        let tables = &self.config.tables;
        atomically(self.db, "clear items", || {
            let mut edges = self.builder();
            edges.push("DELETE FROM ").ident(&tables.children);
            let mut assignments = self.builder();
            assignments.push("DELETE FROM ").ident(&tables.assignments);
            let mut items = self.builder();
            items.push("DELETE FROM ").ident(&tables.items);

            if let Some(item_type) = item_type {
                edges.push(" WHERE ").ident("parent").push(" IN ");
                self.push_names_of_type(&mut edges, item_type);
                edges.push(" OR ").ident("child").push(" IN ");
                self.push_names_of_type(&mut edges, item_type);

                assignments.push(" WHERE ").ident("itemName").push(" IN ");
                self.push_names_of_type(&mut assignments, item_type);

                items.push(" WHERE ").ident("type").push(" = ").bind(item_type.as_str());
            }

            let edges = self.db.execute(&edges.build())?;
            let assignments = self.db.execute(&assignments.build())?;
            let items = self.db.execute(&items.build())?;
            info!(?item_type, edges, assignments, items, "cleared hierarchy");
            Ok(())
        })
    }

    /// `(SELECT name FROM items WHERE type = ?)`
    fn push_names_of_type(&self, b: &mut SqlBuilder, item_type: ItemType) {
        b.push("(SELECT ")
            .ident("name")
            .push(" FROM ")
            .ident(self.items_table())
            .push(" WHERE ")
            .ident("type")
            .push(" = ")
            .bind(item_type.as_str())
            .push(")");
    }

    // ---- direct edges ---------------------------------------------------

    /// Direct parents of `name`.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn get_parents(&self, name: &str) -> Result<Vec<Item>> {
        self.neighbours(name, "child", "parent")
    }

    /// Direct children of `name`.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn get_direct_children(&self, name: &str) -> Result<Vec<Item>> {
        self.neighbours(name, "parent", "child")
    }

    fn neighbours(&self, name: &str, from: &str, to: &str) -> Result<Vec<Item>> {
        let mut b = self.builder();
        b.push("SELECT ")
            .item_columns("i")
            .push(" FROM ")
            .ident(self.edges_table())
            .push(" e JOIN ")
            .ident(self.items_table())
            .push(" i ON ")
            .column("i", "name")
            .push(" = ")
            .column("e", to)
            .push(" WHERE ")
            .column("e", from)
            .push(" = ")
            .bind(name);
        self.query_items(&b.build())
    }

    /// Whether the edge `parent → child` exists.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn has_direct_child(&self, parent: &str, child: &str) -> Result<bool> {
        let mut b = self.builder();
        b.push("SELECT COUNT(*) FROM ")
            .ident(self.edges_table())
            .push(" WHERE ")
            .ident("parent")
            .push(" = ")
            .bind(parent)
            .push(" AND ")
            .ident("child")
            .push(" = ")
            .bind(child);
        Ok(self.count(&b.build())? > 0)
    }

    /// Whether `name` has at least one direct child.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn has_children(&self, name: &str) -> Result<bool> {
        let mut b = self.builder();
        b.push("SELECT COUNT(*) FROM ")
            .ident(self.edges_table())
            .push(" WHERE ")
            .ident("parent")
            .push(" = ")
            .bind(name);
        Ok(self.count(&b.build())? > 0)
    }

    /// Link `child` under `parent`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] when either end does not exist
    /// - [`StoreError::CycleDetected`] for a self-link, or when `child`
    ///   already reaches `parent`
    /// - [`StoreError::Validation`] when a permission would contain a role
    /// - [`StoreError::AlreadyExists`] when the edge exists
    pub fn add_child(&self, parent: &str, child: &str) -> Result<()> {
        // The checks and the insert share one transaction so a concurrent
        // writer cannot slip a reverse edge in between.
        atomically(self.db, "add child", || self.link(parent, child))
    }

    fn link(&self, parent: &str, child: &str) -> Result<()> {
        if parent == child {
            return Err(StoreError::CycleDetected {
                parent: parent.to_string(),
                child: child.to_string(),
            });
        }
        let parent_item = self
            .get(parent)?
            .ok_or_else(|| StoreError::NotFound(parent.to_string()))?;
        let child_item = self
            .get(child)?
            .ok_or_else(|| StoreError::NotFound(child.to_string()))?;

        if parent_item.item_type == ItemType::Permission && child_item.item_type == ItemType::Role
        {
            return Err(StoreError::validation(
                "child",
                format!("permission '{parent}' cannot contain role '{child}'"),
            ));
        }
        if self.has_direct_child(parent, child)? {
            return Err(StoreError::AlreadyExists(format!("{parent} -> {child}")));
        }
        if self.engine.has_descendant(self.db, child, parent)? {
            return Err(StoreError::CycleDetected {
                parent: parent.to_string(),
                child: child.to_string(),
            });
        }

        let mut b = self.builder();
        b.push("INSERT INTO ")
            .ident(self.edges_table())
            .push(" (")
            .ident("parent")
            .push(", ")
            .ident("child")
            .push(") VALUES (")
            .bind(parent)
            .push(", ")
            .bind(child)
            .push(")");
        self.db.execute(&b.build())?;
        debug!(parent, child, "added edge");
        Ok(())
    }

    /// Remove the edge `parent → child`. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn remove_child(&self, parent: &str, child: &str) -> Result<bool> {
        let mut b = self.builder();
        b.push("DELETE FROM ")
            .ident(self.edges_table())
            .push(" WHERE ")
            .ident("parent")
            .push(" = ")
            .bind(parent)
            .push(" AND ")
            .ident("child")
            .push(" = ")
            .bind(child);
        Ok(self.db.execute(&b.build())? > 0)
    }

    /// Remove every edge leaving `parent`. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn remove_children(&self, parent: &str) -> Result<usize> {
        let mut b = self.builder();
        b.push("DELETE FROM ")
            .ident(self.edges_table())
            .push(" WHERE ")
            .ident("parent")
            .push(" = ")
            .bind(parent);
        self.db.execute(&b.build())
    }

    // ---- closure queries ------------------------------------------------

    /// Every item that transitively contains `name`.
    ///
    /// # Errors
    ///
    /// Propagates traversal errors.
    pub fn get_ancestors(&self, name: &str) -> Result<Vec<Item>> {
        self.engine.ancestors(self.db, name)
    }

    /// Every item transitively contained by any of `names`.
    ///
    /// # Errors
    ///
    /// Propagates traversal errors.
    pub fn get_all_children(&self, names: &[&str]) -> Result<Vec<Item>> {
        self.engine.descendants(self.db, names)
    }

    /// # Errors
    ///
    /// Propagates traversal errors.
    pub fn get_all_child_roles(&self, names: &[&str]) -> Result<Vec<Item>> {
        self.engine
            .descendants_by_type(self.db, names, ItemType::Role)
    }

    /// # Errors
    ///
    /// Propagates traversal errors.
    pub fn get_all_child_permissions(&self, names: &[&str]) -> Result<Vec<Item>> {
        self.engine
            .descendants_by_type(self.db, names, ItemType::Permission)
    }

    /// Whether `child` is transitively contained by `parent`.
    ///
    /// # Errors
    ///
    /// Propagates traversal errors.
    pub fn has_child(&self, parent: &str, child: &str) -> Result<bool> {
        self.engine.has_descendant(self.db, parent, child)
    }

    /// # Errors
    ///
    /// Propagates traversal errors.
    pub fn get_access_tree(&self, name: &str) -> Result<Option<AccessTree>> {
        self.engine.access_tree(self.db, name)
    }

    // ---- row primitives shared with the coordinator ---------------------

    pub(crate) fn insert_row(&self, item: &Item) -> Result<()> {
        let mut b = self.builder();
        b.push("INSERT INTO ")
            .ident(self.items_table())
            .push(" (");
        for (idx, column) in ITEM_COLUMNS.iter().enumerate() {
            if idx > 0 {
                b.push(", ");
            }
            b.ident(column);
        }
        b.push(") VALUES (")
            .bind(item.name.as_str())
            .push(", ")
            .bind(item.item_type.as_str())
            .push(", ")
            .bind(item.description.as_deref())
            .push(", ")
            .bind(item.rule_name.as_deref())
            .push(", ")
            .bind(item.created_at)
            .push(", ")
            .bind(item.updated_at)
            .push(")");
        self.db.execute(&b.build())?;
        Ok(())
    }

    /// Write every attribute except the name and `createdAt`.
    pub(crate) fn update_row(&self, name: &str, item: &Item) -> Result<usize> {
        let mut b = self.builder();
        b.push("UPDATE ")
            .ident(self.items_table())
            .push(" SET ")
            .ident("type")
            .push(" = ")
            .bind(item.item_type.as_str())
            .push(", ")
            .ident("description")
            .push(" = ")
            .bind(item.description.as_deref())
            .push(", ")
            .ident("ruleName")
            .push(" = ")
            .bind(item.rule_name.as_deref())
            .push(", ")
            .ident("updatedAt")
            .push(" = ")
            .bind(item.updated_at)
            .push(" WHERE ")
            .ident("name")
            .push(" = ")
            .bind(name);
        self.db.execute(&b.build())
    }

    /// Change the key of the item row in place.
    pub(crate) fn rename_row(&self, old: &str, new: &str) -> Result<usize> {
        let mut b = self.builder();
        b.push("UPDATE ")
            .ident(self.items_table())
            .push(" SET ")
            .ident("name")
            .push(" = ")
            .bind(new)
            .push(" WHERE ")
            .ident("name")
            .push(" = ")
            .bind(old);
        self.db.execute(&b.build())
    }

    /// Point every edge end equal to `old` at `new`.
    pub(crate) fn repoint_edges(&self, old: &str, new: &str) -> Result<usize> {
        let mut total = 0;
        for column in ["parent", "child"] {
            let mut b = self.builder();
            b.push("UPDATE ")
                .ident(self.edges_table())
                .push(" SET ")
                .ident(column)
                .push(" = ")
                .bind(new)
                .push(" WHERE ")
                .ident(column)
                .push(" = ")
                .bind(old);
            total += self.db.execute(&b.build())?;
        }
        Ok(total)
    }

    pub(crate) fn delete_edges_of(&self, name: &str) -> Result<usize> {
        let mut b = self.builder();
        b.push("DELETE FROM ")
            .ident(self.edges_table())
            .push(" WHERE ")
            .ident("parent")
            .push(" = ")
            .bind(name)
            .push(" OR ")
            .ident("child")
            .push(" = ")
            .bind(name);
        self.db.execute(&b.build())
    }

    pub(crate) fn delete_row(&self, name: &str) -> Result<usize> {
        let mut b = self.builder();
        b.push("DELETE FROM ")
            .ident(self.items_table())
            .push(" WHERE ")
            .ident("name")
            .push(" = ")
            .bind(name);
        self.db.execute(&b.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::SqliteBackend;
    use crate::test_support::{memory_db, names, seed};

    fn store(db: &SqliteBackend) -> GraphStore<'_> {
        GraphStore::new(db, StoreConfig::default()).expect("store")
    }

    #[test]
    fn add_then_get_round_trips_attributes() {
        let db = memory_db();
        let s = store(&db);
        let item = Item::role("admin")
            .with_description("Administrator")
            .with_rule_name("isOwner")
            .with_timestamps(100, 200);
        s.add(&item).expect("add");

        assert_eq!(s.get("admin").expect("get"), Some(item));
        assert!(s.exists("admin").expect("exists"));
        assert!(s.role_exists("admin").expect("role"));
        assert!(s.get_permission("admin").expect("perm").is_none());
        assert!(s.get("nobody").expect("get").is_none());
    }

    #[test]
    fn add_rejects_duplicates_and_bad_names() {
        let db = memory_db();
        let s = store(&db);
        s.add(&Item::role("admin")).expect("add");
        assert!(matches!(
            s.add(&Item::permission("admin")).unwrap_err(),
            StoreError::AlreadyExists(_)
        ));
        assert!(matches!(
            s.add(&Item::role("a,b")).unwrap_err(),
            StoreError::SeparatorCollision { .. }
        ));
        assert!(matches!(
            s.add(&Item::role("")).unwrap_err(),
            StoreError::Validation { .. }
        ));
        assert_eq!(s.get_all().expect("all").len(), 1);
    }

    #[test]
    fn listing_by_type() {
        let db = memory_db();
        let s = store(&db);
        s.add(&Item::role("admin")).expect("add");
        s.add(&Item::role("guest")).expect("add");
        s.add(&Item::permission("read")).expect("add");

        assert_eq!(names(&s.get_roles().expect("roles")), vec!["admin", "guest"]);
        assert_eq!(names(&s.get_permissions().expect("perms")), vec!["read"]);
        assert_eq!(
            names(&s.get_by_names(&["read", "admin", "missing"]).expect("by names")),
            vec!["admin", "read"]
        );
        assert!(s.get_by_names(&[]).expect("empty").is_empty());
    }

    #[test]
    fn update_changes_attributes_but_not_name() {
        let db = memory_db();
        let s = store(&db);
        s.add(&Item::role("admin").with_timestamps(1, 1)).expect("add");

        let changed = Item::role("admin")
            .with_description("Boss")
            .with_timestamps(99, 5);
        s.update("admin", &changed).expect("update");
        let stored = s.get("admin").expect("get").expect("exists");
        assert_eq!(stored.description.as_deref(), Some("Boss"));
        assert_eq!(stored.created_at, 1, "createdAt is immutable");
        assert_eq!(stored.updated_at, 5);

        assert!(matches!(
            s.update("admin", &Item::role("root")).unwrap_err(),
            StoreError::Validation { field: "name", .. }
        ));
        assert!(matches!(
            s.update("ghost", &Item::role("ghost")).unwrap_err(),
            StoreError::NotFound(_)
        ));
    }

    #[test]
    fn add_child_guards_the_dag() {
        let db = memory_db();
        let s = store(&db);
        seed(&s, &["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        s.add(&Item::permission("p")).expect("add");

        assert!(matches!(
            s.add_child("c", "a").unwrap_err(),
            StoreError::CycleDetected { .. }
        ));
        assert!(matches!(
            s.add_child("a", "a").unwrap_err(),
            StoreError::CycleDetected { .. }
        ));
        assert!(matches!(
            s.add_child("a", "b").unwrap_err(),
            StoreError::AlreadyExists(_)
        ));
        assert!(matches!(
            s.add_child("a", "missing").unwrap_err(),
            StoreError::NotFound(_)
        ));
        assert!(matches!(
            s.add_child("p", "a").unwrap_err(),
            StoreError::Validation { .. }
        ));
        s.add_child("a", "c").expect("shortcut edge is fine");
        s.add_child("c", "p").expect("role may contain permission");
    }

    #[test]
    fn direct_edge_queries() {
        let db = memory_db();
        let s = store(&db);
        seed(&s, &["a", "b", "c"], &[("a", "b"), ("a", "c"), ("b", "c")]);

        assert_eq!(names(&s.get_direct_children("a").expect("kids")), vec!["b", "c"]);
        assert_eq!(names(&s.get_parents("c").expect("parents")), vec!["a", "b"]);
        assert!(s.has_direct_child("a", "b").expect("edge"));
        assert!(!s.has_direct_child("b", "a").expect("edge"));
        assert!(s.has_children("b").expect("children"));
        assert!(!s.has_children("c").expect("children"));

        assert!(s.remove_child("a", "c").expect("remove"));
        assert!(!s.remove_child("a", "c").expect("remove again"));
        assert!(s.has_child("a", "c").expect("still reachable via b"));
        assert_eq!(s.remove_children("a").expect("remove all"), 1);
        assert!(!s.has_child("a", "c").expect("now unreachable"));
    }

    #[test]
    fn closure_queries_delegate_to_engine() {
        let db = memory_db();
        let s = store(&db);
        seed(&s, &["admin", "editor"], &[("admin", "editor")]);
        s.add(&Item::permission("edit")).expect("add");
        s.add_child("editor", "edit").expect("edge");

        assert_eq!(names(&s.get_ancestors("edit").expect("anc")), vec!["admin", "editor"]);
        assert_eq!(
            names(&s.get_all_children(&["admin"]).expect("all")),
            vec!["edit", "editor"]
        );
        assert_eq!(names(&s.get_all_child_roles(&["admin"]).expect("roles")), vec!["editor"]);
        assert_eq!(
            names(&s.get_all_child_permissions(&["admin"]).expect("perms")),
            vec!["edit"]
        );
        let tree = s.get_access_tree("admin").expect("tree").expect("exists");
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn remove_drops_item_and_edges() {
        let db = memory_db();
        let s = store(&db);
        seed(&s, &["a", "b", "c"], &[("a", "b"), ("b", "c")]);

        assert!(s.remove("b").expect("remove"));
        assert!(!s.exists("b").expect("exists"));
        assert!(s.get_direct_children("a").expect("kids").is_empty());
        assert!(s.get_parents("c").expect("parents").is_empty());
        assert!(!s.remove("b").expect("remove again"));
    }

    #[test]
    fn remove_takes_assignments_on_a_restrict_schema() {
        let no_cascade = StoreConfig {
            cascade: false,
            ..StoreConfig::default()
        };
        let db = crate::db::sqlite::open_in_memory(&no_cascade).expect("open");
        let s = GraphStore::new(&db, no_cascade).expect("store");
        seed(&s, &["r", "q"], &[("r", "q")]);
        let assignments = AssignmentStore::for_graph(&s);
        assignments
            .add(&crate::model::Assignment::new("r", "u1"))
            .expect("grant");
        assignments
            .add(&crate::model::Assignment::new("q", "u1"))
            .expect("grant");

        assert!(s.remove("r").expect("remove"));
        assert!(!s.exists("r").expect("exists"));
        assert!(!assignments.has_item("r").expect("grants"));
        assert!(assignments.exists("q", "u1").expect("other grant kept"));
        assert!(!db.in_transaction());
    }

    #[test]
    fn add_child_runs_in_its_own_transaction_or_joins_the_callers() {
        let db = memory_db();
        let s = store(&db);
        seed(&s, &["a", "b", "c"], &[("a", "b")]);
        assert!(!db.in_transaction());

        db.begin().expect("outer");
        s.add_child("b", "c").expect("edge");
        assert!(db.in_transaction(), "caller's transaction stays open");
        db.rollback().expect("rollback");
        assert!(!s.has_direct_child("b", "c").expect("edge"));

        let err = s.add_child("b", "a").unwrap_err();
        assert!(matches!(err, StoreError::CycleDetected { .. }));
        assert!(!db.in_transaction());
    }

    #[test]
    fn clear_by_type_keeps_the_other_type() {
        let db = memory_db();
        let s = store(&db);
        seed(&s, &["admin"], &[]);
        s.add(&Item::permission("read")).expect("add");
        s.add_child("admin", "read").expect("edge");

        s.clear_permissions().expect("clear");
        assert_eq!(names(&s.get_all().expect("all")), vec!["admin"]);
        assert!(!s.has_children("admin").expect("children"));

        s.clear().expect("clear all");
        assert!(s.get_all().expect("all").is_empty());
    }
}

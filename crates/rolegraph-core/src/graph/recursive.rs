//! Closure as a single recursive common table expression.
//!
//! ```text
//! WITH RECURSIVE reach(name) AS (
//!     SELECT e.child FROM edges e WHERE e.parent IN (:seeds)
//!     UNION
//!     SELECT e.child FROM edges e JOIN reach r ON e.parent = r.name
//! )
//! SELECT DISTINCT i.* FROM reach r JOIN items i ON i.name = r.name
//! WHERE i.name NOT IN (:seeds) [AND i.type = :type]
//! ```
//!
//! `UNION` stops at the fixpoint on every engine that allows it in the
//! recursive member. Where only `UNION ALL` is accepted the walk still ends
//! because the edge set is acyclic, and the outer `DISTINCT` folds the
//! repeats.

use std::collections::HashSet;

use tracing::trace;

use super::{
    AccessTree, Direction, QueryContext, Strategy, TraversalEngine, assemble_tree, unique_seeds,
};
use crate::db::sql::SqlBuilder;
use crate::db::{self, Backend, RowReader, Statement};
use crate::error::Result;
use crate::model::{Edge, Item, ItemType};

const REACH: &str = "reach";
const TREE: &str = "tree";

#[derive(Debug, Clone)]
pub struct RecursiveClosure {
    ctx: QueryContext,
}

impl RecursiveClosure {
    #[must_use]
    pub const fn new(ctx: QueryContext) -> Self {
        Self { ctx }
    }

    /// Render `reach(name)` seeded from `seeds` walking in `direction`.
    fn push_reach_cte(&self, b: &mut SqlBuilder, direction: Direction, seeds: &[&str]) {
        let (from, to) = direction.columns();
        let edges = &self.ctx.tables.children;
        let dialect = self.ctx.dialect;

        b.push(dialect.recursive_with())
            .push(" ")
            .push(REACH)
            .push("(name) AS (SELECT ")
            .column("e", to)
            .push(" FROM ")
            .ident(edges)
            .push(" e WHERE ")
            .column("e", from)
            .push(" IN ")
            .bind_list(seeds)
            .push(" ")
            .push(dialect.recursive_union())
            .push(" SELECT ")
            .column("e", to)
            .push(" FROM ")
            .ident(edges)
            .push(" e JOIN ")
            .push(REACH)
            .push(" r ON ")
            .column("e", from)
            .push(" = r.name)");
    }

    fn closure_statement(
        &self,
        direction: Direction,
        seeds: &[&str],
        item_type: Option<ItemType>,
    ) -> Statement {
        let mut b = self.ctx.builder();
        self.push_reach_cte(&mut b, direction, seeds);
        b.push(" SELECT DISTINCT ")
            .item_columns("i")
            .push(" FROM ")
            .push(REACH)
            .push(" r JOIN ")
            .ident(&self.ctx.tables.items)
            .push(" i ON ")
            .column("i", "name")
            .push(" = r.name WHERE ")
            .column("i", "name")
            .push(" NOT IN ")
            .bind_list(seeds);
        if let Some(item_type) = item_type {
            b.push(" AND ").column("i", "type").push(" = ").bind(item_type.as_str());
        }
        b.build()
    }

    fn reachable_statement(&self, parent: &str, child: &str) -> Statement {
        let mut b = self.ctx.builder();
        self.push_reach_cte(&mut b, Direction::Descendants, &[parent]);
        b.push(" SELECT COUNT(*) FROM ")
            .push(REACH)
            .push(" r WHERE r.name = ")
            .bind(child);
        b.build()
    }

    /// `tree(name, via)` rooted at `root`, where `via` is the parent through
    /// which `name` was reached (empty for the root).
    fn access_tree_statement(&self, root: &str) -> Statement {
        let dialect = self.ctx.dialect;
        let edges = &self.ctx.tables.children;
        let mut b = self.ctx.builder();

        b.push(dialect.recursive_with())
            .push(" ")
            .push(TREE)
            .push("(name, via) AS (SELECT ")
            .bind_text(root)
            .push(", ")
            .push(&dialect.text_cast("''"))
            .push(dialect.from_dual())
            .push(" ")
            .push(dialect.recursive_union())
            .push(" SELECT ");
        let child = format!("e.{}", dialect.quote("child"));
        let parent = format!("e.{}", dialect.quote("parent"));
        b.push(&dialect.text_cast(&child))
            .push(", ")
            .push(&dialect.text_cast(&parent))
            .push(" FROM ")
            .ident(edges)
            .push(" e JOIN ")
            .push(TREE)
            .push(" t ON ")
            .column("e", "parent")
            .push(" = t.name) SELECT DISTINCT t.via, ")
            .item_columns("i")
            .push(" FROM ")
            .push(TREE)
            .push(" t JOIN ")
            .ident(&self.ctx.tables.items)
            .push(" i ON ")
            .column("i", "name")
            .push(" = t.name");
        b.build()
    }
}

impl TraversalEngine for RecursiveClosure {
    fn strategy(&self) -> Strategy {
        Strategy::RecursiveClosure
    }

    fn context(&self) -> &QueryContext {
        &self.ctx
    }

    fn closure(
        &self,
        db: &dyn Backend,
        direction: Direction,
        seeds: &[&str],
        item_type: Option<ItemType>,
    ) -> Result<Vec<Item>> {
        let seeds = unique_seeds(seeds);
        if seeds.is_empty() {
            return Ok(Vec::new());
        }
        let stmt = self.closure_statement(direction, &seeds, item_type);
        trace!(?direction, seeds = seeds.len(), sql = %stmt.sql, "recursive closure");
        db::decode_items(&db.query(&stmt)?)
    }

    fn has_descendant(&self, db: &dyn Backend, parent: &str, child: &str) -> Result<bool> {
        if parent == child {
            return Ok(false);
        }
        let rows = db.query(&self.reachable_statement(parent, child))?;
        let count = match rows.first() {
            Some(row) => RowReader::new(row).integer(0)?,
            None => 0,
        };
        Ok(count > 0)
    }

    fn access_tree(&self, db: &dyn Backend, name: &str) -> Result<Option<AccessTree>> {
        let rows = db.query(&self.access_tree_statement(name))?;

        let mut seen = HashSet::new();
        let mut items: Vec<Item> = Vec::new();
        let mut edges = Vec::new();
        for row in &rows {
            let via = RowReader::new(row).opt_text(0)?;
            let item = db::decode_item(&RowReader::at(row, 1))?;
            if let Some(via) = via {
                edges.push(Edge::new(via, item.name.clone()));
            }
            if seen.insert(item.name.clone()) {
                items.push(item);
            }
        }

        if !seen.contains(name) {
            return Ok(None);
        }
        Ok(Some(assemble_tree(name, items, edges)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::db::sql::Dialect;
    use crate::store::GraphStore;
    use crate::test_support::{Recording, memory_db, names, seed};

    fn engine(dialect: Dialect) -> RecursiveClosure {
        RecursiveClosure::new(QueryContext::new(dialect, &StoreConfig::default()))
    }

    #[test]
    fn sqlite_closure_sql_shape() {
        let stmt = engine(Dialect::Sqlite).closure_statement(
            Direction::Descendants,
            &["admin"],
            Some(ItemType::Permission),
        );
        assert!(stmt.sql.starts_with("WITH RECURSIVE reach(name) AS (SELECT e.\"child\""));
        assert!(stmt.sql.contains(" UNION SELECT "));
        assert!(stmt.sql.contains("e.\"parent\" = r.name"));
        assert!(stmt.sql.contains("i.\"type\" = ?3"));
        assert_eq!(stmt.params.len(), 3);
    }

    #[test]
    fn ancestors_walk_child_to_parent() {
        let stmt = engine(Dialect::Sqlite).closure_statement(Direction::Ancestors, &["x"], None);
        assert!(stmt.sql.contains("SELECT e.\"parent\" FROM"));
        assert!(stmt.sql.contains("e.\"child\" = r.name"));
    }

    #[test]
    fn sql_server_uses_plain_with_and_union_all() {
        let stmt = engine(Dialect::SqlServer).closure_statement(
            Direction::Descendants,
            &["a", "b"],
            None,
        );
        assert!(stmt.sql.starts_with("WITH reach(name)"));
        assert!(stmt.sql.contains("UNION ALL"));
        assert!(stmt.sql.contains("[rbac_item_child]"));
        assert!(stmt.sql.contains("IN (@P1, @P2)"));
        assert!(stmt.sql.contains("NOT IN (@P3, @P4)"));
    }

    #[test]
    fn access_tree_anchor_is_cast_for_strict_engines() {
        let pg = engine(Dialect::Postgres).access_tree_statement("root");
        assert!(pg.sql.contains("SELECT CAST($1 AS TEXT), CAST('' AS TEXT) UNION"));

        let oracle = engine(Dialect::Oracle).access_tree_statement("root");
        assert!(oracle.sql.starts_with("WITH tree(name, via)"));
        assert!(oracle.sql.contains("FROM DUAL UNION ALL"));

        let mysql = engine(Dialect::MySql).access_tree_statement("root");
        assert!(mysql.sql.contains("CAST(e.`child` AS CHAR(255))"));
    }

    #[test]
    fn empty_seeds_issue_no_statement() {
        let db = Recording::default();
        let out = engine(Dialect::MySql)
            .closure(&db, Direction::Descendants, &[], None)
            .expect("closure");
        assert!(out.is_empty());
        assert!(db.sql().is_empty());
    }

    #[test]
    fn closure_on_sqlite() {
        let db = memory_db();
        let store = GraphStore::with_engine(
            &db,
            StoreConfig::default(),
            Box::new(engine(Dialect::Sqlite)),
        )
        .expect("store");
        seed(
            &store,
            &["admin", "editor", "author"],
            &[("admin", "editor"), ("editor", "author"), ("admin", "author")],
        );
        store.add(&Item::permission("post.create")).expect("add");
        store.add_child("author", "post.create").expect("edge");

        let e = store.engine();
        assert_eq!(
            names(&e.descendants(&db, &["admin"]).expect("desc")),
            vec!["author", "editor", "post.create"]
        );
        assert_eq!(
            names(&e.ancestors(&db, "post.create").expect("anc")),
            vec!["admin", "author", "editor"]
        );
        assert_eq!(
            names(
                &e.descendants_by_type(&db, &["admin"], ItemType::Permission)
                    .expect("by type")
            ),
            vec!["post.create"]
        );
        assert!(e.has_descendant(&db, "admin", "post.create").expect("reach"));
        assert!(!e.has_descendant(&db, "post.create", "admin").expect("reach"));
        assert!(!e.has_descendant(&db, "admin", "admin").expect("reach"));
        assert!(!e.has_descendant(&db, "admin", "missing").expect("reach"));

        let tree = e.access_tree(&db, "editor").expect("tree").expect("exists");
        assert_eq!(tree.len(), 3);
        assert!(tree.get("editor").expect("root").parents.is_empty());
        assert_eq!(
            tree.get("post.create")
                .expect("leaf")
                .parents
                .iter()
                .collect::<Vec<_>>(),
            vec!["author"]
        );
        assert!(e.access_tree(&db, "missing").expect("tree").is_none());
    }
}

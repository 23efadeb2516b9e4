//! Transitive-closure traversal over the item hierarchy.
//!
//! The edge table is a DAG of `parent → child` links. Three strategies
//! compute the same closures with different engine requirements:
//!
//! - [`recursive::RecursiveClosure`]: one recursive common table expression.
//! - [`session::SessionVariableClosure`]: a fixpoint walk kept in per-session
//!   variables, for engines with user variables but no recursion.
//! - [`iterative::ApplicationIterative`]: one query per hierarchy level,
//!   driven from Rust.
//!
//! [`factory::TraversalFactory`] picks one per store. Every strategy returns
//! a complete, deduplicated result or an error; none falls back to another
//! strategy mid-call.

pub mod factory;
pub mod iterative;
pub mod recursive;
pub mod session;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use crate::config::{StoreConfig, TableNames};
use crate::db::sql::{Dialect, SqlBuilder};
use crate::db::{self, Backend, RowReader};
use crate::error::Result;
use crate::model::{Edge, Item, ItemType};

/// Upper bound on bound parameters per statement for chunked `IN` lists.
pub const MAX_BIND_PARAMS: usize = 500;

/// Closure algorithm, fixed once per store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    RecursiveClosure,
    SessionVariableClosure,
    ApplicationIterative,
}

impl Strategy {
    pub const ALL: [Self; 3] = [
        Self::RecursiveClosure,
        Self::SessionVariableClosure,
        Self::ApplicationIterative,
    ];
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RecursiveClosure => "recursive-closure",
            Self::SessionVariableClosure => "session-variable-closure",
            Self::ApplicationIterative => "application-iterative",
        })
    }
}

/// Which way along the edges a closure walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Parent to child.
    Descendants,
    /// Child to parent.
    Ancestors,
}

impl Direction {
    /// `(from, to)` edge columns: rows whose `from` is in the frontier yield
    /// their `to` as the next level.
    #[must_use]
    pub const fn columns(self) -> (&'static str, &'static str) {
        match self {
            Self::Descendants => ("parent", "child"),
            Self::Ancestors => ("child", "parent"),
        }
    }
}

/// Everything a strategy needs to render its statements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryContext {
    pub dialect: Dialect,
    pub tables: TableNames,
    pub separator: char,
    pub max_depth: Option<u32>,
}

impl QueryContext {
    #[must_use]
    pub fn new(dialect: Dialect, config: &StoreConfig) -> Self {
        Self {
            dialect,
            tables: config.tables.clone(),
            separator: config.separator,
            max_depth: config.max_depth,
        }
    }

    #[must_use]
    pub const fn builder(&self) -> SqlBuilder {
        SqlBuilder::new(self.dialect)
    }
}

/// One item of an [`AccessTree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessNode {
    pub item: Item,
    /// Direct parents of this item that are themselves in the tree. Empty
    /// for the root.
    pub parents: BTreeSet<String>,
}

/// An item and everything it grants, keyed by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessTree {
    pub root: String,
    pub nodes: BTreeMap<String, AccessNode>,
}

impl AccessTree {
    #[must_use]
    pub fn root_item(&self) -> Option<&Item> {
        self.nodes.get(&self.root).map(|node| &node.item)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AccessNode> {
        self.nodes.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Number of items including the root.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Names of every item in the tree except the root.
    pub fn descendant_names(&self) -> impl Iterator<Item = &str> {
        self.nodes
            .keys()
            .filter(|name| **name != self.root)
            .map(String::as_str)
    }
}

/// Closure queries over the edge table.
///
/// Implementations hold no per-call state of their own; everything lives in
/// the statements they issue against `db`.
pub trait TraversalEngine: fmt::Debug {
    fn strategy(&self) -> Strategy;

    fn context(&self) -> &QueryContext;

    /// Items reachable from `seeds` in `direction` by at least one edge,
    /// excluding the seeds themselves, optionally restricted to one type.
    ///
    /// The traversal passes through items of either type; `item_type` only
    /// filters what is returned. An empty seed list returns an empty result
    /// without touching `db`.
    ///
    /// # Errors
    ///
    /// Propagates backend errors, and [`crate::StoreError::DepthLimitExceeded`]
    /// where the strategy enforces a depth bound.
    fn closure(
        &self,
        db: &dyn Backend,
        direction: Direction,
        seeds: &[&str],
        item_type: Option<ItemType>,
    ) -> Result<Vec<Item>>;

    /// Every item that transitively reaches `name`.
    ///
    /// # Errors
    ///
    /// See [`TraversalEngine::closure`].
    fn ancestors(&self, db: &dyn Backend, name: &str) -> Result<Vec<Item>> {
        self.closure(db, Direction::Ancestors, &[name], None)
    }

    /// Every item reachable from any of `names`.
    ///
    /// # Errors
    ///
    /// See [`TraversalEngine::closure`].
    fn descendants(&self, db: &dyn Backend, names: &[&str]) -> Result<Vec<Item>> {
        self.closure(db, Direction::Descendants, names, None)
    }

    /// Every item of `item_type` reachable from any of `names`.
    ///
    /// # Errors
    ///
    /// See [`TraversalEngine::closure`].
    fn descendants_by_type(
        &self,
        db: &dyn Backend,
        names: &[&str],
        item_type: ItemType,
    ) -> Result<Vec<Item>> {
        self.closure(db, Direction::Descendants, names, Some(item_type))
    }

    /// Whether `child` is reachable from `parent` by at least one edge.
    ///
    /// # Errors
    ///
    /// See [`TraversalEngine::closure`].
    fn has_descendant(&self, db: &dyn Backend, parent: &str, child: &str) -> Result<bool> {
        if parent == child {
            return Ok(false);
        }
        Ok(self
            .descendants(db, &[parent])?
            .iter()
            .any(|item| item.name == child))
    }

    /// `name` plus its descendant closure, with in-tree parent links.
    /// `None` when `name` does not exist.
    ///
    /// # Errors
    ///
    /// See [`TraversalEngine::closure`].
    fn access_tree(&self, db: &dyn Backend, name: &str) -> Result<Option<AccessTree>> {
        let ctx = self.context();
        let Some(root) = fetch_item(db, ctx, name)? else {
            return Ok(None);
        };
        let mut items = self.descendants(db, &[name])?;
        items.push(root);

        let child_names: Vec<&str> = items
            .iter()
            .filter(|item| item.name != name)
            .map(|item| item.name.as_str())
            .collect();
        let edges = fetch_parent_edges(db, ctx, &child_names)?;

        Ok(Some(assemble_tree(name, items, edges)))
    }
}

/// Load one item by name.
pub(crate) fn fetch_item(db: &dyn Backend, ctx: &QueryContext, name: &str) -> Result<Option<Item>> {
    let mut b = ctx.builder();
    b.push("SELECT ")
        .item_columns("i")
        .push(" FROM ")
        .ident(&ctx.tables.items)
        .push(" i WHERE ")
        .column("i", "name")
        .push(" = ")
        .bind(name);
    let rows = db.query(&b.build())?;
    rows.first()
        .map(|row| db::decode_item(&RowReader::new(row)))
        .transpose()
}

/// Edges whose child is one of `children`, in chunks of
/// [`MAX_BIND_PARAMS`].
pub(crate) fn fetch_parent_edges(
    db: &dyn Backend,
    ctx: &QueryContext,
    children: &[&str],
) -> Result<Vec<Edge>> {
    let mut edges = Vec::new();
    for chunk in children.chunks(MAX_BIND_PARAMS) {
        let mut b = ctx.builder();
        b.push("SELECT ")
            .column_list("e", &["parent", "child"])
            .push(" FROM ")
            .ident(&ctx.tables.children)
            .push(" e WHERE ")
            .column("e", "child")
            .push(" IN ")
            .bind_list(chunk);
        for row in db.query(&b.build())? {
            let reader = RowReader::new(&row);
            edges.push(Edge::new(reader.text(0)?, reader.text(1)?));
        }
    }
    Ok(edges)
}

/// Build an [`AccessTree`] from its items and candidate edges. Edges with an
/// endpoint outside `items`, or pointing at the root, are ignored.
pub(crate) fn assemble_tree(root: &str, items: Vec<Item>, edges: Vec<Edge>) -> AccessTree {
    let mut nodes: BTreeMap<String, AccessNode> = items
        .into_iter()
        .map(|item| {
            (
                item.name.clone(),
                AccessNode {
                    item,
                    parents: BTreeSet::new(),
                },
            )
        })
        .collect();
    for edge in edges {
        if edge.child == root || !nodes.contains_key(&edge.parent) {
            continue;
        }
        if let Some(node) = nodes.get_mut(&edge.child) {
            node.parents.insert(edge.parent);
        }
    }
    AccessTree {
        root: root.to_string(),
        nodes,
    }
}

/// Keep only items of `item_type`, when one is given.
pub(crate) fn retain_type(items: &mut Vec<Item>, item_type: Option<ItemType>) {
    if let Some(item_type) = item_type {
        items.retain(|item| item.item_type == item_type);
    }
}

/// Seeds with duplicates removed, first occurrence kept.
pub(crate) fn unique_seeds<'a>(seeds: &[&'a str]) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    seeds.iter().copied().filter(|s| seen.insert(*s)).collect()
}

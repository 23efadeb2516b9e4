//! Breadth-first closure driven from Rust, one query per level.
//!
//! Needs nothing from the engine beyond joins and `IN` lists, so it serves
//! SQLite builds older than 3.8.3. Each round fetches the items one edge away
//! from the current frontier, keeps the ones not seen before and makes them
//! the next frontier.

use std::collections::HashSet;

use tracing::{debug, trace};

use super::{
    Direction, MAX_BIND_PARAMS, QueryContext, Strategy, TraversalEngine, retain_type,
    unique_seeds,
};
use crate::db::{self, Backend, Statement};
use crate::error::{Result, StoreError};
use crate::model::{Item, ItemType};

#[derive(Debug, Clone)]
pub struct ApplicationIterative {
    ctx: QueryContext,
}

impl ApplicationIterative {
    #[must_use]
    pub const fn new(ctx: QueryContext) -> Self {
        Self { ctx }
    }

    /// Items one edge away from any of `frontier`.
    fn step_statement(&self, direction: Direction, frontier: &[&str]) -> Statement {
        let (from, to) = direction.columns();
        let mut b = self.ctx.builder();
        b.push("SELECT ")
            .item_columns("i")
            .push(" FROM ")
            .ident(&self.ctx.tables.children)
            .push(" e JOIN ")
            .ident(&self.ctx.tables.items)
            .push(" i ON ")
            .column("i", "name")
            .push(" = ")
            .column("e", to)
            .push(" WHERE ")
            .column("e", from)
            .push(" IN ")
            .bind_list(frontier);
        b.build()
    }
}

impl TraversalEngine for ApplicationIterative {
    fn strategy(&self) -> Strategy {
        Strategy::ApplicationIterative
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
        let mut seen: HashSet<String> = seeds.iter().map(|s| (*s).to_string()).collect();
        let mut frontier: Vec<String> = seeds.iter().map(|s| (*s).to_string()).collect();
        let mut found = Vec::new();
        let mut depth: u32 = 0;

        while !frontier.is_empty() {
            let mut next = Vec::new();
            let names: Vec<&str> = frontier.iter().map(String::as_str).collect();
            for chunk in names.chunks(MAX_BIND_PARAMS) {
                let rows = db.query(&self.step_statement(direction, chunk))?;
                for item in db::decode_items(&rows)? {
                    if seen.insert(item.name.clone()) {
                        next.push(item.name.clone());
                        found.push(item);
                    }
                }
            }

            depth += 1;
            if let Some(limit) = self.ctx.max_depth {
                if depth > limit && !next.is_empty() {
                    debug!(limit, ?direction, "closure exceeded depth limit");
                    return Err(StoreError::DepthLimitExceeded { limit });
                }
            }
            trace!(depth, discovered = next.len(), "iterative closure round");
            frontier = next;
        }

        retain_type(&mut found, item_type);
        Ok(found)
    }
}

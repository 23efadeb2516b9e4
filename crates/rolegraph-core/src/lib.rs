//! rolegraph-core library.
//!
//! Persists a role/permission hierarchy (items, parent → child edges and
//! user assignments) and answers transitive-closure queries over it with a
//! strategy chosen for the backing engine.
//!
//! ```no_run
//! use rolegraph_core::{GraphStore, Item, StoreConfig, TransactionCoordinator};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = StoreConfig::default();
//! let db = rolegraph_core::db::sqlite::open_in_memory(&config)?;
//! let store = GraphStore::new(&db, config)?;
//! store.add(&Item::role("admin"))?;
//! store.add(&Item::permission("post.delete"))?;
//! store.add_child("admin", "post.delete")?;
//! assert!(store.has_child("admin", "post.delete")?);
//!
//! TransactionCoordinator::new(&store)?.rename_item("admin", "owner")?;
//! # Ok(())
//! # }
//! ```
//!
//! # Conventions
//!
//! - **Errors**: [`StoreError`] for everything below the I/O edge;
//!   `anyhow::Result` only where files are opened or parsed.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `debug!`, `trace!`).
//!   The library never installs a subscriber.

pub mod capabilities;
pub mod config;
pub mod db;
pub mod error;
pub mod graph;
pub mod model;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{StoreConfig, TableNames, load_config};
pub use error::{ErrorCode, Result, StoreError};
pub use graph::factory::TraversalFactory;
pub use graph::{AccessNode, AccessTree, Direction, Strategy, TraversalEngine};
pub use model::{Assignment, Edge, Item, ItemType};
pub use store::{AssignmentStore, GraphStore, ReferentialMode, TransactionCoordinator};

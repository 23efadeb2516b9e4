//! Strategy selection.
//!
//! The backend's driver name decides the engine family; MySQL and SQLite get
//! one version probe because their support for recursive queries depends on
//! the release. The choice is made once per store.

use tracing::info;

use super::iterative::ApplicationIterative;
use super::recursive::RecursiveClosure;
use super::session::SessionVariableClosure;
use super::{QueryContext, Strategy, TraversalEngine};
use crate::capabilities::{Capabilities, detect_capabilities};
use crate::config::StoreConfig;
use crate::db::Backend;
use crate::db::sql::Dialect;
use crate::error::Result;

/// Chooses and builds the [`TraversalEngine`] for a backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraversalFactory;

impl TraversalFactory {
    /// Probe `db` once and build the best strategy it supports.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::UnsupportedEngine`] for an unknown driver
    /// or unparseable version, and [`crate::StoreError::Validation`] for an
    /// invalid config.
    pub fn select(db: &dyn Backend, config: &StoreConfig) -> Result<Box<dyn TraversalEngine>> {
        let caps = detect_capabilities(db)?;
        let strategy = Self::strategy_for(&caps);
        info!(
            driver = db.driver_name(),
            engine = %caps.kind,
            version = ?caps.version,
            %strategy,
            "selected traversal strategy"
        );
        Self::build(strategy, caps.kind.dialect(), config)
    }

    /// Best strategy for the detected capabilities.
    #[must_use]
    pub const fn strategy_for(caps: &Capabilities) -> Strategy {
        if caps.recursive_cte {
            Strategy::RecursiveClosure
        } else if caps.session_variables {
            Strategy::SessionVariableClosure
        } else {
            Strategy::ApplicationIterative
        }
    }

    /// Build `strategy` for `dialect` without probing.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Validation`] for an invalid config and
    /// [`crate::StoreError::UnsupportedEngine`] when `strategy` cannot run on
    /// `dialect`.
    pub fn build(
        strategy: Strategy,
        dialect: Dialect,
        config: &StoreConfig,
    ) -> Result<Box<dyn TraversalEngine>> {
        config.validate()?;
        let ctx = QueryContext::new(dialect, config);
        Ok(match strategy {
            Strategy::RecursiveClosure => Box::new(RecursiveClosure::new(ctx)),
            Strategy::SessionVariableClosure => Box::new(SessionVariableClosure::new(ctx)?),
            Strategy::ApplicationIterative => Box::new(ApplicationIterative::new(ctx)),
        })
    }
}

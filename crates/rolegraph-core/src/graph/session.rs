//! Closure as a fixpoint kept in per-session variables.
//!
//! For engines with user variables but no recursive queries (MySQL 5.x,
//! MariaDB before 10.2.2). Two variables live in the session:
//!
//! - `rg_visited`: every name seen so far, joined by the separator.
//! - `rg_frontier`: the names discovered by the previous step.
//!
//! The walk statement scans the edge table once; for every scanned row it
//! replaces the frontier with the unvisited targets of edges leaving the
//! current frontier and appends them to `rg_visited`. A DAG is never deeper
//! than its edge count, so one scan reaches the fixpoint, after which each
//! remaining row is a no-op. A second statement collects the items named in
//! `rg_visited`.
//!
//! Membership is a substring test on separator-wrapped strings, which is why
//! item names may never contain the separator.
//!
//! On SQLite the variables are emulated by `session_get` / `session_set`,
//! registered per connection by [`crate::db::sqlite::SqliteBackend`].

use tracing::trace;

use super::{Direction, QueryContext, Strategy, TraversalEngine, retain_type, unique_seeds};
use crate::db::sql::{Dialect, SqlBuilder};
use crate::db::{self, Backend, Statement};
use crate::error::{Result, StoreError};
use crate::model::{Item, ItemType};
use crate::model::name::validate_separator;

const FRONTIER: &str = "rg_frontier";
const VISITED: &str = "rg_visited";

/// How session variables are spelled on the target engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSyntax {
    /// `@var := expr`, `GROUP_CONCAT`, `LOCATE`.
    MySql,
    /// `session_set('var', expr)`, `group_concat`, `instr`.
    Sqlite,
}

impl SessionSyntax {
    /// # Errors
    ///
    /// Returns [`StoreError::UnsupportedEngine`] for dialects without session
    /// variables.
    pub fn for_dialect(dialect: Dialect) -> Result<Self> {
        match dialect {
            Dialect::MySql => Ok(Self::MySql),
            Dialect::Sqlite => Ok(Self::Sqlite),
            Dialect::Postgres | Dialect::SqlServer | Dialect::Oracle => {
                Err(StoreError::UnsupportedEngine {
                    driver: dialect.to_string(),
                    version: None,
                })
            }
        }
    }

    fn get(self, var: &str) -> String {
        match self {
            Self::MySql => format!("@{var}"),
            Self::Sqlite => format!("session_get('{var}')"),
        }
    }

    /// A predicate that is always true for a stored edge but that the
    /// planner cannot prove constant.
    fn correlate(self, column: &str) -> String {
        match self {
            Self::MySql => format!("LENGTH({column}) > 0"),
            Self::Sqlite => format!("length({column}) > 0"),
        }
    }

    /// 1-based position of `needle` as a whole separator-delimited element
    /// of `haystack`, 0 when absent.
    fn position(self, sep: &str, needle: &str, haystack: &str) -> String {
        match self {
            Self::MySql => {
                format!("LOCATE(CONCAT({sep}, {needle}, {sep}), CONCAT({sep}, {haystack}, {sep}))")
            }
            Self::Sqlite => format!("instr({sep} || {haystack} || {sep}, {sep} || {needle} || {sep})"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionVariableClosure {
    ctx: QueryContext,
    syntax: SessionSyntax,
}

impl SessionVariableClosure {
    /// # Errors
    ///
    /// Returns [`StoreError::UnsupportedEngine`] when the dialect has no
    /// session variables, and [`StoreError::Validation`] for a separator that
    /// cannot be embedded as a literal.
    pub fn new(ctx: QueryContext) -> Result<Self> {
        let syntax = SessionSyntax::for_dialect(ctx.dialect)?;
        validate_separator(ctx.separator)?;
        Ok(Self { ctx, syntax })
    }

    #[must_use]
    pub const fn syntax(&self) -> SessionSyntax {
        self.syntax
    }

    /// The separator as a SQL string literal. `validate_separator` keeps
    /// quotes and backslashes out, so no escaping is needed.
    fn sep(&self) -> String {
        format!("'{}'", self.ctx.separator)
    }

    fn joined(&self, seeds: &[&str]) -> String {
        let mut sep = [0_u8; 4];
        seeds.join(self.ctx.separator.encode_utf8(&mut sep))
    }

    /// Statements that set up the session before the walk.
    fn init_statements(&self, seeds: &[&str]) -> Vec<Statement> {
        let joined = self.joined(seeds);
        let mut b = self.ctx.builder();
        match self.syntax {
            SessionSyntax::MySql => {
                b.push("SET @")
                    .push(FRONTIER)
                    .push(" := ")
                    .bind(joined.as_str())
                    .push(", @")
                    .push(VISITED)
                    .push(" := ")
                    .bind(joined);
                vec![
                    Statement::raw("SET SESSION group_concat_max_len = 4294967295"),
                    b.build(),
                ]
            }
            SessionSyntax::Sqlite => {
                b.push("SELECT session_set('")
                    .push(FRONTIER)
                    .push("', ")
                    .bind(joined.as_str())
                    .push("), session_set('")
                    .push(VISITED)
                    .push("', ")
                    .bind(joined)
                    .push(")");
                vec![b.build()]
            }
        }
    }

    /// The single scan that drives the frontier to the fixpoint.
    fn walk_statement(&self, direction: Direction) -> Statement {
        let (from, to) = direction.columns();
        let q = |ident: &str| self.ctx.dialect.quote(ident);
        let syntax = self.syntax;
        let sep = self.sep();
        let edges = q(&self.ctx.tables.children);
        let from_col = format!("e.{}", q(from));
        let to_col = format!("e.{}", q(to));
        let frontier = syntax.get(FRONTIER);
        let visited = syntax.get(VISITED);

        let in_frontier = syntax.position(&sep, &from_col, &frontier) + " > 0";
        let unvisited = syntax.position(&sep, &to_col, &visited) + " = 0";
        // The subquery must be re-evaluated for every scanned row, so it has
        // to depend on the outer row. `IS NOT NULL` on a NOT NULL key column
        // is folded away by SQLite; a length test is not.
        let correlate = syntax.correlate(&format!("walk.{}", q(from)));

        let sql = match syntax {
            SessionSyntax::MySql => format!(
                "SELECT @{FRONTIER} := (SELECT GROUP_CONCAT(DISTINCT {to_col} SEPARATOR {sep}) \
                 FROM {edges} e WHERE {in_frontier} AND {unvisited} AND {correlate}), \
                 @{VISITED} := CONCAT_WS({sep}, @{VISITED}, @{FRONTIER}) \
                 FROM {edges} walk"
            ),
            SessionSyntax::Sqlite => format!(
                "SELECT session_set('{FRONTIER}', (SELECT group_concat({to_col}, {sep}) \
                 FROM {edges} e WHERE {in_frontier} AND {unvisited} AND {correlate})), \
                 session_set('{VISITED}', {visited} || coalesce({sep} || {frontier}, '')) \
                 FROM {edges} walk"
            ),
        };
        Statement::raw(sql)
    }

    /// Items named in the visited set, minus the seeds.
    fn collect_statement(&self, seeds: &[&str]) -> Statement {
        let syntax = self.syntax;
        let name_col = format!("i.{}", self.ctx.dialect.quote("name"));
        let in_visited = syntax.position(&self.sep(), &name_col, &syntax.get(VISITED)) + " > 0";

        let mut b: SqlBuilder = self.ctx.builder();
        b.push("SELECT ")
            .item_columns("i")
            .push(" FROM ")
            .ident(&self.ctx.tables.items)
            .push(" i WHERE ")
            .push(&in_visited)
            .push(" AND ")
            .column("i", "name")
            .push(" NOT IN ")
            .bind_list(seeds);
        b.build()
    }

    fn reset_statement(&self) -> Statement {
        Statement::raw(match self.syntax {
            SessionSyntax::MySql => format!("SET @{FRONTIER} := NULL, @{VISITED} := NULL"),
            SessionSyntax::Sqlite => {
                format!("SELECT session_set('{FRONTIER}', NULL), session_set('{VISITED}', NULL)")
            }
        })
    }

    /// `SET` runs as an update on MySQL; the SQLite emulation is a `SELECT`
    /// whose rows are discarded.
    fn run(&self, db: &dyn Backend, stmt: &Statement) -> Result<()> {
        match self.syntax {
            SessionSyntax::MySql => db.execute(stmt).map(drop),
            SessionSyntax::Sqlite => db.query(stmt).map(drop),
        }
    }

    fn walk(&self, db: &dyn Backend, direction: Direction, seeds: &[&str]) -> Result<Vec<Item>> {
        for stmt in self.init_statements(seeds) {
            self.run(db, &stmt)?;
        }
        db.query(&self.walk_statement(direction))?;
        db::decode_items(&db.query(&self.collect_statement(seeds))?)
    }
}

impl TraversalEngine for SessionVariableClosure {
    fn strategy(&self) -> Strategy {
        Strategy::SessionVariableClosure
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
        // A name holding the separator cannot be stored, so it reaches
        // nothing; joining it would split it into unrelated seeds.
        let seeds: Vec<&str> = unique_seeds(seeds)
            .into_iter()
            .filter(|seed| !seed.contains(self.ctx.separator))
            .collect();
        if seeds.is_empty() {
            return Ok(Vec::new());
        }
        trace!(?direction, seeds = seeds.len(), syntax = ?self.syntax, "session-variable closure");

        let result = self.walk(db, direction, &seeds);
        let reset = self.run(db, &self.reset_statement());
        let mut items = result?;
        reset?;
        retain_type(&mut items, item_type);
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::db::Value;
    use crate::store::GraphStore;
    use crate::test_support::{Recording, memory_db, names, seed};

    fn engine(dialect: Dialect, config: &StoreConfig) -> SessionVariableClosure {
        SessionVariableClosure::new(QueryContext::new(dialect, config)).expect("engine")
    }

    #[test]
    fn rejects_engines_without_session_variables() {
        let ctx = QueryContext::new(Dialect::Postgres, &StoreConfig::default());
        let err = SessionVariableClosure::new(ctx).unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedEngine { .. }));
    }

    #[test]
    fn mysql_statements_use_user_variables() {
        let db = Recording::default();
        let e = engine(Dialect::MySql, &StoreConfig::default());
        e.closure(&db, Direction::Descendants, &["admin", "guest"], None)
            .expect("closure");

        let sql = db.sql();
        assert_eq!(sql.len(), 5);
        assert_eq!(sql[0], "SET SESSION group_concat_max_len = 4294967295");
        assert_eq!(sql[1], "SET @rg_frontier := ?, @rg_visited := ?");
        assert!(sql[2].starts_with("SELECT @rg_frontier := (SELECT GROUP_CONCAT(DISTINCT e.`child` SEPARATOR ',')"));
        assert!(sql[2].contains("LOCATE(CONCAT(',', e.`parent`, ','), CONCAT(',', @rg_frontier, ',')) > 0"));
        assert!(sql[2].contains("@rg_visited := CONCAT_WS(',', @rg_visited, @rg_frontier)"));
        assert!(sql[2].contains("AND LENGTH(walk.`parent`) > 0)"));
        assert!(sql[2].ends_with("FROM `rbac_item_child` walk"));
        assert!(sql[3].contains("NOT IN (?, ?)"));
        assert_eq!(sql[4], "SET @rg_frontier := NULL, @rg_visited := NULL");

        let init = &db.statements.borrow()[1];
        assert_eq!(init.params, vec![Value::from("admin,guest"), Value::from("admin,guest")]);
    }

    #[test]
    fn custom_separator_is_used_everywhere() {
        let config = StoreConfig {
            separator: ';',
            ..StoreConfig::default()
        };
        let e = engine(Dialect::MySql, &config);
        let walk = e.walk_statement(Direction::Ancestors).sql;
        assert!(walk.contains("SEPARATOR ';'"));
        assert!(!walk.contains("','"));
        assert!(walk.contains("GROUP_CONCAT(DISTINCT e.`parent`"));
    }

    #[test]
    fn seeds_containing_separator_are_ignored() {
        let db = Recording::default();
        let e = engine(Dialect::MySql, &StoreConfig::default());
        let out = e
            .closure(&db, Direction::Descendants, &["a,b"], None)
            .expect("closure");
        assert!(out.is_empty());
        assert!(db.sql().is_empty());
    }

    #[test]
    fn sqlite_emulation_walks_to_fixpoint() {
        let db = memory_db();
        let config = StoreConfig::default();
        let store = GraphStore::with_engine(
            &db,
            config.clone(),
            Box::new(engine(Dialect::Sqlite, &config)),
        )
        .expect("store");
        seed(
            &store,
            &["a", "b", "c", "d", "e", "x"],
            &[("a", "b"), ("b", "c"), ("c", "d"), ("a", "d"), ("d", "e"), ("x", "e")],
        );

        let e = store.engine();
        assert_eq!(
            names(&e.descendants(&db, &["a"]).expect("desc")),
            vec!["b", "c", "d", "e"]
        );
        assert_eq!(
            names(&e.ancestors(&db, "e").expect("anc")),
            vec!["a", "b", "c", "d", "x"]
        );
        assert_eq!(
            names(&e.descendants(&db, &["c", "x"]).expect("multi")),
            vec!["d", "e"]
        );
        assert!(e.descendants(&db, &["e"]).expect("leaf").is_empty());
        assert!(e.has_descendant(&db, "b", "e").expect("reach"));
        assert!(!e.has_descendant(&db, "e", "b").expect("reach"));
    }

    #[test]
    fn sqlite_walk_depends_on_the_scanned_row() {
        let e = engine(Dialect::Sqlite, &StoreConfig::default());
        let walk = e.walk_statement(Direction::Descendants).sql;
        assert!(walk.contains("AND length(walk.\"parent\") > 0))"));
        assert!(!walk.contains("IS NOT NULL"));
    }

    #[test]
    fn sqlite_walk_follows_every_hop_and_guards_cycles() {
        let db = memory_db();
        let config = StoreConfig::default();
        let store = GraphStore::with_engine(
            &db,
            config.clone(),
            Box::new(engine(Dialect::Sqlite, &config)),
        )
        .expect("store");
        seed(&store, &["P1", "C1", "G1"], &[("P1", "C1"), ("C1", "G1")]);

        assert_eq!(
            names(&store.get_all_children(&["P1"]).expect("desc")),
            vec!["C1", "G1"]
        );
        assert!(store.has_child("P1", "G1").expect("reach"));

        let err = store.add_child("G1", "P1").unwrap_err();
        assert!(matches!(err, StoreError::CycleDetected { .. }));
        assert!(!store.has_direct_child("G1", "P1").expect("edge"));
    }

    #[test]
    fn session_state_is_cleared_after_each_call() {
        let db = memory_db();
        let config = StoreConfig::default();
        let store = GraphStore::with_engine(
            &db,
            config.clone(),
            Box::new(engine(Dialect::Sqlite, &config)),
        )
        .expect("store");
        seed(&store, &["a", "b"], &[("a", "b")]);
        store.engine().descendants(&db, &["a"]).expect("desc");

        let rows = db
            .query(&Statement::raw(
                "SELECT session_get('rg_visited'), session_get('rg_frontier')",
            ))
            .expect("probe");
        assert_eq!(rows, vec![vec![Value::Null, Value::Null]]);
    }
}

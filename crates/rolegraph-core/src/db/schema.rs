//! SQLite DDL for the hierarchy tables.
//!
//! Production engines get their schema from external migration tooling; this
//! rendering exists so the SQLite backend and the test-suite are
//! self-contained. The layout matches the persisted contract:
//! - items keyed by `name`, indexed on `type`
//! - `(parent, child)` edges with a foreign key from each side
//! - `(itemName, userId)` assignments with a foreign key to the item

use crate::config::TableNames;
use crate::db::sql::Dialect;

/// Referential actions declared on the foreign keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferentialActions {
    /// `ON UPDATE CASCADE ON DELETE CASCADE`.
    Cascade,
    /// Plain foreign keys: dependent rows block updates and deletes.
    Restrict,
}

impl ReferentialActions {
    const fn clause(self) -> &'static str {
        match self {
            Self::Cascade => " ON UPDATE CASCADE ON DELETE CASCADE",
            Self::Restrict => "",
        }
    }
}

/// Names of the secondary indexes created for `tables`.
#[must_use]
pub fn index_names(tables: &TableNames) -> [String; 3] {
    [
        format!("idx_{}_type", tables.items),
        format!("idx_{}_parent", tables.children),
        format!("idx_{}_child", tables.children),
    ]
}

/// Render the full schema as one batch.
#[must_use]
pub fn render(tables: &TableNames, actions: ReferentialActions) -> String {
    let q = |ident: &str| Dialect::Sqlite.quote(ident);
    let items = q(&tables.items);
    let children = q(&tables.children);
    let assignments = q(&tables.assignments);
    let [type_idx, parent_idx, child_idx] = index_names(tables).map(|name| q(&name));
    let on = actions.clause();

    format!(
        r#"
CREATE TABLE IF NOT EXISTS {items} (
    "name" VARCHAR(128) NOT NULL PRIMARY KEY,
    "type" VARCHAR(10) NOT NULL CHECK ("type" IN ('role', 'permission')),
    "description" VARCHAR(191),
    "ruleName" VARCHAR(64),
    "createdAt" INTEGER NOT NULL,
    "updatedAt" INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS {type_idx} ON {items} ("type");

CREATE TABLE IF NOT EXISTS {children} (
    "parent" VARCHAR(128) NOT NULL REFERENCES {items} ("name"){on},
    "child" VARCHAR(128) NOT NULL REFERENCES {items} ("name"){on},
    PRIMARY KEY ("parent", "child")
);

CREATE INDEX IF NOT EXISTS {parent_idx} ON {children} ("parent");
CREATE INDEX IF NOT EXISTS {child_idx} ON {children} ("child");

CREATE TABLE IF NOT EXISTS {assignments} (
    "itemName" VARCHAR(128) NOT NULL REFERENCES {items} ("name"){on},
    "userId" VARCHAR(128) NOT NULL,
    "createdAt" INTEGER NOT NULL,
    PRIMARY KEY ("itemName", "userId")
);
"#
    )
}

//! Per-engine SQL fragments and a parameterized statement builder.
//!
//! Engines differ in a handful of places that matter to this crate:
//! identifier quoting, placeholder syntax, the keyword that opens a
//! recursive block, whether `UNION` is allowed inside it, how strictly the
//! anchor and recursive members must agree on column types, and whether a
//! table-less `SELECT` needs `FROM DUAL`. [`Dialect`] answers those
//! questions; [`SqlBuilder`] assembles statements from them without ever
//! splicing a value into SQL text.

use std::fmt;

use crate::db::{Statement, Value};

/// Column list of the items table, in the order [`crate::db::decode_item`]
/// expects.
pub const ITEM_COLUMNS: [&str; 6] = [
    "name",
    "type",
    "description",
    "ruleName",
    "createdAt",
    "updatedAt",
];

/// Column list of the assignments table, in decode order.
pub const ASSIGNMENT_COLUMNS: [&str; 3] = ["itemName", "userId", "createdAt"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Sqlite,
    MySql,
    Postgres,
    SqlServer,
    Oracle,
}

impl Dialect {
    /// Quote an identifier.
    #[must_use]
    pub fn quote(self, ident: &str) -> String {
        match self {
            Self::MySql => format!("`{ident}`"),
            Self::SqlServer => format!("[{ident}]"),
            Self::Sqlite | Self::Postgres | Self::Oracle => format!("\"{ident}\""),
        }
    }

    /// Placeholder for the 1-based parameter `index`.
    #[must_use]
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Self::Sqlite => format!("?{index}"),
            Self::MySql => "?".to_string(),
            Self::Postgres => format!("${index}"),
            Self::SqlServer => format!("@P{index}"),
            Self::Oracle => format!(":{index}"),
        }
    }

    /// Opening clause of a recursive common table expression.
    #[must_use]
    pub const fn recursive_with(self) -> &'static str {
        match self {
            Self::Sqlite | Self::MySql | Self::Postgres => "WITH RECURSIVE",
            Self::SqlServer | Self::Oracle => "WITH",
        }
    }

    /// Set operator joining anchor and recursive member.
    ///
    /// SQL Server and Oracle only accept `UNION ALL` there; on an acyclic
    /// graph the recursion still terminates and the outer `DISTINCT`
    /// removes the repeats.
    #[must_use]
    pub const fn recursive_union(self) -> &'static str {
        match self {
            Self::Sqlite | Self::MySql | Self::Postgres => "UNION",
            Self::SqlServer | Self::Oracle => "UNION ALL",
        }
    }

    /// Wrap `expr` so the anchor member of a recursive block yields an
    /// unbounded text column.
    ///
    /// Without it Postgres types a bare `''` as `unknown`, SQL Server
    /// rejects the varchar/nvarchar mismatch and MySQL sizes the column from
    /// the empty literal and truncates everything the recursion adds.
    #[must_use]
    pub fn text_cast(self, expr: &str) -> String {
        match self {
            Self::Sqlite => expr.to_string(),
            Self::MySql => format!("CAST({expr} AS CHAR(255))"),
            Self::Postgres => format!("CAST({expr} AS TEXT)"),
            Self::SqlServer => format!("CAST({expr} AS NVARCHAR(MAX))"),
            Self::Oracle => format!("CAST({expr} AS VARCHAR2(4000))"),
        }
    }

    /// Suffix for a `SELECT` without a table.
    #[must_use]
    pub const fn from_dual(self) -> &'static str {
        match self {
            Self::Oracle => " FROM DUAL",
            Self::Sqlite | Self::MySql | Self::Postgres | Self::SqlServer => "",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sqlite => "sqlite",
            Self::MySql => "mysql",
            Self::Postgres => "postgres",
            Self::SqlServer => "sqlserver",
            Self::Oracle => "oracle",
        })
    }
}

/// Incremental statement builder.
///
/// Parameters are numbered in the order they are bound, so fragments must be
/// pushed in the order they appear in the final SQL.
#[derive(Debug)]
pub struct SqlBuilder {
    dialect: Dialect,
    sql: String,
    params: Vec<Value>,
}

impl SqlBuilder {
    #[must_use]
    pub const fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    #[must_use]
    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Append raw SQL text. Never pass user data here.
    pub fn push(&mut self, fragment: &str) -> &mut Self {
        self.sql.push_str(fragment);
        self
    }

    /// Append a quoted identifier.
    pub fn ident(&mut self, name: &str) -> &mut Self {
        let quoted = self.dialect.quote(name);
        self.sql.push_str(&quoted);
        self
    }

    /// Append `alias.<quoted column>`.
    pub fn column(&mut self, alias: &str, column: &str) -> &mut Self {
        self.sql.push_str(alias);
        self.sql.push('.');
        self.ident(column)
    }

    /// Append the item column list qualified by `alias`.
    pub fn item_columns(&mut self, alias: &str) -> &mut Self {
        self.column_list(alias, &ITEM_COLUMNS)
    }

    /// Append a comma-separated, alias-qualified column list.
    pub fn column_list(&mut self, alias: &str, columns: &[&str]) -> &mut Self {
        for (idx, column) in columns.iter().enumerate() {
            if idx > 0 {
                self.sql.push_str(", ");
            }
            self.column(alias, column);
        }
        self
    }

    /// Bind a value and append its placeholder.
    pub fn bind(&mut self, value: impl Into<Value>) -> &mut Self {
        self.params.push(value.into());
        let placeholder = self.dialect.placeholder(self.params.len());
        self.sql.push_str(&placeholder);
        self
    }

    /// Bind a text value wrapped in the dialect's unbounded text cast.
    pub fn bind_text(&mut self, value: &str) -> &mut Self {
        self.params.push(Value::from(value));
        let placeholder = self.dialect.placeholder(self.params.len());
        let cast = self.dialect.text_cast(&placeholder);
        self.sql.push_str(&cast);
        self
    }

    /// Append `(p1, p2, ...)` binding every value.
    ///
    /// Callers must not pass an empty slice; `IN ()` is not valid SQL on
    /// most engines.
    pub fn bind_list<S: AsRef<str>>(&mut self, values: &[S]) -> &mut Self {
        self.sql.push('(');
        for (idx, value) in values.iter().enumerate() {
            if idx > 0 {
                self.sql.push_str(", ");
            }
            self.bind(value.as_ref());
        }
        self.sql.push(')');
        self
    }

    #[must_use]
    pub fn build(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_per_dialect() {
        assert_eq!(Dialect::Sqlite.quote("ruleName"), "\"ruleName\"");
        assert_eq!(Dialect::MySql.quote("ruleName"), "`ruleName`");
        assert_eq!(Dialect::SqlServer.quote("ruleName"), "[ruleName]");
        assert_eq!(Dialect::Oracle.quote("type"), "\"type\"");
    }

    #[test]
    fn placeholders_are_numbered_in_bind_order() {
        let mut b = SqlBuilder::new(Dialect::Postgres);
        b.push("SELECT 1 WHERE a = ").bind("x").push(" AND b IN ").bind_list(&["y", "z"]);
        let stmt = b.build();
        assert_eq!(stmt.sql, "SELECT 1 WHERE a = $1 AND b IN ($2, $3)");
        assert_eq!(
            stmt.params,
            vec![Value::from("x"), Value::from("y"), Value::from("z")]
        );
    }

    #[test]
    fn mysql_placeholders_are_positional() {
        let mut b = SqlBuilder::new(Dialect::MySql);
        b.bind_list(&["a", "b"]);
        assert_eq!(b.build().sql, "(?, ?)");
    }

    #[test]
    fn item_columns_are_qualified_and_quoted() {
        let mut b = SqlBuilder::new(Dialect::Sqlite);
        b.item_columns("i");
        assert_eq!(
            b.build().sql,
            "i.\"name\", i.\"type\", i.\"description\", i.\"ruleName\", i.\"createdAt\", i.\"updatedAt\""
        );
    }

    #[test]
    fn text_cast_only_where_needed() {
        assert_eq!(Dialect::Sqlite.text_cast("''"), "''");
        assert_eq!(Dialect::Postgres.text_cast("''"), "CAST('' AS TEXT)");
        assert_eq!(
            Dialect::SqlServer.text_cast("@P1"),
            "CAST(@P1 AS NVARCHAR(MAX))"
        );
    }

    #[test]
    fn bind_text_casts_placeholder() {
        let mut b = SqlBuilder::new(Dialect::Postgres);
        b.push("SELECT ").bind_text("root");
        assert_eq!(b.build().sql, "SELECT CAST($1 AS TEXT)");
    }

    #[test]
    fn recursive_keywords() {
        assert_eq!(Dialect::Sqlite.recursive_with(), "WITH RECURSIVE");
        assert_eq!(Dialect::Oracle.recursive_with(), "WITH");
        assert_eq!(Dialect::SqlServer.recursive_union(), "UNION ALL");
        assert_eq!(Dialect::MySql.recursive_union(), "UNION");
        assert_eq!(Dialect::Oracle.from_dual(), " FROM DUAL");
    }
}

//! Engine capability detection.
//!
//! The driver name alone decides the engine kind, except where one product
//! line spans versions with materially different features (SQLite before
//! 3.8.3, MySQL before 8.0.1, MariaDB before 10.2.2 lack recursive common
//! table expressions). For those a single read-only version probe settles
//! it.
//!
//! Unlike optional subsystems, nothing here degrades silently: an unknown
//! driver or a version string that cannot be parsed is an
//! [`StoreError::UnsupportedEngine`] error.

use std::fmt;

use tracing::debug;

use crate::db::Backend;
use crate::db::sql::Dialect;
use crate::error::{Result, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    Sqlite,
    MySql,
    MariaDb,
    Postgres,
    SqlServer,
    Oracle,
}

impl EngineKind {
    /// SQL dialect spoken by this engine.
    #[must_use]
    pub const fn dialect(self) -> Dialect {
        match self {
            Self::Sqlite => Dialect::Sqlite,
            Self::MySql | Self::MariaDb => Dialect::MySql,
            Self::Postgres => Dialect::Postgres,
            Self::SqlServer => Dialect::SqlServer,
            Self::Oracle => Dialect::Oracle,
        }
    }

    /// First version with recursive common table expressions, when the
    /// engine has releases without them.
    const fn recursive_cte_since(self) -> Option<EngineVersion> {
        match self {
            Self::Sqlite => Some(EngineVersion::new(3, 8, 3)),
            Self::MySql => Some(EngineVersion::new(8, 0, 1)),
            Self::MariaDb => Some(EngineVersion::new(10, 2, 2)),
            Self::Postgres | Self::SqlServer | Self::Oracle => None,
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sqlite => "sqlite",
            Self::MySql => "mysql",
            Self::MariaDb => "mariadb",
            Self::Postgres => "postgres",
            Self::SqlServer => "sqlserver",
            Self::Oracle => "oracle",
        })
    }
}

/// `major.minor.patch` triple compared lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EngineVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl EngineVersion {
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse the leading `major[.minor[.patch]]` of a server version string.
    ///
    /// Trailing build metadata (`-log`, `-0ubuntu0.22.04.1`, ...) is ignored.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let numeric: &str = raw
            .trim()
            .split(|c: char| !(c.is_ascii_digit() || c == '.'))
            .next()?;
        let mut parts = numeric.split('.').filter(|p| !p.is_empty());
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next().map_or(Some(0), |p| p.parse().ok())?;
        let patch = parts.next().map_or(Some(0), |p| p.parse().ok())?;
        Some(Self::new(major, minor, patch))
    }
}

impl fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// What the backing engine can do, as far as traversal is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub kind: EngineKind,
    /// Probed version, when the kind needed one.
    pub version: Option<EngineVersion>,
    /// Recursive common table expressions are available.
    pub recursive_cte: bool,
    /// Per-session user variables with in-statement assignment are available.
    pub session_variables: bool,
}

/// Map a driver name to an engine kind, before any version probe.
fn kind_from_driver(driver: &str) -> Option<EngineKind> {
    match driver.to_ascii_lowercase().as_str() {
        "sqlite" | "sqlite3" => Some(EngineKind::Sqlite),
        "mysql" | "mariadb" => Some(EngineKind::MySql),
        "pgsql" | "postgres" | "postgresql" => Some(EngineKind::Postgres),
        "sqlsrv" | "mssql" | "sqlserver" => Some(EngineKind::SqlServer),
        "oci" | "oracle" => Some(EngineKind::Oracle),
        _ => None,
    }
}

/// Split a MySQL-protocol version string into the real product and version.
///
/// MariaDB servers report e.g. `5.5.5-10.6.12-MariaDB-1:10.6.12+maria~ubu2004`
/// through the MySQL protocol; the `5.5.5-` prefix is a compatibility shim.
fn mysql_family_version(raw: &str) -> (EngineKind, Option<EngineVersion>) {
    if raw.to_ascii_lowercase().contains("mariadb") {
        let stripped = raw.strip_prefix("5.5.5-").unwrap_or(raw);
        (EngineKind::MariaDb, EngineVersion::parse(stripped))
    } else {
        (EngineKind::MySql, EngineVersion::parse(raw))
    }
}

/// Probe the backend and report its traversal capabilities.
///
/// # Errors
///
/// Returns [`StoreError::UnsupportedEngine`] for an unknown driver or an
/// unparseable version, and propagates a failing version probe.
pub fn detect_capabilities(db: &dyn Backend) -> Result<Capabilities> {
    let driver = db.driver_name();
    let Some(mut kind) = kind_from_driver(driver) else {
        return Err(StoreError::UnsupportedEngine {
            driver: driver.to_string(),
            version: None,
        });
    };

    let version = match kind {
        EngineKind::Sqlite | EngineKind::MySql | EngineKind::MariaDb => {
            let raw = db.server_version()?;
            let (probed_kind, parsed) = if kind == EngineKind::Sqlite {
                (kind, EngineVersion::parse(&raw))
            } else {
                mysql_family_version(&raw)
            };
            kind = probed_kind;
            let Some(parsed) = parsed else {
                return Err(StoreError::UnsupportedEngine {
                    driver: driver.to_string(),
                    version: Some(raw),
                });
            };
            Some(parsed)
        }
        EngineKind::Postgres | EngineKind::SqlServer | EngineKind::Oracle => None,
    };

    let recursive_cte = match (kind.recursive_cte_since(), version) {
        (None, _) => true,
        (Some(since), Some(version)) => version >= since,
        (Some(_), None) => false,
    };
    let session_variables = matches!(kind, EngineKind::MySql | EngineKind::MariaDb);

    let caps = Capabilities {
        kind,
        version,
        recursive_cte,
        session_variables,
    };
    debug!(?caps, driver, "engine capability detection complete");
    Ok(caps)
}

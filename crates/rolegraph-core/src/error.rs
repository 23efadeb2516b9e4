use std::fmt;

/// Machine-readable error codes for callers that branch on failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidName,
    SeparatorCollision,
    UnsupportedEngine,
    ItemNotFound,
    ItemExists,
    CycleDetected,
    DepthLimitExceeded,
    TransactionFailed,
    CorruptRow,
    StorageFailure,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidName => "E1001",
            Self::SeparatorCollision => "E1002",
            Self::UnsupportedEngine => "E1003",
            Self::ItemNotFound => "E2001",
            Self::ItemExists => "E2002",
            Self::CycleDetected => "E2003",
            Self::DepthLimitExceeded => "E2004",
            Self::TransactionFailed => "E3001",
            Self::CorruptRow => "E3002",
            Self::StorageFailure => "E5001",
        }
    }

    /// Short human-facing summary for logs.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::InvalidName => "Invalid name",
            Self::SeparatorCollision => "Name contains the reserved separator",
            Self::UnsupportedEngine => "Unsupported database engine",
            Self::ItemNotFound => "Item not found",
            Self::ItemExists => "Item already exists",
            Self::CycleDetected => "Cycle would be created",
            Self::DepthLimitExceeded => "Hierarchy depth limit exceeded",
            Self::TransactionFailed => "Transaction failed",
            Self::CorruptRow => "Unexpected row shape",
            Self::StorageFailure => "Storage backend failure",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::InvalidName => Some("Names must be non-empty and within the column width."),
            Self::SeparatorCollision => {
                Some("Pick a name without the separator, or configure a different separator.")
            }
            Self::UnsupportedEngine => {
                Some("Use SQLite, MySQL/MariaDB, PostgreSQL, SQL Server or Oracle.")
            }
            Self::ItemNotFound | Self::ItemExists | Self::CorruptRow => None,
            Self::CycleDetected => Some("Remove/adjust child links to keep the hierarchy acyclic."),
            Self::DepthLimitExceeded => Some("Raise `max_depth` in the store config."),
            Self::TransactionFailed => {
                Some("Close the open transaction before starting a coordinated mutation.")
            }
            Self::StorageFailure => Some("Retry once. If persistent, check the database logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors raised by the hierarchy store, traversal engines and coordinator.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A name or attribute failed validation before any I/O happened.
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// An item name contains the delimiter used to encode visited sets.
    #[error("item name '{name}' contains the reserved separator '{separator}'")]
    SeparatorCollision { name: String, separator: char },

    /// The backend reported an engine kind or version no strategy can serve.
    #[error("unsupported engine '{driver}'{}", version_suffix(.version))]
    UnsupportedEngine {
        driver: String,
        version: Option<String>,
    },

    /// A coordinated mutation could not run or could not be rolled back.
    #[error("transaction failure: {reason}")]
    TransactionFailure {
        reason: String,
        #[source]
        cause: Option<Box<StoreError>>,
    },

    /// The operation requires an item that does not exist.
    #[error("item not found: '{0}'")]
    NotFound(String),

    /// An item with this name already exists.
    #[error("item already exists: '{0}'")]
    AlreadyExists(String),

    /// Linking `child` under `parent` would close a loop.
    #[error("adding '{child}' as a child of '{parent}' would create a cycle")]
    CycleDetected { parent: String, child: String },

    /// The iterative traversal ran more rounds than configured.
    #[error("hierarchy deeper than the configured limit of {limit} levels")]
    DepthLimitExceeded { limit: u32 },

    /// A result row did not have the expected shape.
    #[error("unexpected row shape: {0}")]
    Decode(String),

    /// SQLite backend error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Error reported by a non-SQLite backend.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::InvalidName,
            Self::SeparatorCollision { .. } => ErrorCode::SeparatorCollision,
            Self::UnsupportedEngine { .. } => ErrorCode::UnsupportedEngine,
            Self::TransactionFailure { .. } => ErrorCode::TransactionFailed,
            Self::NotFound(_) => ErrorCode::ItemNotFound,
            Self::AlreadyExists(_) => ErrorCode::ItemExists,
            Self::CycleDetected { .. } => ErrorCode::CycleDetected,
            Self::DepthLimitExceeded { .. } => ErrorCode::DepthLimitExceeded,
            Self::Decode(_) => ErrorCode::CorruptRow,
            Self::Sqlite(_) | Self::Backend(_) => ErrorCode::StorageFailure,
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

fn version_suffix(version: &Option<String>) -> String {
    version
        .as_deref()
        .map(|v| format!(" (version {v})"))
        .unwrap_or_default()
}

/// Result alias used across the crate.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::{ErrorCode, StoreError};
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::InvalidName,
            ErrorCode::SeparatorCollision,
            ErrorCode::UnsupportedEngine,
            ErrorCode::ItemNotFound,
            ErrorCode::ItemExists,
            ErrorCode::CycleDetected,
            ErrorCode::DepthLimitExceeded,
            ErrorCode::TransactionFailed,
            ErrorCode::CorruptRow,
            ErrorCode::StorageFailure,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::SeparatorCollision.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn unsupported_engine_display_includes_version() {
        let err = StoreError::UnsupportedEngine {
            driver: "firebird".to_string(),
            version: Some("3.0".to_string()),
        };
        let s = err.to_string();
        assert!(s.contains("firebird"), "display: {s}");
        assert!(s.contains("3.0"), "display: {s}");

        let bare = StoreError::UnsupportedEngine {
            driver: "firebird".to_string(),
            version: None,
        };
        assert_eq!(bare.to_string(), "unsupported engine 'firebird'");
    }

    #[test]
    fn variants_map_to_codes() {
        assert_eq!(
            StoreError::NotFound("x".into()).code(),
            ErrorCode::ItemNotFound
        );
        assert_eq!(
            StoreError::SeparatorCollision {
                name: "a,b".into(),
                separator: ','
            }
            .code(),
            ErrorCode::SeparatorCollision
        );
        assert!(StoreError::DepthLimitExceeded { limit: 3 }.hint().is_some());
    }
}

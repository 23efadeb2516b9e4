//! Name and width checks applied before any statement reaches the backend.

use crate::error::{Result, StoreError};

/// Width of `name`, `parent`, `child`, `itemName` and `userId` columns.
pub const MAX_NAME_LEN: usize = 128;
/// Width of the nullable `description` column.
pub const MAX_DESCRIPTION_LEN: usize = 191;
/// Width of the nullable `ruleName` column.
pub const MAX_RULE_NAME_LEN: usize = 64;
/// Longest table name accepted in the config.
pub const MAX_TABLE_NAME_LEN: usize = 64;

pub(crate) fn check_len(field: &'static str, value: &str, max: usize) -> Result<()> {
    if value.len() > max {
        return Err(StoreError::validation(
            field,
            format!("{} bytes exceeds the {max}-byte limit", value.len()),
        ));
    }
    Ok(())
}

fn check_non_empty(field: &'static str, value: &str, max: usize) -> Result<()> {
    if value.is_empty() {
        return Err(StoreError::validation(field, "must not be empty"));
    }
    check_len(field, value, max)
}

/// Validate an item name and the separator invariant.
///
/// # Errors
///
/// Returns [`StoreError::Validation`] for empty or oversized names and
/// [`StoreError::SeparatorCollision`] when the name contains `separator`.
pub fn validate_item_name(name: &str, separator: char) -> Result<()> {
    check_non_empty("item name", name, MAX_NAME_LEN)?;
    if name.contains(separator) {
        return Err(StoreError::SeparatorCollision {
            name: name.to_string(),
            separator,
        });
    }
    Ok(())
}

/// Validate a user identifier used in assignments.
///
/// # Errors
///
/// Returns [`StoreError::Validation`] for empty or oversized ids.
pub fn validate_user_id(user_id: &str) -> Result<()> {
    check_non_empty("user id", user_id, MAX_NAME_LEN)
}

/// Validate a configured table name.
///
/// Quote characters and NUL are rejected so the name can be quoted by any
/// dialect without escaping.
///
/// # Errors
///
/// Returns [`StoreError::Validation`] when the name is empty, too long or
/// contains a quote character.
pub fn validate_table_name(table: &str) -> Result<()> {
    check_non_empty("table name", table, MAX_TABLE_NAME_LEN)?;
    if table
        .chars()
        .any(|c| matches!(c, '"' | '`' | '[' | ']' | '\'' | '\0'))
    {
        return Err(StoreError::validation(
            "table name",
            format!("'{table}' contains a quote character"),
        ));
    }
    Ok(())
}

/// Validate the visited-set separator.
///
/// The separator has to be a single printable ASCII punctuation character:
/// it is spliced into SQL literals and used by substring membership tests.
///
/// # Errors
///
/// Returns [`StoreError::Validation`] for any other character.
pub fn validate_separator(separator: char) -> Result<()> {
    if !separator.is_ascii_punctuation() || matches!(separator, '\'' | '\\' | '"') {
        return Err(StoreError::validation(
            "separator",
            format!("{separator:?} must be ASCII punctuation other than quotes or backslash"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_name_bounds() {
        assert!(validate_item_name("", ',').is_err());
        assert!(validate_item_name(&"n".repeat(MAX_NAME_LEN), ',').is_ok());
        assert!(validate_item_name(&"n".repeat(MAX_NAME_LEN + 1), ',').is_err());
    }

    #[test]
    fn item_name_width_counts_bytes() {
        // 64 two-byte characters fit exactly.
        assert!(validate_item_name(&"é".repeat(64), ',').is_ok());
        assert!(validate_item_name(&"é".repeat(65), ',').is_err());
    }

    #[test]
    fn separator_collision_is_distinct_error() {
        let err = validate_item_name("posts,comments", ',').unwrap_err();
        assert!(matches!(err, StoreError::SeparatorCollision { .. }));
    }

    #[test]
    fn user_id_bounds() {
        assert!(validate_user_id("").is_err());
        assert!(validate_user_id("42").is_ok());
    }

    #[test]
    fn table_name_rejects_quotes() {
        assert!(validate_table_name("rbac_item").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("items\"; DROP").is_err());
        assert!(validate_table_name(&"t".repeat(65)).is_err());
    }

    #[test]
    fn separator_must_be_punctuation() {
        assert!(validate_separator(',').is_ok());
        assert!(validate_separator(';').is_ok());
        assert!(validate_separator('a').is_err());
        assert!(validate_separator('\'').is_err());
        assert!(validate_separator(' ').is_err());
    }
}

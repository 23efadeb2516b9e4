//! Items (roles and permissions) and the edges between them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, StoreError};
use crate::model::name::{self, MAX_DESCRIPTION_LEN, MAX_RULE_NAME_LEN};

/// The two kinds of node in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Role,
    Permission,
}

impl ItemType {
    /// Value stored in the `type` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Role => "role",
            Self::Permission => "permission",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "role" => Ok(Self::Role),
            "permission" => Ok(Self::Permission),
            other => Err(StoreError::Decode(format!(
                "unknown item type '{other}': expected role or permission"
            ))),
        }
    }
}

/// A role or permission row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub description: Option<String>,
    pub rule_name: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Item {
    /// New item of the given type stamped with the current time.
    pub fn new(item_type: ItemType, name: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            name: name.into(),
            item_type,
            description: None,
            rule_name: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn role(name: impl Into<String>) -> Self {
        Self::new(ItemType::Role, name)
    }

    pub fn permission(name: impl Into<String>) -> Self {
        Self::new(ItemType::Permission, name)
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_rule_name(mut self, rule_name: impl Into<String>) -> Self {
        self.rule_name = Some(rule_name.into());
        self
    }

    #[must_use]
    pub const fn with_timestamps(mut self, created_at: i64, updated_at: i64) -> Self {
        self.created_at = created_at;
        self.updated_at = updated_at;
        self
    }

    #[must_use]
    pub fn is_role(&self) -> bool {
        self.item_type == ItemType::Role
    }

    /// Check every column width and the separator invariant.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for empty or oversized fields and
    /// [`StoreError::SeparatorCollision`] when the name contains `separator`.
    pub fn validate(&self, separator: char) -> Result<()> {
        name::validate_item_name(&self.name, separator)?;
        if let Some(description) = &self.description {
            name::check_len("description", description, MAX_DESCRIPTION_LEN)?;
        }
        if let Some(rule_name) = &self.rule_name {
            name::check_len("rule name", rule_name, MAX_RULE_NAME_LEN)?;
        }
        Ok(())
    }
}

/// A parent → child link. The parent implies the child.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    pub parent: String,
    pub child: String,
}

impl Edge {
    pub fn new(parent: impl Into<String>, child: impl Into<String>) -> Self {
        Self {
            parent: parent.into(),
            child: child.into(),
        }
    }

    /// Same link with the direction flipped.
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self {
            parent: self.child.clone(),
            child: self.parent.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_type_round_trips_through_str() {
        for t in [ItemType::Role, ItemType::Permission] {
            assert_eq!(t.as_str().parse::<ItemType>().unwrap(), t);
        }
        assert!("group".parse::<ItemType>().is_err());
    }

    #[test]
    fn new_item_has_equal_timestamps() {
        let item = Item::role("admin");
        assert_eq!(item.created_at, item.updated_at);
        assert!(item.is_role());
        assert!(!Item::permission("posts.create").is_role());
    }

    #[test]
    fn validate_rejects_long_description() {
        let item = Item::role("admin").with_description("d".repeat(192));
        let err = item.validate(',').unwrap_err();
        assert!(matches!(err, StoreError::Validation { field: "description", .. }));
    }

    #[test]
    fn validate_rejects_long_rule_name() {
        let item = Item::role("admin").with_rule_name("r".repeat(65));
        assert!(item.validate(',').is_err());
        let ok = Item::role("admin").with_rule_name("r".repeat(64));
        assert!(ok.validate(',').is_ok());
    }

    #[test]
    fn validate_rejects_separator_in_name() {
        let err = Item::role("a,b").validate(',').unwrap_err();
        assert!(matches!(err, StoreError::SeparatorCollision { separator: ',', .. }));
        assert!(Item::role("a,b").validate(';').is_ok());
    }

    #[test]
    fn edge_reversal() {
        let e = Edge::new("parent", "child");
        assert_eq!(e.reversed(), Edge::new("child", "parent"));
    }

    #[test]
    fn item_type_serializes_lowercase() {
        let item = Item::permission("read")
            .with_description("Read posts")
            .with_rule_name("isAuthor")
            .with_timestamps(1, 2);
        let toml = toml::to_string(&item).unwrap();
        assert!(toml.contains("type = \"permission\""), "{toml}");
    }
}

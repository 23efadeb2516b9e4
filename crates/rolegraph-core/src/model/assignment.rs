use serde::{Deserialize, Serialize};

/// A user ↔ item grant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Assignment {
    pub item_name: String,
    pub user_id: String,
    pub created_at: i64,
}

impl Assignment {
    /// New assignment stamped with the current time.
    pub fn new(item_name: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            item_name: item_name.into(),
            user_id: user_id.into(),
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

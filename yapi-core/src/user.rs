//! User: the account that owns API keys and upstream credentials.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,

    /// Unique display name.
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Free-form string-keyed metadata, matched by rule `user_metadata`
    /// predicates (flat string equality, see `yapi-proxy::matcher`).
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    #[serde(default)]
    pub deleted: bool,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_active(&self) -> bool {
        !self.deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactive_when_soft_deleted() {
        let mut u = User {
            id: "u1".into(),
            name: "alice".into(),
            description: String::new(),
            metadata: HashMap::new(),
            deleted: false,
            created_at: None,
            updated_at: None,
        };
        assert!(u.is_active());
        u.deleted = true;
        assert!(!u.is_active());
    }
}

//! Caller identity

use serde::{Deserialize, Serialize};

/// The authenticated caller on whose behalf an operation runs.
///
/// Every service operation takes a principal explicitly; ownership checks compare
/// `user_id` against the stored record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Principal {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Whether this principal owns a resource belonging to `user_id`
    pub fn owns(&self, user_id: i64) -> bool {
        self.user_id == user_id
    }
}

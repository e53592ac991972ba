//! Core domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = i64;
pub type NotificationId = i64;

/// The resolved caller principal backing authorization decisions.
///
/// Immutable for the lifetime of the request or connection it was resolved
/// for; sourced from the [`UserDirectory`](crate::store::UserDirectory).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

/// A notification row. `user_id` is the owner and never changes after
/// creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Partial update accepted by the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationChanges {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub read: Option<bool>,
}

/// Caller-supplied paging parameters.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageRequest {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl PageRequest {
    /// Effective `(page, per_page)`, clamped to positive values.
    pub fn clamped(&self) -> (u64, u64) {
        let page = self.page.unwrap_or(1).max(1) as u64;
        let per_page = self.per_page.unwrap_or(20).max(1) as u64;
        (page, per_page)
    }
}

/// One page of a user's notifications, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationPage {
    pub notifications: Vec<Notification>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u64,
    pub per_page: u64,
    /// The owner's total row count, not the page length.
    pub total: u64,
}

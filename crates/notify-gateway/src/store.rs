//! Persistence traits and the in-memory backend
//!
//! Implement `NotificationStore` and `UserDirectory` over a real database to
//! back the gateway in production; `MemoryStore` implements both for
//! development and testing.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::model::{Identity, Notification, NotificationChanges, NotificationId, UserId};

/// Record store for notification rows.
///
/// Field validation lives behind this trait: a backend rejecting a value
/// returns [`Error::Validation`] with human-readable messages.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Create a row owned by `owner_id`.
    async fn create(&self, owner_id: UserId, message: &str) -> Result<Notification>;

    async fn find(&self, id: NotificationId) -> Option<Notification>;

    /// Apply `changes` to an existing row.
    async fn update(&self, id: NotificationId, changes: NotificationChanges)
        -> Result<Notification>;

    async fn delete(&self, id: NotificationId) -> Result<()>;

    /// A slice of `owner_id`'s rows, newest first, plus the owner's total
    /// row count.
    async fn list_by_owner(
        &self,
        owner_id: UserId,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<Notification>, u64)>;
}

/// Lookup of caller principals.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> Option<Identity>;
    async fn find_by_email(&self, email: &str) -> Option<Identity>;
}

/// In-memory backend. Suitable for development and testing, not for
/// multi-instance deployments.
#[derive(Clone, Default)]
pub struct MemoryStore {
    users: Arc<DashMap<UserId, Identity>>,
    notifications: Arc<DashMap<NotificationId, Notification>>,
    next_user_id: Arc<AtomicI64>,
    next_notification_id: Arc<AtomicI64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user, returning its identity.
    pub fn add_user(&self, name: impl Into<String>, email: impl Into<String>) -> Identity {
        let identity = Identity {
            id: self.next_user_id.fetch_add(1, Ordering::SeqCst) + 1,
            name: name.into(),
            email: email.into(),
        };
        self.users.insert(identity.id, identity.clone());
        identity
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_by_id(&self, id: UserId) -> Option<Identity> {
        self.users.get(&id).map(|user| user.clone())
    }

    async fn find_by_email(&self, email: &str) -> Option<Identity> {
        self.users
            .iter()
            .find(|user| user.email == email)
            .map(|user| user.clone())
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn create(&self, owner_id: UserId, message: &str) -> Result<Notification> {
        let mut errors = Vec::new();
        if message.trim().is_empty() {
            errors.push("Message can't be blank".to_string());
        }
        if !self.users.contains_key(&owner_id) {
            errors.push("User must exist".to_string());
        }
        if !errors.is_empty() {
            return Err(Error::Validation(errors));
        }

        let notification = Notification {
            id: self.next_notification_id.fetch_add(1, Ordering::SeqCst) + 1,
            user_id: owner_id,
            message: message.to_string(),
            read: false,
            created_at: Utc::now(),
        };
        self.notifications
            .insert(notification.id, notification.clone());
        Ok(notification)
    }

    async fn find(&self, id: NotificationId) -> Option<Notification> {
        self.notifications.get(&id).map(|n| n.clone())
    }

    async fn update(
        &self,
        id: NotificationId,
        changes: NotificationChanges,
    ) -> Result<Notification> {
        if let Some(message) = &changes.message {
            if message.trim().is_empty() {
                return Err(Error::Validation(vec!["Message can't be blank".to_string()]));
            }
        }

        let mut entry = self.notifications.get_mut(&id).ok_or(Error::NotFound)?;
        if let Some(message) = changes.message {
            entry.message = message;
        }
        if let Some(read) = changes.read {
            entry.read = read;
        }
        Ok(entry.clone())
    }

    async fn delete(&self, id: NotificationId) -> Result<()> {
        self.notifications.remove(&id);
        Ok(())
    }

    async fn list_by_owner(
        &self,
        owner_id: UserId,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<Notification>, u64)> {
        let mut owned: Vec<Notification> = self
            .notifications
            .iter()
            .filter(|n| n.user_id == owner_id)
            .map(|n| n.clone())
            .collect();
        // Newest first; id breaks ties created in the same instant
        owned.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        let total = owned.len() as u64;
        let items = owned
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((items, total))
    }
}

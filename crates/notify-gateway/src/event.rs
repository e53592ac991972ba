//! Notification lifecycle events
//!
//! Events are ephemeral: produced once per successful mutation, delivered to
//! zero or more live subscriptions, never persisted.

use serde::{Deserialize, Serialize};

use crate::model::{Notification, NotificationId, UserId};

/// Wire payload pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    Created { notification: Notification },
    Updated { notification: Notification },
    Destroyed { notification_id: NotificationId },
}

/// A notification-lifecycle event, routed only to subscriptions matching its
/// owner.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationEvent {
    pub owner_id: UserId,
    pub payload: EventPayload,
}

impl NotificationEvent {
    pub fn created(notification: Notification) -> Self {
        Self {
            owner_id: notification.user_id,
            payload: EventPayload::Created { notification },
        }
    }

    pub fn updated(notification: Notification) -> Self {
        Self {
            owner_id: notification.user_id,
            payload: EventPayload::Updated { notification },
        }
    }

    /// Destroyed events carry only the id; the row is already gone.
    pub fn destroyed(notification: &Notification) -> Self {
        Self {
            owner_id: notification.user_id,
            payload: EventPayload::Destroyed {
                notification_id: notification.id,
            },
        }
    }

    /// Event kind for logging
    pub fn kind(&self) -> &'static str {
        match self.payload {
            EventPayload::Created { .. } => "created",
            EventPayload::Updated { .. } => "updated",
            EventPayload::Destroyed { .. } => "destroyed",
        }
    }
}

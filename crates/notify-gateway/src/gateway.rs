//! Mutation orchestration: ownership checks, store writes, event emission
//!
//! Every operation is terminal in one call: require identity, authorize,
//! mutate the store, publish the matching event. The store write always
//! precedes the event, and a failed write publishes nothing. Publishing is
//! non-blocking and its outcome never affects the committed mutation.

use std::sync::Arc;

use crate::broadcaster::NotificationBroadcaster;
use crate::error::{Error, Result};
use crate::event::NotificationEvent;
use crate::model::{
    Identity, Notification, NotificationChanges, NotificationId, NotificationPage, PageRequest,
    Pagination,
};
use crate::store::NotificationStore;

pub struct NotificationGateway {
    store: Arc<dyn NotificationStore>,
    broadcaster: NotificationBroadcaster,
}

impl NotificationGateway {
    pub fn new(store: Arc<dyn NotificationStore>, broadcaster: NotificationBroadcaster) -> Self {
        Self { store, broadcaster }
    }

    /// The caller's notifications, newest first.
    ///
    /// The one operation where identity is a filter, not a trust boundary:
    /// an absent identity yields an empty page rather than a rejection.
    pub async fn list(
        &self,
        user: Option<&Identity>,
        page: PageRequest,
    ) -> Result<NotificationPage> {
        let (page_number, per_page) = page.clamped();
        let (notifications, total) = match user {
            Some(user) => {
                self.store
                    .list_by_owner(user.id, (page_number - 1) * per_page, per_page)
                    .await?
            }
            None => (Vec::new(), 0),
        };
        Ok(NotificationPage {
            notifications,
            pagination: Pagination {
                page: page_number,
                per_page,
                total,
            },
        })
    }

    pub async fn show(&self, user: Option<&Identity>, id: NotificationId) -> Result<Notification> {
        let user = require(user)?;
        self.load_owned(user, id).await
    }

    pub async fn create(&self, user: Option<&Identity>, message: &str) -> Result<Notification> {
        let user = require(user)?;
        let notification = self.store.create(user.id, message).await?;
        self.broadcaster
            .publish(NotificationEvent::created(notification.clone()));
        Ok(notification)
    }

    pub async fn update(
        &self,
        user: Option<&Identity>,
        id: NotificationId,
        changes: NotificationChanges,
    ) -> Result<Notification> {
        let user = require(user)?;
        self.load_owned(user, id).await?;
        let notification = self.store.update(id, changes).await?;
        self.broadcaster
            .publish(NotificationEvent::updated(notification.clone()));
        Ok(notification)
    }

    pub async fn mark_read(
        &self,
        user: Option<&Identity>,
        id: NotificationId,
    ) -> Result<Notification> {
        self.update(
            user,
            id,
            NotificationChanges {
                read: Some(true),
                ..NotificationChanges::default()
            },
        )
        .await
    }

    pub async fn delete(&self, user: Option<&Identity>, id: NotificationId) -> Result<()> {
        let user = require(user)?;
        let notification = self.load_owned(user, id).await?;
        self.store.delete(id).await?;
        self.broadcaster
            .publish(NotificationEvent::destroyed(&notification));
        Ok(())
    }

    /// Load a notification for an identity-bound operation: absent rows fail
    /// `NotFound` before ownership is checked.
    async fn load_owned(&self, user: &Identity, id: NotificationId) -> Result<Notification> {
        let notification = self.store.find(id).await.ok_or(Error::NotFound)?;
        if notification.user_id != user.id {
            return Err(Error::Forbidden);
        }
        Ok(notification)
    }
}

fn require(user: Option<&Identity>) -> Result<&Identity> {
    user.ok_or(Error::AuthenticationRequired)
}

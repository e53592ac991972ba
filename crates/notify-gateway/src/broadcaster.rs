//! Per-user event fan-out

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::event::NotificationEvent;
use crate::model::{Identity, UserId};

/// Events buffered per subscriber before a slow consumer starts losing them.
const SINK_CAPACITY: usize = 100;

/// Identifies one live registration.
///
/// The owning connection task must call
/// [`NotificationBroadcaster::unsubscribe`] on every exit path, including
/// abnormal disconnects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    user_id: UserId,
    id: Uuid,
}

impl SubscriptionHandle {
    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}

#[derive(Debug, Clone)]
struct Subscriber {
    id: Uuid,
    sink: mpsc::Sender<NotificationEvent>,
}

/// Maintains per-user subscriber sets and publishes events to exactly the
/// subscribers registered under the affected user.
#[derive(Clone)]
pub struct NotificationBroadcaster {
    /// user id -> registrations, in subscription order
    subscribers: Arc<DashMap<UserId, Vec<Subscriber>>>,
}

impl NotificationBroadcaster {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(DashMap::new()),
        }
    }

    /// Register a new subscription for `identity`.
    ///
    /// Multiple concurrent subscriptions per identity are independent; each
    /// gets its own receiver.
    pub fn subscribe(
        &self,
        identity: &Identity,
    ) -> (SubscriptionHandle, mpsc::Receiver<NotificationEvent>) {
        let (sink, receiver) = mpsc::channel(SINK_CAPACITY);
        let id = Uuid::new_v4();
        self.subscribers
            .entry(identity.id)
            .or_default()
            .push(Subscriber { id, sink });

        tracing::debug!(user_id = identity.id, subscription = %id, "Subscribed");
        (
            SubscriptionHandle {
                user_id: identity.id,
                id,
            },
            receiver,
        )
    }

    /// Remove exactly one registration. Unsubscribing twice is a no-op.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        if let Some(mut entries) = self.subscribers.get_mut(&handle.user_id) {
            entries.retain(|s| s.id != handle.id);
        }
        self.subscribers
            .remove_if(&handle.user_id, |_, entries| entries.is_empty());
    }

    /// Deliver `event` to every live sink registered under its owner, in
    /// registration order. Returns the delivered count.
    ///
    /// Never blocks: the registry guard is only held while snapshotting the
    /// subscriber set, and a full or closed sink affects nobody but itself.
    pub fn publish(&self, event: NotificationEvent) -> usize {
        let snapshot: Vec<Subscriber> = self
            .subscribers
            .get(&event.owner_id)
            .map(|entries| entries.clone())
            .unwrap_or_default();

        let mut sent = 0;
        for subscriber in snapshot {
            match subscriber.sink.try_send(event.clone()) {
                Ok(()) => sent += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        owner_id = event.owner_id,
                        subscription = %subscriber.id,
                        "Slow subscriber, event dropped"
                    );
                }
                // Receiver gone; swept by prune_closed or unsubscribe
                Err(TrySendError::Closed(_)) => {}
            }
        }

        tracing::debug!(
            owner_id = event.owner_id,
            kind = event.kind(),
            sent,
            "Event published"
        );
        sent
    }

    /// Sweep registrations whose receiving side is gone.
    pub fn prune_closed(&self) {
        let users: Vec<UserId> = self.subscribers.iter().map(|e| *e.key()).collect();
        for user_id in users {
            if let Some(mut entries) = self.subscribers.get_mut(&user_id) {
                entries.retain(|s| !s.sink.is_closed());
            }
            self.subscribers
                .remove_if(&user_id, |_, entries| entries.is_empty());
        }
    }

    /// Total live registrations across all users
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.iter().map(|e| e.value().len()).sum()
    }

    /// Registrations for one user
    pub fn user_subscriber_count(&self, user_id: UserId) -> usize {
        self.subscribers
            .get(&user_id)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }
}

impl Default for NotificationBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

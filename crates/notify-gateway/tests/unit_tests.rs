//! Unit tests for notify-gateway

use std::sync::Arc;

use axum::http::{HeaderMap, Uri};
use chrono::{Duration, Utc};
use notify_gateway::{
    AuthRequest, Authenticator, Error, EventPayload, Identity, MemoryStore,
    NotificationBroadcaster, NotificationChanges, NotificationEvent, NotificationGateway,
    NotificationStore, PageRequest, SigningSecret, TokenService,
};

fn store_with_users() -> (Arc<MemoryStore>, Identity, Identity) {
    let store = Arc::new(MemoryStore::new());
    let alice = store.add_user("Alice", "alice@example.com");
    let bob = store.add_user("Bob", "bob@example.com");
    (store, alice, bob)
}

fn token_service(store: &Arc<MemoryStore>) -> TokenService {
    TokenService::new(
        SigningSecret::Configured("test-secret".into()),
        store.clone(),
    )
}

fn authenticator(store: &Arc<MemoryStore>) -> Authenticator {
    Authenticator::new(Arc::new(token_service(store)), store.clone())
}

fn gateway(store: &Arc<MemoryStore>) -> (NotificationGateway, NotificationBroadcaster) {
    let broadcaster = NotificationBroadcaster::new();
    (
        NotificationGateway::new(store.clone(), broadcaster.clone()),
        broadcaster,
    )
}

fn auth_request(headers: HeaderMap, uri: &str) -> AuthRequest {
    AuthRequest::new(headers, uri.parse::<Uri>().unwrap())
}

fn bearer_headers(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("authorization", format!("Bearer {token}").parse().unwrap());
    headers
}

fn cookie_headers(cookie: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("cookie", cookie.parse().unwrap());
    headers
}

fn sample_notification(id: i64, owner_id: i64) -> notify_gateway::Notification {
    notify_gateway::Notification {
        id,
        user_id: owner_id,
        message: "hello".into(),
        read: false,
        created_at: Utc::now(),
    }
}

// ============== TokenService Tests ==============

#[tokio::test]
async fn test_issue_verify_round_trip() {
    let (store, alice, _) = store_with_users();
    let tokens = token_service(&store);

    let token = tokens.issue(&alice, Duration::hours(24)).unwrap();
    let resolved = tokens.verify(&token).await.unwrap().unwrap();

    assert_eq!(resolved.id, alice.id);
    assert_eq!(resolved.email, alice.email);
}

#[tokio::test]
async fn test_verify_rejects_expired_token() {
    let (store, alice, _) = store_with_users();
    let tokens = token_service(&store);

    let token = tokens.issue(&alice, Duration::hours(-1)).unwrap();

    assert!(matches!(
        tokens.verify(&token).await,
        Err(Error::InvalidToken(_))
    ));
}

#[tokio::test]
async fn test_verify_rejects_tampered_signature() {
    let (store, alice, _) = store_with_users();
    let tokens = token_service(&store);

    let token = tokens.issue(&alice, Duration::hours(1)).unwrap();
    let (payload, signature) = token.rsplit_once('.').unwrap();
    // Mutate the first signature character; 'A' and 'Q' differ in their
    // high bits, so the decoded signature bytes always change
    let first = if signature.starts_with('A') { "Q" } else { "A" };
    let tampered = format!("{payload}.{first}{}", &signature[1..]);
    assert_ne!(token, tampered);

    assert!(matches!(
        tokens.verify(&tampered).await,
        Err(Error::InvalidToken(_))
    ));
}

#[tokio::test]
async fn test_verify_rejects_garbage() {
    let (store, _, _) = store_with_users();
    let tokens = token_service(&store);

    assert!(matches!(
        tokens.verify("not-a-token").await,
        Err(Error::InvalidToken(_))
    ));
}

#[tokio::test]
async fn test_verify_rejects_foreign_secret() {
    let (store, alice, _) = store_with_users();
    let tokens = token_service(&store);
    let other = TokenService::new(SigningSecret::Configured("other-secret".into()), store.clone());

    let token = other.issue(&alice, Duration::hours(1)).unwrap();

    assert!(tokens.verify(&token).await.is_err());
}

#[tokio::test]
async fn test_verify_unknown_subject_is_none() {
    let (store, _, _) = store_with_users();
    let tokens = token_service(&store);
    let ghost = Identity {
        id: 999,
        name: "Ghost".into(),
        email: "ghost@example.com".into(),
    };

    let token = tokens.issue(&ghost, Duration::hours(1)).unwrap();

    assert_eq!(tokens.verify(&token).await.unwrap(), None);
}

#[tokio::test]
async fn test_fallback_secret_round_trip() {
    let (store, alice, _) = store_with_users();
    let tokens = TokenService::new(SigningSecret::from_config(None), store.clone());

    let token = tokens.issue(&alice, Duration::hours(1)).unwrap();
    assert_eq!(tokens.verify(&token).await.unwrap().unwrap().id, alice.id);

    // A configured service must not accept fallback-signed tokens
    let configured = token_service(&store);
    assert!(configured.verify(&token).await.is_err());
}

// ============== AuthRequest Tests ==============

#[test]
fn test_auth_request_bearer_token() {
    let request = auth_request(bearer_headers("my-secret-token"), "/api/notifications");
    assert_eq!(request.bearer_token(), Some("my-secret-token"));
}

#[test]
fn test_auth_request_header_and_query() {
    let mut headers = HeaderMap::new();
    headers.insert("x-user-id", "42".parse().unwrap());

    let request = auth_request(headers, "/cable?token=abc&foo=bar");

    assert_eq!(request.header("x-user-id"), Some("42"));
    assert_eq!(request.header("non-existent"), None);
    assert_eq!(request.query_param("token"), Some("abc"));
    assert_eq!(request.query_param("foo"), Some("bar"));
    assert_eq!(request.query_param("missing"), None);
}

#[test]
fn test_auth_request_cookie() {
    let request = auth_request(
        cookie_headers("theme=dark; auth_token=tok123; session_user_id=7"),
        "/cable",
    );

    assert_eq!(request.cookie("auth_token"), Some("tok123"));
    assert_eq!(request.cookie("session_user_id"), Some("7"));
    assert_eq!(request.cookie("missing"), None);
}

// ============== Authenticator Tests ==============

#[tokio::test]
async fn test_request_auth_bearer_token() {
    let (store, alice, _) = store_with_users();
    let auth = authenticator(&store);
    let token = token_service(&store)
        .issue(&alice, Duration::hours(1))
        .unwrap();

    let request = auth_request(bearer_headers(&token), "/api/notifications");
    let resolved = auth.authenticate_request(&request).await.unwrap();

    assert_eq!(resolved.id, alice.id);
}

#[tokio::test]
async fn test_request_auth_caller_id_header() {
    let (store, _, bob) = store_with_users();
    let auth = authenticator(&store);

    let mut headers = HeaderMap::new();
    headers.insert("x-user-id", bob.id.to_string().parse().unwrap());
    let request = auth_request(headers, "/api/notifications");

    assert_eq!(
        auth.authenticate_request(&request).await.unwrap().id,
        bob.id
    );
}

#[tokio::test]
async fn test_request_auth_invalid_token_falls_through_to_header() {
    let (store, _, bob) = store_with_users();
    let auth = authenticator(&store);

    let mut headers = bearer_headers("garbage-token");
    headers.insert("x-user-id", bob.id.to_string().parse().unwrap());
    let request = auth_request(headers, "/api/notifications");

    assert_eq!(
        auth.authenticate_request(&request).await.unwrap().id,
        bob.id
    );
}

#[tokio::test]
async fn test_request_auth_absent_credentials() {
    let (store, _, _) = store_with_users();
    let auth = authenticator(&store);
    let request = auth_request(HeaderMap::new(), "/api/notifications");

    assert!(auth.authenticate_request(&request).await.is_none());
    assert!(matches!(
        auth.require_identity(&request).await,
        Err(Error::AuthenticationRequired)
    ));
}

#[tokio::test]
async fn test_handshake_cookie_token() {
    let (store, alice, _) = store_with_users();
    let auth = authenticator(&store);
    let token = token_service(&store)
        .issue(&alice, Duration::hours(1))
        .unwrap();

    let request = auth_request(cookie_headers(&format!("auth_token={token}")), "/cable");

    assert_eq!(
        auth.authenticate_handshake(&request).await.unwrap().id,
        alice.id
    );
}

#[tokio::test]
async fn test_handshake_query_token() {
    let (store, alice, _) = store_with_users();
    let auth = authenticator(&store);
    let token = token_service(&store)
        .issue(&alice, Duration::hours(1))
        .unwrap();

    let request = auth_request(HeaderMap::new(), &format!("/cable?token={token}"));

    assert_eq!(
        auth.authenticate_handshake(&request).await.unwrap().id,
        alice.id
    );
}

#[tokio::test]
async fn test_handshake_session_cookie_fallback() {
    let (store, _, bob) = store_with_users();
    let auth = authenticator(&store);

    let request = auth_request(
        cookie_headers(&format!("session_user_id={}", bob.id)),
        "/cable",
    );

    assert_eq!(
        auth.authenticate_handshake(&request).await.unwrap().id,
        bob.id
    );
}

#[tokio::test]
async fn test_handshake_refused_without_credentials() {
    let (store, _, _) = store_with_users();
    let auth = authenticator(&store);
    let request = auth_request(HeaderMap::new(), "/cable");

    assert!(matches!(
        auth.authenticate_handshake(&request).await,
        Err(Error::AuthenticationRequired)
    ));
}

#[tokio::test]
async fn test_handshake_expired_token_refused() {
    let (store, alice, _) = store_with_users();
    let auth = authenticator(&store);
    let expired = token_service(&store)
        .issue(&alice, Duration::hours(-1))
        .unwrap();

    let request = auth_request(cookie_headers(&format!("auth_token={expired}")), "/cable");

    assert!(auth.authenticate_handshake(&request).await.is_err());
}

// ============== NotificationBroadcaster Tests ==============

#[tokio::test]
async fn test_publish_routes_by_owner() {
    let (_, alice, bob) = store_with_users();
    let broadcaster = NotificationBroadcaster::new();

    let (_h1, mut rx_a1) = broadcaster.subscribe(&alice);
    let (_h2, mut rx_a2) = broadcaster.subscribe(&alice);
    let (_h3, mut rx_b) = broadcaster.subscribe(&bob);

    let sent = broadcaster.publish(NotificationEvent::created(sample_notification(1, alice.id)));

    assert_eq!(sent, 2);
    assert!(rx_a1.try_recv().is_ok());
    assert!(rx_a2.try_recv().is_ok());
    assert!(rx_b.try_recv().is_err());
}

#[tokio::test]
async fn test_publish_without_subscribers() {
    let (_, alice, _) = store_with_users();
    let broadcaster = NotificationBroadcaster::new();

    let sent = broadcaster.publish(NotificationEvent::created(sample_notification(1, alice.id)));

    assert_eq!(sent, 0);
}

#[tokio::test]
async fn test_unsubscribe_is_idempotent() {
    let (_, alice, _) = store_with_users();
    let broadcaster = NotificationBroadcaster::new();

    let (h1, mut rx1) = broadcaster.subscribe(&alice);
    let (_h2, mut rx2) = broadcaster.subscribe(&alice);

    broadcaster.unsubscribe(&h1);
    broadcaster.unsubscribe(&h1);

    let sent = broadcaster.publish(NotificationEvent::created(sample_notification(1, alice.id)));

    assert_eq!(sent, 1);
    assert!(rx1.try_recv().is_err());
    assert!(rx2.try_recv().is_ok());
    assert_eq!(broadcaster.user_subscriber_count(alice.id), 1);
}

#[tokio::test]
async fn test_publish_skips_closed_sinks() {
    let (_, alice, _) = store_with_users();
    let broadcaster = NotificationBroadcaster::new();

    let (_h1, rx1) = broadcaster.subscribe(&alice);
    let (_h2, mut rx2) = broadcaster.subscribe(&alice);
    drop(rx1);

    let sent = broadcaster.publish(NotificationEvent::created(sample_notification(1, alice.id)));

    assert_eq!(sent, 1);
    assert!(rx2.try_recv().is_ok());
}

#[tokio::test]
async fn test_prune_closed_subscriptions() {
    let (_, alice, bob) = store_with_users();
    let broadcaster = NotificationBroadcaster::new();

    let (_h1, rx1) = broadcaster.subscribe(&alice);
    let (_h2, _rx2) = broadcaster.subscribe(&bob);
    assert_eq!(broadcaster.subscriber_count(), 2);

    drop(rx1);
    broadcaster.prune_closed();

    assert_eq!(broadcaster.subscriber_count(), 1);
    assert_eq!(broadcaster.user_subscriber_count(alice.id), 0);
    assert_eq!(broadcaster.user_subscriber_count(bob.id), 1);
}

// ============== MemoryStore Tests ==============

#[tokio::test]
async fn test_store_create_rejects_blank_message() {
    let (store, alice, _) = store_with_users();

    let result = store.create(alice.id, "   ").await;

    match result {
        Err(Error::Validation(errors)) => {
            assert!(errors.contains(&"Message can't be blank".to_string()));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_store_create_rejects_unknown_owner() {
    let (store, _, _) = store_with_users();

    let result = store.create(999, "hello").await;

    match result {
        Err(Error::Validation(errors)) => {
            assert!(errors.contains(&"User must exist".to_string()));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_store_list_newest_first() {
    let (store, alice, _) = store_with_users();

    for i in 1..=3 {
        store.create(alice.id, &format!("message {i}")).await.unwrap();
    }

    let (items, total) = store.list_by_owner(alice.id, 0, 10).await.unwrap();

    assert_eq!(total, 3);
    assert_eq!(items[0].message, "message 3");
    assert_eq!(items[2].message, "message 1");
}

#[tokio::test]
async fn test_store_update_missing_row() {
    let (store, _, _) = store_with_users();

    let result = store
        .update(
            123,
            NotificationChanges {
                read: Some(true),
                ..NotificationChanges::default()
            },
        )
        .await;

    assert!(matches!(result, Err(Error::NotFound)));
}

// ============== NotificationGateway Tests ==============

#[tokio::test]
async fn test_create_publishes_single_created_event() {
    let (store, alice, _) = store_with_users();
    let (gateway, broadcaster) = gateway(&store);
    let (_handle, mut rx) = broadcaster.subscribe(&alice);

    let created = gateway.create(Some(&alice), "hello world").await.unwrap();

    let event = rx.try_recv().unwrap();
    assert_eq!(event.owner_id, alice.id);
    match event.payload {
        EventPayload::Created { notification } => {
            assert_eq!(notification.id, created.id);
            assert_eq!(notification.message, "hello world");
            assert!(!notification.read);
        }
        other => panic!("expected created event, got {other:?}"),
    }
    // Exactly one event per mutation
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_failed_create_publishes_nothing() {
    let (store, alice, _) = store_with_users();
    let (gateway, broadcaster) = gateway(&store);
    let (_handle, mut rx) = broadcaster.subscribe(&alice);

    assert!(matches!(
        gateway.create(Some(&alice), "").await,
        Err(Error::Validation(_))
    ));

    assert!(rx.try_recv().is_err());
    let page = gateway
        .list(Some(&alice), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.pagination.total, 0);
}

#[tokio::test]
async fn test_unauthenticated_mutation_rejected() {
    let (store, _, _) = store_with_users();
    let (gateway, _) = gateway(&store);

    assert!(matches!(
        gateway.create(None, "hello").await,
        Err(Error::AuthenticationRequired)
    ));
    assert!(matches!(
        gateway.mark_read(None, 1).await,
        Err(Error::AuthenticationRequired)
    ));
    assert!(matches!(
        gateway.delete(None, 1).await,
        Err(Error::AuthenticationRequired)
    ));
}

#[tokio::test]
async fn test_mark_read_publishes_updated_event() {
    let (store, alice, _) = store_with_users();
    let (gateway, broadcaster) = gateway(&store);

    let created = gateway.create(Some(&alice), "unread").await.unwrap();
    let (_handle, mut rx) = broadcaster.subscribe(&alice);

    let updated = gateway.mark_read(Some(&alice), created.id).await.unwrap();
    assert!(updated.read);

    let event = rx.try_recv().unwrap();
    match event.payload {
        EventPayload::Updated { notification } => assert!(notification.read),
        other => panic!("expected updated event, got {other:?}"),
    }
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_cross_owner_mark_read_forbidden() {
    let (store, alice, bob) = store_with_users();
    let (gateway, broadcaster) = gateway(&store);

    let bobs = gateway.create(Some(&bob), "bob's note").await.unwrap();
    let (_ha, mut rx_a) = broadcaster.subscribe(&alice);
    let (_hb, mut rx_b) = broadcaster.subscribe(&bob);

    assert!(matches!(
        gateway.mark_read(Some(&alice), bobs.id).await,
        Err(Error::Forbidden)
    ));

    // Row unchanged, no event on either stream
    assert!(!store.find(bobs.id).await.unwrap().read);
    assert!(rx_a.try_recv().is_err());
    assert!(rx_b.try_recv().is_err());
}

#[tokio::test]
async fn test_cross_owner_show_update_delete_forbidden() {
    let (store, alice, bob) = store_with_users();
    let (gateway, _) = gateway(&store);

    let bobs = gateway.create(Some(&bob), "bob's note").await.unwrap();

    assert!(matches!(
        gateway.show(Some(&alice), bobs.id).await,
        Err(Error::Forbidden)
    ));
    assert!(matches!(
        gateway
            .update(
                Some(&alice),
                bobs.id,
                NotificationChanges {
                    message: Some("stolen".into()),
                    ..NotificationChanges::default()
                },
            )
            .await,
        Err(Error::Forbidden)
    ));
    assert!(matches!(
        gateway.delete(Some(&alice), bobs.id).await,
        Err(Error::Forbidden)
    ));
    assert_eq!(store.find(bobs.id).await.unwrap().message, "bob's note");
}

#[tokio::test]
async fn test_show_missing_not_found() {
    let (store, alice, _) = store_with_users();
    let (gateway, _) = gateway(&store);

    assert!(matches!(
        gateway.show(Some(&alice), 123).await,
        Err(Error::NotFound)
    ));
}

#[tokio::test]
async fn test_delete_publishes_destroyed_event() {
    let (store, alice, _) = store_with_users();
    let (gateway, broadcaster) = gateway(&store);

    let created = gateway.create(Some(&alice), "short-lived").await.unwrap();
    let (_handle, mut rx) = broadcaster.subscribe(&alice);

    gateway.delete(Some(&alice), created.id).await.unwrap();

    let event = rx.try_recv().unwrap();
    assert_eq!(event.owner_id, alice.id);
    match event.payload {
        EventPayload::Destroyed { notification_id } => assert_eq!(notification_id, created.id),
        other => panic!("expected destroyed event, got {other:?}"),
    }
    assert!(store.find(created.id).await.is_none());
}

#[tokio::test]
async fn test_update_blank_message_rejected_without_event() {
    let (store, alice, _) = store_with_users();
    let (gateway, broadcaster) = gateway(&store);

    let created = gateway.create(Some(&alice), "original").await.unwrap();
    let (_handle, mut rx) = broadcaster.subscribe(&alice);

    assert!(matches!(
        gateway
            .update(
                Some(&alice),
                created.id,
                NotificationChanges {
                    message: Some("".into()),
                    ..NotificationChanges::default()
                },
            )
            .await,
        Err(Error::Validation(_))
    ));

    assert!(rx.try_recv().is_err());
    assert_eq!(store.find(created.id).await.unwrap().message, "original");
}

// ============== Listing Tests ==============

#[tokio::test]
async fn test_listing_scoped_to_owner() {
    let (store, alice, bob) = store_with_users();
    let (gateway, _) = gateway(&store);

    for i in 1..=3 {
        gateway
            .create(Some(&alice), &format!("alice {i}"))
            .await
            .unwrap();
    }
    gateway.create(Some(&bob), "bob 1").await.unwrap();

    let page = gateway
        .list(Some(&alice), PageRequest::default())
        .await
        .unwrap();

    assert_eq!(page.pagination.total, 3);
    assert_eq!(page.notifications.len(), 3);
    assert!(page.notifications.iter().all(|n| n.user_id == alice.id));
}

#[tokio::test]
async fn test_listing_pagination_slices_newest_first() {
    let (store, alice, _) = store_with_users();
    let (gateway, _) = gateway(&store);

    for i in 1..=5 {
        gateway
            .create(Some(&alice), &format!("message {i}"))
            .await
            .unwrap();
    }

    let page2 = gateway
        .list(
            Some(&alice),
            PageRequest {
                page: Some(2),
                per_page: Some(2),
            },
        )
        .await
        .unwrap();

    assert_eq!(page2.pagination.page, 2);
    assert_eq!(page2.pagination.per_page, 2);
    assert_eq!(page2.pagination.total, 5);
    assert_eq!(page2.notifications.len(), 2);
    assert_eq!(page2.notifications[0].message, "message 3");
    assert_eq!(page2.notifications[1].message, "message 2");
}

#[tokio::test]
async fn test_listing_out_of_range_page_is_empty() {
    let (store, alice, _) = store_with_users();
    let (gateway, _) = gateway(&store);

    gateway.create(Some(&alice), "only one").await.unwrap();

    let page = gateway
        .list(
            Some(&alice),
            PageRequest {
                page: Some(99),
                per_page: Some(20),
            },
        )
        .await
        .unwrap();

    assert!(page.notifications.is_empty());
    assert_eq!(page.pagination.total, 1);
}

#[tokio::test]
async fn test_listing_clamps_non_positive_paging() {
    let (store, alice, _) = store_with_users();
    let (gateway, _) = gateway(&store);

    gateway.create(Some(&alice), "clamped").await.unwrap();

    let page = gateway
        .list(
            Some(&alice),
            PageRequest {
                page: Some(0),
                per_page: Some(-5),
            },
        )
        .await
        .unwrap();

    assert_eq!(page.pagination.page, 1);
    assert_eq!(page.pagination.per_page, 1);
    assert_eq!(page.notifications.len(), 1);
}

#[tokio::test]
async fn test_listing_without_identity_is_empty() {
    let (store, alice, _) = store_with_users();
    let (gateway, _) = gateway(&store);

    gateway.create(Some(&alice), "invisible").await.unwrap();

    let page = gateway.list(None, PageRequest::default()).await.unwrap();

    assert!(page.notifications.is_empty());
    assert_eq!(page.pagination.total, 0);
}

// ============== End-to-end Tests ==============

#[tokio::test]
async fn test_connected_subscriber_sees_own_create_only() {
    let (store, alice, bob) = store_with_users();
    let (gateway, broadcaster) = gateway(&store);

    let (alice_handle, mut alice_rx) = broadcaster.subscribe(&alice);
    let (_bob_handle, mut bob_rx) = broadcaster.subscribe(&bob);

    gateway.create(Some(&alice), "for alice").await.unwrap();

    let event = alice_rx.try_recv().unwrap();
    assert_eq!(event.owner_id, alice.id);
    match event.payload {
        EventPayload::Created { notification } => assert_eq!(notification.message, "for alice"),
        other => panic!("expected created event, got {other:?}"),
    }
    assert!(alice_rx.try_recv().is_err());
    assert!(bob_rx.try_recv().is_err());

    // Disconnecting alice leaves bob's subscription intact
    broadcaster.unsubscribe(&alice_handle);
    gateway.create(Some(&bob), "for bob").await.unwrap();
    assert!(bob_rx.try_recv().is_ok());
}

#[tokio::test]
async fn test_expired_token_request_cannot_mutate() {
    let (store, alice, _) = store_with_users();
    let auth = authenticator(&store);
    let (gateway, _) = gateway(&store);

    let expired = token_service(&store)
        .issue(&alice, Duration::seconds(-5))
        .unwrap();
    let request = auth_request(bearer_headers(&expired), "/api/notifications");

    let user = auth.authenticate_request(&request).await;
    assert!(user.is_none());

    assert!(matches!(
        gateway.create(user.as_ref(), "should not exist").await,
        Err(Error::AuthenticationRequired)
    ));
    let page = gateway
        .list(Some(&alice), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.pagination.total, 0);
}

//! Caller identity resolution
//!
//! Two call shapes share one resolver: one-shot API requests and the
//! WebSocket handshake. Each tries an ordered list of strategies and stops
//! at the first one yielding a valid identity, so the trust decision is made
//! at most once per request or connection.

use std::sync::Arc;

use axum::http::{HeaderMap, Uri};

use crate::error::{Error, Result};
use crate::model::Identity;
use crate::store::UserDirectory;
use crate::token::TokenService;

/// Cookie carrying a signed token during the WebSocket handshake.
pub const AUTH_TOKEN_COOKIE: &str = "auth_token";
/// Cookie carrying a session-bound user id (trusted-session fallback).
pub const SESSION_COOKIE: &str = "session_user_id";
/// Query parameter carrying a signed token during the handshake.
pub const TOKEN_PARAM: &str = "token";
/// Header naming the caller directly (trusted-network fallback).
pub const CALLER_ID_HEADER: &str = "x-user-id";

/// Request context the resolution strategies read from
#[derive(Debug, Clone)]
pub struct AuthRequest {
    /// HTTP headers from the request
    pub headers: HeaderMap,
    /// Full request URI (path + query string)
    pub uri: Uri,
}

impl AuthRequest {
    pub fn new(headers: HeaderMap, uri: Uri) -> Self {
        Self { headers, uri }
    }

    /// Get a header value as string
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Get the Bearer token from Authorization header
    pub fn bearer_token(&self) -> Option<&str> {
        self.header("authorization")
            .and_then(|auth| auth.strip_prefix("Bearer "))
    }

    /// Get a query parameter value by name
    ///
    /// Note: This is a simple implementation that doesn't handle URL
    /// decoding. Token strings never need it.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.uri.query().and_then(|query| {
            query.split('&').find_map(|pair| {
                let mut parts = pair.splitn(2, '=');
                let key = parts.next()?;
                let value = parts.next()?;
                if key == name { Some(value) } else { None }
            })
        })
    }

    /// Get a cookie value by name from the `cookie` header
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.header("cookie").and_then(|cookies| {
            cookies.split(';').find_map(|pair| {
                let mut parts = pair.trim().splitn(2, '=');
                let key = parts.next()?;
                let value = parts.next()?;
                if key == name { Some(value) } else { None }
            })
        })
    }
}

/// Strategies tried, in order, for the connection handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStrategy {
    /// Signed token in the `auth_token` cookie.
    CookieToken,
    /// Signed token in the `token` query parameter.
    QueryToken,
    /// Session-bound user id cookie.
    SessionUserId,
}

/// Strategies tried, in order, for one-shot API requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStrategy {
    /// Signed token in the `Authorization` header.
    BearerToken,
    /// Raw caller id in `X-User-Id`. Weaker guarantee than a signed token;
    /// meant for trusted-network callers and tests.
    CallerIdHeader,
}

/// Resolves a caller's identity from a request or connection handshake.
pub struct Authenticator {
    tokens: Arc<TokenService>,
    directory: Arc<dyn UserDirectory>,
    handshake_order: Vec<HandshakeStrategy>,
    request_order: Vec<RequestStrategy>,
}

impl Authenticator {
    pub fn new(tokens: Arc<TokenService>, directory: Arc<dyn UserDirectory>) -> Self {
        Self {
            tokens,
            directory,
            handshake_order: vec![
                HandshakeStrategy::CookieToken,
                HandshakeStrategy::QueryToken,
                HandshakeStrategy::SessionUserId,
            ],
            request_order: vec![RequestStrategy::BearerToken, RequestStrategy::CallerIdHeader],
        }
    }

    /// Resolve the caller of a one-shot request, if any.
    ///
    /// Absence of credentials is not an error; callers decide whether an
    /// identity is required.
    pub async fn authenticate_request(&self, request: &AuthRequest) -> Option<Identity> {
        for strategy in &self.request_order {
            if let Some(identity) = self.attempt_request(*strategy, request).await {
                return Some(identity);
            }
        }
        None
    }

    /// Resolve the caller or fail with `AuthenticationRequired`.
    pub async fn require_identity(&self, request: &AuthRequest) -> Result<Identity> {
        self.authenticate_request(request)
            .await
            .ok_or(Error::AuthenticationRequired)
    }

    /// Resolve the caller of a connection handshake, refusing the
    /// connection when no strategy yields a valid identity.
    pub async fn authenticate_handshake(&self, request: &AuthRequest) -> Result<Identity> {
        for strategy in &self.handshake_order {
            if let Some(identity) = self.attempt_handshake(*strategy, request).await {
                return Ok(identity);
            }
        }
        Err(Error::AuthenticationRequired)
    }

    async fn attempt_request(
        &self,
        strategy: RequestStrategy,
        request: &AuthRequest,
    ) -> Option<Identity> {
        match strategy {
            RequestStrategy::BearerToken => {
                let token = request.bearer_token()?;
                self.verify_token(token).await
            }
            RequestStrategy::CallerIdHeader => {
                let id = request.header(CALLER_ID_HEADER)?.parse().ok()?;
                self.directory.find_by_id(id).await
            }
        }
    }

    async fn attempt_handshake(
        &self,
        strategy: HandshakeStrategy,
        request: &AuthRequest,
    ) -> Option<Identity> {
        match strategy {
            HandshakeStrategy::CookieToken => {
                let token = request.cookie(AUTH_TOKEN_COOKIE)?;
                self.verify_token(token).await
            }
            HandshakeStrategy::QueryToken => {
                let token = request.query_param(TOKEN_PARAM)?;
                self.verify_token(token).await
            }
            HandshakeStrategy::SessionUserId => {
                let id = request.cookie(SESSION_COOKIE)?.parse().ok()?;
                self.directory.find_by_id(id).await
            }
        }
    }

    /// A bad token is recoverable: log it and let the next strategy run.
    async fn verify_token(&self, token: &str) -> Option<Identity> {
        match self.tokens.verify(token).await {
            Ok(identity) => identity,
            Err(error) => {
                tracing::warn!(%error, "token rejected");
                None
            }
        }
    }
}

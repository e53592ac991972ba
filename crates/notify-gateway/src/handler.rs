//! HTTP handlers for the notification API

use axum::{
    extract::{OriginalUri, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::AuthRequest;
use crate::error::Error;
use crate::model::{Identity, Notification, NotificationChanges, NotificationId, PageRequest};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
}

#[derive(Serialize)]
pub struct SessionResponse {
    message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    user: Identity,
}

/// Body wrapper used by create and update
#[derive(Debug, Deserialize)]
pub struct NotificationParams {
    pub notification: NotificationChanges,
}

#[derive(Serialize)]
pub struct DeleteResponse {
    message: &'static str,
}

fn unauthorized(error: &'static str, message: &'static str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": error, "message": message })),
    )
        .into_response()
}

/// POST /api/authentication/login
pub async fn login(State(state): State<AppState>, Json(body): Json<LoginRequest>) -> Response {
    let Some(user) = state.directory.find_by_email(&body.email).await else {
        tracing::debug!(email = %body.email, "Login rejected");
        return unauthorized("Invalid credentials", "User not found");
    };

    match state.tokens.issue(&user, state.token_ttl) {
        Ok(token) => Json(SessionResponse {
            message: "Login successful",
            token: Some(token),
            user,
        })
        .into_response(),
        Err(error) => error.into_response(),
    }
}

/// GET /api/authentication/verify
pub async fn verify(
    State(state): State<AppState>,
    headers: HeaderMap,
    OriginalUri(uri): OriginalUri,
) -> Response {
    let request = AuthRequest::new(headers, uri);
    let Some(token) = request.bearer_token() else {
        return unauthorized("No token provided", "Authorization header missing");
    };

    match state.tokens.verify(token).await {
        Ok(Some(user)) => Json(SessionResponse {
            message: "Token is valid",
            token: None,
            user,
        })
        .into_response(),
        Ok(None) => unauthorized("Invalid token", "Unknown subject"),
        Err(error) => error.into_response(),
    }
}

/// GET /api/notifications
pub async fn index(
    State(state): State<AppState>,
    headers: HeaderMap,
    OriginalUri(uri): OriginalUri,
    Query(page): Query<PageRequest>,
) -> Result<Response, Error> {
    let request = AuthRequest::new(headers, uri);
    let user = state.authenticator.authenticate_request(&request).await;
    let page = state.gateway.list(user.as_ref(), page).await?;
    Ok(Json(page).into_response())
}

/// GET /api/notifications/{id}
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<NotificationId>,
    headers: HeaderMap,
    OriginalUri(uri): OriginalUri,
) -> Result<Json<Notification>, Error> {
    let request = AuthRequest::new(headers, uri);
    let user = state.authenticator.authenticate_request(&request).await;
    Ok(Json(state.gateway.show(user.as_ref(), id).await?))
}

/// POST /api/notifications
pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    OriginalUri(uri): OriginalUri,
    Json(params): Json<NotificationParams>,
) -> Result<Response, Error> {
    let request = AuthRequest::new(headers, uri);
    let user = state.authenticator.authenticate_request(&request).await;
    let message = params.notification.message.unwrap_or_default();
    let notification = state.gateway.create(user.as_ref(), &message).await?;
    Ok((StatusCode::CREATED, Json(notification)).into_response())
}

/// PATCH/PUT /api/notifications/{id}
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<NotificationId>,
    headers: HeaderMap,
    OriginalUri(uri): OriginalUri,
    Json(params): Json<NotificationParams>,
) -> Result<Json<Notification>, Error> {
    let request = AuthRequest::new(headers, uri);
    let user = state.authenticator.authenticate_request(&request).await;
    Ok(Json(
        state
            .gateway
            .update(user.as_ref(), id, params.notification)
            .await?,
    ))
}

/// PATCH /api/notifications/{id}/mark_read
pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<NotificationId>,
    headers: HeaderMap,
    OriginalUri(uri): OriginalUri,
) -> Result<Json<Notification>, Error> {
    let request = AuthRequest::new(headers, uri);
    let user = state.authenticator.authenticate_request(&request).await;
    Ok(Json(state.gateway.mark_read(user.as_ref(), id).await?))
}

/// DELETE /api/notifications/{id}
pub async fn destroy(
    State(state): State<AppState>,
    Path(id): Path<NotificationId>,
    headers: HeaderMap,
    OriginalUri(uri): OriginalUri,
) -> Result<Json<DeleteResponse>, Error> {
    let request = AuthRequest::new(headers, uri);
    let user = state.authenticator.authenticate_request(&request).await;
    state.gateway.delete(user.as_ref(), id).await?;
    Ok(Json(DeleteResponse {
        message: "Notification deleted successfully",
    }))
}

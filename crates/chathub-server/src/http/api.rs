//! `/api` REST handlers.

use axum::Json;
use axum::extract::State;
use chathub_core::PersistedMessage;
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::extract::AuthUser;
use crate::server::AppState;

/// `POST /api/messages` body. The sender is always the caller.
#[derive(Debug, Deserialize)]
pub struct PostMessageBody {
    /// Message text.
    pub content: String,
    /// Recipient user ID for a direct message.
    #[serde(default)]
    pub recipient: Option<String>,
    /// Target room.
    #[serde(default)]
    pub room_id: Option<String>,
}

/// `GET /api/users/online` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct OnlineUsers {
    /// Sorted display names.
    pub connected_users: Vec<String>,
    /// Number of names.
    pub count: usize,
}

/// POST /api/messages
pub async fn post_message(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Json(body): Json<PostMessageBody>,
) -> Result<Json<PersistedMessage>, ApiError> {
    if body.content.trim().is_empty() {
        return Err(ApiError::BadRequest("content is required".into()));
    }
    let message = state
        .hub
        .post_message(&identity, body.content, body.recipient, body.room_id)
        .await?;
    Ok(Json(message))
}

/// GET /api/messages
pub async fn list_messages(
    State(state): State<AppState>,
    _caller: AuthUser,
) -> Result<Json<Vec<PersistedMessage>>, ApiError> {
    Ok(Json(state.hub.messages().await?))
}

/// GET /api/users/online
pub async fn online_users(State(state): State<AppState>, _caller: AuthUser) -> Json<OnlineUsers> {
    let connected_users = state.hub.list_connected_names();
    Json(OnlineUsers {
        count: connected_users.len(),
        connected_users,
    })
}

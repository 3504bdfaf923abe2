use axum::{
    Json,
    extract::{Query, State},
};
use chrono::Utc;
use tracing::debug;

use pibble_gateway::store;
use pibble_types::api::{ChatHistoryQuery, ChatHistoryResponse};
use pibble_types::error::ChatError;
use pibble_types::models::FriendStatus;

use crate::error::ApiError;
use crate::state::AppState;

/// GET /chat-history?userKey&friendKey
///
/// Marks the friend's unread messages to the caller as read, then returns the
/// whole conversation oldest first. Only accepted friends (or an admin on
/// either side) may read it.
pub async fn chat_history(
    State(state): State<AppState>,
    Query(query): Query<ChatHistoryQuery>,
) -> Result<Json<ChatHistoryResponse>, ApiError> {
    if query.user_key.is_empty() || query.friend_key.is_empty() {
        return Err(ChatError::Validation("Missing userKey or friendKey".into()).into());
    }

    let user = state.identity.require(&query.user_key).await?;
    let friend = state
        .identity
        .validate(&query.friend_key)
        .await?
        .ok_or_else(|| ChatError::NotFound("Friend not found".into()))?;

    let privileged = state.identity.is_admin(&user.credential) || state.identity.is_admin(&friend.credential);
    if !privileged {
        let (a, b) = (user.credential.clone(), friend.credential.clone());
        let relation = store::call(state.store(), move |s| s.friendship(&a, &b)).await?;
        if !matches!(relation, Some((_, FriendStatus::Accepted))) {
            return Err(ChatError::Forbidden("You are not friends with this user".into()).into());
        }
    }

    let (me, them) = (user.credential, friend.credential);
    let now = Utc::now();
    let messages = store::call(state.store(), move |s| {
        let marked = s.mark_read(&me, &them, &now)?;
        if marked > 0 {
            debug!("marked {} messages from {} as read", marked, them);
        }
        s.messages_between(&me, &them)
    })
    .await?;

    Ok(Json(ChatHistoryResponse {
        success: true,
        messages,
    }))
}

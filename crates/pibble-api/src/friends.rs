use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use chrono::Utc;
use tracing::info;

use pibble_gateway::store;
use pibble_types::api::{FriendRequest, FriendResponseRequest, StatusResponse};
use pibble_types::error::ChatError;
use pibble_types::models::{FriendStatus, User};

use crate::error::ApiError;
use crate::state::AppState;

fn ok(message: impl Into<String>) -> Json<StatusResponse> {
    Json(StatusResponse {
        success: true,
        message: message.into(),
    })
}

async fn user_named(state: &AppState, username: &str) -> Result<User, ApiError> {
    let name = username.trim().to_string();
    store::call(state.store(), move |s| s.user_by_username(&name))
        .await?
        .ok_or_else(|| ChatError::NotFound("User not found".into()).into())
}

/// POST /friends/request: ask `username` to be friends with the caller.
pub async fn send_request(
    State(state): State<AppState>,
    payload: Result<Json<FriendRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let Json(req) = payload?;
    let me = state.identity.require(&req.post_key).await?;
    let target = user_named(&state, &req.username).await?;

    if target.credential == me.credential {
        return Err(ChatError::Validation("You cannot send a friend request to yourself".into()).into());
    }

    let (from, to) = (me.credential.clone(), target.credential.clone());
    let now = Utc::now();
    let outcome = store::call(state.store(), move |s| {
        match s.friendship(&from, &to)? {
            Some((_, FriendStatus::Accepted)) => return Ok(Err(ChatError::Validation("Already friends".into()))),
            Some((_, FriendStatus::Pending)) => {
                return Ok(Err(ChatError::Validation("Friend request already pending".into())));
            }
            Some((_, FriendStatus::Rejected)) | None => {}
        }
        s.insert_friend_request(&from, &to, &now)?;
        Ok(Ok(()))
    })
    .await?;
    outcome?;

    info!("{} sent a friend request to {}", me.display_name, target.display_name);
    Ok(ok("Friend request sent"))
}

/// POST /friends/respond: accept or reject a pending request from `username`.
pub async fn respond(
    State(state): State<AppState>,
    payload: Result<Json<FriendResponseRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let Json(req) = payload?;
    let me = state.identity.require(&req.post_key).await?;
    let requester = user_named(&state, &req.username).await?;

    let status = if req.accept {
        FriendStatus::Accepted
    } else {
        FriendStatus::Rejected
    };
    let (from, to) = (requester.credential.clone(), me.credential.clone());
    let now = Utc::now();
    let outcome = store::call(state.store(), move |s| {
        let pending = matches!(
            s.friendship(&from, &to)?,
            Some((requested_by, FriendStatus::Pending)) if requested_by == from
        );
        if !pending {
            return Ok(Err(ChatError::NotFound("No pending friend request from this user".into())));
        }
        s.update_friend_status(&from, &to, status, &now)?;
        Ok(Ok(()))
    })
    .await?;
    outcome?;

    info!(
        "{} {} the friend request from {}",
        me.display_name,
        status.as_str(),
        requester.display_name
    );
    Ok(ok(if req.accept {
        "Friend request accepted"
    } else {
        "Friend request rejected"
    }))
}

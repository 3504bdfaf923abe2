use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use rand::Rng;
use tracing::info;

use pibble_db::models::Registration;
use pibble_gateway::store;
use pibble_types::api::{SignupRequest, SignupResponse};
use pibble_types::error::ChatError;
use pibble_types::models::User;

use crate::error::ApiError;
use crate::state::AppState;

const POST_KEY_LEN: usize = 12;
const POST_KEY_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";
const MAX_USERNAME_LEN: usize = 32;

pub fn generate_post_key() -> String {
    let mut rng = rand::rng();
    (0..POST_KEY_LEN)
        .map(|_| POST_KEY_ALPHABET[rng.random_range(0..POST_KEY_ALPHABET.len())] as char)
        .collect()
}

/// POST /signup
pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SignupResponse>), ApiError> {
    let Json(req) = payload?;

    let username = req.username.trim().to_string();
    if username.is_empty() {
        return Err(ChatError::Validation("Username is required".into()).into());
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(ChatError::Validation(format!("Username must be at most {} characters", MAX_USERNAME_LEN)).into());
    }

    let post_key = match req.custom_post_key.as_deref().map(str::trim) {
        Some(key) if !key.is_empty() => {
            if key.chars().any(char::is_whitespace) {
                return Err(ChatError::Validation("Post key cannot contain spaces".into()).into());
            }
            key.to_string()
        }
        _ => generate_post_key(),
    };
    if state.identity.is_admin(&post_key) {
        return Err(ChatError::Validation("Post key already taken".into()).into());
    }

    let user = User {
        credential: post_key,
        display_name: username,
        avatar_path: None,
        role: req.role.filter(|r| !r.trim().is_empty()),
        bio: req.bio.filter(|b| !b.trim().is_empty()),
    };

    let (outcome, created) = store::call(state.store(), move |s| Ok((s.register_user(&user)?, user))).await?;
    match outcome {
        Registration::Created => {}
        Registration::UsernameTaken => {
            return Err(ChatError::Validation("Username already taken".into()).into());
        }
        Registration::PostKeyTaken => {
            return Err(ChatError::Validation("Post key already taken".into()).into());
        }
    }

    info!("New user {} signed up", created.display_name);

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            success: true,
            post_key: created.credential,
            username: created.display_name,
        }),
    ))
}

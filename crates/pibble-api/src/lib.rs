pub mod error;
pub mod friends;
pub mod history;
pub mod media;
pub mod signup;
pub mod state;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

use crate::state::AppState;

/// Room for the key fields and multipart framing on top of the file itself.
const UPLOAD_FORM_OVERHEAD: usize = 64 * 1024;

/// HTTP routes around the realtime core.
pub fn router(state: AppState) -> Router {
    // The handler checks the file against max_upload_bytes while streaming;
    // this caps the request as a whole.
    let upload_limit = state.max_upload_bytes.saturating_add(UPLOAD_FORM_OVERHEAD);
    Router::new()
        .route("/chat-history", get(history::chat_history))
        .route(
            "/upload-chat-media",
            post(media::upload_chat_media).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/signup", post(signup::signup))
        .route("/friends/request", post(friends::send_request))
        .route("/friends/respond", post(friends::respond))
        .with_state(state)
}

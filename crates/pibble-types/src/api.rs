use serde::{Deserialize, Serialize};

use crate::models::PrivateMessage;

// -- Chat history --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistoryQuery {
    #[serde(default)]
    pub user_key: String,
    #[serde(default)]
    pub friend_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatHistoryResponse {
    pub success: bool,
    pub messages: Vec<PrivateMessage>,
}

// -- Media upload --

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub message_id: i64,
    pub media_path: String,
}

// -- Signup --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub username: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub custom_post_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupResponse {
    pub success: bool,
    pub post_key: String,
    pub username: String,
}

// -- Friends --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    pub post_key: String,
    pub username: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendResponseRequest {
    pub post_key: String,
    pub username: String,
    pub accept: bool,
}

/// Generic `{success, message}` body for actions with no payload and for
/// every error.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub success: bool,
    pub message: String,
}

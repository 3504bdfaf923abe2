use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{PresenceEntry, PrivateMessage, UserView};

/// Commands sent FROM client TO server over the WebSocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ClientCommand {
    /// Begin a session with a post key
    Authenticate { credential: String },

    /// Post to the public room
    ChatMessage { text: String },

    /// Join the private room shared with a friend
    JoinPrivateChat {
        self_credential: String,
        friend_credential: String,
    },

    /// Send a direct message. `client_local_id` lets the sender reconcile
    /// its optimistic echo with the stored copy.
    SendPrivateMessage {
        sender: String,
        receiver: String,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        gif_url: Option<String>,
        #[serde(default)]
        client_local_id: Option<String>,
    },

    /// Check a credential without touching the session
    ValidateKey { credential: String },
}

/// Events sent FROM server TO client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    AuthResponse {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<UserView>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// A public-room message
    NewMessage {
        user: UserView,
        text: String,
        timestamp: DateTime<Utc>,
    },

    /// Join/leave notice
    SystemMessage { text: String },

    /// Full online-users snapshot
    UsersUpdate { users: Vec<PresenceEntry> },

    PrivateMessage {
        id: i64,
        sender: String,
        receiver: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_path: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        gif_url: Option<String>,
        timestamp: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_local_id: Option<String>,
    },

    KeyValidated {
        valid: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        credential: Option<String>,
    },

    /// Failure report delivered only to the originating connection
    MessageError {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_local_id: Option<String>,
    },
}

impl ServerEvent {
    pub fn auth_ok(user: UserView) -> Self {
        Self::AuthResponse {
            success: true,
            user: Some(user),
            message: None,
        }
    }

    pub fn auth_failed(message: impl Into<String>) -> Self {
        Self::AuthResponse {
            success: false,
            user: None,
            message: Some(message.into()),
        }
    }

    pub fn private_message(msg: &PrivateMessage, client_local_id: Option<String>) -> Self {
        Self::PrivateMessage {
            id: msg.id,
            sender: msg.sender.clone(),
            receiver: msg.receiver.clone(),
            text: msg.text.clone(),
            image_path: msg.image_path.clone(),
            gif_url: msg.gif_url.clone(),
            timestamp: msg.timestamp,
            client_local_id,
        }
    }

    /// Wire name of the event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AuthResponse { .. } => "auth_response",
            Self::NewMessage { .. } => "new_message",
            Self::SystemMessage { .. } => "system_message",
            Self::UsersUpdate { .. } => "users_update",
            Self::PrivateMessage { .. } => "private_message",
            Self::KeyValidated { .. } => "key_validated",
            Self::MessageError { .. } => "message_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn commands_use_snake_case_names_and_camel_case_fields() {
        let raw = json!({
            "type": "join_private_chat",
            "data": { "selfCredential": "k2", "friendCredential": "k1" }
        });
        let cmd: ClientCommand = serde_json::from_value(raw).unwrap();
        assert_eq!(
            cmd,
            ClientCommand::JoinPrivateChat {
                self_credential: "k2".into(),
                friend_credential: "k1".into(),
            }
        );
    }

    #[test]
    fn optional_private_fields_may_be_omitted() {
        let raw = json!({
            "type": "send_private_message",
            "data": { "sender": "k1", "receiver": "k2", "text": "hey" }
        });
        let cmd: ClientCommand = serde_json::from_value(raw).unwrap();
        match cmd {
            ClientCommand::SendPrivateMessage { gif_url, client_local_id, text, .. } => {
                assert_eq!(text.as_deref(), Some("hey"));
                assert!(gif_url.is_none());
                assert!(client_local_id.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn failed_auth_omits_user() {
        let value = serde_json::to_value(ServerEvent::auth_failed("Invalid post key")).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "auth_response",
                "data": { "success": false, "message": "Invalid post key" }
            })
        );
    }

    #[test]
    fn key_validated_shape() {
        let value = serde_json::to_value(ServerEvent::KeyValidated {
            valid: true,
            credential: Some("k1".into()),
        })
        .unwrap();
        assert_eq!(value["type"], "key_validated");
        assert_eq!(value["data"]["credential"], "k1");
    }
}

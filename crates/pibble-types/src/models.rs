use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Avatar shown for users who never uploaded one.
pub const DEFAULT_AVATAR_PATH: &str = "uploads/default-avatar.png";

/// A registered (or synthesized admin) user. The credential is the only
/// authentication factor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub credential: String,
    pub display_name: String,
    pub avatar_path: Option<String>,
    pub role: Option<String>,
    pub bio: Option<String>,
}

impl User {
    pub fn avatar_or_default(&self) -> &str {
        self.avatar_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_AVATAR_PATH)
    }

    /// The sanitized view sent back on successful authentication and
    /// attached to public messages.
    pub fn view(&self) -> UserView {
        UserView {
            display_name: self.display_name.clone(),
            avatar_path: self.avatar_or_default().to_string(),
            credential: self.credential.clone(),
        }
    }

    pub fn presence_entry(&self) -> PresenceEntry {
        PresenceEntry {
            display_name: self.display_name.clone(),
            avatar_path: self.avatar_or_default().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub display_name: String,
    pub avatar_path: String,
    pub credential: String,
}

/// One row of the online-users list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    pub display_name: String,
    pub avatar_path: String,
}

/// A message posted to the public room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicMessage {
    pub id: i64,
    pub sender: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// A direct message between two users. At least one of `text`,
/// `image_path` and `gif_url` is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateMessage {
    pub id: i64,
    pub sender: String,
    pub receiver: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gif_url: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

/// Payload of a private message before the store assigns it an id.
#[derive(Debug, Clone, Default)]
pub struct NewPrivateMessage {
    pub sender: String,
    pub receiver: String,
    pub text: Option<String>,
    pub image_path: Option<String>,
    pub gif_url: Option<String>,
}

impl NewPrivateMessage {
    /// True when at least one payload field carries content.
    pub fn has_content(&self) -> bool {
        [&self.text, &self.image_path, &self.gif_url]
            .iter()
            .any(|f| f.as_deref().is_some_and(|s| !s.trim().is_empty()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendStatus {
    Pending,
    Accepted,
    Rejected,
}

impl FriendStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(avatar: Option<&str>) -> User {
        User {
            credential: "k1".into(),
            display_name: "Ann".into(),
            avatar_path: avatar.map(str::to_string),
            role: None,
            bio: None,
        }
    }

    #[test]
    fn missing_or_empty_avatar_falls_back() {
        assert_eq!(user(None).view().avatar_path, DEFAULT_AVATAR_PATH);
        assert_eq!(user(Some("")).presence_entry().avatar_path, DEFAULT_AVATAR_PATH);
        assert_eq!(user(Some("uploads/a.png")).view().avatar_path, "uploads/a.png");
    }

    #[test]
    fn private_message_needs_some_content() {
        let mut msg = NewPrivateMessage {
            sender: "a".into(),
            receiver: "b".into(),
            text: Some("   ".into()),
            ..Default::default()
        };
        assert!(!msg.has_content());

        msg.gif_url = Some("https://media.example/x.gif".into());
        assert!(msg.has_content());
    }
}

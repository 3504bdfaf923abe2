//! Database row types, mapped directly from SQLite rows.
//! Distinct from pibble-types models to keep the DB layer independent.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use tracing::warn;

use pibble_types::models::{FriendStatus, PrivateMessage, PublicMessage, User};

pub struct UserRow {
    pub post_key: String,
    pub username: String,
    pub profile_pic: Option<String>,
    pub role: Option<String>,
    pub bio: Option<String>,
}

impl UserRow {
    pub fn into_user(self) -> User {
        User {
            credential: self.post_key,
            display_name: self.username,
            avatar_path: self.profile_pic,
            role: self.role,
            bio: self.bio,
        }
    }
}

/// Outcome of registering a new account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Created,
    UsernameTaken,
    PostKeyTaken,
}

pub struct FriendRow {
    pub requester_key: String,
    pub addressee_key: String,
    pub status: String,
    pub created_at: String,
}

impl FriendRow {
    pub fn status(&self) -> Option<FriendStatus> {
        FriendStatus::parse(&self.status)
    }
}

pub struct PublicMessageRow {
    pub id: i64,
    pub sender_key: String,
    pub text: String,
    pub created_at: String,
}

impl PublicMessageRow {
    pub fn into_message(self) -> PublicMessage {
        PublicMessage {
            timestamp: parse_timestamp(&self.created_at, self.id),
            id: self.id,
            sender: self.sender_key,
            text: self.text,
        }
    }
}

pub struct PrivateMessageRow {
    pub id: i64,
    pub sender_key: String,
    pub receiver_key: String,
    pub text: Option<String>,
    pub image_path: Option<String>,
    pub gif_url: Option<String>,
    pub created_at: String,
    pub read_at: Option<String>,
}

impl PrivateMessageRow {
    pub fn into_message(self) -> PrivateMessage {
        PrivateMessage {
            timestamp: parse_timestamp(&self.created_at, self.id),
            read_at: self.read_at.as_deref().map(|s| parse_timestamp(s, self.id)),
            id: self.id,
            sender: self.sender_key,
            receiver: self.receiver_key,
            text: self.text,
            image_path: self.image_path,
            gif_url: self.gif_url,
        }
    }
}

/// Timestamps are written as RFC 3339. Rows inserted by hand through the
/// sqlite shell use `datetime('now')`, which has no timezone; read those as
/// naive UTC.
pub fn parse_timestamp(raw: &str, message_id: i64) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc()))
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' on message {}: {}", raw, message_id, e);
            DateTime::default()
        })
}

/// Fixed-width so that text ordering matches time ordering.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

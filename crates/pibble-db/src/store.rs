use anyhow::Result;
use chrono::{DateTime, Utc};

use pibble_types::models::{FriendStatus, NewPrivateMessage, PrivateMessage, PublicMessage, User};

use crate::Database;
use crate::models::Registration;

/// The credential and social store as seen by the realtime gateway and the
/// HTTP handlers. Calls are blocking; async callers run them on the blocking
/// pool.
pub trait SocialStore: Send + Sync + 'static {
    fn user_by_credential(&self, credential: &str) -> Result<Option<User>>;

    fn user_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Create the account unless its username or credential is taken.
    fn register_user(&self, user: &User) -> Result<Registration>;

    fn insert_public_message(&self, sender: &str, text: &str, at: &DateTime<Utc>) -> Result<PublicMessage>;

    fn insert_private_message(&self, msg: &NewPrivateMessage, at: &DateTime<Utc>) -> Result<PrivateMessage>;

    fn messages_between(&self, a: &str, b: &str) -> Result<Vec<PrivateMessage>>;

    fn mark_read(&self, receiver: &str, sender: &str, at: &DateTime<Utc>) -> Result<usize>;

    fn insert_friend_request(&self, requester: &str, addressee: &str, at: &DateTime<Utc>) -> Result<()>;

    fn update_friend_status(
        &self,
        requester: &str,
        addressee: &str,
        status: FriendStatus,
        at: &DateTime<Utc>,
    ) -> Result<bool>;

    /// Status of the relation between two users in either direction, with
    /// the requester's credential.
    fn friendship(&self, a: &str, b: &str) -> Result<Option<(String, FriendStatus)>>;
}

impl SocialStore for Database {
    fn user_by_credential(&self, credential: &str) -> Result<Option<User>> {
        Ok(self.get_user_by_post_key(credential)?.map(|row| row.into_user()))
    }

    fn user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self.get_user_by_username(username)?.map(|row| row.into_user()))
    }

    fn register_user(&self, user: &User) -> Result<Registration> {
        Database::register_user(
            self,
            &user.credential,
            &user.display_name,
            user.avatar_path.as_deref(),
            user.role.as_deref(),
            user.bio.as_deref(),
        )
    }

    fn insert_public_message(&self, sender: &str, text: &str, at: &DateTime<Utc>) -> Result<PublicMessage> {
        Ok(Database::insert_public_message(self, sender, text, at)?.into_message())
    }

    fn insert_private_message(&self, msg: &NewPrivateMessage, at: &DateTime<Utc>) -> Result<PrivateMessage> {
        Ok(Database::insert_private_message(self, msg, at)?.into_message())
    }

    fn messages_between(&self, a: &str, b: &str) -> Result<Vec<PrivateMessage>> {
        Ok(self
            .get_messages_between(a, b)?
            .into_iter()
            .map(|row| row.into_message())
            .collect())
    }

    fn mark_read(&self, receiver: &str, sender: &str, at: &DateTime<Utc>) -> Result<usize> {
        Database::mark_read(self, receiver, sender, at)
    }

    fn insert_friend_request(&self, requester: &str, addressee: &str, at: &DateTime<Utc>) -> Result<()> {
        Database::insert_friend_request(self, requester, addressee, at)
    }

    fn update_friend_status(
        &self,
        requester: &str,
        addressee: &str,
        status: FriendStatus,
        at: &DateTime<Utc>,
    ) -> Result<bool> {
        Database::update_friend_status(self, requester, addressee, status, at)
    }

    fn friendship(&self, a: &str, b: &str) -> Result<Option<(String, FriendStatus)>> {
        Ok(self
            .get_friendship(a, b)?
            .and_then(|row| row.status().map(|status| (row.requester_key, status))))
    }
}

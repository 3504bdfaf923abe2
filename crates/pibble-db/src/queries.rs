use crate::Database;
use crate::models::{
    FriendRow, PrivateMessageRow, PublicMessageRow, Registration, UserRow, format_timestamp,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use pibble_types::models::{FriendStatus, NewPrivateMessage};
use rusqlite::Connection;

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        post_key: &str,
        username: &str,
        profile_pic: Option<&str>,
        role: Option<&str>,
        bio: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (post_key, username, profile_pic, role, bio) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![post_key, username, profile_pic, role, bio],
            )?;
            Ok(())
        })
    }

    /// Insert a user unless the username or post key is already in use.
    /// The checks and the insert run under one lock, so concurrent signups
    /// for the same name see exactly one `Created`.
    pub fn register_user(
        &self,
        post_key: &str,
        username: &str,
        profile_pic: Option<&str>,
        role: Option<&str>,
        bio: Option<&str>,
    ) -> Result<Registration> {
        self.with_conn(|conn| {
            if query_user(conn, "username", username)?.is_some() {
                return Ok(Registration::UsernameTaken);
            }
            if query_user(conn, "post_key", post_key)?.is_some() {
                return Ok(Registration::PostKeyTaken);
            }
            conn.execute(
                "INSERT INTO users (post_key, username, profile_pic, role, bio) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![post_key, username, profile_pic, role, bio],
            )?;
            Ok(Registration::Created)
        })
    }

    pub fn get_user_by_post_key(&self, post_key: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "post_key", post_key))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    // -- Public messages --

    pub fn insert_public_message(
        &self,
        sender_key: &str,
        text: &str,
        created_at: &DateTime<Utc>,
    ) -> Result<PublicMessageRow> {
        let created_at = format_timestamp(created_at);
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO public_messages (sender_key, text, created_at) VALUES (?1, ?2, ?3)",
                (sender_key, text, &created_at),
            )?;
            Ok(PublicMessageRow {
                id: conn.last_insert_rowid(),
                sender_key: sender_key.to_string(),
                text: text.to_string(),
                created_at,
            })
        })
    }

    pub fn get_public_messages(&self, limit: u32) -> Result<Vec<PublicMessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender_key, text, created_at FROM (
                     SELECT id, sender_key, text, created_at FROM public_messages
                     ORDER BY id DESC LIMIT ?1
                 ) ORDER BY id ASC",
            )?;
            let rows = stmt
                .query_map([limit], |row| {
                    Ok(PublicMessageRow {
                        id: row.get(0)?,
                        sender_key: row.get(1)?,
                        text: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Private messages --

    pub fn insert_private_message(
        &self,
        msg: &NewPrivateMessage,
        created_at: &DateTime<Utc>,
    ) -> Result<PrivateMessageRow> {
        let created_at = format_timestamp(created_at);
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO private_messages (sender_key, receiver_key, text, image_path, gif_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    msg.sender,
                    msg.receiver,
                    msg.text,
                    msg.image_path,
                    msg.gif_url,
                    created_at
                ],
            )?;
            Ok(PrivateMessageRow {
                id: conn.last_insert_rowid(),
                sender_key: msg.sender.clone(),
                receiver_key: msg.receiver.clone(),
                text: msg.text.clone(),
                image_path: msg.image_path.clone(),
                gif_url: msg.gif_url.clone(),
                created_at,
                read_at: None,
            })
        })
    }

    /// Full conversation between two users, oldest first.
    pub fn get_messages_between(&self, a: &str, b: &str) -> Result<Vec<PrivateMessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender_key, receiver_key, text, image_path, gif_url, created_at, read_at
                 FROM private_messages
                 WHERE (sender_key = ?1 AND receiver_key = ?2)
                    OR (sender_key = ?2 AND receiver_key = ?1)
                 ORDER BY created_at ASC, id ASC",
            )?;
            let rows = stmt
                .query_map((a, b), |row| {
                    Ok(PrivateMessageRow {
                        id: row.get(0)?,
                        sender_key: row.get(1)?,
                        receiver_key: row.get(2)?,
                        text: row.get(3)?,
                        image_path: row.get(4)?,
                        gif_url: row.get(5)?,
                        created_at: row.get(6)?,
                        read_at: row.get(7)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Stamp every unread message from `sender` to `receiver`. Messages that
    /// already carry a `read_at` keep it. Returns the number newly marked.
    pub fn mark_read(&self, receiver: &str, sender: &str, at: &DateTime<Utc>) -> Result<usize> {
        let at = format_timestamp(at);
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE private_messages SET read_at = ?1
                 WHERE receiver_key = ?2 AND sender_key = ?3 AND read_at IS NULL",
                (&at, receiver, sender),
            )?;
            Ok(changed)
        })
    }

    pub fn count_private_messages(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM private_messages", [], |row| row.get(0))?;
            Ok(n as u64)
        })
    }

    // -- Friends --

    /// Record a pending request from `requester` to `addressee`. A previously
    /// rejected request in the same direction is reopened.
    pub fn insert_friend_request(&self, requester: &str, addressee: &str, at: &DateTime<Utc>) -> Result<()> {
        let at = format_timestamp(at);
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO friends (requester_key, addressee_key, status, created_at, updated_at)
                 VALUES (?1, ?2, 'pending', ?3, ?3)
                 ON CONFLICT (requester_key, addressee_key)
                 DO UPDATE SET status = 'pending', updated_at = excluded.updated_at
                 WHERE friends.status = 'rejected'",
                (requester, addressee, &at),
            )?;
            Ok(())
        })
    }

    /// Set the status of the request `requester -> addressee`. Returns false
    /// if no such request exists.
    pub fn update_friend_status(
        &self,
        requester: &str,
        addressee: &str,
        status: FriendStatus,
        at: &DateTime<Utc>,
    ) -> Result<bool> {
        let at = format_timestamp(at);
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE friends SET status = ?1, updated_at = ?2
                 WHERE requester_key = ?3 AND addressee_key = ?4",
                (status.as_str(), &at, requester, addressee),
            )?;
            Ok(changed > 0)
        })
    }

    /// The relation between two users in either direction, if any.
    pub fn get_friendship(&self, a: &str, b: &str) -> Result<Option<FriendRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT requester_key, addressee_key, status, created_at FROM friends
                     WHERE (requester_key = ?1 AND addressee_key = ?2)
                        OR (requester_key = ?2 AND addressee_key = ?1)
                     ORDER BY CASE status WHEN 'accepted' THEN 0 WHEN 'pending' THEN 1 ELSE 2 END
                     LIMIT 1",
                    (a, b),
                    |row| {
                        Ok(FriendRow {
                            requester_key: row.get(0)?,
                            addressee_key: row.get(1)?,
                            status: row.get(2)?,
                            created_at: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT post_key, username, profile_pic, role, bio FROM users WHERE {} = ?1",
        column
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                post_key: row.get(0)?,
                username: row.get(1)?,
                profile_pic: row.get(2)?,
                role: row.get(3)?,
                bio: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

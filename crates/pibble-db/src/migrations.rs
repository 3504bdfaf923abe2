use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            post_key     TEXT PRIMARY KEY,
            username     TEXT NOT NULL UNIQUE,
            profile_pic  TEXT,
            role         TEXT,
            bio          TEXT
        );

        CREATE TABLE IF NOT EXISTS friends (
            requester_key  TEXT NOT NULL,
            addressee_key  TEXT NOT NULL,
            status         TEXT NOT NULL CHECK (status IN ('pending', 'accepted', 'rejected')),
            created_at     TEXT NOT NULL,
            updated_at     TEXT NOT NULL,
            PRIMARY KEY (requester_key, addressee_key)
        );

        CREATE TABLE IF NOT EXISTS public_messages (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            sender_key  TEXT NOT NULL,
            text        TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS private_messages (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            sender_key    TEXT NOT NULL,
            receiver_key  TEXT NOT NULL,
            text          TEXT,
            image_path    TEXT,
            gif_url       TEXT,
            created_at    TEXT NOT NULL,
            read_at       TEXT,
            CHECK (
                COALESCE(text, '') <> ''
                OR COALESCE(image_path, '') <> ''
                OR COALESCE(gif_url, '') <> ''
            )
        );

        CREATE INDEX IF NOT EXISTS idx_private_messages_pair
            ON private_messages(sender_key, receiver_key, created_at);

        -- Seed the founding admin account
        INSERT OR IGNORE INTO users (post_key, username, profile_pic, role, bio)
            VALUES ('pibble_power3', 'Tulip', 'uploads/default-avatar.png', 'Agarthas Admin',
                    'yk ur own classic pibble lover here i love pibbles so much');
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}

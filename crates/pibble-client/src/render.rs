use chrono::{DateTime, Local, Utc};

use pibble_types::dedup::MessageDeduplicator;
use pibble_types::events::ServerEvent;

/// Formats server events as terminal lines. Public messages already shown
/// are suppressed.
#[derive(Default)]
pub struct Renderer {
    dedup: MessageDeduplicator,
}

fn clock(ts: &DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%H:%M").to_string()
}

impl Renderer {
    pub fn render(&mut self, event: &ServerEvent) -> Option<String> {
        let line = match event {
            ServerEvent::AuthResponse {
                success: true,
                user: Some(user),
                ..
            } => format!("Logged in as {}", user.display_name),
            ServerEvent::AuthResponse { message, .. } => {
                format!("Login failed: {}", message.as_deref().unwrap_or("unknown error"))
            }
            ServerEvent::NewMessage { user, text, timestamp } => {
                if !self.dedup.observe(&user.credential, timestamp, text) {
                    return None;
                }
                format!("[{}] {}: {}", clock(timestamp), user.display_name, text)
            }
            ServerEvent::SystemMessage { text } => format!("* {}", text),
            ServerEvent::UsersUpdate { users } => {
                let names: Vec<&str> = users.iter().map(|u| u.display_name.as_str()).collect();
                format!("Online ({}): {}", names.len(), names.join(", "))
            }
            ServerEvent::PrivateMessage {
                sender,
                receiver,
                text,
                image_path,
                gif_url,
                timestamp,
                ..
            } => {
                let body = text
                    .as_deref()
                    .or(image_path.as_deref())
                    .or(gif_url.as_deref())
                    .unwrap_or_default();
                format!("[{}] {} -> {}: {}", clock(timestamp), sender, receiver, body)
            }
            ServerEvent::KeyValidated {
                valid: true,
                credential,
            } => format!("Key {} is valid", credential.as_deref().unwrap_or_default()),
            ServerEvent::KeyValidated { .. } => "Key is not valid".to_string(),
            ServerEvent::MessageError { message, .. } => format!("! {}", message),
        };
        Some(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pibble_types::models::UserView;

    fn public(text: &str) -> ServerEvent {
        ServerEvent::NewMessage {
            user: UserView {
                display_name: "ann".into(),
                avatar_path: "uploads/default-avatar.png".into(),
                credential: "k1".into(),
            },
            text: text.into(),
            timestamp: DateTime::default(),
        }
    }

    #[test]
    fn repeated_public_message_renders_once() {
        let mut r = Renderer::default();
        assert!(r.render(&public("hello")).unwrap().ends_with("ann: hello"));
        assert_eq!(r.render(&public("hello")), None);
        assert!(r.render(&public("hello again")).is_some());
    }

    #[test]
    fn other_events_always_render() {
        let mut r = Renderer::default();
        let event = ServerEvent::SystemMessage { text: "bob has joined the chat".into() };
        assert_eq!(r.render(&event).as_deref(), Some("* bob has joined the chat"));
        assert_eq!(r.render(&event).as_deref(), Some("* bob has joined the chat"));
        assert_eq!(
            r.render(&ServerEvent::auth_failed("Invalid post key")).as_deref(),
            Some("Login failed: Invalid post key")
        );
    }
}

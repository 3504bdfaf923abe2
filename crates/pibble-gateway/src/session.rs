//! Per-connection state machine: `Connected -> Authenticated -> Closed`.
//!
//! Each command runs to completion before the next one on the same
//! connection is read, so per-sender ordering holds and persist-then-emit
//! needs no extra locking.

use std::collections::BTreeSet;
use std::str::FromStr;

use anyhow::bail;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use pibble_types::error::ChatError;
use pibble_types::events::{ClientCommand, ServerEvent};
use pibble_types::models::{NewPrivateMessage, User};

use crate::dispatcher::{ConnectionId, Dispatcher};
use crate::identity::IdentityResolver;
use crate::rooms::RoomId;
use crate::store::{self, SharedStore};

/// What to do when a public message cannot be persisted. Either way the
/// message is not broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublicPersistPolicy {
    /// Drop it; the sender is not told.
    #[default]
    Drop,
    /// Drop it and send `message_error` to the sender.
    FailClosed,
}

impl FromStr for PublicPersistPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(Self::Drop),
            "fail-closed" | "fail_closed" => Ok(Self::FailClosed),
            other => bail!("unknown public persist policy '{}' (expected drop or fail-closed)", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Authenticated(User),
    Closed,
}

/// One physical connection's view of the chat.
#[derive(Debug)]
pub struct Session {
    id: ConnectionId,
    state: SessionState,
    joined_rooms: BTreeSet<RoomId>,
}

impl Session {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn user(&self) -> Option<&User> {
        match &self.state {
            SessionState::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user().is_some()
    }

    pub fn joined_rooms(&self) -> &BTreeSet<RoomId> {
        &self.joined_rooms
    }
}

/// Drives every connection's state machine against the shared dispatcher
/// and store.
#[derive(Clone)]
pub struct SessionManager {
    dispatcher: Dispatcher,
    identity: IdentityResolver,
    policy: PublicPersistPolicy,
}

impl SessionManager {
    pub fn new(dispatcher: Dispatcher, identity: IdentityResolver, policy: PublicPersistPolicy) -> Self {
        Self {
            dispatcher,
            identity,
            policy,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    fn store(&self) -> &SharedStore {
        self.identity.store()
    }

    /// Register a fresh, unauthenticated connection.
    pub async fn open(&self) -> (Session, mpsc::UnboundedReceiver<ServerEvent>) {
        let (id, rx) = self.dispatcher.register().await;
        debug!("{} opened", id);
        let session = Session {
            id,
            state: SessionState::Connected,
            joined_rooms: BTreeSet::new(),
        };
        (session, rx)
    }

    pub async fn handle(&self, session: &mut Session, cmd: ClientCommand) {
        if session.state == SessionState::Closed {
            return;
        }

        match cmd {
            ClientCommand::Authenticate { credential } => self.authenticate(session, &credential).await,

            ClientCommand::ChatMessage { text } => self.send_public(session, text).await,

            ClientCommand::JoinPrivateChat {
                self_credential,
                friend_credential,
            } => self.join_private(session, &self_credential, &friend_credential).await,

            ClientCommand::SendPrivateMessage {
                sender,
                receiver,
                text,
                gif_url,
                client_local_id,
            } => {
                let msg = NewPrivateMessage {
                    sender,
                    receiver,
                    text,
                    image_path: None,
                    gif_url,
                };
                self.send_private(session, msg, client_local_id).await
            }

            ClientCommand::ValidateKey { credential } => self.validate_key(session, &credential).await,
        }
    }

    /// Tear the connection down. Safe to call more than once.
    pub async fn close(&self, session: &mut Session) {
        if session.state == SessionState::Closed {
            return;
        }
        let was = std::mem::replace(&mut session.state, SessionState::Closed);
        session.joined_rooms.clear();

        self.dispatcher.unregister(session.id).await;

        if let SessionState::Authenticated(user) = was {
            self.dispatcher.user_offline(session.id).await;
            info!("{} ({}) left the chat", user.display_name, session.id);
            self.dispatcher
                .emit_to_room(
                    &RoomId::Public,
                    ServerEvent::SystemMessage {
                        text: format!("{} has left the chat", user.display_name),
                    },
                    None,
                )
                .await;
            self.dispatcher.broadcast_presence().await;
        } else {
            debug!("{} closed before authenticating", session.id);
        }
    }

    async fn authenticate(&self, session: &mut Session, credential: &str) {
        if session.is_authenticated() {
            self.reply(session, ServerEvent::auth_failed("Session already authenticated"))
                .await;
            return;
        }

        let user = match self.identity.validate(credential).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                info!("{} failed to authenticate: unknown post key", session.id);
                self.reply(session, ServerEvent::auth_failed("Invalid post key")).await;
                return;
            }
            Err(e) => {
                self.reply(session, ServerEvent::auth_failed(e.to_string())).await;
                return;
            }
        };

        info!("{} ({}) authenticated", user.display_name, session.id);

        // The ack is queued before joining the public room so no room
        // traffic can reach the client ahead of it.
        session.state = SessionState::Authenticated(user.clone());
        self.reply(session, ServerEvent::auth_ok(user.view())).await;
        self.dispatcher.user_online(session.id, user.clone()).await;
        self.join(session, RoomId::Public).await;

        self.dispatcher
            .emit_to_room(
                &RoomId::Public,
                ServerEvent::SystemMessage {
                    text: format!("{} has joined the chat", user.display_name),
                },
                Some(session.id),
            )
            .await;
        self.dispatcher.broadcast_presence().await;
    }

    async fn send_public(&self, session: &mut Session, text: String) {
        let Some(user) = session.user().cloned() else {
            return;
        };
        if text.trim().is_empty() {
            return;
        }

        let sender = user.credential.clone();
        let now = Utc::now();
        let persisted = store::call(self.store(), move |s| s.insert_public_message(&sender, &text, &now)).await;

        let msg = match persisted {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Public message from {} not persisted, dropping: {}", session.id, e);
                if self.policy == PublicPersistPolicy::FailClosed {
                    self.report(session, ChatError::Persistence("Message could not be saved".into()), None)
                        .await;
                }
                return;
            }
        };

        self.dispatcher
            .emit_to_room(
                &RoomId::Public,
                ServerEvent::NewMessage {
                    user: user.view(),
                    text: msg.text,
                    timestamp: msg.timestamp,
                },
                None,
            )
            .await;
    }

    async fn join_private(&self, session: &mut Session, self_credential: &str, friend_credential: &str) {
        let user = match self.acting_user(session, self_credential).await {
            Ok(user) => user,
            Err(e) => {
                self.report(session, e, None).await;
                return;
            }
        };
        if friend_credential.is_empty() {
            self.report(session, ChatError::Validation("Missing friend key".into()), None)
                .await;
            return;
        }

        self.join(session, RoomId::private(&user.credential, friend_credential))
            .await;
    }

    async fn send_private(&self, session: &mut Session, msg: NewPrivateMessage, client_local_id: Option<String>) {
        let user = match self.acting_user(session, &msg.sender).await {
            Ok(user) => user,
            Err(e) => {
                self.report(session, e, client_local_id).await;
                return;
            }
        };
        if msg.receiver.is_empty() {
            self.report(session, ChatError::Validation("Missing receiver".into()), client_local_id)
                .await;
            return;
        }
        if !msg.has_content() {
            self.report(
                session,
                ChatError::Validation("Message needs text, an image or a GIF".into()),
                client_local_id,
            )
            .await;
            return;
        }

        let msg = NewPrivateMessage {
            sender: user.credential,
            text: msg.text.filter(|t| !t.trim().is_empty()),
            gif_url: msg.gif_url.filter(|g| !g.trim().is_empty()),
            ..msg
        };
        let room = RoomId::private(&msg.sender, &msg.receiver);
        let now = Utc::now();

        let stored = match store::call(self.store(), move |s| s.insert_private_message(&msg, &now)).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Private message from {} not persisted: {}", session.id, e);
                self.report(
                    session,
                    ChatError::Persistence("Message could not be saved".into()),
                    client_local_id,
                )
                .await;
                return;
            }
        };

        debug!("private message {} -> room {}", stored.id, room);
        self.dispatcher
            .emit_to_room(&room, ServerEvent::private_message(&stored, client_local_id), None)
            .await;
    }

    async fn validate_key(&self, session: &Session, credential: &str) {
        let valid = match self.identity.validate(credential).await {
            Ok(user) => user,
            Err(e) => {
                warn!("{} key validation failed: {}", session.id, e);
                None
            }
        };
        self.reply(
            session,
            ServerEvent::KeyValidated {
                valid: valid.is_some(),
                credential: valid.map(|u| u.credential),
            },
        )
        .await;
    }

    /// The user a private-chat command acts as. An authenticated session may
    /// only act as itself; an unauthenticated one must present a valid key.
    async fn acting_user(&self, session: &Session, claimed: &str) -> Result<User, ChatError> {
        if let Some(user) = session.user() {
            if user.credential != claimed {
                return Err(ChatError::Forbidden("Post key does not match this session".into()));
            }
            return Ok(user.clone());
        }
        self.identity.require(claimed).await
    }

    async fn join(&self, session: &mut Session, room: RoomId) {
        if session.joined_rooms.insert(room.clone()) {
            self.dispatcher.join(session.id, room).await;
        }
    }

    async fn reply(&self, session: &Session, event: ServerEvent) {
        self.dispatcher.send_to(session.id, event).await;
    }

    async fn report(&self, session: &Session, err: ChatError, client_local_id: Option<String>) {
        self.reply(
            session,
            ServerEvent::MessageError {
                message: err.to_string(),
                client_local_id,
            },
        )
        .await;
    }
}

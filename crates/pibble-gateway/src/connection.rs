use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};

use pibble_types::events::ClientCommand;

use crate::session::SessionManager;

/// Handle a single WebSocket connection from upgrade to close.
///
/// Outbound events are forwarded by a dedicated task; inbound commands are
/// handled one at a time on this task, in arrival order.
pub async fn handle_connection(socket: WebSocket, manager: SessionManager) {
    let (mut sender, mut receiver) = socket.split();
    let (mut session, mut events) = manager.open().await;
    let conn_id = session.id();

    info!("{} connected to gateway", conn_id);

    // Forward events addressed to this connection -> client
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to encode {} for {}: {}", event.name(), conn_id, e);
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Read commands from client
    loop {
        tokio::select! {
            _ = &mut send_task => break,
            frame = receiver.next() => {
                let msg = match frame {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        warn!("{} socket error: {}", conn_id, e);
                        break;
                    }
                    None => break,
                };

                match msg {
                    Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                        Ok(cmd) => manager.handle(&mut session, cmd).await,
                        Err(e) => {
                            warn!(
                                "{} bad command: {} -- raw: {}",
                                conn_id,
                                e,
                                text.as_str().chars().take(200).collect::<String>()
                            );
                        }
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    send_task.abort();
    manager.close(&mut session).await;
    info!("{} disconnected from gateway", conn_id);
}

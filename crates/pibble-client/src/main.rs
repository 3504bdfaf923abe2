mod input;
mod render;

use anyhow::{Context, Result, bail};
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{info, warn};

use pibble_types::events::{ClientCommand, ServerEvent};

use crate::input::{HELP, Input, LineParser};
use crate::render::Renderer;

const DEFAULT_URL: &str = "ws://127.0.0.1:3000/gateway";

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // Logs go to stderr so they don't interleave with chat lines
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "pibble_chat=info".into()),
        )
        .init();

    let url = std::env::var("PIBBLE_URL").unwrap_or_else(|_| DEFAULT_URL.into());
    let Some(key) = std::env::var("PIBBLE_KEY").ok().filter(|k| !k.trim().is_empty()) else {
        bail!("PIBBLE_KEY must be set to your post key");
    };

    let (ws_stream, _) = tokio_tungstenite::connect_async(&url)
        .await
        .with_context(|| format!("failed to connect to {}", url))?;
    info!("Connected to {}", url);

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    send(&mut ws_tx, &ClientCommand::Authenticate { credential: key.clone() }).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut parser = LineParser::new(key);
    let mut renderer = Renderer::default();

    loop {
        tokio::select! {
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerEvent>(text.as_str()) {
                    Ok(event) => {
                        if let Some(line) = renderer.render(&event) {
                            println!("{}", line);
                        }
                    }
                    Err(e) => warn!("Unrecognized event: {}", e),
                },
                Some(Ok(Message::Close(_))) | None => {
                    info!("Server closed the connection");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Connection error: {}", e);
                    break;
                }
            },
            line = lines.next_line() => match line? {
                Some(line) => match parser.parse(&line) {
                    Some(Input::Send(cmd)) => send(&mut ws_tx, &cmd).await?,
                    Some(Input::Help) => println!("{}", HELP),
                    Some(Input::Invalid(hint)) => println!("{}", hint),
                    Some(Input::Quit) => break,
                    None => {}
                },
                // stdin closed
                None => break,
            },
        }
    }

    ws_tx.send(Message::Close(None)).await.ok();
    Ok(())
}

async fn send<S>(sink: &mut S, cmd: &ClientCommand) -> Result<()>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let json = serde_json::to_string(cmd)?;
    sink.send(Message::Text(json.into())).await?;
    Ok(())
}

use pibble_types::events::ClientCommand;

pub const HELP: &str = "\
Commands:
  /join <key>         open a private chat with <key>
  /dm <key> <text>    send a private message
  /check <key>        check whether a post key is valid
  /help               show this help
  /quit               leave
Anything else is sent to the public room.";

#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Send(ClientCommand),
    Help,
    Quit,
    /// Malformed command; the string is a usage hint.
    Invalid(&'static str),
}

/// Turns stdin lines into commands on behalf of one credential.
pub struct LineParser {
    credential: String,
    next_local_id: u64,
}

impl LineParser {
    pub fn new(credential: impl Into<String>) -> Self {
        Self {
            credential: credential.into(),
            next_local_id: 1,
        }
    }

    pub fn parse(&mut self, line: &str) -> Option<Input> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        if !line.starts_with('/') {
            return Some(Input::Send(ClientCommand::ChatMessage { text: line.to_string() }));
        }

        let (cmd, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        let input = match cmd {
            "/help" => Input::Help,
            "/quit" => Input::Quit,
            "/join" if !rest.is_empty() => Input::Send(ClientCommand::JoinPrivateChat {
                self_credential: self.credential.clone(),
                friend_credential: rest.to_string(),
            }),
            "/join" => Input::Invalid("usage: /join <key>"),
            "/check" if !rest.is_empty() => Input::Send(ClientCommand::ValidateKey {
                credential: rest.to_string(),
            }),
            "/check" => Input::Invalid("usage: /check <key>"),
            "/dm" => match rest.split_once(char::is_whitespace) {
                Some((receiver, text)) if !text.trim().is_empty() => {
                    let local_id = format!("local-{}", self.next_local_id);
                    self.next_local_id += 1;
                    Input::Send(ClientCommand::SendPrivateMessage {
                        sender: self.credential.clone(),
                        receiver: receiver.to_string(),
                        text: Some(text.trim().to_string()),
                        gif_url: None,
                        client_local_id: Some(local_id),
                    })
                }
                _ => Input::Invalid("usage: /dm <key> <text>"),
            },
            _ => Input::Invalid("unknown command, try /help"),
        };
        Some(input)
    }
}

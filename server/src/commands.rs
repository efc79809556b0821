//! Slash commands typed into chat.
//!
//! Replies go to the issuing session only; command text is never broadcast.

use crate::error::ServerError;
use crate::hub::Hub;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Help,
    Unknown(String),
}

impl Command {
    /// Parses a chat line that starts with `/`. Returns `None` for plain chat.
    pub fn parse(line: &str) -> Option<Self> {
        let body = line.strip_prefix('/')?;
        let name = body.split_whitespace().next().unwrap_or("");

        Some(match name.to_ascii_lowercase().as_str() {
            "list" => Command::List,
            "help" => Command::Help,
            _ => Command::Unknown(name.to_string()),
        })
    }

    /// Runs the command and returns the reply line for the sender.
    pub async fn execute(&self, hub: &Hub) -> Result<String, ServerError> {
        match self {
            Command::List => {
                let names = hub.names().await?;
                Ok(format!("Online ({}): {}", names.len(), names.join(", ")))
            }
            Command::Help => Ok("Commands: /help, /list".to_string()),
            Command::Unknown(name) => Ok(format!("Unknown command: {}", name)),
        }
    }
}

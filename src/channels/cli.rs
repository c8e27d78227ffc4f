//! CLI channel: stdin/stdout REPL for trying the bot locally.

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse, StatusUpdate};
use crate::error::ChannelError;

/// Channel id reported for every CLI message.
pub const CLI_CHANNEL_ID: &str = "cli";

/// User id of the single local user.
pub const CLI_USER_ID: &str = "local-user";

/// Reads lines from stdin as messages from one local user; prints replies to
/// stdout.
pub struct CliChannel;

impl CliChannel {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        // Blank lines are still sent: an empty name is a valid answer.
                        let msg = IncomingMessage::new("cli", CLI_USER_ID, &line)
                            .with_channel_id(CLI_CHANNEL_ID);
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        _msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        println!("\n{}\n", response.content);
        eprint!("> ");
        Ok(())
    }

    async fn send_status(
        &self,
        status: StatusUpdate,
        _msg: &IncomingMessage,
    ) -> Result<(), ChannelError> {
        match status {
            StatusUpdate::Typing => eprintln!("⏳ ..."),
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_channel_name() {
        assert_eq!(CliChannel::new().name(), "cli");
    }

    #[tokio::test]
    async fn cli_status_and_health_never_fail() {
        let ch = CliChannel::new();
        let msg = IncomingMessage::new("cli", CLI_USER_ID, "hi");
        assert!(ch.send_status(StatusUpdate::Typing, &msg).await.is_ok());
        assert!(ch.health_check().await.is_ok());
    }
}

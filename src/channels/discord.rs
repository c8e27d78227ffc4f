//! Discord channel: gateway WebSocket for inbound messages, REST for replies.
//!
//! Speaks gateway v10 with JSON encoding: HELLO, a jittered heartbeat loop,
//! IDENTIFY, then MESSAGE_CREATE dispatches. Session resume is not
//! implemented; any disconnect reconnects with a fresh IDENTIFY.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse, StatusUpdate};
use crate::error::ChannelError;

/// REST API base.
pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Gateway endpoint.
pub const DISCORD_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// Maximum message length for Discord's create-message API.
const DISCORD_MAX_MESSAGE_LENGTH: usize = 2000;

/// Pause before reconnecting after the gateway drops.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Gateway intents the bot subscribes to.
pub mod intents {
    pub const GUILDS: u64 = 1 << 0;
    pub const GUILD_MESSAGES: u64 = 1 << 9;
    pub const MESSAGE_CONTENT: u64 = 1 << 15;

    pub const DEFAULT: u64 = GUILDS | GUILD_MESSAGES | MESSAGE_CONTENT;
}

mod opcode {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const RECONNECT: u8 = 7;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

/// Discord bot channel.
pub struct DiscordChannel {
    token: SecretString,
    api_base: String,
    gateway_url: String,
    client: reqwest::Client,
}

impl DiscordChannel {
    pub fn new(token: SecretString) -> Self {
        Self {
            token,
            api_base: DISCORD_API_BASE.to_string(),
            gateway_url: DISCORD_GATEWAY_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Point REST and gateway traffic somewhere else (tests, proxies).
    pub fn with_endpoints(mut self, api_base: &str, gateway_url: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self.gateway_url = gateway_url.to_string();
        self
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.token.expose_secret())
    }

    /// Post `text` to a channel, split to fit Discord's length limit. Only the
    /// first chunk carries the reply reference.
    async fn send_message(
        &self,
        channel_id: &str,
        reply_to: Option<&str>,
        text: &str,
    ) -> Result<(), ChannelError> {
        let chunks = split_message(text, DISCORD_MAX_MESSAGE_LENGTH);

        for (i, chunk) in chunks.iter().enumerate() {
            let reference = if i == 0 { reply_to } else { None };
            let body = message_body(chunk, reference);

            let resp = self
                .client
                .post(self.api_url(&format!("channels/{channel_id}/messages")))
                .header(reqwest::header::AUTHORIZATION, self.auth_header())
                .json(&body)
                .send()
                .await
                .map_err(|e| ChannelError::SendFailed {
                    name: "discord".into(),
                    reason: e.to_string(),
                })?;

            let status = resp.status();
            if status == reqwest::StatusCode::UNAUTHORIZED {
                return Err(ChannelError::AuthFailed {
                    name: "discord".into(),
                    reason: "create message returned 401".into(),
                });
            }
            if !status.is_success() {
                let err = resp.text().await.unwrap_or_default();
                return Err(ChannelError::SendFailed {
                    name: "discord".into(),
                    reason: format!("create message failed ({status}): {err}"),
                });
            }
        }

        Ok(())
    }

    async fn trigger_typing(&self, channel_id: &str) -> Result<(), ChannelError> {
        let resp = self
            .client
            .post(self.api_url(&format!("channels/{channel_id}/typing")))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .header(reqwest::header::CONTENT_LENGTH, "0")
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "discord".into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(ChannelError::SendFailed {
                name: "discord".into(),
                reason: format!("typing returned {}", resp.status()),
            });
        }
        Ok(())
    }
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let token = self.token.clone();
        let gateway_url = self.gateway_url.clone();

        tokio::spawn(async move {
            tracing::info!("Discord channel connecting to gateway...");

            loop {
                match run_session(&token, &gateway_url, &tx).await {
                    Ok(SessionEnd::ListenerClosed) => {
                        tracing::info!("Discord listener channel closed");
                        return;
                    }
                    Ok(SessionEnd::Reconnect) => {
                        tracing::info!("Discord gateway asked to reconnect");
                    }
                    Err(e) => {
                        tracing::warn!("Discord gateway error: {e:#}");
                    }
                }
                if tx.is_closed() {
                    return;
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        let reply_to = msg.metadata.get("message_id").and_then(|v| v.as_str());
        self.send_message(&msg.channel_id, reply_to, &response.content)
            .await
    }

    async fn send_status(
        &self,
        status: StatusUpdate,
        msg: &IncomingMessage,
    ) -> Result<(), ChannelError> {
        match status {
            StatusUpdate::Typing => self.trigger_typing(&msg.channel_id).await,
        }
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("users/@me"))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "discord".into(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else if status == reqwest::StatusCode::UNAUTHORIZED {
            Err(ChannelError::AuthFailed {
                name: "discord".into(),
                reason: "bot token rejected".into(),
            })
        } else {
            Err(ChannelError::StartupFailed {
                name: "discord".into(),
                reason: format!("users/@me returned {status}"),
            })
        }
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Discord channel shutting down");
        Ok(())
    }
}

// ── Gateway ─────────────────────────────────────────────────────────

/// A raw gateway frame.
#[derive(Debug, Deserialize)]
struct GatewayPayload {
    op: u8,
    #[serde(default)]
    d: serde_json::Value,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    t: Option<String>,
}

/// Why a gateway session ended without an error.
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    /// Nobody is consuming messages any more; stop for good.
    ListenerClosed,
    /// Server asked for a reconnect, or the socket closed.
    Reconnect,
}

/// One gateway connection, from HELLO until it drops.
async fn run_session(
    token: &SecretString,
    gateway_url: &str,
    tx: &UnboundedSender<IncomingMessage>,
) -> anyhow::Result<SessionEnd> {
    let (ws, _) = tokio_tungstenite::connect_async(gateway_url)
        .await
        .context("gateway connect failed")?;
    let (mut sink, mut stream) = ws.split();

    let hello = loop {
        let frame = stream
            .next()
            .await
            .context("gateway closed before HELLO")??;
        if let Message::Text(text) = frame {
            break serde_json::from_str::<GatewayPayload>(text.as_str())?;
        }
    };
    if hello.op != opcode::HELLO {
        anyhow::bail!("expected HELLO, got opcode {}", hello.op);
    }
    let period = hello
        .d
        .get("heartbeat_interval")
        .and_then(serde_json::Value::as_u64)
        .filter(|&ms| ms > 0)
        .map(Duration::from_millis)
        .context("HELLO without heartbeat_interval")?;

    // First beat lands at a random point within the interval.
    let jitter = period.mul_f64(rand::random::<f64>());
    let mut heartbeat = tokio::time::interval_at(Instant::now() + jitter, period);

    sink.send(Message::Text(identify_payload(token).to_string().into()))
        .await?;

    let mut last_seq: Option<u64> = None;
    let mut awaiting_ack = false;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if awaiting_ack {
                    tracing::warn!("Discord heartbeat not acknowledged, reconnecting");
                    return Ok(SessionEnd::Reconnect);
                }
                sink.send(Message::Text(heartbeat_payload(last_seq).to_string().into())).await?;
                awaiting_ack = true;
            }
            frame = stream.next() => {
                let Some(frame) = frame else {
                    return Ok(SessionEnd::Reconnect);
                };
                let payload = match frame? {
                    Message::Text(text) => serde_json::from_str::<GatewayPayload>(text.as_str())?,
                    Message::Close(close) => {
                        tracing::info!(?close, "Discord gateway closed the connection");
                        return Ok(SessionEnd::Reconnect);
                    }
                    _ => continue,
                };

                if let Some(seq) = payload.s {
                    last_seq = Some(seq);
                }

                match payload.op {
                    opcode::DISPATCH => {
                        if let Some(msg) = handle_dispatch(&payload) {
                            if tx.send(msg).is_err() {
                                return Ok(SessionEnd::ListenerClosed);
                            }
                        }
                    }
                    opcode::HEARTBEAT => {
                        sink.send(Message::Text(heartbeat_payload(last_seq).to_string().into())).await?;
                    }
                    opcode::HEARTBEAT_ACK => awaiting_ack = false,
                    opcode::RECONNECT | opcode::INVALID_SESSION => {
                        return Ok(SessionEnd::Reconnect);
                    }
                    other => tracing::debug!(op = other, "Ignoring gateway opcode"),
                }
            }
        }
    }
}

fn identify_payload(token: &SecretString) -> serde_json::Value {
    serde_json::json!({
        "op": opcode::IDENTIFY,
        "d": {
            "token": token.expose_secret(),
            "intents": intents::DEFAULT,
            "properties": {
                "os": std::env::consts::OS,
                "browser": env!("CARGO_PKG_NAME"),
                "device": env!("CARGO_PKG_NAME"),
            }
        }
    })
}

fn heartbeat_payload(last_seq: Option<u64>) -> serde_json::Value {
    serde_json::json!({ "op": opcode::HEARTBEAT, "d": last_seq })
}

/// Handle a dispatch event; returns a message for MESSAGE_CREATE.
fn handle_dispatch(payload: &GatewayPayload) -> Option<IncomingMessage> {
    match payload.t.as_deref() {
        Some("READY") => {
            log_ready(&payload.d);
            None
        }
        Some("MESSAGE_CREATE") => parse_message_create(&payload.d),
        _ => None,
    }
}

fn log_ready(d: &serde_json::Value) {
    let user = d.get("user");
    let username = user
        .and_then(|u| u.get("username"))
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
    let bot_id = user
        .and_then(|u| u.get("id"))
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
    let guilds = d
        .get("guilds")
        .and_then(|g| g.as_array())
        .map_or(0, Vec::len);

    tracing::info!(
        username,
        bot_id,
        guilds,
        "Discord bot is online"
    );
}

#[derive(Debug, Deserialize)]
struct MessageCreate {
    id: String,
    channel_id: String,
    #[serde(default)]
    content: String,
    author: Author,
    #[serde(default)]
    webhook_id: Option<String>,
    #[serde(default)]
    guild_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Author {
    id: String,
    username: String,
    #[serde(default)]
    global_name: Option<String>,
    #[serde(default)]
    bot: bool,
}

/// Map a MESSAGE_CREATE payload to an `IncomingMessage`.
fn parse_message_create(d: &serde_json::Value) -> Option<IncomingMessage> {
    let event: MessageCreate = match serde_json::from_value(d.clone()) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!("Discord: unparseable MESSAGE_CREATE: {e}");
            return None;
        }
    };

    let display_name = event
        .author
        .global_name
        .as_deref()
        .unwrap_or(&event.author.username);

    Some(
        IncomingMessage::new("discord", &event.author.id, &event.content)
            .with_channel_id(event.channel_id.clone())
            .with_user_name(display_name)
            .with_bot(event.author.bot || event.webhook_id.is_some())
            .with_metadata(serde_json::json!({
                "message_id": event.id,
                "guild_id": event.guild_id,
                "username": event.author.username,
            })),
    )
}

// ── Helpers ─────────────────────────────────────────────────────────

fn message_body(text: &str, reply_to: Option<&str>) -> serde_json::Value {
    let mut body = serde_json::json!({ "content": text });
    if let Some(message_id) = reply_to {
        body["message_reference"] = serde_json::json!({
            "message_id": message_id,
            "fail_if_not_exists": false,
        });
    }
    body
}

/// Split a message into chunks of at most `max_chars` characters.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        // Byte offset of the first char past the limit, if any.
        let Some((limit, _)) = remaining.char_indices().nth(max_chars) else {
            chunks.push(remaining.to_string());
            break;
        };

        let window = &remaining[..limit];
        let split_at = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&i| i > 0)
            .unwrap_or(limit);

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────

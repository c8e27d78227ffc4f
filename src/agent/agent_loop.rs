//! Main agent loop: the conversation orchestrator.
//!
//! For every inbound message, in order, stopping at the first branch that
//! applies:
//!
//! 1. drop messages from bots and from other channels
//! 2. show a typing indicator (best-effort)
//! 3. onboarding: greet unknown users, capture the name of pending ones
//! 4. canned replies for identity / name questions
//! 5. rate-limited LLM generation
//!
//! Any failure in 2–5 becomes a generic apology; nothing a single message
//! does can take the loop down.

use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinSet;

use crate::channels::{Channel, IncomingMessage, OutgoingResponse, StatusUpdate};
use crate::config::AgentConfig;
use crate::error::Error;
use crate::intent::{Intent, IntentClassifier};
use crate::llm::{CompletionRequest, LlmProvider};
use crate::onboarding::prompts;
use crate::onboarding::{OnboardingManager, OnboardingStep};
use crate::rate_limit::RateLimiter;

/// Core dependencies for the agent.
pub struct AgentDeps {
    pub onboarding: Arc<OnboardingManager>,
    pub classifier: Arc<IntentClassifier>,
    pub limiter: Arc<RateLimiter>,
    pub llm: Arc<dyn LlmProvider>,
}

/// The orchestrator: one channel in, replies out.
pub struct Agent {
    pub(crate) config: AgentConfig,
    pub(crate) deps: AgentDeps,
    pub(crate) channel: Arc<dyn Channel>,
}

impl Agent {
    /// Create a new agent.
    pub fn new(config: AgentConfig, deps: AgentDeps, channel: Arc<dyn Channel>) -> Self {
        Self {
            config,
            deps,
            channel,
        }
    }

    // ── Main loop ───────────────────────────────────────────────────

    /// Run until Ctrl+C or until the channel's stream ends.
    ///
    /// Each message is handled on its own task, so a slow LLM call only
    /// delays the reply to that message.
    pub async fn run(self) -> Result<(), Error> {
        let agent = Arc::new(self);
        let mut message_stream = agent.channel.start().await?;
        let mut tasks = JoinSet::new();

        tracing::info!(
            channel = agent.channel.name(),
            channel_id = %agent.config.channel_id,
            "Agent {} ready and listening",
            agent.config.name
        );

        let interrupted = loop {
            let message = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl+C received, shutting down...");
                    break true;
                }
                msg = message_stream.next() => {
                    match msg {
                        Some(m) => m,
                        None => {
                            tracing::info!("Channel stream ended, shutting down...");
                            break false;
                        }
                    }
                }
            };

            let agent = Arc::clone(&agent);
            tasks.spawn(async move { agent.process(message).await });

            // Reap finished handlers.
            while let Some(result) = tasks.try_join_next() {
                if let Err(e) = result {
                    tracing::error!("Message handler task failed: {}", e);
                }
            }
        };

        if interrupted {
            tasks.shutdown().await;
        } else {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    tracing::error!("Message handler task failed: {}", e);
                }
            }
        }

        if let Err(e) = agent.channel.shutdown().await {
            tracing::warn!("Channel shutdown failed: {}", e);
        }
        Ok(())
    }

    /// Handle one message and deliver the reply, if any.
    pub async fn process(&self, message: IncomingMessage) {
        let Some(reply) = self.handle_message(&message).await else {
            return;
        };
        if let Err(e) = self
            .channel
            .respond(&message, OutgoingResponse::text(reply))
            .await
        {
            tracing::error!(user_id = %message.user_id, "Failed to deliver reply: {}", e);
        }
    }

    /// Whether a message is for this bot at all.
    pub fn accepts(&self, message: &IncomingMessage) -> bool {
        !message.is_bot && message.channel_id == self.config.channel_id
    }

    /// Compute the reply to a message. `None` means the message is ignored.
    pub async fn handle_message(&self, message: &IncomingMessage) -> Option<String> {
        if !self.accepts(message) {
            tracing::trace!(
                user_id = %message.user_id,
                channel_id = %message.channel_id,
                is_bot = message.is_bot,
                "Ignoring message"
            );
            return None;
        }

        match self.converse(message).await {
            Ok(reply) => Some(reply),
            Err(e) => {
                tracing::error!(user_id = %message.user_id, "Error handling message: {}", e);
                Some(prompts::GENERIC_APOLOGY.to_string())
            }
        }
    }

    async fn converse(&self, message: &IncomingMessage) -> Result<String, Error> {
        if let Err(e) = self
            .channel
            .send_status(StatusUpdate::Typing, message)
            .await
        {
            tracing::debug!("Typing indicator failed: {}", e);
        }

        let profile = match self
            .deps
            .onboarding
            .step(&message.user_id, &message.content)
            .await?
        {
            OnboardingStep::Greeted => return Ok(prompts::WELCOME.to_string()),
            OnboardingStep::Registered(profile) => {
                return Ok(prompts::registration_complete(&profile.name));
            }
            OnboardingStep::Ready(profile) => profile,
        };

        match self.deps.classifier.classify(&message.content) {
            Intent::Identity => return Ok(prompts::identity_reply(&profile)),
            Intent::Name => return Ok(prompts::name_reply(&profile)),
            Intent::None => {}
        }

        if !self.deps.limiter.try_acquire() {
            tracing::info!(user_id = %message.user_id, "LLM rate limit reached");
            return Ok(prompts::RATE_LIMITED.to_string());
        }

        let prompt = prompts::generation_prompt(&profile, &message.content);
        let response = self
            .deps
            .llm
            .complete(CompletionRequest::new(prompt))
            .await?;

        tracing::debug!(
            user_id = %message.user_id,
            model = self.deps.llm.model_name(),
            finish_reason = ?response.finish_reason,
            remaining = self.deps.limiter.remaining(),
            "Generated reply"
        );

        if response.content.trim().is_empty() {
            Ok(prompts::EMPTY_GENERATION.to_string())
        } else {
            Ok(response.content)
        }
    }
}

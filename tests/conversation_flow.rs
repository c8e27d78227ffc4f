//! End-to-end conversation tests.
//!
//! Drives the agent through the public API with a stub LLM, a recording
//! channel and a manual clock, covering onboarding, canned replies and the
//! global rate window.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeDelta, TimeZone, Utc};
use tempfile::TempDir;

use kharaba_bot::agent::{Agent, AgentDeps};
use kharaba_bot::channels::{
    Channel, IncomingMessage, MessageStream, OutgoingResponse, StatusUpdate,
};
use kharaba_bot::clock::{Clock, ManualClock};
use kharaba_bot::config::AgentConfig;
use kharaba_bot::error::{ChannelError, LlmError};
use kharaba_bot::intent::IntentClassifier;
use kharaba_bot::llm::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider};
use kharaba_bot::onboarding::OnboardingManager;
use kharaba_bot::onboarding::prompts;
use kharaba_bot::rate_limit::RateLimiter;
use kharaba_bot::store::{UserStore, format_registration_date};

const CHANNEL_ID: &str = "1234";

/// Stub LLM provider (no real API calls).
struct StubLlm {
    calls: AtomicUsize,
}

#[async_trait]
impl LlmProvider for StubLlm {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CompletionResponse {
            content: format!("answer #{n} ({} chars)", request.prompt.chars().count()),
            finish_reason: FinishReason::Stop,
        })
    }
}

/// Channel that replays a fixed script and records replies.
struct ScriptedChannel {
    script: Mutex<Vec<IncomingMessage>>,
    replies: Mutex<Vec<(String, String)>>,
}

impl ScriptedChannel {
    fn new(script: Vec<IncomingMessage>) -> Self {
        Self {
            script: Mutex::new(script),
            replies: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Channel for ScriptedChannel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let script = std::mem::take(&mut *self.script.lock().unwrap());
        Ok(Box::pin(futures::stream::iter(script)))
    }

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        self.replies
            .lock()
            .unwrap()
            .push((msg.user_id.clone(), response.content));
        Ok(())
    }

    async fn send_status(
        &self,
        _status: StatusUpdate,
        _msg: &IncomingMessage,
    ) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

struct World {
    agent: Agent,
    llm: Arc<StubLlm>,
    clock: Arc<ManualClock>,
    store: Arc<UserStore>,
    _dir: TempDir,
}

async fn world(channel: Arc<ScriptedChannel>) -> World {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 1, 15, 20, 0, 0).unwrap(),
    ));
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let store = Arc::new(UserStore::load(dir.path().join("users.json"), dyn_clock.clone()).await);
    let llm = Arc::new(StubLlm {
        calls: AtomicUsize::new(0),
    });

    let deps = AgentDeps {
        onboarding: Arc::new(OnboardingManager::new(Arc::clone(&store))),
        classifier: Arc::new(IntentClassifier::default_rules()),
        limiter: Arc::new(RateLimiter::new(
            dyn_clock,
            std::time::Duration::from_secs(60),
            2,
        )),
        llm: llm.clone(),
    };
    let config = AgentConfig {
        channel_id: CHANNEL_ID.into(),
        ..AgentConfig::default()
    };

    World {
        agent: Agent::new(config, deps, channel),
        llm,
        clock,
        store,
        _dir: dir,
    }
}

fn message(user: &str, text: &str) -> IncomingMessage {
    IncomingMessage::new("scripted", user, text).with_channel_id(CHANNEL_ID)
}

#[tokio::test]
async fn full_conversation_scenario() {
    let w = world(Arc::new(ScriptedChannel::new(vec![]))).await;
    let say = |text: &str| message("sam-id", text);

    // Unknown user: welcome, no profile, no LLM.
    let reply = w.agent.handle_message(&say("hello")).await.unwrap();
    assert_eq!(reply, prompts::WELCOME);
    assert!(w.store.get("sam-id").await.is_none());

    // Name capture.
    let reply = w.agent.handle_message(&say("Sam")).await.unwrap();
    assert!(reply.contains("Sam"));
    let profile = w.store.get("sam-id").await.unwrap();
    assert_eq!(profile.id, "sam-id");
    assert_eq!(profile.name, "Sam");
    assert_eq!(profile.registration_date, format_registration_date(w.clock.now()));

    // Identity question: canned reply with name and date.
    let reply = w.agent.handle_message(&say("من أنت")).await.unwrap();
    assert!(reply.contains("Sam"));
    assert!(reply.contains(&profile.registration_date));
    assert_eq!(w.llm.calls.load(Ordering::SeqCst), 0);

    // Two free-form questions go to the LLM.
    let first = w.agent.handle_message(&say("what is Rust?")).await.unwrap();
    w.clock.advance(TimeDelta::seconds(20));
    let second = w.agent.handle_message(&say("and Tokio?")).await.unwrap();
    assert!(first.starts_with("answer #1"));
    assert!(second.starts_with("answer #2"));

    // Third within the same minute is refused without calling the LLM.
    w.clock.advance(TimeDelta::seconds(20));
    let third = w.agent.handle_message(&say("and serde?")).await.unwrap();
    assert_eq!(third, prompts::RATE_LIMITED);
    assert_eq!(w.llm.calls.load(Ordering::SeqCst), 2);

    // A new window opens a minute after the first request.
    w.clock.advance(TimeDelta::seconds(20));
    let fourth = w.agent.handle_message(&say("and axum?")).await.unwrap();
    assert!(fourth.starts_with("answer #3"));
}

#[tokio::test]
async fn profile_survives_restart_but_pending_does_not() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("users.json");
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));

    {
        let store = Arc::new(UserStore::load(&path, clock.clone()).await);
        let onboarding = OnboardingManager::new(store);
        onboarding.step("a", "hi").await.unwrap();
        onboarding.step("a", "Alice").await.unwrap();
        onboarding.step("b", "hi").await.unwrap();
    }

    let store = UserStore::load(&path, clock).await;
    assert_eq!(store.get("a").await.unwrap().name, "Alice");
    assert!(store.get("b").await.is_none());
}

#[tokio::test]
async fn run_loop_answers_each_human_in_channel() {
    let channel = Arc::new(ScriptedChannel::new(vec![
        message("u1", "hello"),
        message("u2", "hey").with_bot(true),
        message("u3", "hi").with_channel_id("elsewhere"),
        message("u4", "salam"),
    ]));
    let w = world(Arc::clone(&channel)).await;

    w.agent.run().await.unwrap();

    let mut replies = channel.replies.lock().unwrap().clone();
    replies.sort();
    assert_eq!(
        replies,
        vec![
            ("u1".to_string(), prompts::WELCOME.to_string()),
            ("u4".to_string(), prompts::WELCOME.to_string()),
        ]
    );
}

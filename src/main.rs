use std::sync::Arc;

use kharaba_bot::agent::{Agent, AgentDeps};
use kharaba_bot::channels::{Channel, CliChannel, DiscordChannel};
use kharaba_bot::clock::{Clock, SystemClock};
use kharaba_bot::config::{BotConfig, ChannelKind};
use kharaba_bot::intent::IntentClassifier;
use kharaba_bot::llm::create_provider;
use kharaba_bot::onboarding::OnboardingManager;
use kharaba_bot::rate_limit::RateLimiter;
use kharaba_bot::store::UserStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = BotConfig::load().unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        eprintln!("  export GEMINI_API_KEY=...");
        eprintln!("  export DISCORD_BOT_TOKEN=... DISCORD_CHANNEL_ID=...");
        std::process::exit(1);
    });

    eprintln!("🤖 Kharaba v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.llm.model);
    eprintln!(
        "   Rate limit: {} requests / {}s",
        config.rate_limit.max_requests,
        config.rate_limit.window.as_secs()
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // ── User store ───────────────────────────────────────────────────────
    let store = Arc::new(UserStore::load(config.users_path.clone(), Arc::clone(&clock)).await);
    eprintln!(
        "   Users: {} ({} registered)",
        store.path().display(),
        store.len().await
    );

    // ── Channel ──────────────────────────────────────────────────────────
    let channel: Arc<dyn Channel> = match &config.channel {
        ChannelKind::Discord { token } => {
            let discord = DiscordChannel::new(token.clone());
            if let Err(e) = discord.health_check().await {
                eprintln!("Error: Discord health check failed: {}", e);
                std::process::exit(1);
            }
            eprintln!("   Channel: discord (#{})", config.agent.channel_id);
            Arc::new(discord)
        }
        ChannelKind::Cli => {
            eprintln!("   Channel: cli. Type a message and press Enter.\n");
            Arc::new(CliChannel::new())
        }
    };

    // ── Agent ───────────────────────────────────────────────────────────
    let deps = AgentDeps {
        onboarding: Arc::new(OnboardingManager::new(store)),
        classifier: Arc::new(IntentClassifier::default_rules()),
        limiter: Arc::new(RateLimiter::new(
            clock,
            config.rate_limit.window,
            config.rate_limit.max_requests,
        )),
        llm: create_provider(&config.llm),
    };

    let agent = Agent::new(config.agent, deps, channel);
    agent.run().await?;

    Ok(())
}

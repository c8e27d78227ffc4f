//! Kharaba: a Discord assistant backed by Gemini, with per-user onboarding
//! and a global rate guard on LLM calls.

pub mod agent;
pub mod channels;
pub mod clock;
pub mod config;
pub mod error;
pub mod intent;
pub mod llm;
pub mod onboarding;
pub mod rate_limit;
pub mod store;

//! Onboarding: the two-step greet/capture-name flow.
//!
//! A user with no profile is greeted on their first message; their next
//! message is taken as their display name and registers them. Only then do
//! their messages reach intent matching and the LLM.

pub mod manager;
pub mod prompts;
pub mod state;

pub use manager::{OnboardingManager, OnboardingStep};
pub use state::OnboardingPhase;

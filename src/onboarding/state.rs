//! Onboarding state machine: where a user is in the greet/name exchange.

/// Per-user onboarding phase.
///
/// Progresses linearly: Unknown → AwaitingName → Registered. `Registered` is
/// never stored; it is derived from the user having a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnboardingPhase {
    Unknown,
    AwaitingName,
    Registered,
}

impl std::fmt::Display for OnboardingPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::AwaitingName => "awaiting_name",
            Self::Registered => "registered",
        };
        write!(f, "{s}")
    }
}

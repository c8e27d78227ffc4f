//! OnboardingManager: drives the greet/capture-name exchange for users who
//! have no profile yet.
//!
//! The "awaiting name" marker lives in memory only. A restart while a user is
//! mid-onboarding means they get greeted again. There is no timeout: a user
//! who never answers stays pending for the life of the process.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::error::StoreError;
use crate::store::{UserProfile, UserStore};

use super::state::OnboardingPhase;

/// Outcome of feeding one message through onboarding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnboardingStep {
    /// First contact: the user was greeted and is now awaiting their name.
    Greeted,
    /// The message supplied the user's name and registration completed.
    Registered(UserProfile),
    /// The user was already registered; the message is a normal turn.
    Ready(UserProfile),
}

/// Coordinates pending markers, per-user locking, and registration.
pub struct OnboardingManager {
    store: Arc<UserStore>,
    pending: Mutex<HashSet<String>>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl OnboardingManager {
    pub fn new(store: Arc<UserStore>) -> Self {
        Self {
            store,
            pending: Mutex::new(HashSet::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<UserStore> {
        &self.store
    }

    /// Current phase for a user.
    pub async fn phase(&self, user_id: &str) -> OnboardingPhase {
        if self.store.get(user_id).await.is_some() {
            OnboardingPhase::Registered
        } else if self.is_pending(user_id) {
            OnboardingPhase::AwaitingName
        } else {
            OnboardingPhase::Unknown
        }
    }

    /// Whether the user has been greeted and we are waiting for their name.
    pub fn is_pending(&self, user_id: &str) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(user_id)
    }

    /// Advance onboarding for `user_id` with the raw message `text`.
    ///
    /// Registered users short-circuit to [`OnboardingStep::Ready`] without
    /// taking the per-user lock. Everyone else is serialized per user, so two
    /// near-simultaneous messages from a new user cannot both register.
    pub async fn step(&self, user_id: &str, text: &str) -> Result<OnboardingStep, StoreError> {
        if let Some(profile) = self.store.get(user_id).await {
            return Ok(OnboardingStep::Ready(profile));
        }

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        // Re-check under the lock: a concurrent message may have registered.
        if let Some(profile) = self.store.get(user_id).await {
            return Ok(OnboardingStep::Ready(profile));
        }

        if !self.is_pending(user_id) {
            self.pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(user_id.to_string());
            tracing::info!(user_id, phase = %OnboardingPhase::AwaitingName, "Greeting new user");
            return Ok(OnboardingStep::Greeted);
        }

        let name = text.trim();
        // The in-memory profile outlives a failed write, so the user leaves
        // onboarding either way.
        let registered = self.store.register(user_id, name).await;
        self.forget(user_id);
        let profile = registered?;

        tracing::info!(user_id, phase = %OnboardingPhase::Registered, "Onboarding complete");
        Ok(OnboardingStep::Registered(profile))
    }

    fn forget(&self, user_id: &str) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(user_id);
        self.locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(user_id);
    }

    fn user_lock(&self, user_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(user_id.to_string()).or_default())
    }
}

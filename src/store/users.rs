//! JSON-file user store.
//!
//! The whole database lives in memory and is rewritten to disk in full on
//! every registration. Registrations are rare next to ordinary chat traffic,
//! so there is no append log.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;

use crate::clock::Clock;
use crate::error::StoreError;

/// A registered user. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    #[serde(rename = "registrationDate")]
    pub registration_date: String,
}

/// On-disk layout: `{ "users": { "<id>": { ... } } }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsersDatabase {
    #[serde(default)]
    pub users: HashMap<String, UserProfile>,
}

/// Render a registration instant the way it is stored and shown to users.
pub fn format_registration_date(at: DateTime<Utc>) -> String {
    at.format("%d/%m/%Y").to_string()
}

/// File-backed map from user id to profile.
pub struct UserStore {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    db: RwLock<UsersDatabase>,
}

impl UserStore {
    /// Load the store from `path`.
    ///
    /// A missing or unreadable file yields an empty store; it is created on
    /// the first registration.
    pub async fn load(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        let path = path.into();
        let db = match fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str::<UsersDatabase>(&raw) {
                Ok(db) => {
                    tracing::info!(
                        path = %path.display(),
                        users = db.users.len(),
                        "Loaded user database"
                    );
                    db
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "User database is malformed, starting empty"
                    );
                    UsersDatabase::default()
                }
            },
            Err(e) => {
                tracing::info!(
                    path = %path.display(),
                    error = %e,
                    "No existing user database found, creating a new one"
                );
                UsersDatabase::default()
            }
        };

        Self {
            path,
            clock,
            db: RwLock::new(db),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up a user's profile.
    pub async fn get(&self, user_id: &str) -> Option<UserProfile> {
        self.db.read().await.users.get(user_id).cloned()
    }

    /// Number of registered users.
    pub async fn len(&self) -> usize {
        self.db.read().await.users.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.db.read().await.users.is_empty()
    }

    /// Create a profile for `user_id` dated today and persist the store.
    ///
    /// The profile stays in memory even if the write fails.
    pub async fn register(&self, user_id: &str, name: &str) -> Result<UserProfile, StoreError> {
        let mut db = self.db.write().await;
        if db.users.contains_key(user_id) {
            return Err(StoreError::AlreadyRegistered {
                user_id: user_id.to_string(),
            });
        }

        let profile = UserProfile {
            id: user_id.to_string(),
            name: name.to_string(),
            registration_date: format_registration_date(self.clock.now()),
        };
        db.users.insert(user_id.to_string(), profile.clone());

        // Write lock is held across the write so full-file overwrites land in
        // registration order.
        self.persist(&db).await?;

        tracing::info!(user_id, name, "Registered new user");
        Ok(profile)
    }

    async fn persist(&self, db: &UsersDatabase) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(db)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        fs::write(&self.path, json).await?;
        Ok(())
    }
}

//! Session provisioning types and the session-user table
//!
//! The HTTP provisioning step and the WebSocket bind step are separate
//! requests; the session-user table bridges them. Entries expire after ten
//! minutes, and an absent entry simply means the session runs as an
//! anonymous user.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::registry::User;

/// How long a provisioned session may wait for its WebSocket bind
const SESSION_TTL: Duration = Duration::from_secs(600);

/// Sweep interval for expired entries
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// The payload returned by terminal provisioning and echoed back in the
/// WebSocket bind frame
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalResult {
    /// Session identifier minted at provisioning time
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub session_id: String,
    /// One-time token binding the session to its pod
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,
    /// Target cluster name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster: String,
    /// Target namespace
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Target pod
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pod: String,
    /// Target container
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub container: String,
    /// Shell requested by the client, if any
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cmd: String,
}

/// Generate a 16-byte random session id, hex-encoded
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

struct SessionEntry {
    user: User,
    expires_at: Instant,
}

/// Short-lived map from session id to the authenticated user
#[derive(Default)]
pub struct SessionTable {
    entries: DashMap<String, SessionEntry>,
}

impl SessionTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a session id to its user for the session TTL
    pub fn insert(&self, session_id: &str, user: User) {
        self.entries.insert(
            session_id.to_string(),
            SessionEntry {
                user,
                expires_at: Instant::now() + SESSION_TTL,
            },
        );
    }

    /// Look up the user for a session id
    ///
    /// Expired entries are dropped on access; absence means the session
    /// cannot be linked to a user.
    pub fn lookup(&self, session_id: &str) -> Option<User> {
        let entry = self.entries.get(session_id)?;
        if Instant::now() >= entry.expires_at {
            drop(entry);
            self.entries.remove(session_id);
            return None;
        }
        Some(entry.user.clone())
    }

    /// Remove expired entries
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, e| now < e.expires_at);
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Spawn the periodic sweeper
    pub fn spawn_sweeper(self: std::sync::Arc<Self>, shutdown: CancellationToken) {
        let table = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = ticker.tick() => {
                        table.cleanup_expired();
                        debug!(live = table.len(), "session table swept");
                    }
                }
            }
        });
    }
}

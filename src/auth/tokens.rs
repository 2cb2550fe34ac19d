//! In-memory session tokens with sliding expiry.
//!
//! Each entry keeps its expiry as milliseconds since the store was created.
//! Validation refreshes that value with a compare-and-swap while holding the
//! shared guard, so concurrent validations never block one another and never
//! lose a refresh. Issue, revoke and sweep take the exclusive guard.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use parking_lot::RwLock;
use rand::rngs::OsRng;
use rand::RngCore;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::error::Error;

pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

const TOKEN_BYTES: usize = 32;

struct TokenEntry {
    user_id: i64,
    expires_at: AtomicU64,
}

#[derive(Clone)]
pub struct TokenStore {
    tokens: Arc<RwLock<HashMap<String, TokenEntry>>>,
    epoch: Instant,
    ttl: Duration,
}

impl TokenStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            tokens: Arc::new(RwLock::new(HashMap::new())),
            epoch: Instant::now(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Creates a fresh random token for `user_id`.
    pub fn issue(&self, user_id: i64) -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let token = hex::encode(bytes);

        let entry = TokenEntry {
            user_id,
            expires_at: AtomicU64::new(self.now_ms() + self.ttl_ms()),
        };
        self.tokens.write().insert(token.clone(), entry);
        debug!("Issued session token for user {}", user_id);
        token
    }

    /// Resolves `token` to its user and pushes its expiry forward.
    pub fn validate(&self, token: &str) -> Result<i64, Error> {
        let tokens = self.tokens.read();
        // Sampled under the guard so a wait behind a writer cannot leave it stale.
        let now = self.now_ms();
        let refreshed = now + self.ttl_ms();
        let entry = tokens.get(token).ok_or(Error::InvalidToken)?;
        entry
            .expires_at
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |expires_at| {
                if now > expires_at {
                    None
                } else {
                    Some(expires_at.max(refreshed))
                }
            })
            .map_err(|_| Error::InvalidToken)?;
        Ok(entry.user_id)
    }

    /// Removes `token`; a token that is not present is ignored.
    pub fn revoke(&self, token: &str) {
        if self.tokens.write().remove(token).is_some() {
            debug!("Revoked session token");
        }
    }

    /// Removes every token belonging to `user_id` and returns how many there were.
    pub fn revoke_user(&self, user_id: i64) -> usize {
        let mut tokens = self.tokens.write();
        let before = tokens.len();
        tokens.retain(|_, entry| entry.user_id != user_id);
        let removed = before - tokens.len();
        if removed > 0 {
            debug!("Revoked {} session tokens of user {}", removed, user_id);
        }
        removed
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.now_ms();
        let mut tokens = self.tokens.write();
        let before = tokens.len();
        tokens.retain(|_, entry| entry.expires_at.load(Ordering::Acquire) >= now);
        before - tokens.len()
    }

    pub fn len(&self) -> usize {
        self.tokens.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Starts the periodic sweep on the current tokio runtime.
    ///
    /// The task lives as long as the returned [`Sweeper`].
    pub fn spawn_sweeper(&self, every: Duration) -> Sweeper {
        let store = self.clone();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        let removed = store.sweep();
                        if removed > 0 {
                            debug!("Swept {} expired session tokens", removed);
                        }
                    }
                }
            }
            info!("Session sweeper stopped");
        });

        info!("Session sweeper started with {}s interval", every.as_secs());
        Sweeper {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    fn now_ms(&self) -> u64 {
        Instant::now().duration_since(self.epoch).as_millis() as u64
    }

    fn ttl_ms(&self) -> u64 {
        self.ttl.as_millis() as u64
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

/// Owner of the background sweep task. Dropping it aborts the task.
pub struct Sweeper {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    /// Signals the task to stop and waits for it to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

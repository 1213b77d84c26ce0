//! Replay protection for webhook deliveries.
//!
//! Every delivery carries a random `token`. A token that already produced a
//! successful verification is a redelivery and must not be persisted again.
//!
//! The cache sits behind the `SeenTokenStore` trait so a shared backend can
//! replace the in-process map when the service runs on several instances.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::tickets::StoreError;

/// Result of claiming a delivery token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// First sighting; the caller now owns the delivery.
    Fresh,
    /// Seen before. `ticket_id` is set once the first delivery was persisted.
    Replay { ticket_id: Option<u64> },
}

/// Concurrent-safe record of delivery tokens already accepted.
#[async_trait]
pub trait SeenTokenStore: Send + Sync {
    /// Whether `token` has been marked and not yet expired.
    async fn has_seen_token(&self, token: &str) -> Result<bool, StoreError>;

    /// Atomically check and mark `token`.
    ///
    /// Of two concurrent calls with the same token exactly one gets
    /// `Claim::Fresh`.
    async fn mark_seen(&self, token: &str) -> Result<Claim, StoreError>;

    /// Attach the persisted ticket id to a claimed token.
    async fn record_ticket(&self, token: &str, ticket_id: u64) -> Result<(), StoreError>;

    /// Drop a claim whose delivery failed, so a redelivery can succeed.
    async fn forget(&self, token: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Copy)]
struct SeenEntry {
    seen_at: Instant,
    ticket_id: Option<u64>,
}

/// In-process token cache with time-based expiry.
#[derive(Clone)]
pub struct MemorySeenTokens {
    cache: Arc<DashMap<String, SeenEntry>>,
    ttl: Duration,
    max_entries: usize,
}

impl MemorySeenTokens {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        info!(
            ttl_seconds = ttl.as_secs(),
            max_entries = max_entries,
            "replay_cache_initialized"
        );
        Self {
            cache: Arc::new(DashMap::new()),
            ttl,
            max_entries,
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Remove expired tokens, returning how many were dropped.
    pub fn sweep_expired(&self) -> usize {
        let before = self.cache.len();
        let ttl = self.ttl;
        self.cache.retain(|_, entry| entry.seen_at.elapsed() < ttl);
        let removed = before.saturating_sub(self.cache.len());

        if removed > 0 {
            debug!(removed = removed, remaining = self.cache.len(), "replay_cache_swept");
        }
        removed
    }

    fn is_live(&self, entry: &SeenEntry) -> bool {
        entry.seen_at.elapsed() < self.ttl
    }
}

#[async_trait]
impl SeenTokenStore for MemorySeenTokens {
    async fn has_seen_token(&self, token: &str) -> Result<bool, StoreError> {
        Ok(self
            .cache
            .get(token)
            .map(|entry| self.is_live(&entry))
            .unwrap_or(false))
    }

    async fn mark_seen(&self, token: &str) -> Result<Claim, StoreError> {
        if self.cache.len() >= self.max_entries {
            warn!(entries = self.cache.len(), "replay_cache_full");
            self.sweep_expired();
        }

        let fresh = SeenEntry {
            seen_at: Instant::now(),
            ticket_id: None,
        };

        // The entry guard holds the shard lock, making check-and-mark atomic
        let claim = match self.cache.entry(token.to_string()) {
            Entry::Occupied(mut occupied) => {
                if self.is_live(occupied.get()) {
                    Claim::Replay {
                        ticket_id: occupied.get().ticket_id,
                    }
                } else {
                    occupied.insert(fresh);
                    Claim::Fresh
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                Claim::Fresh
            }
        };

        Ok(claim)
    }

    async fn record_ticket(&self, token: &str, ticket_id: u64) -> Result<(), StoreError> {
        if let Some(mut entry) = self.cache.get_mut(token) {
            entry.ticket_id = Some(ticket_id);
        }
        Ok(())
    }

    async fn forget(&self, token: &str) -> Result<(), StoreError> {
        self.cache.remove(token);
        Ok(())
    }
}

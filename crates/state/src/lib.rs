//! The Call State Store: a concurrent, call-id-keyed map owning every
//! in-flight call's mutable state, with a background TTL sweep (§4.4).
//!
//! Grounded on the teacher's `SessionManager`/`SessionStore` pair
//! (per-session `RwLock<HashMap<_>>` plus a `tokio::select!` cleanup loop),
//! generalized from a single global lock to a `DashMap` so that turns for
//! different calls never contend on the same lock (§5: "a single global lock
//! is unacceptable under load").

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::watch;

use ivr_core::{CallConfig, CallId, CallState};

/// Calls older than this are eligible for TTL eviction (§3 lifecycle).
pub const CALL_MAX_AGE: Duration = Duration::from_secs(3600);
/// How often the background sweep runs (§3 lifecycle).
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(1800);

#[derive(Debug, Error)]
pub enum StateError {
    #[error("no state entry exists for call {0}")]
    NotFound(CallId),
}

/// Owns every in-flight call's state. Safe to share behind an `Arc`; every
/// operation is keyed by call-id and only takes the lock for that shard.
#[derive(Default)]
pub struct CallStateStore {
    calls: DashMap<CallId, CallState>,
}

impl CallStateStore {
    pub fn new() -> Self {
        Self {
            calls: DashMap::new(),
        }
    }

    /// Invariant 1: a call-id appears in at most one entry. Returns the
    /// existing entry's snapshot if present, otherwise creates one from
    /// `config` and returns that snapshot.
    pub fn get_or_create(&self, call_id: &CallId, config: CallConfig) -> CallState {
        self.calls
            .entry(call_id.clone())
            .or_insert_with(|| CallState::new(call_id.clone(), config))
            .clone()
    }

    /// A consistent read-only snapshot, or `None` if no entry exists.
    pub fn get(&self, call_id: &CallId) -> Option<CallState> {
        self.calls.get(call_id).map(|entry| entry.value().clone())
    }

    /// Run `mutator` against the live entry under its shard lock, returning
    /// whatever it returns. `None` if no entry exists for `call_id` — callers
    /// that need to treat this as fatal should use [`Self::update_existing`].
    pub fn update<R>(&self, call_id: &CallId, mutator: impl FnOnce(&mut CallState) -> R) -> Option<R> {
        self.calls.get_mut(call_id).map(|mut entry| mutator(entry.value_mut()))
    }

    /// Same as [`Self::update`] but surfaces a [`StateError::NotFound`]
    /// instead of silently skipping — for call sites where a missing entry
    /// indicates a genuine inconsistency worth logging, not the
    /// best-effort-recreate path the orchestrator otherwise takes.
    pub fn update_existing<R>(
        &self,
        call_id: &CallId,
        mutator: impl FnOnce(&mut CallState) -> R,
    ) -> Result<R, StateError> {
        self.update(call_id, mutator)
            .ok_or_else(|| StateError::NotFound(call_id.clone()))
    }

    /// Evict a call's entry. Safe to call on an id that isn't present
    /// (invariant 4: status callbacks after a transfer/termination must not
    /// error).
    pub fn clear(&self, call_id: &CallId) {
        self.calls.remove(call_id);
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Remove every entry whose `created_at` is older than `max_age` as of
    /// `now`. Returns the number of entries evicted. A free function of
    /// `now`/`max_age` so the sweep logic itself is independently testable
    /// without waiting on real wall-clock time.
    pub fn evict_older_than(&self, now: chrono::DateTime<Utc>, max_age: Duration) -> usize {
        let cutoff = now - chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::zero());
        let expired: Vec<CallId> = self
            .calls
            .iter()
            .filter(|entry| entry.value().created_at < cutoff)
            .map(|entry| entry.key().clone())
            .collect();
        let count = expired.len();
        for call_id in expired {
            self.calls.remove(&call_id);
        }
        count
    }

    /// Spawn the background sweep task. Returns a shutdown sender; dropping
    /// or sending `true` on it stops the loop, mirroring the teacher's
    /// `SessionManager::start_cleanup_task` shutdown-aware interval loop.
    pub fn spawn_sweep(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let store = Arc::clone(self);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let evicted = store.evict_older_than(Utc::now(), CALL_MAX_AGE);
                        if evicted > 0 {
                            tracing::info!(evicted, remaining = store.len(), "call state TTL sweep");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("call state sweep task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_is_idempotent_per_call_id() {
        let store = CallStateStore::new();
        let id = CallId::new("CA1");
        let first = store.get_or_create(&id, CallConfig::default());
        let mut second_config = CallConfig::default();
        second_config.call_purpose = "should be ignored".to_string();
        let second = store.get_or_create(&id, second_config);
        assert_eq!(first.config.call_purpose, second.config.call_purpose);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn update_mutates_the_live_entry() {
        let store = CallStateStore::new();
        let id = CallId::new("CA1");
        store.get_or_create(&id, CallConfig::default());
        store.update(&id, |state| state.record_press('5'));
        let snapshot = store.get(&id).unwrap();
        assert_eq!(snapshot.last_pressed_digit, Some('5'));
    }

    #[test]
    fn update_on_missing_call_is_a_noop_not_an_error() {
        let store = CallStateStore::new();
        let id = CallId::new("missing");
        assert!(store.update(&id, |state| state.record_press('1')).is_none());
    }

    #[test]
    fn clear_on_missing_call_does_not_panic() {
        let store = CallStateStore::new();
        store.clear(&CallId::new("never-existed"));
    }

    #[test]
    fn evict_older_than_removes_only_expired_entries() {
        let store = CallStateStore::new();
        let old_id = CallId::new("old");
        let fresh_id = CallId::new("fresh");
        store.get_or_create(&old_id, CallConfig::default());
        store.get_or_create(&fresh_id, CallConfig::default());

        let far_future = Utc::now() + chrono::Duration::hours(2);
        let evicted = store.evict_older_than(far_future, CALL_MAX_AGE);

        assert_eq!(evicted, 2);
        assert!(store.is_empty());
    }

    #[test]
    fn evict_older_than_keeps_calls_within_ttl() {
        let store = CallStateStore::new();
        let id = CallId::new("CA1");
        store.get_or_create(&id, CallConfig::default());

        let soon = Utc::now() + chrono::Duration::minutes(5);
        let evicted = store.evict_older_than(soon, CALL_MAX_AGE);

        assert_eq!(evicted, 0);
        assert_eq!(store.len(), 1);
    }
}

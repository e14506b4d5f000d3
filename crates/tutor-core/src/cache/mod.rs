//! Three-tier cache: in-memory LRU, durable SQLite store and an optional
//! remote store, all addressed by the same namespaced key.
//!
//! Lookups walk the tiers in order and promote hits upwards. Writes go to
//! every available tier. Durable and remote failures never fail a call; they
//! are logged, counted in `backend_errors`, and the manager carries on with
//! the tiers that still work.

pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{CacheConfig, RemotePromotion};
use crate::errors::TutorResult;
use crate::store::cache_db::{SqliteTier, StoredEntry};
use memory::{entry_size, MemoryLookup, MemoryTier};

pub const SESSION_PREFIX: &str = "session:";
pub const RESOURCE_PREFIX: &str = "resource:";
pub const SCAN_PREFIX: &str = "scan:";

/// Which tier served a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    Memory,
    Local,
    Remote,
}

/// A value held by a remote store.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteEntry {
    pub value: String,
    /// Remaining lifetime, when the store tracks one.
    pub ttl: Option<Duration>,
}

/// Pluggable third tier (a shared cache service, for instance).
pub trait RemoteStore: Send + Sync {
    fn get(&self, key: &str) -> TutorResult<Option<RemoteEntry>>;
    fn set(&self, key: &str, value: &str, ttl: Duration) -> TutorResult<()>;
    fn remove(&self, key: &str) -> TutorResult<()>;
    fn clear(&self) -> TutorResult<()>;
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hit_rate: f64,
    pub memory_hits: u64,
    pub sqlite_hits: u64,
    pub remote_hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub current_memory_mb: f64,
    pub total_requests: u64,
    pub active_sessions: usize,
    pub memory_entries: usize,
    pub backend_errors: u64,
}

#[derive(Debug, Default)]
struct Counters {
    memory_hits: u64,
    sqlite_hits: u64,
    remote_hits: u64,
    misses: u64,
    evictions: u64,
    total_requests: u64,
    backend_errors: u64,
}

#[derive(Debug)]
struct CacheState {
    memory: MemoryTier,
    counters: Counters,
}

impl CacheState {
    fn store_in_memory(&mut self, key: &str, value: String, expires_at: f64) {
        match self.memory.insert(key, value, expires_at) {
            Some(evicted) => self.counters.evictions += evicted as u64,
            None => debug!(key, "entry larger than memory budget; kept out of memory tier"),
        }
    }
}

fn now_secs() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Lock order is `local` before `state`; every path that touches the durable
/// tier holds `local` until its memory-tier update is done.
pub struct CacheManager {
    config: CacheConfig,
    state: Mutex<CacheState>,
    local: Mutex<Option<SqliteTier>>,
    remote: Option<Arc<dyn RemoteStore>>,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("config", &self.config)
            .field("remote", &self.remote.is_some())
            .finish()
    }
}

impl CacheManager {
    /// A manager with only the memory tier; call [`initialize`](Self::initialize)
    /// to open the durable tier.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            state: Mutex::new(CacheState {
                memory: MemoryTier::new(config.max_memory_bytes()),
                counters: Counters::default(),
            }),
            local: Mutex::new(None),
            remote: None,
            config,
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Open the durable tier. On failure the manager keeps running
    /// memory-only and `false` is returned.
    pub fn initialize(&self) -> bool {
        let mut local = self.local.lock();
        if local.is_some() {
            return true;
        }
        match SqliteTier::open(&self.config.sqlite_path) {
            Ok(tier) => {
                debug!(path = %self.config.sqlite_path.display(), "durable cache tier opened");
                *local = Some(tier);
                true
            }
            Err(e) => {
                warn!(path = %self.config.sqlite_path.display(), error = %e, "durable cache tier unavailable; running memory-only");
                self.state.lock().counters.backend_errors += 1;
                false
            }
        }
    }

    /// Release the durable tier and drop every in-memory entry.
    pub fn close(&self) {
        let mut local = self.local.lock();
        local.take();
        self.state.lock().memory.clear();
    }

    pub fn is_durable(&self) -> bool {
        self.local.lock().is_some()
    }

    fn backend_error(&self, tier: Tier, op: &str, key: &str, error: &dyn std::fmt::Display) {
        warn!(?tier, op, key, error = %error, "cache backend error");
        self.state.lock().counters.backend_errors += 1;
    }

    // -----------------------------------------------------------------------
    // Raw JSON-text surface
    // -----------------------------------------------------------------------

    /// Look `key` up through every tier, promoting hits.
    pub fn get_raw(&self, key: &str) -> Option<String> {
        self.lookup(key).map(|(value, _)| value)
    }

    /// Like [`get_raw`](Self::get_raw), also reporting the serving tier.
    pub fn lookup(&self, key: &str) -> Option<(String, Tier)> {
        let now = now_secs();
        {
            let mut state = self.state.lock();
            state.counters.total_requests += 1;
            if let MemoryLookup::Hit(value) = state.memory.get(key, now) {
                state.counters.memory_hits += 1;
                return Some((value, Tier::Memory));
            }
        }

        // Held until the promotion lands, so a concurrent write or delete
        // cannot be overtaken by the value read here.
        let local = self.local.lock();
        match local.as_ref().map(|tier| tier.get(key, now)) {
            Some(Ok(Some(entry))) => {
                let mut state = self.state.lock();
                state.counters.sqlite_hits += 1;
                state.store_in_memory(key, entry.value.clone(), entry.expires_at);
                return Some((entry.value, Tier::Local));
            }
            Some(Err(e)) => self.backend_error(Tier::Local, "get", key, &e),
            Some(Ok(None)) | None => {}
        }

        if let Some(remote) = &self.remote {
            match remote.get(key) {
                Ok(Some(entry)) => {
                    let ttl = entry.ttl.unwrap_or(self.config.analysis_ttl);
                    let expires_at = now + ttl.as_secs_f64();
                    if self.config.remote_promotion == RemotePromotion::BackfillLocal {
                        self.put_local(local.as_ref(), key, &entry.value, expires_at, now);
                    }
                    let mut state = self.state.lock();
                    state.counters.remote_hits += 1;
                    state.store_in_memory(key, entry.value.clone(), expires_at);
                    return Some((entry.value, Tier::Remote));
                }
                Ok(None) => {}
                Err(e) => self.backend_error(Tier::Remote, "get", key, &e),
            }
        }

        self.state.lock().counters.misses += 1;
        None
    }

    /// Write through an already held durable-tier guard.
    fn put_local(&self, local: Option<&SqliteTier>, key: &str, value: &str, expires_at: f64, now: f64) {
        let result = local.map(|tier| {
            tier.put(
                key,
                &StoredEntry {
                    value: value.to_string(),
                    size_bytes: entry_size(key, value),
                    expires_at,
                },
                now,
            )
        });
        if let Some(Err(e)) = result {
            self.backend_error(Tier::Local, "set", key, &e);
        }
    }

    /// Store JSON text in every available tier.
    pub fn set_raw(&self, key: &str, value: String, ttl: Duration) {
        let now = now_secs();
        let expires_at = now + ttl.as_secs_f64();
        let local = self.local.lock();
        self.put_local(local.as_ref(), key, &value, expires_at, now);
        if let Some(remote) = &self.remote {
            if let Err(e) = remote.set(key, &value, ttl) {
                self.backend_error(Tier::Remote, "set", key, &e);
            }
        }
        self.state.lock().store_in_memory(key, value, expires_at);
    }

    /// Remove `key` from every tier. True if any tier held it.
    pub fn delete(&self, key: &str) -> bool {
        let local = self.local.lock();
        let mut found = self.state.lock().memory.remove(key);
        match local.as_ref().map(|tier| tier.remove(key)) {
            Some(Ok(removed)) => found |= removed,
            Some(Err(e)) => self.backend_error(Tier::Local, "delete", key, &e),
            None => {}
        }
        if let Some(remote) = &self.remote {
            if let Err(e) = remote.remove(key) {
                self.backend_error(Tier::Remote, "delete", key, &e);
            }
        }
        found
    }

    pub fn clear(&self) {
        let local = self.local.lock();
        self.state.lock().memory.clear();
        if let Some(Err(e)) = local.as_ref().map(SqliteTier::clear) {
            self.backend_error(Tier::Local, "clear", "*", &e);
        }
        if let Some(remote) = &self.remote {
            if let Err(e) = remote.clear() {
                self.backend_error(Tier::Remote, "clear", "*", &e);
            }
        }
    }

    /// Sweep expired entries from the memory and durable tiers.
    pub fn purge_expired(&self) -> usize {
        let now = now_secs();
        let local = self.local.lock();
        let mut purged = self.state.lock().memory.purge_expired(now);
        match local.as_ref().map(|tier| tier.purge_expired(now)) {
            Some(Ok(n)) => purged += n,
            Some(Err(e)) => self.backend_error(Tier::Local, "purge", "*", &e),
            None => {}
        }
        purged
    }

    // -----------------------------------------------------------------------
    // Typed surface
    // -----------------------------------------------------------------------

    /// Decoded value for `key`. A value that does not decode into `T` is
    /// dropped from every tier and reported as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get_raw(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "dropping undecodable cache entry");
                self.delete(key);
                None
            }
        }
    }

    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) -> TutorResult<()> {
        let encoded = serde_json::to_string(value)?;
        self.set_raw(key, encoded, ttl);
        Ok(())
    }

    pub fn get_analysis<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key)
    }

    /// Store under the caller's key; `None` uses the configured analysis TTL.
    pub fn set_analysis<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> TutorResult<()> {
        self.set(key, value, ttl.unwrap_or(self.config.analysis_ttl))
    }

    pub fn get_session<T: DeserializeOwned>(&self, session_id: &str) -> Option<T> {
        self.get(&format!("{SESSION_PREFIX}{session_id}"))
    }

    pub fn set_session<T: Serialize + ?Sized>(&self, session_id: &str, value: &T) -> TutorResult<()> {
        self.set(
            &format!("{SESSION_PREFIX}{session_id}"),
            value,
            self.config.session_ttl,
        )
    }

    pub fn get_resource<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.get(&format!("{RESOURCE_PREFIX}{name}"))
    }

    pub fn set_resource<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> TutorResult<()> {
        self.set(
            &format!("{RESOURCE_PREFIX}{name}"),
            value,
            self.config.resource_ttl,
        )
    }

    /// Snapshot of the counters. Takes the state lock, changes nothing.
    pub fn get_stats(&self) -> CacheStats {
        let now = now_secs();
        let state = self.state.lock();
        let c = &state.counters;
        let hits = c.memory_hits + c.sqlite_hits + c.remote_hits;
        CacheStats {
            hit_rate: if c.total_requests == 0 {
                0.0
            } else {
                hits as f64 / c.total_requests as f64
            },
            memory_hits: c.memory_hits,
            sqlite_hits: c.sqlite_hits,
            remote_hits: c.remote_hits,
            misses: c.misses,
            evictions: c.evictions,
            current_memory_mb: state.memory.current_bytes() as f64 / (1024.0 * 1024.0),
            total_requests: c.total_requests,
            active_sessions: state.memory.count_live(SESSION_PREFIX, now),
            memory_entries: state.memory.len(),
            backend_errors: c.backend_errors,
        }
    }
}

//! In-process [`CacheStore`] with expiry and Redis-compatible introspection.
//!
//! Keeps native `keyspace_hits`/`keyspace_misses` counters and answers `INFO`
//! in the same text format Redis uses, so metrics code is exercised unchanged.
//! [`disconnect`](MemoryStore::disconnect) and [`reconnect`](MemoryStore::reconnect)
//! drive the lifecycle events used to simulate backend outages.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::info;

use super::store::{CacheError, CacheResult, CacheStore, ConnectionEvent, HealthState};
use super::ttl::Ttl;

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    hits: u64,
    misses: u64,
}

impl Inner {
    fn purge_expired(&mut self, now: Instant) {
        self.entries.retain(|_, e| e.expires_at > now);
    }
}

#[derive(Debug)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    health: HealthState,
    failing: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// A connected, empty store.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            health: HealthState::new(true),
            failing: AtomicBool::new(false),
        }
    }

    /// Simulates the connection dropping.
    pub fn disconnect(&self) {
        if self.health.apply(ConnectionEvent::Closed) {
            info!(store = self.name(), "connection closed");
        }
    }

    /// Simulates the connection coming back.
    pub fn reconnect(&self) {
        if self.health.apply(ConnectionEvent::Connected) {
            info!(store = self.name(), "connection established");
        }
    }

    /// While set, every command fails with a backend error even though the
    /// connection reports healthy.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    /// Writes a raw value, bypassing the health checks. Lets tests plant
    /// payloads a well-behaved writer would never produce.
    pub fn insert_raw(&self, key: &str, value: &str, ttl: Ttl) {
        let mut inner = self.lock();
        inner.entries.insert(
            key.to_owned(),
            Entry {
                value: value.to_owned(),
                expires_at: Instant::now() + ttl.as_duration(),
            },
        );
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned map is still a usable cache.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check(&self) -> CacheResult<()> {
        if !self.health.is_healthy() {
            return Err(CacheError::NotConnected);
        }
        if self.failing.load(Ordering::Acquire) {
            return Err(CacheError::Backend("injected failure".to_owned()));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.check()?;
        let now = Instant::now();
        let mut inner = self.lock();

        let value = inner
            .entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone());

        if value.is_some() {
            inner.hits += 1;
        } else {
            inner.entries.remove(key);
            inner.misses += 1;
        }
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Ttl) -> CacheResult<()> {
        self.check()?;
        self.insert_raw(key, value, ttl);
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> CacheResult<u64> {
        self.check()?;
        let now = Instant::now();
        let mut inner = self.lock();
        inner.purge_expired(now);
        Ok(keys
            .iter()
            .filter(|k| inner.entries.remove(k.as_str()).is_some())
            .count() as u64)
    }

    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        self.check()?;
        let now = Instant::now();
        let mut inner = self.lock();
        inner.purge_expired(now);
        let mut keys: Vec<String> = inner
            .entries
            .keys()
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn db_size(&self) -> CacheResult<u64> {
        self.check()?;
        let now = Instant::now();
        let mut inner = self.lock();
        inner.purge_expired(now);
        Ok(inner.entries.len() as u64)
    }

    async fn info(&self, section: &str) -> CacheResult<String> {
        self.check()?;
        let inner = self.lock();
        let mut out = String::new();
        match section {
            "stats" => {
                let _ = write!(
                    out,
                    "# Stats\r\nkeyspace_hits:{}\r\nkeyspace_misses:{}\r\n",
                    inner.hits, inner.misses
                );
            }
            "memory" => {
                let used: usize = inner
                    .entries
                    .iter()
                    .map(|(k, e)| k.len() + e.value.len())
                    .sum();
                let _ = write!(
                    out,
                    "# Memory\r\nused_memory:{used}\r\nused_memory_human:{}\r\n",
                    human_bytes(used as u64)
                );
            }
            _ => {}
        }
        Ok(out)
    }

    async fn reset_stats(&self) -> CacheResult<()> {
        self.check()?;
        let mut inner = self.lock();
        inner.hits = 0;
        inner.misses = 0;
        Ok(())
    }

    fn health(&self) -> &HealthState {
        &self.health
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Redis-style glob: `*` matches any run, `?` any single character.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        match p.get(pi) {
            Some('*') => {
                backtrack = Some((pi, ti));
                pi += 1;
            }
            Some(&c) if c == '?' || c == t[ti] => {
                pi += 1;
                ti += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    pi = star + 1;
                    ti = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }

    p[pi..].iter().all(|&c| c == '*')
}

/// Formats a byte count the way Redis' `used_memory_human` does.
fn human_bytes(bytes: u64) -> String {
    const UNITS: [(&str, f64); 3] = [
        ("G", 1024.0 * 1024.0 * 1024.0),
        ("M", 1024.0 * 1024.0),
        ("K", 1024.0),
    ];
    UNITS
        .iter()
        .find(|(_, size)| bytes as f64 >= *size)
        .map(|(unit, size)| format!("{:.2}{unit}", bytes as f64 / size))
        .unwrap_or_else(|| format!("{bytes}B"))
}

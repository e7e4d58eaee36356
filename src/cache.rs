//! Response cache: fingerprinting, bounded LRU storage, ETag index, and the
//! in-flight registry that coalesces concurrent identical requests.
//!
//! Fingerprints fold in the auth-relevant headers so responses never leak
//! between principals. Expired entries are never returned, but the stale
//! entry and its ETag are retained until LRU pressure or the sweep removes
//! them, keeping conditional revalidation possible after expiry.

use crate::error::Error;
use crate::response::Response;
use crate::time::TimeSource;
use http::header::HeaderMap;
use http::Method;
use lru::LruCache;
use regex::Regex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;

const SEP: char = '\u{0}';
const AUTH_MEMO_CAP: usize = 100;
const SWEEP_INTERVAL_MS: u64 = 60_000;

/// Snapshot of cache occupancy.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub default_ttl: Duration,
    pub in_flight: usize,
    pub etags: usize,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    response: Response,
    expires_at: u64,
}

/// Bounded FIFO memo for auth-header extraction.
#[derive(Debug, Default)]
struct AuthMemo {
    order: VecDeque<String>,
    values: HashMap<String, String>,
}

impl AuthMemo {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn insert(&mut self, key: String, value: String) {
        if self.values.insert(key.clone(), value).is_none() {
            self.order.push_back(key);
            if self.order.len() > AUTH_MEMO_CAP {
                if let Some(oldest) = self.order.pop_front() {
                    self.values.remove(&oldest);
                }
            }
        }
    }

    fn clear(&mut self) {
        self.order.clear();
        self.values.clear();
    }
}

pub struct HttpCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    etags: Mutex<HashMap<String, String>>,
    auth_memo: Mutex<AuthMemo>,
    in_flight: InFlight,
    default_ttl: Duration,
    max_size: usize,
    /// Lowercased header names that partition the cache between principals.
    auth_headers: Vec<String>,
    clock: Arc<dyn TimeSource>,
    last_sweep: AtomicU64,
}

impl std::fmt::Debug for HttpCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCache")
            .field("max_size", &self.max_size)
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl HttpCache {
    pub fn new(
        max_size: usize,
        default_ttl: Duration,
        auth_headers: Vec<String>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        let capacity = NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::MIN);
        let last_sweep = AtomicU64::new(clock.now_millis());
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            etags: Mutex::new(HashMap::new()),
            auth_memo: Mutex::new(AuthMemo::default()),
            in_flight: InFlight::new(),
            default_ttl,
            max_size: capacity.get(),
            auth_headers,
            clock,
            last_sweep,
        }
    }

    /// Deterministic fingerprint over method, URL, sorted params, and the
    /// auth-relevant headers. Differing credentials yield differing keys.
    pub fn key(
        &self,
        method: &Method,
        url: &str,
        params: &[(String, Option<String>)],
        headers: &HeaderMap,
    ) -> String {
        let mut pairs: Vec<(&str, &str)> = params
            .iter()
            .filter_map(|(k, v)| v.as_deref().map(|v| (k.as_str(), v)))
            .collect();
        pairs.sort_unstable();
        let params_json = if pairs.is_empty() {
            String::new()
        } else {
            serde_json::to_string(&pairs).unwrap_or_default()
        };
        let auth_json = self.auth_extract(headers);
        format!("{method}{SEP}{url}{SEP}{params_json}{SEP}{auth_json}")
    }

    /// JSON of the auth-relevant headers, memoized per header shape.
    fn auth_extract(&self, headers: &HeaderMap) -> String {
        let mut shape: Vec<(&str, &[u8])> =
            headers.iter().map(|(name, value)| (name.as_str(), value.as_bytes())).collect();
        shape.sort_unstable();
        let memo_key = shape.iter().fold(String::new(), |mut acc, (name, value)| {
            acc.push_str(name);
            acc.push(':');
            acc.push_str(&String::from_utf8_lossy(value));
            acc.push('\n');
            acc
        });

        if let Some(cached) = lock(&self.auth_memo).get(&memo_key) {
            return cached;
        }

        let auth: BTreeMap<&str, String> = shape
            .iter()
            .filter(|(name, _)| self.auth_headers.iter().any(|a| a == name))
            .map(|(name, value)| (*name, String::from_utf8_lossy(value).into_owned()))
            .collect();
        let extracted = if auth.is_empty() {
            String::new()
        } else {
            serde_json::to_string(&auth).unwrap_or_default()
        };

        lock(&self.auth_memo).insert(memo_key, extracted.clone());
        extracted
    }

    /// Fresh entry for the fingerprint, promoted to most-recently-used and
    /// marked `from_cache`. Expired entries are never returned.
    pub fn get(&self, key: &str) -> Option<Response> {
        let now = self.clock.now_millis();
        let mut entries = lock(&self.entries);
        let expired = matches!(entries.peek(key), Some(e) if e.expires_at <= now);
        if expired {
            return None;
        }
        entries.get(key).map(|entry| {
            let mut response = entry.response.clone();
            response.from_cache = true;
            response
        })
    }

    /// Store a response. Evicting under LRU pressure also drops the evicted
    /// fingerprint's ETag.
    pub fn set(&self, key: &str, response: Response, ttl: Option<Duration>, etag: Option<String>) {
        let now = self.clock.now_millis();
        let ttl = ttl.unwrap_or(self.default_ttl);
        let entry = CacheEntry {
            response: Response { from_cache: false, ..response },
            expires_at: now.saturating_add(ttl.as_millis() as u64),
        };
        {
            let mut entries = lock(&self.entries);
            let mut etags = lock(&self.etags);
            if let Some((evicted_key, _)) = entries.push(key.to_string(), entry) {
                if evicted_key != key {
                    tracing::debug!(key = %evicted_key, "evicted least-recently-used cache entry");
                    etags.remove(&evicted_key);
                }
            }
            match etag {
                Some(tag) => {
                    etags.insert(key.to_string(), tag);
                }
                None => {
                    etags.remove(key);
                }
            }
        }
        self.maybe_sweep(now);
    }

    /// Extend an entry's life after a 304, returning the revalidated
    /// response marked `from_cache`.
    pub fn refresh(&self, key: &str) -> Option<Response> {
        let now = self.clock.now_millis();
        let mut entries = lock(&self.entries);
        entries.get_mut(key).map(|entry| {
            entry.expires_at = now.saturating_add(self.default_ttl.as_millis() as u64);
            let mut response = entry.response.clone();
            response.from_cache = true;
            response
        })
    }

    pub fn etag(&self, key: &str) -> Option<String> {
        lock(&self.etags).get(key).cloned()
    }

    /// Remove every entry whose fingerprint matches the pattern (treated as
    /// a regex; an invalid pattern degrades to a literal match). Returns the
    /// number of entries removed.
    pub fn invalidate(&self, pattern: &str) -> usize {
        let Some(re) = Regex::new(pattern)
            .ok()
            .or_else(|| Regex::new(&regex::escape(pattern)).ok())
        else {
            return 0;
        };
        let mut entries = lock(&self.entries);
        let mut etags = lock(&self.etags);
        let matching: Vec<String> =
            entries.iter().map(|(k, _)| k.clone()).filter(|k| re.is_match(k)).collect();
        for key in &matching {
            entries.pop(key);
            etags.remove(key);
        }
        matching.len()
    }

    /// Drop all entries, ETags, in-flight registrations, and the auth memo.
    pub fn clear(&self) {
        lock(&self.entries).clear();
        lock(&self.etags).clear();
        lock(&self.auth_memo).clear();
        self.in_flight.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: lock(&self.entries).len(),
            max_size: self.max_size,
            default_ttl: self.default_ttl,
            in_flight: self.in_flight.len(),
            etags: lock(&self.etags).len(),
        }
    }

    /// Join the in-flight request for a fingerprint, or become its leader.
    pub(crate) fn join_in_flight(&self, key: &str) -> Join {
        self.in_flight.join(key)
    }

    /// Best-effort cleanup of expired entries, at most once per minute.
    fn maybe_sweep(&self, now: u64) {
        let last = self.last_sweep.load(Ordering::Acquire);
        if now.saturating_sub(last) < SWEEP_INTERVAL_MS {
            return;
        }
        if self
            .last_sweep
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let mut entries = lock(&self.entries);
        let mut etags = lock(&self.etags);
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.expires_at <= now)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
            etags.remove(key);
        }
        if !expired.is_empty() {
            tracing::debug!(count = expired.len(), "swept expired cache entries");
        }
    }
}

/// Outcome of attempting to join an in-flight request.
pub(crate) enum Join {
    /// No request is in flight; the caller must dispatch and settle the
    /// guard on every path.
    Leader(InFlightGuard),
    /// Another caller is already dispatching; await its broadcast outcome.
    Waiter(broadcast::Receiver<Result<Response, Error>>),
}

/// Registry of pending dispatches keyed by fingerprint.
#[derive(Clone)]
struct InFlight {
    senders: Arc<Mutex<HashMap<String, broadcast::Sender<Result<Response, Error>>>>>,
}

impl InFlight {
    fn new() -> Self {
        Self { senders: Arc::new(Mutex::new(HashMap::new())) }
    }

    fn join(&self, key: &str) -> Join {
        let mut senders = lock(&self.senders);
        if let Some(sender) = senders.get(key) {
            Join::Waiter(sender.subscribe())
        } else {
            let (sender, _) = broadcast::channel(1);
            senders.insert(key.to_string(), sender);
            Join::Leader(InFlightGuard {
                registry: self.clone(),
                key: key.to_string(),
                settled: false,
            })
        }
    }

    fn settle(&self, key: &str, result: Result<Response, Error>) {
        if let Some(sender) = lock(&self.senders).remove(key) {
            // No receivers is fine: the leader may have been alone.
            let _ = sender.send(result);
        }
    }

    fn forget(&self, key: &str) {
        lock(&self.senders).remove(key);
    }

    fn len(&self) -> usize {
        lock(&self.senders).len()
    }

    fn clear(&self) {
        lock(&self.senders).clear();
    }
}

/// Leader-side handle. Dropping without [`complete`](Self::complete)
/// unregisters the key so waiters observe the abandonment instead of
/// hanging.
pub(crate) struct InFlightGuard {
    registry: InFlight,
    key: String,
    settled: bool,
}

impl InFlightGuard {
    pub(crate) fn complete(mut self, result: Result<Response, Error>) {
        self.settled = true;
        self.registry.settle(&self.key, result);
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if !self.settled {
            self.registry.forget(&self.key);
        }
    }
}

//! Client configuration.
//!
//! [`ClientOptions`] is the loosely-typed input; [`ClientConfig`] is the
//! canonical shape. Normalization never fails: out-of-range values clamp
//! and invalid values fall back to defaults, so a misconfigured caller gets
//! a working client instead of a crash at call time.

use crate::backoff::Backoff;
use crate::error::Error;
use crate::hints::LinkHintSink;
use crate::jitter::Jitter;
use crate::response::Response;
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Predicate deciding whether an error is worth another attempt.
pub type RetryCondition = Arc<dyn Fn(&Error) -> bool + Send + Sync>;

/// Value served in place of a breaker rejection.
pub type BreakerFallback = Arc<dyn Fn() -> Response + Send + Sync>;

const TIMEOUT_RANGE_MS: (u64, u64) = (100, 300_000);
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const CACHE_TTL_RANGE_MS: (u64, u64) = (1_000, 86_400_000);
const DEFAULT_CACHE_TTL_MS: u64 = 300_000;
const CACHE_SIZE_RANGE: (usize, usize) = (1, 10_000);
const DEFAULT_CACHE_SIZE: usize = 100;
const RETRY_ATTEMPTS_RANGE: (usize, usize) = (0, 10);
const DEFAULT_RETRY_ATTEMPTS: usize = 3;
const FAILURE_THRESHOLD_RANGE: (usize, usize) = (1, 100);
const DEFAULT_FAILURE_THRESHOLD: usize = 5;
const RESET_TIMEOUT_RANGE_MS: (u64, u64) = (1_000, 3_600_000);
const DEFAULT_RESET_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_MAX_REQUEST_SIZE: usize = 10 * 1024 * 1024;
const DEFAULT_MAX_RESPONSE_SIZE: usize = 50 * 1024 * 1024;

/// Cache tuning.
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    pub ttl_ms: Option<u64>,
    pub max_size: Option<usize>,
    /// Header names that isolate cache entries between principals.
    pub auth_headers: Option<Vec<String>>,
}

/// Retry tuning.
#[derive(Clone, Default)]
pub struct RetryOptions {
    /// Total attempt count; zero still dispatches once.
    pub attempts: Option<usize>,
    pub delay: Option<Backoff>,
    pub jitter: Option<Jitter>,
    pub condition: Option<RetryCondition>,
    pub respect_retry_after: Option<bool>,
}

impl std::fmt::Debug for RetryOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryOptions")
            .field("attempts", &self.attempts)
            .field("delay", &self.delay)
            .field("jitter", &self.jitter)
            .field("condition", &self.condition.as_ref().map(|_| "<fn>"))
            .field("respect_retry_after", &self.respect_retry_after)
            .finish()
    }
}

/// Circuit breaker tuning.
#[derive(Clone, Default)]
pub struct BreakerOptions {
    pub failure_threshold: Option<usize>,
    pub reset_timeout_ms: Option<u64>,
    pub fallback: Option<BreakerFallback>,
}

impl std::fmt::Debug for BreakerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerOptions")
            .field("failure_threshold", &self.failure_threshold)
            .field("reset_timeout_ms", &self.reset_timeout_ms)
            .field("fallback", &self.fallback.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Untrusted construction input. Every field is optional.
#[derive(Clone, Default)]
pub struct ClientOptions {
    pub base_url: Option<String>,
    pub timeout_ms: Option<u64>,
    pub default_headers: Option<Vec<(String, String)>>,
    pub max_request_size: Option<usize>,
    pub max_response_size: Option<usize>,
    pub cache: Option<CacheOptions>,
    pub retry: Option<RetryOptions>,
    pub breaker: Option<BreakerOptions>,
    pub hint_sink: Option<Arc<dyn LinkHintSink>>,
}

impl std::fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientOptions")
            .field("base_url", &self.base_url)
            .field("timeout_ms", &self.timeout_ms)
            .field("default_headers", &self.default_headers)
            .field("max_request_size", &self.max_request_size)
            .field("max_response_size", &self.max_response_size)
            .field("cache", &self.cache)
            .field("retry", &self.retry)
            .field("breaker", &self.breaker)
            .field("hint_sink", &self.hint_sink.as_ref().map(|_| "<sink>"))
            .finish()
    }
}

/// Canonical configuration. Construct with [`ClientConfig::new`].
#[derive(Clone)]
pub struct ClientConfig {
    pub base_url: Option<String>,
    pub timeout: Duration,
    pub default_headers: HeaderMap,
    pub cache_ttl: Duration,
    pub cache_max_size: usize,
    /// Lowercased.
    pub auth_headers: Vec<String>,
    pub retry_attempts: usize,
    pub retry_delay: Backoff,
    pub retry_jitter: Jitter,
    pub retry_condition: RetryCondition,
    pub respect_retry_after: bool,
    pub failure_threshold: usize,
    pub reset_timeout: Duration,
    pub breaker_fallback: Option<BreakerFallback>,
    pub max_request_size: usize,
    pub max_response_size: usize,
    pub hint_sink: Option<Arc<dyn LinkHintSink>>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("cache_ttl", &self.cache_ttl)
            .field("cache_max_size", &self.cache_max_size)
            .field("auth_headers", &self.auth_headers)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_delay", &self.retry_delay)
            .field("retry_jitter", &self.retry_jitter)
            .field("respect_retry_after", &self.respect_retry_after)
            .field("failure_threshold", &self.failure_threshold)
            .field("reset_timeout", &self.reset_timeout)
            .field("max_request_size", &self.max_request_size)
            .field("max_response_size", &self.max_response_size)
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self {
            base_url: None,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            default_headers,
            cache_ttl: Duration::from_millis(DEFAULT_CACHE_TTL_MS),
            cache_max_size: DEFAULT_CACHE_SIZE,
            auth_headers: default_auth_headers(),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: Backoff::default(),
            retry_jitter: Jitter::default(),
            retry_condition: Arc::new(default_retry_condition),
            respect_retry_after: true,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            reset_timeout: Duration::from_millis(DEFAULT_RESET_TIMEOUT_MS),
            breaker_fallback: None,
            max_request_size: DEFAULT_MAX_REQUEST_SIZE,
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
            hint_sink: None,
        }
    }
}

impl ClientConfig {
    pub fn new(options: ClientOptions) -> Self {
        Self::default().apply(options)
    }

    /// Layer overrides onto this configuration, clamping each field
    /// independently. Used both at construction and by `create`.
    pub fn apply(mut self, options: ClientOptions) -> Self {
        if let Some(raw) = options.base_url {
            self.base_url = normalize_base_url(&raw);
        }
        if let Some(ms) = options.timeout_ms {
            self.timeout = Duration::from_millis(clamp(ms, TIMEOUT_RANGE_MS));
        }
        if let Some(pairs) = options.default_headers {
            self.default_headers = build_default_headers(pairs);
        }
        if let Some(size) = options.max_request_size {
            self.max_request_size = size;
        }
        if let Some(size) = options.max_response_size {
            self.max_response_size = size;
        }
        if let Some(cache) = options.cache {
            if let Some(ms) = cache.ttl_ms {
                self.cache_ttl = Duration::from_millis(clamp(ms, CACHE_TTL_RANGE_MS));
            }
            if let Some(size) = cache.max_size {
                self.cache_max_size = size.clamp(CACHE_SIZE_RANGE.0, CACHE_SIZE_RANGE.1);
            }
            if let Some(names) = cache.auth_headers {
                self.auth_headers =
                    names.into_iter().map(|n| n.to_ascii_lowercase()).collect();
            }
        }
        if let Some(retry) = options.retry {
            if let Some(attempts) = retry.attempts {
                self.retry_attempts =
                    attempts.clamp(RETRY_ATTEMPTS_RANGE.0, RETRY_ATTEMPTS_RANGE.1);
            }
            if let Some(delay) = retry.delay {
                self.retry_delay = delay;
            }
            if let Some(jitter) = retry.jitter {
                self.retry_jitter = jitter;
            }
            if let Some(condition) = retry.condition {
                self.retry_condition = condition;
            }
            if let Some(respect) = retry.respect_retry_after {
                self.respect_retry_after = respect;
            }
        }
        if let Some(breaker) = options.breaker {
            if let Some(threshold) = breaker.failure_threshold {
                self.failure_threshold =
                    threshold.clamp(FAILURE_THRESHOLD_RANGE.0, FAILURE_THRESHOLD_RANGE.1);
            }
            if let Some(ms) = breaker.reset_timeout_ms {
                self.reset_timeout = Duration::from_millis(clamp(ms, RESET_TIMEOUT_RANGE_MS));
            }
            if let Some(fallback) = breaker.fallback {
                self.breaker_fallback = Some(fallback);
            }
        }
        if let Some(sink) = options.hint_sink {
            self.hint_sink = Some(sink);
        }
        self
    }
}

/// Retry on transport-level failures and on statuses that can succeed later:
/// 408, 429, and 5xx. Other 4xx will not improve on retry.
pub fn default_retry_condition(error: &Error) -> bool {
    match error {
        Error::Network { .. } | Error::Timeout { .. } => true,
        Error::Http { status, .. } => {
            matches!(*status, 408 | 429) || (500..=599).contains(status)
        }
        Error::Cancelled { .. } | Error::CircuitOpen { .. } => false,
    }
}

fn default_auth_headers() -> Vec<String> {
    vec!["authorization".to_string(), "x-api-key".to_string(), "cookie".to_string()]
}

fn clamp(value: u64, (lo, hi): (u64, u64)) -> u64 {
    value.clamp(lo, hi)
}

fn normalize_base_url(raw: &str) -> Option<String> {
    match Url::parse(raw) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {
            Some(raw.trim_end_matches('/').to_string())
        }
        _ => {
            tracing::warn!(base_url = raw, "ignoring invalid base URL");
            None
        }
    }
}

fn build_default_headers(pairs: Vec<(String, String)>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(&value)) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::warn!(header = %name, "ignoring invalid default header"),
        }
    }
    if !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    headers
}

//! The client facade and its request pipeline.
//!
//! A request flows through: request interceptors → cache lookup →
//! in-flight coalescing → circuit breaker → retry loop → cancellable
//! transport dispatch → response build → cache store → response
//! interceptors. Each stage runs to completion before the next begins;
//! cancellation skips everything but resource cleanup.

use crate::breaker::{CircuitBreaker, CircuitBreakerStats};
use crate::cache::{CacheStats, HttpCache, Join};
use crate::config::{ClientConfig, ClientOptions};
use crate::error::Error;
use crate::hints::scan_link_headers;
use crate::interceptor::{
    ErrorInterceptor, InterceptorSet, RequestInterceptor, ResponseInterceptor,
};
use crate::request::{Body, FormData, Request};
use crate::response::Response;
use crate::time::{TimeSource, TokioTime};
use crate::transport::{Transport, TransportBody, TransportError, TransportOptions};
use crate::urlbuild::{append_query, resolve};
use http::header::{HeaderMap, HeaderValue, CONTENT_TYPE, IF_NONE_MATCH, RETRY_AFTER};
use http::Method;
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Server-directed pacing never exceeds this, bounding tail latency.
const RETRY_AFTER_CAP: Duration = Duration::from_secs(30);

struct ClientInner {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    cache: HttpCache,
    breaker: CircuitBreaker,
    interceptors: RwLock<InterceptorSet>,
    time: Arc<dyn TimeSource>,
    hints_sent: AtomicUsize,
}

/// A resilient HTTP client over a pluggable transport.
///
/// Cloning is cheap and shares the cache, breaker, and interceptors;
/// [`create`](HttpClient::create) yields an independent instance instead.
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient").field("config", &self.inner.config).finish()
    }
}

impl HttpClient {
    pub fn new(transport: Arc<dyn Transport>, options: ClientOptions) -> Self {
        Self::assemble(
            ClientConfig::new(options),
            transport,
            InterceptorSet::default(),
            Arc::new(TokioTime::default()),
        )
    }

    fn assemble(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        interceptors: InterceptorSet,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        let cache = HttpCache::new(
            config.cache_max_size,
            config.cache_ttl,
            config.auth_headers.clone(),
            time.clone(),
        );
        let breaker = CircuitBreaker::new(
            config.failure_threshold,
            config.reset_timeout,
            config.breaker_fallback.clone(),
            time.clone(),
        );
        Self {
            inner: Arc::new(ClientInner {
                config,
                transport,
                cache,
                breaker,
                interceptors: RwLock::new(interceptors),
                time,
                hints_sent: AtomicUsize::new(0),
            }),
        }
    }

    /// Swap the time source, resetting cache and breaker state. A test seam.
    pub fn with_time_source(self, time: Arc<dyn TimeSource>) -> Self {
        Self::assemble(
            self.inner.config.clone(),
            self.inner.transport.clone(),
            self.interceptor_snapshot(),
            time,
        )
    }

    /// A new instance inheriting this client's settings and interceptors,
    /// with `options` layered on top. It owns a fresh cache and breaker.
    pub fn create(&self, options: ClientOptions) -> HttpClient {
        Self::assemble(
            self.inner.config.clone().apply(options),
            self.inner.transport.clone(),
            self.interceptor_snapshot(),
            self.inner.time.clone(),
        )
    }

    // --- interceptor registration -------------------------------------

    pub fn on_request(&self, interceptor: Arc<dyn RequestInterceptor>) {
        self.write_interceptors().push_request(interceptor);
    }

    pub fn on_response(&self, interceptor: Arc<dyn ResponseInterceptor>) {
        self.write_interceptors().push_response(interceptor);
    }

    pub fn on_error(&self, interceptor: Arc<dyn ErrorInterceptor>) {
        self.write_interceptors().push_error(interceptor);
    }

    /// Register a whole set at once, preserving registration order.
    pub fn use_interceptors(&self, set: InterceptorSet) {
        self.write_interceptors().extend(set);
    }

    fn write_interceptors(&self) -> std::sync::RwLockWriteGuard<'_, InterceptorSet> {
        self.inner.interceptors.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn interceptor_snapshot(&self) -> InterceptorSet {
        self.inner
            .interceptors
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    // --- the pipeline --------------------------------------------------

    /// Execute a request descriptor through the full pipeline.
    pub async fn request(&self, request: Request) -> Result<Response, Error> {
        let interceptors = self.interceptor_snapshot();
        let request = match interceptors.run_request(request).await {
            Ok(request) => request,
            Err(err) => return Err(interceptors.run_error(err).await),
        };

        let outcome = if request.is_cacheable() {
            self.cacheable_path(&request).await
        } else {
            self.direct_path(&request).await
        };

        match outcome {
            Ok(response) => match interceptors.run_response(response).await {
                Ok(response) => Ok(response),
                Err(err) => Err(interceptors.run_error(err).await),
            },
            Err(err) => Err(interceptors.run_error(err).await),
        }
    }

    async fn direct_path(&self, request: &Request) -> Result<Response, Error> {
        let mut url = resolve(self.inner.config.base_url.as_deref(), &request.url)?;
        append_query(&mut url, &request.params);
        let headers = self.merge_headers(request);
        self.inner.breaker.call(|| self.retrying(request, &url, headers)).await
    }

    async fn cacheable_path(&self, request: &Request) -> Result<Response, Error> {
        let resolved = resolve(self.inner.config.base_url.as_deref(), &request.url)?;
        let headers = self.merge_headers(request);
        let fingerprint = self.inner.cache.key(
            &request.method,
            resolved.as_str(),
            &request.params,
            &headers,
        );

        match self.inner.cache.join_in_flight(&fingerprint) {
            Join::Waiter(mut receiver) => {
                tracing::debug!(url = %resolved, "coalescing with in-flight request");
                let cancel = request.cancel.clone().unwrap_or_else(CancellationToken::new);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        Err(Error::Cancelled { url: resolved.to_string() })
                    }
                    outcome = receiver.recv() => match outcome {
                        Ok(result) => result,
                        // The leader was dropped before settling.
                        Err(_) => Err(Error::Cancelled { url: resolved.to_string() }),
                    },
                }
            }
            Join::Leader(guard) => {
                let outcome =
                    self.lead_dispatch(request, resolved, headers, &fingerprint).await;
                // Cache writes above happen strictly before waiters settle.
                guard.complete(outcome.clone());
                outcome
            }
        }
    }

    /// The leader side of the cacheable path: serve a fresh entry, or
    /// dispatch (conditionally when an ETag is known) and store the result.
    async fn lead_dispatch(
        &self,
        request: &Request,
        mut url: Url,
        mut headers: HeaderMap,
        fingerprint: &str,
    ) -> Result<Response, Error> {
        if let Some(hit) = self.inner.cache.get(fingerprint) {
            tracing::debug!(url = %url, "cache hit");
            return Ok(hit);
        }
        if let Some(etag) = self.inner.cache.etag(fingerprint) {
            if let Ok(value) = HeaderValue::from_str(&etag) {
                tracing::debug!(url = %url, etag = %etag, "revalidating with If-None-Match");
                headers.insert(IF_NONE_MATCH, value);
            }
        }
        append_query(&mut url, &request.params);

        let response =
            self.inner.breaker.call(|| self.retrying(request, &url, headers)).await?;

        if response.status == 304 {
            // Body unchanged: serve the stored entry with a fresh lease.
            return Ok(self.inner.cache.refresh(fingerprint).unwrap_or(response));
        }
        if (200..300).contains(&response.status) {
            self.inner.cache.set(fingerprint, response.clone(), None, response.etag.clone());
        }
        Ok(response)
    }

    /// Retry loop. The configured attempt count is the total; zero still
    /// dispatches once.
    async fn retrying(
        &self,
        request: &Request,
        url: &Url,
        headers: HeaderMap,
    ) -> Result<Response, Error> {
        let total = self.inner.config.retry_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.send_once(request, url, &headers).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    if attempt >= total || !(self.inner.config.retry_condition)(&err) {
                        return Err(err);
                    }
                    let delay = self.retry_delay(&err, attempt);
                    tracing::debug!(
                        attempt,
                        total,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after failure"
                    );
                    self.inner.time.pause(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Backoff with jitter, overridden by server-directed pacing for 429.
    fn retry_delay(&self, err: &Error, attempt: usize) -> Duration {
        if self.inner.config.respect_retry_after {
            if let Error::Http { status: 429, response, .. } = err {
                if let Some(delay) = retry_after_delay(&response.headers) {
                    return delay.min(RETRY_AFTER_CAP);
                }
            }
        }
        self.inner.config.retry_jitter.apply(self.inner.config.retry_delay.delay(attempt))
    }

    /// One cancellable dispatch: encode, guard size, race the transport
    /// against the timeout governor and the caller's token, decode, and map
    /// failures into the error taxonomy. The governor timer is dropped on
    /// every exit path.
    async fn send_once(
        &self,
        request: &Request,
        url: &Url,
        headers: &HeaderMap,
    ) -> Result<Response, Error> {
        let config = &self.inner.config;
        let display_url = url.as_str();

        let cancel = request.cancel.clone().unwrap_or_else(CancellationToken::new);
        if cancel.is_cancelled() {
            return Err(Error::Cancelled { url: display_url.to_string() });
        }

        let body = request.body.encode().map_err(|e| Error::Network {
            url: display_url.to_string(),
            message: format!("failed to encode request body: {e}"),
        })?;
        if body.len() > config.max_request_size {
            return Err(Error::Network {
                url: display_url.to_string(),
                message: format!(
                    "request body of {} bytes exceeds limit of {} bytes",
                    body.len(),
                    config.max_request_size
                ),
            });
        }

        let mut headers = headers.clone();
        if matches!(body, TransportBody::Form(_)) {
            // The transport owns the multipart boundary.
            headers.remove(CONTENT_TYPE);
        }

        let governor = CancellationToken::new();
        let options = TransportOptions {
            method: request.method.clone(),
            headers,
            body,
            cancel: governor.child_token(),
            priority: request.priority,
        };
        let timeout = request.timeout.unwrap_or(config.timeout);

        let raw = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                governor.cancel();
                return Err(Error::Cancelled { url: display_url.to_string() });
            }
            outcome = tokio::time::timeout(timeout, self.inner.transport.send(url, options)) => {
                match outcome {
                    Err(_elapsed) => {
                        governor.cancel();
                        return Err(Error::Timeout { url: display_url.to_string(), timeout });
                    }
                    Ok(Err(err)) => return Err(map_transport_error(err, display_url)),
                    Ok(Ok(raw)) => raw,
                }
            }
        };

        let response =
            Response::from_transport(raw, request.response_type, config.max_response_size)?;
        if let Some(sink) = &config.hint_sink {
            scan_link_headers(&response.headers, sink.as_ref(), &self.inner.hints_sent);
        }
        if !response.ok {
            tracing::debug!(status = response.status, url = %response.url, "server returned error status");
            return Err(Error::Http {
                status: response.status,
                url: response.url.clone(),
                response,
            });
        }
        Ok(response)
    }

    /// Instance defaults first, caller headers winning on conflict.
    fn merge_headers(&self, request: &Request) -> HeaderMap {
        let mut merged = self.inner.config.default_headers.clone();
        for (name, value) in &request.headers {
            merged.insert(name.clone(), value.clone());
        }
        merged
    }

    // --- per-verb and body helpers -------------------------------------

    pub async fn get(&self, url: &str) -> Result<Response, Error> {
        self.request(Request::get(url)).await
    }

    pub async fn post(&self, url: &str, body: Body) -> Result<Response, Error> {
        self.request(Request::post(url).body(body)).await
    }

    pub async fn put(&self, url: &str, body: Body) -> Result<Response, Error> {
        self.request(Request::put(url).body(body)).await
    }

    pub async fn patch(&self, url: &str, body: Body) -> Result<Response, Error> {
        self.request(Request::patch(url).body(body)).await
    }

    pub async fn delete(&self, url: &str) -> Result<Response, Error> {
        self.request(Request::delete(url)).await
    }

    pub async fn head(&self, url: &str) -> Result<Response, Error> {
        self.request(Request::head(url)).await
    }

    pub async fn options_(&self, url: &str) -> Result<Response, Error> {
        self.request(Request::options(url)).await
    }

    /// JSON in, decoded JSON out.
    pub async fn json(
        &self,
        method: Method,
        url: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, Error> {
        let request = Request::new(method, url)
            .body(Body::Json(body))
            .header("content-type", "application/json");
        let response = self.request(request).await?;
        Ok(response.data.into_value())
    }

    /// Submit a multipart form. A JSON object is promoted to form fields
    /// with nulls omitted; see [`FormData`].
    pub async fn form(
        &self,
        method: Method,
        url: &str,
        data: impl Into<FormData>,
    ) -> Result<Response, Error> {
        self.request(Request::new(method, url).body(Body::Form(data.into()))).await
    }

    // --- cache and breaker management ----------------------------------

    pub fn clear_cache(&self) {
        self.inner.cache.clear();
    }

    /// Remove cached entries whose fingerprint matches `pattern` (regex).
    pub fn invalidate_cache(&self, pattern: &str) -> usize {
        self.inner.cache.invalidate(pattern)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    pub fn breaker_stats(&self) -> CircuitBreakerStats {
        self.inner.breaker.stats()
    }

    pub fn reset_breaker(&self) {
        self.inner.breaker.reset();
    }

    pub fn is_healthy(&self) -> bool {
        self.inner.breaker.stats().is_healthy
    }
}

fn retry_after_delay(headers: &HeaderMap) -> Option<Duration> {
    let secs: u64 = headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()?;
    if secs == 0 {
        return None;
    }
    Some(Duration::from_secs(secs))
}

fn map_transport_error(err: TransportError, url: &str) -> Error {
    match err {
        TransportError::Cancelled => Error::Cancelled { url: url.to_string() },
        TransportError::Connect(message) | TransportError::Body(message) => {
            Error::Network { url: url.to_string(), message }
        }
    }
}

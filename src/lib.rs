#![forbid(unsafe_code)]

//! # tenax
//!
//! A resilient HTTP client for async Rust, layered over a pluggable
//! transport:
//!
//! - **Response caching** with LRU bounds, TTLs, ETag revalidation, and
//!   auth-aware fingerprints that never leak entries between principals
//! - **Request coalescing**: concurrent identical GETs share one dispatch
//! - **Retries** with capped exponential backoff, jitter, and
//!   `Retry-After` honoring
//! - **Circuit breaking** with half-open probing and optional fallbacks
//! - **Interceptor chains** for requests, responses, and errors
//! - **Cancellation** via timeout governor and caller-supplied tokens
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use bytes::Bytes;
//! use tenax::{
//!     ClientOptions, HttpClient, Transport, TransportError, TransportOptions,
//!     TransportResponse,
//! };
//!
//! /// A stub transport; production code would wrap a real HTTP stack here.
//! struct StaticTransport;
//!
//! #[async_trait]
//! impl Transport for StaticTransport {
//!     async fn send(
//!         &self,
//!         url: &url::Url,
//!         _options: TransportOptions,
//!     ) -> Result<TransportResponse, TransportError> {
//!         let mut headers = http::HeaderMap::new();
//!         headers.insert(
//!             http::header::CONTENT_TYPE,
//!             http::HeaderValue::from_static("application/json"),
//!         );
//!         Ok(TransportResponse {
//!             status: 200,
//!             headers,
//!             url: url.to_string(),
//!             body: Bytes::from_static(b"{\"ready\":true}"),
//!         })
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tenax::Error> {
//!     let client = HttpClient::new(Arc::new(StaticTransport), ClientOptions::default());
//!
//!     let first = client.get("https://api.example.com/status").await?;
//!     assert_eq!(first.status, 200);
//!     assert!(!first.from_cache);
//!
//!     // Identical GETs are served from the cache.
//!     let second = client.get("https://api.example.com/status").await?;
//!     assert!(second.from_cache);
//!     Ok(())
//! }
//! ```

mod backoff;
mod breaker;
mod cache;
mod client;
mod config;
mod error;
mod hints;
mod interceptor;
mod jitter;
mod request;
mod response;
mod time;
mod transport;
mod urlbuild;

// Re-exports
pub use backoff::Backoff;
pub use breaker::{CircuitBreakerStats, CircuitState};
pub use cache::CacheStats;
pub use client::HttpClient;
pub use config::{
    default_retry_condition, BreakerFallback, BreakerOptions, CacheOptions, ClientConfig,
    ClientOptions, RetryCondition, RetryOptions,
};
pub use error::Error;
pub use hints::{HintKind, LinkHintSink};
pub use http::Method;
pub use interceptor::{
    error_fn, request_fn, response_fn, ErrorInterceptor, InterceptorSet,
    RequestInterceptor, ResponseInterceptor,
};
pub use jitter::Jitter;
pub use request::{Body, FormData, FormPart, Priority, Request, ResponseType};
pub use response::{Data, Response};
pub use time::{ManualClock, TimeSource, TokioTime};
pub use transport::{
    Transport, TransportBody, TransportError, TransportOptions, TransportResponse,
};

pub mod prelude;

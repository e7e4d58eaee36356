//! Convenient re-exports for common tenax types.
pub use crate::{
    Backoff, Body, CacheOptions, ClientOptions, Data, Error, FormData, HttpClient,
    InterceptorSet, Jitter, Method, Request, Response, ResponseType, RetryOptions,
    Transport, TransportError, TransportOptions, TransportResponse,
};

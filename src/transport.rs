//! The pluggable transport contract.
//!
//! The client never speaks wire-level HTTP itself; it hands a resolved URL
//! and fully-built options to a [`Transport`] and interprets the outcome.

use crate::request::{FormData, Priority};
use async_trait::async_trait;
use bytes::Bytes;
use http::header::HeaderMap;
use http::Method;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Body handed to the transport.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum TransportBody {
    #[default]
    None,
    Bytes(Bytes),
    /// Multipart parts; the transport chooses the boundary and sets the
    /// `Content-Type` accordingly.
    Form(FormData),
}

impl TransportBody {
    pub fn len(&self) -> usize {
        match self {
            TransportBody::None => 0,
            TransportBody::Bytes(b) => b.len(),
            TransportBody::Form(f) => f.size(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Options accompanying one transport dispatch.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: TransportBody,
    /// Cancelled by the client when the timeout governor or the caller's
    /// token fires; the transport should abort the exchange.
    pub cancel: CancellationToken,
    pub priority: Option<Priority>,
}

/// A completed exchange: status line, headers, final URL, buffered body.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HeaderMap,
    /// Final URL after any redirects the transport followed.
    pub url: String,
    pub body: Bytes,
}

/// Failure before a complete response was received.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// DNS failure, refused connection, reset, TLS failure.
    #[error("connection failed: {0}")]
    Connect(String),
    /// Body read failed mid-stream.
    #[error("body read failed: {0}")]
    Body(String),
    /// The cancellation token fired while the exchange was in progress.
    #[error("transport was cancelled")]
    Cancelled,
}

/// The one collaborator the client consumes.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        url: &Url,
        options: TransportOptions,
    ) -> Result<TransportResponse, TransportError>;
}

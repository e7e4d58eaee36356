//! Error taxonomy.
//!
//! Consumers branch on the variant, never on message text. Errors are
//! `Clone` so coalesced callers can share a failure outcome.

use crate::response::Response;
use std::time::Duration;

/// Everything a request can fail with.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// The server replied with a non-2xx/3xx status.
    #[error("HTTP {status} for {url}")]
    Http {
        status: u16,
        url: String,
        /// The full descriptor, so callers can inspect headers and body.
        response: Response,
    },
    /// The transport failed before a complete response was received.
    #[error("network failure for {url}: {message}")]
    Network { url: String, message: String },
    /// The request exceeded its budget and was cancelled by the timeout
    /// governor.
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },
    /// The caller-supplied token aborted the request.
    #[error("request to {url} was cancelled")]
    Cancelled { url: String },
    /// The circuit breaker rejected the call without dispatching.
    #[error("service unavailable: circuit open after {failures} consecutive failures, retry in {retry_in:?}")]
    CircuitOpen { failures: usize, retry_in: Duration },
}

impl Error {
    pub fn is_http(&self) -> bool {
        matches!(self, Self::Http { .. })
    }

    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// HTTP status, when the server replied at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The request URL, absent only for breaker rejections.
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Http { url, .. }
            | Self::Network { url, .. }
            | Self::Timeout { url, .. }
            | Self::Cancelled { url } => Some(url),
            Self::CircuitOpen { .. } => None,
        }
    }

    /// The failed response descriptor, for `Http` errors.
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Http { response, .. } => Some(response),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Data;
    use http::header::HeaderMap;

    fn http_error(status: u16) -> Error {
        Error::Http {
            status,
            url: "https://api.test/x".into(),
            response: Response {
                ok: false,
                status,
                status_text: String::new(),
                headers: HeaderMap::new(),
                url: "https://api.test/x".into(),
                data: Data::Empty,
                etag: None,
                from_cache: false,
            },
        }
    }

    #[test]
    fn http_error_display_includes_status_and_url() {
        let msg = http_error(503).to_string();
        assert!(msg.contains("503"));
        assert!(msg.contains("https://api.test/x"));
    }

    #[test]
    fn timeout_display_mentions_budget() {
        let err = Error::Timeout {
            url: "https://api.test/x".into(),
            timeout: Duration::from_secs(5),
        };
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn circuit_open_display_reads_as_service_unavailable() {
        let err = Error::CircuitOpen { failures: 5, retry_in: Duration::from_secs(30) };
        assert!(err.to_string().contains("service unavailable"));
    }

    #[test]
    fn predicates_cover_all_variants() {
        assert!(http_error(500).is_http());
        assert!(Error::Network { url: "u".into(), message: "m".into() }.is_network());
        assert!(Error::Timeout { url: "u".into(), timeout: Duration::ZERO }.is_timeout());
        assert!(Error::Cancelled { url: "u".into() }.is_cancelled());
        assert!(
            Error::CircuitOpen { failures: 1, retry_in: Duration::ZERO }.is_circuit_open()
        );
    }

    #[test]
    fn status_and_url_accessors() {
        let err = http_error(404);
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.url(), Some("https://api.test/x"));
        assert!(err.response().is_some());

        let open = Error::CircuitOpen { failures: 1, retry_in: Duration::ZERO };
        assert_eq!(open.status(), None);
        assert_eq!(open.url(), None);
    }
}

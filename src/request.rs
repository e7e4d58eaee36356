//! Request descriptors and body encodings.

use crate::transport::TransportBody;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::Method;
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How the response body should be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseType {
    /// Inspect `Content-Type`: JSON for `application/json*`, text for
    /// `text/*`, otherwise JSON with a text fallback.
    #[default]
    Auto,
    Json,
    Text,
    Bytes,
}

/// Scheduling hint forwarded to the transport when it supports one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    High,
    Low,
}

/// A multipart form: ordered text fields and file parts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormData {
    parts: Vec<FormPart>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormPart {
    Text { name: String, value: String },
    File { name: String, filename: String, content_type: String, data: Bytes },
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(FormPart::Text { name: name.into(), value: value.into() });
        self
    }

    /// Add a text field only when a value is present.
    pub fn maybe_text(self, name: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(v) => self.text(name, v),
            None => self,
        }
    }

    pub fn file(
        mut self,
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: Bytes,
    ) -> Self {
        self.parts.push(FormPart::File {
            name: name.into(),
            filename: filename.into(),
            content_type: content_type.into(),
            data,
        });
        self
    }

    pub fn parts(&self) -> &[FormPart] {
        &self.parts
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Total payload size, used for the request size guard.
    pub fn size(&self) -> usize {
        self.parts
            .iter()
            .map(|p| match p {
                FormPart::Text { name, value } => name.len() + value.len(),
                FormPart::File { name, filename, data, .. } => {
                    name.len() + filename.len() + data.len()
                }
            })
            .sum()
    }
}

/// Promote a JSON object into form fields. Null values are omitted, scalars
/// are stringified, nested values are serialized as JSON text. Non-object
/// values produce an empty form.
impl From<Value> for FormData {
    fn from(value: Value) -> Self {
        let mut form = FormData::new();
        if let Value::Object(map) = value {
            for (name, field) in map {
                let text = match field {
                    Value::Null => continue,
                    Value::String(s) => s,
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    other => other.to_string(),
                };
                form = form.text(name, text);
            }
        }
        form
    }
}

/// Request body.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Body {
    #[default]
    Empty,
    Text(String),
    Bytes(Bytes),
    /// JSON-encoded at dispatch time.
    Json(Value),
    /// Multipart form; the transport supplies the boundary.
    Form(FormData),
}

impl Body {
    pub fn json(value: Value) -> Self {
        Body::Json(value)
    }

    pub(crate) fn encode(&self) -> Result<TransportBody, serde_json::Error> {
        Ok(match self {
            Body::Empty => TransportBody::None,
            Body::Text(s) => TransportBody::Bytes(Bytes::from(s.clone())),
            Body::Bytes(b) => TransportBody::Bytes(b.clone()),
            Body::Json(v) => TransportBody::Bytes(Bytes::from(serde_json::to_vec(v)?)),
            Body::Form(f) => TransportBody::Form(f.clone()),
        })
    }
}

/// Everything needed to issue one request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// Absolute, or relative to the client's base URL.
    pub url: String,
    /// Query parameters in insertion order; `None` values are omitted.
    pub params: Vec<(String, Option<String>)>,
    pub headers: HeaderMap,
    pub body: Body,
    /// Overrides the instance default. `Duration::ZERO` expires immediately.
    pub timeout: Option<Duration>,
    /// External abort handle, observed alongside the timeout governor.
    pub cancel: Option<CancellationToken>,
    /// `Some(false)` opts a GET out of the cache; non-GETs never cache.
    pub cache: Option<bool>,
    pub response_type: ResponseType,
    pub priority: Option<Priority>,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            params: Vec::new(),
            headers: HeaderMap::new(),
            body: Body::Empty,
            timeout: None,
            cancel: None,
            cache: None,
            response_type: ResponseType::Auto,
            priority: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(Method::PATCH, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    pub fn head(url: impl Into<String>) -> Self {
        Self::new(Method::HEAD, url)
    }

    pub fn options(url: impl Into<String>) -> Self {
        Self::new(Method::OPTIONS, url)
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), Some(value.into())));
        self
    }

    /// `None` values are carried but omitted from the query string.
    pub fn param_opt(mut self, key: impl Into<String>, value: Option<String>) -> Self {
        self.params.push((key.into(), value));
        self
    }

    /// Invalid header names or values are dropped rather than failing the
    /// request, matching the permissive-constructor behavior of the client.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) =
            (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value))
        {
            self.headers.insert(name, value);
        } else {
            tracing::warn!(header = name, "dropping invalid request header");
        }
        self
    }

    pub fn body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn no_cache(mut self) -> Self {
        self.cache = Some(false);
        self
    }

    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// GETs cache unless explicitly opted out.
    pub fn is_cacheable(&self) -> bool {
        self.method == Method::GET && self.cache != Some(false)
    }
}

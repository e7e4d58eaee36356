//! Response descriptors and body decoding.

use crate::error::Error;
use crate::request::ResponseType;
use crate::transport::TransportResponse;
use bytes::Bytes;
use http::header::{HeaderMap, CONTENT_LENGTH, CONTENT_TYPE, ETAG};
use http::StatusCode;
use serde_json::Value;

/// Decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    Empty,
    Json(Value),
    Text(String),
    Bytes(Bytes),
}

impl Data {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Data::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Data::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Data::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Lossy conversion used by the `json` facade helper.
    pub fn into_value(self) -> Value {
        match self {
            Data::Json(v) => v,
            Data::Text(s) => Value::String(s),
            Data::Empty | Data::Bytes(_) => Value::Null,
        }
    }
}

/// What a completed request yields.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Status in the 200–399 range.
    pub ok: bool,
    pub status: u16,
    pub status_text: String,
    pub headers: HeaderMap,
    /// Final URL after redirects.
    pub url: String,
    pub data: Data,
    pub etag: Option<String>,
    /// Set when the descriptor was served from the client's cache.
    pub from_cache: bool,
}

impl Response {
    /// Build a descriptor from a raw transport exchange, enforcing the
    /// response size guard and decoding the body per the selector.
    pub(crate) fn from_transport(
        raw: TransportResponse,
        response_type: ResponseType,
        max_response_size: usize,
    ) -> Result<Self, Error> {
        if let Some(declared) = declared_length(&raw.headers) {
            if declared > max_response_size as u64 {
                return Err(Error::Network {
                    url: raw.url,
                    message: format!(
                        "declared content length of {declared} bytes exceeds limit of {max_response_size} bytes"
                    ),
                });
            }
        }

        let content_type = raw
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        let data = decode_body(&raw.body, &content_type, response_type)
            .map_err(|message| Error::Network { url: raw.url.clone(), message })?;

        let status_text = StatusCode::from_u16(raw.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("")
            .to_string();
        let etag = raw.headers.get(ETAG).and_then(|v| v.to_str().ok()).map(str::to_string);

        Ok(Response {
            ok: (200..400).contains(&raw.status),
            status: raw.status,
            status_text,
            headers: raw.headers,
            url: raw.url,
            data,
            etag,
            from_cache: false,
        })
    }
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers.get(CONTENT_LENGTH)?.to_str().ok()?.trim().parse().ok()
}

fn decode_body(
    body: &Bytes,
    content_type: &str,
    response_type: ResponseType,
) -> Result<Data, String> {
    if body.is_empty() {
        return Ok(Data::Empty);
    }
    match response_type {
        ResponseType::Bytes => Ok(Data::Bytes(body.clone())),
        ResponseType::Text => Ok(Data::Text(String::from_utf8_lossy(body).into_owned())),
        ResponseType::Json => serde_json::from_slice(body)
            .map(Data::Json)
            .map_err(|e| format!("failed to decode JSON body: {e}")),
        ResponseType::Auto => {
            if content_type.starts_with("application/json") {
                serde_json::from_slice(body)
                    .map(Data::Json)
                    .map_err(|e| format!("failed to decode JSON body: {e}"))
            } else if content_type.starts_with("text/") {
                Ok(Data::Text(String::from_utf8_lossy(body).into_owned()))
            } else {
                // Unknown content type: try JSON, fall back to text.
                match serde_json::from_slice(body) {
                    Ok(v) => Ok(Data::Json(v)),
                    Err(_) => Ok(Data::Text(String::from_utf8_lossy(body).into_owned())),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(status: u16, content_type: &str, body: &'static [u8]) -> TransportResponse {
        let mut headers = HeaderMap::new();
        if !content_type.is_empty() {
            headers.insert(CONTENT_TYPE, content_type.parse().unwrap());
        }
        TransportResponse {
            status,
            headers,
            url: "https://api.test/x".into(),
            body: Bytes::from_static(body),
        }
    }

    #[test]
    fn auto_decodes_json_content_type() {
        let resp = Response::from_transport(
            raw(200, "application/json; charset=utf-8", br#"{"x":1}"#),
            ResponseType::Auto,
            50 * 1024 * 1024,
        )
        .unwrap();
        assert!(resp.ok);
        assert_eq!(resp.status_text, "OK");
        assert_eq!(resp.data.as_json().unwrap()["x"], 1);
    }

    #[test]
    fn auto_decodes_text_content_type() {
        let resp = Response::from_transport(
            raw(200, "text/plain", b"hello"),
            ResponseType::Auto,
            1024,
        )
        .unwrap();
        assert_eq!(resp.data.as_text(), Some("hello"));
    }

    #[test]
    fn auto_falls_back_to_text_for_unknown_types() {
        let resp = Response::from_transport(
            raw(200, "application/octet-stream", b"not json"),
            ResponseType::Auto,
            1024,
        )
        .unwrap();
        assert_eq!(resp.data.as_text(), Some("not json"));
    }

    #[test]
    fn strict_json_decode_failure_is_a_network_error() {
        let err = Response::from_transport(
            raw(200, "text/plain", b"not json"),
            ResponseType::Json,
            1024,
        )
        .unwrap_err();
        assert!(err.is_network());
    }

    #[test]
    fn declared_length_over_limit_rejected_before_decode() {
        let mut r = raw(200, "application/json", br#"{}"#);
        r.headers.insert(CONTENT_LENGTH, "999999".parse().unwrap());
        let err = Response::from_transport(r, ResponseType::Auto, 1024).unwrap_err();
        assert!(err.is_network());
        assert!(err.to_string().contains("content length"));
    }

    #[test]
    fn etag_and_ok_flag_extracted() {
        let mut r = raw(404, "text/plain", b"nope");
        r.headers.insert(ETAG, "\"abc\"".parse().unwrap());
        let resp = Response::from_transport(r, ResponseType::Auto, 1024).unwrap();
        assert!(!resp.ok);
        assert_eq!(resp.etag.as_deref(), Some("\"abc\""));
    }

    #[test]
    fn empty_body_is_empty_data() {
        let resp =
            Response::from_transport(raw(204, "", b""), ResponseType::Auto, 1024).unwrap();
        assert_eq!(resp.data, Data::Empty);
    }
}

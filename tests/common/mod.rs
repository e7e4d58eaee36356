//! Scripted transport for pipeline tests.

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tenax::{Transport, TransportError, TransportOptions, TransportResponse};
use url::Url;

/// One scripted exchange. The last reply repeats once the script runs dry.
#[derive(Clone)]
pub enum Reply {
    Status { status: u16, headers: Vec<(&'static str, String)>, body: String },
    /// Never resolves; honors the cancellation token.
    Hang,
    ConnectError(String),
}

impl Reply {
    pub fn json(status: u16, body: &str) -> Self {
        Reply::Status {
            status,
            headers: vec![("content-type", "application/json".to_string())],
            body: body.to_string(),
        }
    }

    pub fn status(status: u16) -> Self {
        Reply::Status { status, headers: Vec::new(), body: String::new() }
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Reply::Status { headers, .. } = &mut self {
            headers.push((name, value.to_string()));
        }
        self
    }
}

/// Counts dispatches, records every request, and replays the script.
#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<VecDeque<Reply>>,
    dispatches: AtomicUsize,
    requests: Mutex<Vec<(String, HeaderMap)>>,
    delay: Mutex<Option<Duration>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, reply: Reply) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn dispatches(&self) -> usize {
        self.dispatches.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<(String, HeaderMap)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_headers(&self) -> Option<HeaderMap> {
        self.requests.lock().unwrap().last().map(|(_, headers)| headers.clone())
    }

    fn next_reply(&self) -> Reply {
        let mut replies = self.replies.lock().unwrap();
        if replies.len() > 1 {
            replies.pop_front().expect("non-empty script")
        } else {
            replies.front().cloned().unwrap_or_else(|| Reply::status(200))
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        url: &Url,
        options: TransportOptions,
    ) -> Result<TransportResponse, TransportError> {
        self.dispatches.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push((url.to_string(), options.headers.clone()));
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.next_reply() {
            Reply::Hang => {
                options.cancel.cancelled().await;
                Err(TransportError::Cancelled)
            }
            Reply::ConnectError(message) => Err(TransportError::Connect(message)),
            Reply::Status { status, headers, body } => {
                let mut map = HeaderMap::new();
                for (name, value) in headers {
                    map.insert(
                        HeaderName::from_static(name),
                        HeaderValue::from_str(&value).expect("valid header value"),
                    );
                }
                Ok(TransportResponse {
                    status,
                    headers: map,
                    url: url.to_string(),
                    body: Bytes::from(body),
                })
            }
        }
    }
}

//! Interceptor chains.
//!
//! Three ordered chains: request, response, error. Interceptors run
//! strictly sequentially in registration order; the output of one is the
//! input of the next. A request or response interceptor that fails aborts
//! its chain, and the failure becomes the active error.

use crate::error::Error;
use crate::request::Request;
use crate::response::Response;
use async_trait::async_trait;
use std::sync::Arc;

/// Transforms an outgoing request before the pipeline uses it.
#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    async fn intercept(&self, request: Request) -> Result<Request, Error>;
}

/// Transforms a completed response before it reaches the caller.
#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
    async fn intercept(&self, response: Response) -> Result<Response, Error>;
}

/// Observes or replaces the active error. Returning `Some` substitutes the
/// error for the rest of the chain; `None` leaves it unchanged.
#[async_trait]
pub trait ErrorInterceptor: Send + Sync {
    async fn intercept(&self, error: &Error) -> Option<Error>;
}

/// The three registered chains. Cloning shares the interceptor objects.
#[derive(Clone, Default)]
pub struct InterceptorSet {
    request: Vec<Arc<dyn RequestInterceptor>>,
    response: Vec<Arc<dyn ResponseInterceptor>>,
    error: Vec<Arc<dyn ErrorInterceptor>>,
}

impl std::fmt::Debug for InterceptorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorSet")
            .field("request", &self.request.len())
            .field("response", &self.response.len())
            .field("error", &self.error.len())
            .finish()
    }
}

impl InterceptorSet {
    pub fn push_request(&mut self, interceptor: Arc<dyn RequestInterceptor>) {
        self.request.push(interceptor);
    }

    pub fn push_response(&mut self, interceptor: Arc<dyn ResponseInterceptor>) {
        self.response.push(interceptor);
    }

    pub fn push_error(&mut self, interceptor: Arc<dyn ErrorInterceptor>) {
        self.error.push(interceptor);
    }

    /// Append every interceptor from `other`, preserving order.
    pub fn extend(&mut self, other: InterceptorSet) {
        self.request.extend(other.request);
        self.response.extend(other.response);
        self.error.extend(other.error);
    }

    pub(crate) async fn run_request(&self, mut request: Request) -> Result<Request, Error> {
        for interceptor in &self.request {
            request = interceptor.intercept(request).await?;
        }
        Ok(request)
    }

    pub(crate) async fn run_response(&self, mut response: Response) -> Result<Response, Error> {
        for interceptor in &self.response {
            response = interceptor.intercept(response).await?;
        }
        Ok(response)
    }

    pub(crate) async fn run_error(&self, mut error: Error) -> Error {
        for interceptor in &self.error {
            if let Some(replacement) = interceptor.intercept(&error).await {
                error = replacement;
            }
        }
        error
    }
}

struct RequestFn<F>(F);

#[async_trait]
impl<F> RequestInterceptor for RequestFn<F>
where
    F: Fn(Request) -> Result<Request, Error> + Send + Sync,
{
    async fn intercept(&self, request: Request) -> Result<Request, Error> {
        (self.0)(request)
    }
}

struct ResponseFn<F>(F);

#[async_trait]
impl<F> ResponseInterceptor for ResponseFn<F>
where
    F: Fn(Response) -> Result<Response, Error> + Send + Sync,
{
    async fn intercept(&self, response: Response) -> Result<Response, Error> {
        (self.0)(response)
    }
}

struct ErrorFn<F>(F);

#[async_trait]
impl<F> ErrorInterceptor for ErrorFn<F>
where
    F: Fn(&Error) -> Option<Error> + Send + Sync,
{
    async fn intercept(&self, error: &Error) -> Option<Error> {
        (self.0)(error)
    }
}

/// Wrap a synchronous closure as a request interceptor.
pub fn request_fn<F>(f: F) -> Arc<dyn RequestInterceptor>
where
    F: Fn(Request) -> Result<Request, Error> + Send + Sync + 'static,
{
    Arc::new(RequestFn(f))
}

/// Wrap a synchronous closure as a response interceptor.
pub fn response_fn<F>(f: F) -> Arc<dyn ResponseInterceptor>
where
    F: Fn(Response) -> Result<Response, Error> + Send + Sync + 'static,
{
    Arc::new(ResponseFn(f))
}

/// Wrap a synchronous closure as an error interceptor.
pub fn error_fn<F>(f: F) -> Arc<dyn ErrorInterceptor>
where
    F: Fn(&Error) -> Option<Error> + Send + Sync + 'static,
{
    Arc::new(ErrorFn(f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;

    #[tokio::test]
    async fn request_chain_runs_in_registration_order() {
        let mut set = InterceptorSet::default();
        set.push_request(request_fn(|req| Ok(req.header("x-order", "first"))));
        set.push_request(request_fn(|req| Ok(req.header("x-order", "second"))));

        let out = set.run_request(Request::get("/a")).await.unwrap();
        assert_eq!(out.headers.get("x-order").unwrap(), "second");
    }

    #[tokio::test]
    async fn request_chain_aborts_on_error() {
        let mut set = InterceptorSet::default();
        set.push_request(request_fn(|_| {
            Err(Error::Network { url: "u".into(), message: "rejected".into() })
        }));
        set.push_request(request_fn(|req| Ok(req.header("x-late", "1"))));

        let err = set.run_request(Request::get("/a")).await.unwrap_err();
        assert!(err.to_string().contains("rejected"));
    }

    #[tokio::test]
    async fn error_chain_replaces_and_preserves() {
        let mut set = InterceptorSet::default();
        // First interceptor rewrites, second observes without replacing.
        set.push_error(error_fn(|_| {
            Some(Error::Network { url: "u".into(), message: "rewritten".into() })
        }));
        set.push_error(error_fn(|_| None));

        let out = set.run_error(Error::Cancelled { url: "u".into() }).await;
        assert!(out.is_network());
        assert!(out.to_string().contains("rewritten"));
    }

    #[tokio::test]
    async fn empty_chains_pass_values_through() {
        let set = InterceptorSet::default();
        let req = set.run_request(Request::get("/a")).await.unwrap();
        assert_eq!(req.url, "/a");
        let err = set.run_error(Error::Cancelled { url: "u".into() }).await;
        assert!(err.is_cancelled());
    }
}

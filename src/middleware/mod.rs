//! Request middleware
//!
//! Every filter, policy and handler is compiled down to a [`Middleware`]: a
//! function of the request and the rest of the chain. A middleware either
//! answers the request itself or hands it on with [`Next::run`].

use crate::exception::HttpException;
use axum::{body::Body, http::Request, response::Response};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub mod builtins;
mod table;

pub use table::{MiddlewareEntry, MiddlewareTable};

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Result of running a middleware.
pub type MiddlewareResult = Result<Response, HttpException>;

/// A type-erased, shareable request middleware.
pub type Middleware = Arc<dyn Fn(Request<Body>, Next) -> BoxFuture<MiddlewareResult> + Send + Sync>;

/// Wrap an async closure as a [`Middleware`].
///
/// ```rust,ignore
/// let hello = middleware(|_req, _next| async { Ok("hello".into_response()) });
/// ```
pub fn middleware<F, Fut>(f: F) -> Middleware
where
    F: Fn(Request<Body>, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MiddlewareResult> + Send + 'static,
{
    Arc::new(move |request: Request<Body>, next: Next| -> BoxFuture<MiddlewareResult> {
        Box::pin(f(request, next))
    })
}

/// Represents the rest of the chain
pub struct Next {
    run: Box<dyn FnOnce(Request<Body>) -> BoxFuture<MiddlewareResult> + Send>,
}

impl Next {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(Request<Body>) -> BoxFuture<MiddlewareResult> + Send + 'static,
    {
        Self { run: Box::new(f) }
    }

    /// Execute the next middleware
    pub async fn run(self, request: Request<Body>) -> MiddlewareResult {
        (self.run)(request).await
    }
}

/// An ordered, immutable middleware chain mounted at one route.
#[derive(Clone)]
pub struct Chain {
    middleware: Arc<[Middleware]>,
}

impl Chain {
    pub fn new(middleware: Vec<Middleware>) -> Self {
        Self {
            middleware: middleware.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// Run the chain, rendering a short-circuiting exception as its response.
    pub async fn handle(&self, request: Request<Body>) -> Response {
        use axum::response::IntoResponse;

        match self.run(request).await {
            Ok(response) => response,
            Err(exception) => exception.into_response(),
        }
    }

    pub fn run(&self, request: Request<Body>) -> BoxFuture<MiddlewareResult> {
        dispatch(Arc::clone(&self.middleware), 0, request)
    }
}

fn dispatch(
    middleware: Arc<[Middleware]>,
    index: usize,
    request: Request<Body>,
) -> BoxFuture<MiddlewareResult> {
    let Some(current) = middleware.get(index).cloned() else {
        // The last middleware handed the request on; nothing is left to answer it.
        let path = request.uri().path().to_string();
        return Box::pin(async move { Err(HttpException::not_found(format!("No handler for {}", path))) });
    };

    let next = Next::new(move |request| dispatch(middleware, index + 1, request));
    current(request, next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, StatusCode};
    use axum::response::IntoResponse;

    fn tag(value: &'static str) -> Middleware {
        middleware(move |mut req: Request<Body>, next: Next| async move {
            let trail = req
                .headers()
                .get("x-trail")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            req.headers_mut().insert(
                "x-trail",
                HeaderValue::from_str(&format!("{}{}", trail, value)).unwrap(),
            );
            next.run(req).await
        })
    }

    fn echo_trail() -> Middleware {
        middleware(|req: Request<Body>, _next: Next| async move {
            let trail = req.headers().get("x-trail").cloned();
            Ok(trail.map(|t| t.to_str().unwrap().to_string()).unwrap_or_default().into_response())
        })
    }

    #[tokio::test]
    async fn test_chain_runs_in_order() {
        let chain = Chain::new(vec![tag("a"), tag("b"), echo_trail()]);
        let response = chain.handle(Request::new(Body::empty())).await;
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"ab");
    }

    #[tokio::test]
    async fn test_exception_short_circuits() {
        let deny = middleware(|_req, _next| async {
            Err(HttpException::forbidden("nope".to_string()))
        });
        let chain = Chain::new(vec![deny, echo_trail()]);
        let response = chain.handle(Request::new(Body::empty())).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_falling_off_the_end_is_not_found() {
        let chain = Chain::new(vec![tag("a")]);
        let response = chain.handle(Request::new(Body::empty())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

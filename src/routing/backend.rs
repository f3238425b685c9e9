//! HTTP collaborator
//!
//! The routing core only needs a handful of operations from the HTTP layer:
//! create a named router, mount a chain at a method and url, apply global
//! middleware, and bind a listener. [`AxumBackend`] provides them on axum.
//!
//! Named routers are groupings over a single listener, so they share one url
//! namespace: the same method and url mounted on two routers is a duplicate.

use crate::config::AppConfig;
use crate::error::Result;
use crate::exception::HttpException;
use crate::middleware::{BoxFuture, Chain, Middleware, MiddlewareResult, Next};
use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    error_handling::HandleErrorLayer,
    http::{Method, Request},
    response::{IntoResponse, Response},
    routing::{MethodFilter, MethodRouter},
};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower::{BoxError, ServiceBuilder};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MountError {
    #[error("router '{0}' was never created")]
    UnknownRouter(String),

    #[error("unsupported method '{0}'")]
    UnsupportedMethod(String),

    #[error("{method} {url} is already mounted")]
    Duplicate { method: String, url: String },

    #[error("{url} conflicts with mounted path {existing}")]
    Conflict { url: String, existing: String },

    #[error("invalid path {url}: {reason}")]
    InvalidPath { url: String, reason: &'static str },
}

#[async_trait]
pub trait RouterBackend: Send {
    fn create_router(&mut self, name: &str);

    fn has_router(&self, name: &str) -> bool;

    fn mount(&mut self, router: &str, method: &str, url: &str, chain: Chain) -> std::result::Result<(), MountError>;

    /// Middleware wrapping every mounted route, outermost first.
    fn apply_middleware(&mut self, middleware: Vec<Middleware>);

    /// Cap in-flight requests across all routes; requests beyond `max` get 503.
    fn limit_concurrency(&mut self, max: usize);

    /// The composed request handler for everything mounted so far.
    fn router(&self) -> Router;

    async fn listen(&mut self, config: &AppConfig) -> Result<SocketAddr>;

    fn local_addr(&self) -> Option<SocketAddr>;

    async fn shutdown(&mut self);
}

struct RunningServer {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
}

/// Mounts chains on axum method routers and serves them with `axum::serve`.
#[derive(Default)]
pub struct AxumBackend {
    routers: HashSet<String>,
    paths: Vec<(String, MethodRouter)>,
    mounted: HashSet<(Method, String)>,
    shapes: HashMap<String, String>,
    middleware: Vec<Middleware>,
    concurrency: Option<GlobalConcurrencyLimitLayer>,
    local_addr: Option<SocketAddr>,
    server: Option<RunningServer>,
}

impl AxumBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RouterBackend for AxumBackend {
    fn create_router(&mut self, name: &str) {
        if self.routers.insert(name.to_string()) {
            tracing::debug!("Created router '{}'", name);
        }
    }

    fn has_router(&self, name: &str) -> bool {
        self.routers.contains(name)
    }

    fn mount(&mut self, router: &str, method: &str, url: &str, chain: Chain) -> std::result::Result<(), MountError> {
        if !self.routers.contains(router) {
            return Err(MountError::UnknownRouter(router.to_string()));
        }
        let method = Method::from_bytes(method.to_uppercase().as_bytes())
            .map_err(|_| MountError::UnsupportedMethod(method.to_string()))?;
        let filter = MethodFilter::try_from(method.clone())
            .map_err(|_| MountError::UnsupportedMethod(method.to_string()))?;

        let path = axum_path(url);
        validate_path(&path).map_err(|reason| MountError::InvalidPath {
            url: url.to_string(),
            reason,
        })?;
        if !self.mounted.insert((method.clone(), path.clone())) {
            return Err(MountError::Duplicate {
                method: method.to_string(),
                url: url.to_string(),
            });
        }
        // Paths differing only in parameter names collide inside axum's matcher.
        let shape = path_shape(&path);
        if let Some(existing) = self.shapes.get(&shape).filter(|existing| **existing != path) {
            self.mounted.remove(&(method, path));
            return Err(MountError::Conflict {
                url: url.to_string(),
                existing: existing.clone(),
            });
        }
        self.shapes.insert(shape, path.clone());

        let handler = move |request: Request<Body>| async move { chain.handle(request).await };
        match self.paths.iter_mut().find(|(existing, _)| *existing == path) {
            Some((_, routes)) => {
                *routes = std::mem::replace(routes, MethodRouter::new()).on(filter, handler);
            }
            None => self.paths.push((path, MethodRouter::new().on(filter, handler))),
        }

        tracing::debug!("Mounted {} {} on '{}'", method, url, router);
        Ok(())
    }

    fn apply_middleware(&mut self, middleware: Vec<Middleware>) {
        self.middleware = middleware;
    }

    fn limit_concurrency(&mut self, max: usize) {
        tracing::debug!("Limiting in-flight requests to {}", max);
        self.concurrency = Some(GlobalConcurrencyLimitLayer::new(max));
    }

    fn router(&self) -> Router {
        let mut app = Router::new();
        for (path, routes) in &self.paths {
            app = app.route(path, routes.clone());
        }
        // Layers wrap what is already there, so the first middleware is applied last.
        for middleware in self.middleware.iter().rev() {
            app = app.layer(axum::middleware::from_fn(adapt(Arc::clone(middleware))));
        }
        if let Some(limit) = &self.concurrency {
            app = app.layer(
                ServiceBuilder::new()
                    .layer(HandleErrorLayer::new(overloaded))
                    .load_shed()
                    .layer(limit.clone()),
            );
        }
        app
    }

    async fn listen(&mut self, config: &AppConfig) -> Result<SocketAddr> {
        if config.certificate.is_some() {
            tracing::warn!("TLS is terminated outside this backend; serving plain HTTP");
        }

        let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let (shutdown, signal) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = signal.await;
                })
                .await
        });

        tracing::info!("Listening on http://{}", addr);
        self.local_addr = Some(addr);
        self.server = Some(RunningServer { shutdown, task });
        Ok(addr)
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    async fn shutdown(&mut self) {
        let Some(server) = self.server.take() else {
            return;
        };
        let _ = server.shutdown.send(());
        match server.task.await {
            Ok(Ok(())) => tracing::info!("Server stopped"),
            Ok(Err(e)) => tracing::error!("Server stopped with error: {}", e),
            Err(e) => tracing::error!("Server task failed: {}", e),
        }
    }
}

/// Run a [`Middleware`] as an axum `from_fn` layer.
fn adapt(
    middleware: Middleware,
) -> impl Fn(Request<Body>, axum::middleware::Next) -> BoxFuture<axum::response::Response> + Clone + Send + Sync + 'static {
    move |request: Request<Body>, inner: axum::middleware::Next| -> BoxFuture<axum::response::Response> {
        let next = Next::new(move |request| -> BoxFuture<MiddlewareResult> {
            Box::pin(async move { Ok(inner.run(request).await) })
        });
        let response = middleware(request, next);
        Box::pin(async move { response.await.unwrap_or_else(IntoResponse::into_response) })
    }
}

async fn overloaded(err: BoxError) -> Response {
    tracing::warn!("Rejecting request: {}", err);
    HttpException::service_unavailable("Server is at capacity".to_string()).into_response()
}

/// Rewrite `:param` and `*` segments into axum path syntax.
pub fn axum_path(url: &str) -> String {
    let trimmed = url.trim();
    let mut segments = Vec::new();
    for segment in trimmed.trim_start_matches('/').split('/') {
        let segment = if let Some(name) = segment.strip_prefix(':') {
            format!("{{{}}}", name)
        } else if segment == "*" {
            "{*wildcard}".to_string()
        } else if let Some(name) = segment.strip_prefix('*') {
            format!("{{*{}}}", name)
        } else {
            segment.to_string()
        };
        segments.push(segment);
    }
    format!("/{}", segments.join("/"))
}

/// Reject paths axum's matcher would refuse at router construction.
fn validate_path(path: &str) -> std::result::Result<(), &'static str> {
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    let mut names = HashSet::new();
    for (index, segment) in segments.iter().enumerate() {
        let name = match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(inner) => match inner.strip_prefix('*') {
                Some(_) if index + 1 != segments.len() => return Err("catch-all must be the last segment"),
                Some(name) => name,
                None => inner,
            },
            None if segment.contains(['{', '}']) => return Err("braces outside a parameter"),
            None => continue,
        };
        if name.is_empty() || name.contains(['{', '}', '*']) {
            return Err("empty or malformed parameter name");
        }
        if !names.insert(name) {
            return Err("repeated parameter name");
        }
    }
    Ok(())
}

fn path_shape(path: &str) -> String {
    path.split('/')
        .map(|segment| match segment {
            s if s.starts_with("{*") => "*",
            s if s.starts_with('{') => ":",
            s => s,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::middleware;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    fn text(body: &'static str) -> Chain {
        Chain::new(vec![middleware(move |_req, _next| async move { Ok(body.into_response()) })])
    }

    async fn call(router: Router, method: Method, uri: &str) -> (StatusCode, String) {
        let request = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn test_axum_path() {
        assert_eq!(axum_path("/user/:id"), "/user/{id}");
        assert_eq!(axum_path("/files/*"), "/files/{*wildcard}");
        assert_eq!(axum_path("/files/*rest"), "/files/{*rest}");
        assert_eq!(axum_path("/"), "/");
        assert_eq!(axum_path("about"), "/about");
    }

    #[tokio::test]
    async fn test_mount_and_route() {
        let mut backend = AxumBackend::new();
        backend.create_router("default");
        backend.mount("default", "get", "/hello", text("hi")).unwrap();
        backend.mount("default", "delete", "/hello", text("bye")).unwrap();

        assert_eq!(call(backend.router(), Method::GET, "/hello").await, (StatusCode::OK, "hi".into()));
        assert_eq!(call(backend.router(), Method::DELETE, "/hello").await.1, "bye");
        assert_eq!(call(backend.router(), Method::GET, "/nope").await.0, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_mount_rejections() {
        let mut backend = AxumBackend::new();
        assert_eq!(
            backend.mount("api", "get", "/x", text("x")),
            Err(MountError::UnknownRouter("api".into()))
        );

        backend.create_router("default");
        backend.mount("default", "get", "/user/:id", text("a")).unwrap();
        assert!(matches!(
            backend.mount("default", "get", "/user/:id", text("b")),
            Err(MountError::Duplicate { .. })
        ));
        assert!(matches!(
            backend.mount("default", "post", "/user/:name", text("c")),
            Err(MountError::Conflict { .. })
        ));
        assert!(matches!(
            backend.mount("default", "bogus method", "/x", text("d")),
            Err(MountError::UnsupportedMethod(_))
        ));
    }

    #[test]
    fn test_malformed_paths_are_not_mounted() {
        let mut backend = AxumBackend::new();
        backend.create_router("default");
        for url in ["/files/*/meta", "/user/:", "/pair/:id/:id", "/a/{b", "/x/*rest/y"] {
            assert!(
                matches!(
                    backend.mount("default", "get", url, text("x")),
                    Err(MountError::InvalidPath { .. })
                ),
                "{} should be rejected",
                url
            );
        }
        backend.mount("default", "get", "/files/*", text("files")).unwrap();
        backend.mount("default", "get", "/pair/:a/:b", text("pair")).unwrap();
        let _ = backend.router();
    }

    #[tokio::test]
    async fn test_concurrency_limit() {
        let mut backend = AxumBackend::new();
        backend.create_router("default");
        backend.mount("default", "get", "/", text("ok")).unwrap();

        backend.limit_concurrency(1);
        assert_eq!(call(backend.router(), Method::GET, "/").await.0, StatusCode::OK);

        backend.limit_concurrency(0);
        assert_eq!(
            call(backend.router(), Method::GET, "/").await.0,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_routers_share_one_namespace() {
        let mut backend = AxumBackend::new();
        backend.create_router("default");
        backend.create_router("api");
        backend.mount("default", "get", "/status", text("a")).unwrap();
        assert!(matches!(
            backend.mount("api", "get", "/status", text("b")),
            Err(MountError::Duplicate { .. })
        ));
        backend.mount("api", "post", "/status", text("c")).unwrap();
    }

    #[tokio::test]
    async fn test_middleware_wraps_in_order() {
        let mut backend = AxumBackend::new();
        backend.create_router("default");
        backend.mount("default", "get", "/", text("inner")).unwrap();

        let outer = middleware(|_req, _next| async { Ok((StatusCode::ACCEPTED, "outer").into_response()) });
        let passthrough = middleware(|req, next: Next| async move { next.run(req).await });
        backend.apply_middleware(vec![outer, passthrough]);

        assert_eq!(
            call(backend.router(), Method::GET, "/").await,
            (StatusCode::ACCEPTED, "outer".into())
        );
    }

    #[tokio::test]
    async fn test_listen_and_shutdown() {
        let mut backend = AxumBackend::new();
        backend.create_router("default");
        backend.mount("default", "get", "/", text("up")).unwrap();

        let config = AppConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..AppConfig::default()
        };
        let addr = backend.listen(&config).await.unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(backend.local_addr(), Some(addr));
        backend.shutdown().await;
    }
}

//! Minimal application: one service, one filter, one model, two controllers.
//!
//! ```sh
//! PORT=8080 cargo run --example hello
//! curl localhost:8080/                    # public
//! curl localhost:8080/api/todo            # generated REST route
//! curl -H 'x-token: secret' localhost:8080/admin
//! ```

use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use trellis::prelude::*;
use trellis::routing::routes_from_json;

struct Counter {
    hits: AtomicU64,
}

impl Component for Counter {}
impl Service for Counter {}

struct TokenFilter {
    token: String,
}

impl Component for TokenFilter {}

#[async_trait]
impl Filter for TokenFilter {
    async fn handle(&self, request: Request<Body>, next: Next) -> MiddlewareResult {
        match request.headers().get("x-token").and_then(|v| v.to_str().ok()) {
            Some(token) if token == self.token => next.run(request).await,
            _ => Err(HttpException::unauthorized("missing or invalid x-token".to_string())),
        }
    }
}

struct Todo;

impl Component for Todo {}
impl Model for Todo {}

struct PageController {
    app: AppHandle,
}

impl Component for PageController {}

impl Controller for PageController {
    fn action(self: Arc<Self>, name: &str) -> Option<Middleware> {
        match name {
            "home" => Some(bind(self, |this, _req, _next| async move {
                let hits = this
                    .app
                    .service_as::<Counter>("Counter")
                    .map_or(0, |counter| counter.hits.fetch_add(1, Ordering::Relaxed) + 1);
                Ok(format!("hello, visitor #{}", hits).into_response())
            })),
            "admin" => Some(bind(self, |_this, _req, _next| async { Ok("welcome, admin".into_response()) })),
            _ => None,
        }
    }
}

/// Answers every generated REST action with the model it was generated for.
struct RestController;

impl Component for RestController {}

impl Controller for RestController {
    fn action(self: Arc<Self>, name: &str) -> Option<Middleware> {
        let action = name.to_string();
        Some(bind(self, move |_this, request, _next| {
            let action = action.clone();
            async move {
                let model = request
                    .extensions()
                    .get::<RouteModel>()
                    .map(|m| m.0.clone())
                    .unwrap_or_default();
                Ok(axum::Json(json!({ "model": model, "action": action })).into_response())
            }
        }))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info,trellis=debug").init();

    let config = AppConfig::from_json_str(
        &json!({
            "port": 1337,
            "security_filter": "TokenFilter",
            "routes": {
                "rest": {
                    "controller": "RestController",
                    "actions": { "find": "get /api/{model}", "create": "post /api/{model}" }
                }
            }
        })
        .to_string(),
    )?
    .with_env_overrides()?;

    let policies = PolicyMap::from_json(&json!({
        "*": true,
        "PageController": { "admin": false }
    }))?;
    let routes = routes_from_json(&json!({
        "/": "PageController.home",
        "/admin": "PageController.admin",
        "/home": { "redirect": "/" }
    }))?;

    let mut app = Application::builder()
        .config(config)
        .policies(policies)
        .routes(routes)
        .service("Counter", |_app| Ok(Counter { hits: AtomicU64::new(0) }))
        .filter("TokenFilter", |_app| Ok(TokenFilter { token: "secret".into() }))
        .model("TodoModel", |_app| Ok(Todo))
        .controller("PageController", |app| Ok(PageController { app: app.clone() }))
        .controller("RestController", |_app| Ok(RestController))
        .after("init:done", |_app| async {
            tracing::info!("All components ready");
            Ok(())
        })
        .build()?;

    app.start().await?;
    shutdown_signal().await;
    app.shutdown().await;
    Ok(())
}

//! # Trellis
//!
//! Bootstrap lifecycle, component registries and policy-driven route
//! compilation for axum applications.
//!
//! ## Features
//!
//! - **Staged Boot**: a fixed stage sequence with before/after hooks, driven automatically or step by step
//! - **Component Registries**: named services, filters, models and controllers, activated in registration order
//! - **Policies**: global, per-controller and per-action policies compiled into each route's middleware chain
//! - **Auto Routes**: REST/CRUD routes synthesized from templates for every model
//! - **Ordered Middleware**: application middleware with a strict, deterministic order
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use trellis::prelude::*;
//!
//! struct PageController;
//!
//! impl Component for PageController {}
//!
//! impl Controller for PageController {
//!     fn action(self: Arc<Self>, name: &str) -> Option<Middleware> {
//!         match name {
//!             "home" => Some(bind(self, |_this, _req, _next| async { Ok("home".into_response()) })),
//!             _ => None,
//!         }
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> trellis::Result<()> {
//!     let mut app = Application::builder()
//!         .config(AppConfig::default().with_env_overrides()?)
//!         .policies(PolicyMap::with_global(true))
//!         .controller("PageController", |_app| Ok(PageController))
//!         .route(Route::new("/", "PageController.home"))
//!         .build()?;
//!
//!     app.start().await?;
//!     shutdown_signal().await;
//!     app.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod component;
pub mod config;
pub mod context;
pub mod error;
pub mod exception;
pub mod lifecycle;
pub mod messaging;
pub mod middleware;
pub mod registry;
pub mod routing;

// Re-export core types
pub use context::{AppContext, AppHandle};
pub use error::{Result, TrellisError};
pub use lifecycle::{Application, ApplicationBuilder};

// Re-export commonly used types from dependencies
pub use async_trait::async_trait;
pub use axum;

/// Prelude module for convenient imports
///
/// ```
/// use trellis::prelude::*;
/// ```
pub mod prelude {
    pub use crate::component::{Component, Controller, Filter, Model, Service, bind};
    pub use crate::config::{AppConfig, Environment};
    pub use crate::context::{AppContext, AppHandle};
    pub use crate::error::{Result, TrellisError};
    pub use crate::exception::{ErrorTable, HttpException};
    pub use crate::lifecycle::{Application, ApplicationBuilder, Stage, StageCompleted, StageStep, shutdown_signal};
    pub use crate::messaging::EventBus;
    pub use crate::middleware::{Middleware, MiddlewareResult, Next, middleware};
    pub use crate::routing::{PolicyMap, PolicySpec, Route, RouteModel, RouteTarget, SecurityFilter};
    pub use async_trait::async_trait;
    pub use axum::{
        body::Body,
        http::{Request, StatusCode},
        response::{IntoResponse, Response},
    };
    pub use std::sync::Arc;
}

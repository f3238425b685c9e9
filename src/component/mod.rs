//! Component author contract
//!
//! Services, filters, models and controllers are all components: constructed
//! by a factory that receives an [`AppHandle`], optionally initialized right
//! after construction, and looked up by name through the host application.
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis::prelude::*;
//!
//! pub struct UserController {
//!     app: AppHandle,
//! }
//!
//! impl Component for UserController {}
//!
//! impl Controller for UserController {
//!     fn action(self: Arc<Self>, name: &str) -> Option<Middleware> {
//!         match name {
//!             "find" => Some(bind(self, |_this, _req, _next| async {
//!                 Ok("[]".into_response())
//!             })),
//!             _ => None,
//!         }
//!     }
//! }
//! ```

use crate::context::AppHandle;
use crate::error::Result;
use crate::middleware::{BoxFuture, Middleware, MiddlewareResult, Next};
use async_trait::async_trait;
use axum::{body::Body, http::Request};
use std::any::Any;
use std::future::Future;
use std::sync::Arc;

/// Recover the concrete type behind a component trait object.
pub trait AsAny: Send + Sync + 'static {
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Base trait for everything stored in a registry.
pub trait Component: AsAny {
    /// Post-construction initializer, called once right after the factory.
    fn initialize(&self, _app: &AppHandle) -> Result<()> {
        Ok(())
    }
}

pub trait Service: Component {}

pub trait Model: Component {}

/// A request filter, usable by name in policies and route filter lists.
///
/// `"AuthFilter"` resolves to [`Filter::handle`], `"AuthFilter.admin"` to the
/// `admin` entry of [`Filter::action`].
#[async_trait]
pub trait Filter: Component {
    async fn handle(&self, request: Request<Body>, next: Next) -> MiddlewareResult;

    fn action(self: Arc<Self>, _name: &str) -> Option<Middleware> {
        None
    }
}

/// A route handler provider; `"UserController.find"` resolves to `action("find")`.
pub trait Controller: Component {
    fn action(self: Arc<Self>, name: &str) -> Option<Middleware>;
}

/// Bind a middleware to its owning instance.
pub fn bind<C, F, Fut>(instance: Arc<C>, f: F) -> Middleware
where
    C: ?Sized + Send + Sync + 'static,
    F: Fn(Arc<C>, Request<Body>, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MiddlewareResult> + Send + 'static,
{
    Arc::new(move |request: Request<Body>, next: Next| -> BoxFuture<MiddlewareResult> {
        Box::pin(f(Arc::clone(&instance), request, next))
    })
}

/// The [`Filter::handle`] of `filter` as a middleware.
pub fn filter_middleware(filter: Arc<dyn Filter>) -> Middleware {
    Arc::new(move |request: Request<Body>, next: Next| -> BoxFuture<MiddlewareResult> {
        let filter = Arc::clone(&filter);
        Box::pin(async move { filter.handle(request, next).await })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Chain;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    struct Greeter {
        greeting: &'static str,
    }

    impl Component for Greeter {}

    impl Controller for Greeter {
        fn action(self: Arc<Self>, name: &str) -> Option<Middleware> {
            match name {
                "hello" => Some(bind(self, |this, _req, _next| async move {
                    Ok(this.greeting.into_response())
                })),
                _ => None,
            }
        }
    }

    struct Teapot;

    impl Component for Teapot {}

    #[async_trait]
    impl Filter for Teapot {
        async fn handle(&self, _request: Request<Body>, _next: Next) -> MiddlewareResult {
            Ok(StatusCode::IM_A_TEAPOT.into_response())
        }
    }

    #[tokio::test]
    async fn test_bound_action_sees_instance() {
        let controller: Arc<dyn Controller> = Arc::new(Greeter { greeting: "hi" });
        let action = controller.action("hello").unwrap();
        let response = Chain::new(vec![action]).handle(Request::new(Body::empty())).await;
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"hi");
    }

    #[tokio::test]
    async fn test_filter_middleware_calls_handle() {
        let filter: Arc<dyn Filter> = Arc::new(Teapot);
        let response = Chain::new(vec![filter_middleware(filter)])
            .handle(Request::new(Body::empty()))
            .await;
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    }

    #[test]
    fn test_downcast_through_trait_object() {
        let controller: Arc<dyn Controller> = Arc::new(Greeter { greeting: "hey" });
        let greeter = AsAny::as_any(controller).downcast::<Greeter>().unwrap();
        assert_eq!(greeter.greeting, "hey");
    }
}

use crate::exception::HttpException;
use crate::middleware::{Middleware, Next, middleware};
use axum::{
    body::Body,
    http::{HeaderValue, Request, StatusCode, header},
    response::IntoResponse,
};
use std::sync::Arc;
use std::time::Instant;

/// Logs method, uri, status and latency, tagging each request with an id.
pub fn request_logger() -> Middleware {
    middleware(|request: Request<Body>, next: Next| async move {
        let method = request.method().clone();
        let uri = request.uri().clone();
        let request_id = uuid::Uuid::new_v4();
        let start = Instant::now();

        tracing::debug!(%request_id, "--> {} {}", method, uri);

        match next.run(request).await {
            Ok(mut response) => {
                tracing::info!(
                    %request_id,
                    "<-- {} {} {} {:?}",
                    method,
                    uri,
                    response.status(),
                    start.elapsed()
                );
                if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
                    response.headers_mut().insert("x-request-id", value);
                }
                Ok(response)
            }
            Err(e) => {
                tracing::info!(%request_id, "<-- {} {} {} {:?}", method, uri, e, start.elapsed());
                Err(e)
            }
        }
    })
}

/// Rejects every request with 403; the security filter when none is configured.
pub fn deny_all() -> Middleware {
    middleware(|request: Request<Body>, _next: Next| async move {
        tracing::debug!("Denied {} {}", request.method(), request.uri());
        Err(HttpException::forbidden("Access denied".to_string()))
    })
}

/// Answers with a 302 to `target`; the default `redirect` shortcut handler.
pub fn redirect(target: impl Into<String>) -> Middleware {
    let target: Arc<str> = Arc::from(target.into());
    middleware(move |_request: Request<Body>, _next: Next| {
        let target = Arc::clone(&target);
        async move {
            let location = HeaderValue::from_str(&target).map_err(|_| {
                HttpException::server_error(format!("Invalid redirect target '{}'", target))
            })?;
            Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Chain;

    fn ok() -> Middleware {
        middleware(|_req, _next| async { Ok(StatusCode::OK.into_response()) })
    }

    #[tokio::test]
    async fn test_deny_all_is_forbidden() {
        let response = Chain::new(vec![deny_all(), ok()])
            .handle(Request::new(Body::empty()))
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_redirect_sets_location() {
        let response = Chain::new(vec![redirect("/login")])
            .handle(Request::new(Body::empty()))
            .await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/login");
    }

    #[tokio::test]
    async fn test_request_logger_tags_response() {
        let response = Chain::new(vec![request_logger(), ok()])
            .handle(Request::new(Body::empty()))
            .await;
        assert!(response.headers().contains_key("x-request-id"));
    }
}

//! Request logging middleware.

use axum::{
    extract::Request,
    http::{Method, StatusCode, Uri},
    middleware::Next,
    response::Response,
};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Request data captured before the request moves into the handler chain.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub method: Method,
    pub uri: Uri,
    pub start: Instant,
}

impl RequestContext {
    fn from_request(req: &Request) -> Self {
        Self {
            method: req.method().clone(),
            uri: req.uri().clone(),
            start: Instant::now(),
        }
    }

    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Logs at a level matching the response class.
    fn log_completion(&self, status: StatusCode) {
        let duration_ms = self.elapsed().as_millis();
        if status.is_server_error() {
            error!(
                method = %self.method,
                uri = %self.uri,
                status = status.as_u16(),
                duration_ms,
                "Server error occurred"
            );
        } else if status.is_client_error() {
            warn!(
                method = %self.method,
                uri = %self.uri,
                status = status.as_u16(),
                duration_ms,
                "Client error occurred"
            );
        } else {
            info!(
                method = %self.method,
                uri = %self.uri,
                status = status.as_u16(),
                duration_ms,
                "Request completed"
            );
        }
    }
}

/// Logs every request with its status and duration.
pub async fn logging_middleware(req: Request, next: Next) -> Response {
    let ctx = RequestContext::from_request(&req);

    let response = next.run(req).await;

    ctx.log_completion(response.status());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, routing::get};
    use tower::ServiceExt;

    #[test]
    fn test_request_context_extraction() -> Result<(), axum::http::Error> {
        let request = axum::http::Request::builder()
            .uri("/favorites/?page=2")
            .method(Method::POST)
            .body(Body::empty())?;

        let ctx = RequestContext::from_request(&request);

        assert_eq!(ctx.method, Method::POST);
        assert_eq!(ctx.uri, "/favorites/?page=2");
        assert!(ctx.elapsed() < Duration::from_secs(1));
        Ok(())
    }

    #[tokio::test]
    async fn test_logging_middleware_passes_response_through()
    -> Result<(), Box<dyn std::error::Error>> {
        let app = Router::new()
            .route("/ok", get(|| async { "OK" }))
            .route("/teapot", get(|| async { StatusCode::IM_A_TEAPOT }))
            .layer(axum::middleware::from_fn(logging_middleware));

        let ok = app
            .clone()
            .oneshot(axum::http::Request::builder().uri("/ok").body(Body::empty())?)
            .await?;
        let teapot = app
            .oneshot(axum::http::Request::builder().uri("/teapot").body(Body::empty())?)
            .await?;

        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(teapot.status(), StatusCode::IM_A_TEAPOT);
        Ok(())
    }
}

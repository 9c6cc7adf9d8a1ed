use std::time::Instant;

use axum::http;
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next, Result as MiddlewareResult};
use tracing::{info, warn};

/// Logs every outgoing GitHub API call with its outcome and latency.
///
/// Only the method and path are logged; query strings and headers carry
/// nothing useful here and headers carry the installation token.
#[derive(Debug, Default, Clone, Copy)]
pub struct ApiTraceMiddleware;

#[async_trait::async_trait]
impl Middleware for ApiTraceMiddleware {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> MiddlewareResult<Response> {
        let method = req.method().clone();
        let path = req.url().path().to_string();
        let started = Instant::now();

        let response = next.run(req, extensions).await;
        let elapsed_ms = started.elapsed().as_millis();

        match &response {
            Ok(resp) if resp.status().is_success() => {
                info!("GitHub {} {} -> {} ({} ms)", method, path, resp.status(), elapsed_ms);
            }
            Ok(resp) => {
                warn!("GitHub {} {} -> {} ({} ms)", method, path, resp.status(), elapsed_ms);
            }
            Err(e) => {
                warn!("GitHub {} {} failed after {} ms: {}", method, path, elapsed_ms, e);
            }
        }

        response
    }
}

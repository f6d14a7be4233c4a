//! API key middleware for the bridge HTTP API.
//!
//! With a key configured, every request outside the exempt paths must carry
//! it in `X-API-Key` or `Authorization: Bearer <token>`. Without one every
//! request passes (development mode).

use axum::{
    body::Body,
    http::{Request, Response, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use std::task::{Context, Poll};
use subtle::ConstantTimeEq;
use tower::{Layer, Service};

use pb_api_types::ErrorBody;

/// Paths reachable without a key, so that liveness probes need no secret.
pub const EXEMPT_PATHS: &[&str] = &["/health"];

#[derive(Clone)]
pub struct AuthLayer {
    api_key: Option<Arc<String>>,
}

impl AuthLayer {
    /// `Some(key)` enforces auth, `None` allows everything.
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.map(Arc::new),
        }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            api_key: self.api_key.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    api_key: Option<Arc<String>>,
}

fn presented_key(req: &Request<Body>) -> Option<String> {
    let headers = req.headers();
    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| {
            headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(str::to_string)
        })
}

impl<S> Service<Request<Body>> for AuthMiddleware<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let api_key = self.api_key.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let expected = match api_key {
                Some(k) if !EXEMPT_PATHS.contains(&req.uri().path()) => k,
                _ => return inner.call(req).await,
            };

            match presented_key(&req) {
                Some(token) if bool::from(token.as_bytes().ct_eq(expected.as_bytes())) => {
                    inner.call(req).await
                }
                _ => {
                    tracing::warn!(path = %req.uri().path(), "rejected request without valid API key");
                    let body = ErrorBody {
                        error: "unauthorized".into(),
                    };
                    Ok((StatusCode::UNAUTHORIZED, Json(body)).into_response())
                }
            }
        })
    }
}

//! Read-through response cache middleware.
//!
//! Wraps individual read routes. A stored body for the caller's key is
//! served directly with `X-Cache: HIT`; otherwise the route runs, the
//! response is marked `X-Cache: MISS`, and a `200 OK` body is stored for
//! the configured TTL. Store failures never fail the request.

use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderValue, Method, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, instrument, warn};

use super::{
    METRIC_CACHE_HIT, METRIC_CACHE_MISS, METRIC_CACHE_STORE_ERROR, keys::CacheKey,
    store::CacheHandle,
};
use crate::application::auth::AuthUser;

pub const X_CACHE: &str = "x-cache";

/// Shared cache state for the middleware.
#[derive(Clone, Debug)]
pub struct CacheState {
    pub handle: CacheHandle,
    pub ttl: Duration,
}

impl CacheState {
    pub fn new(handle: CacheHandle, ttl: Duration) -> Self {
        Self { handle, ttl }
    }
}

#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn response_cache_layer(
    State(cache): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() != Method::GET {
        return next.run(request).await;
    }

    let target = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let identity = request
        .extensions()
        .get::<AuthUser>()
        .map(|user| user.user_id);
    let key = CacheKey::derive(&target, identity);

    match cache.handle.get(key.as_str()).await {
        Ok(Some(body)) => {
            debug!(cache = cache.handle.backend(), outcome = "hit", "serving cached response");
            metrics::counter!(METRIC_CACHE_HIT).increment(1);
            return cached_response(body);
        }
        Ok(None) => {}
        Err(err) => {
            warn!(
                target = "smartfile::cache::middleware",
                op = "get",
                error = %err,
                "Cache lookup failed; serving uncached"
            );
            metrics::counter!(METRIC_CACHE_STORE_ERROR, "op" => "get").increment(1);
        }
    }

    debug!(cache = cache.handle.backend(), outcome = "miss", "executing handler");
    metrics::counter!(METRIC_CACHE_MISS).increment(1);

    let response = next.run(request).await;

    if response.status() != StatusCode::OK || !cache.handle.is_available() {
        return mark(response, "MISS");
    }

    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(
                target = "smartfile::cache::middleware",
                error = %err,
                "Failed to buffer response body"
            );
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if let Err(err) = cache
        .handle
        .set(key.as_str(), bytes.clone(), cache.ttl)
        .await
    {
        warn!(
            target = "smartfile::cache::middleware",
            op = "set",
            error = %err,
            "Cache write failed; response not cached"
        );
        metrics::counter!(METRIC_CACHE_STORE_ERROR, "op" => "set").increment(1);
    }

    mark(Response::from_parts(parts, Body::from(bytes)), "MISS")
}

fn cached_response(body: Bytes) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(X_CACHE, HeaderValue::from_static("HIT"));
    response
}

fn mark(mut response: Response, outcome: &'static str) -> Response {
    response
        .headers_mut()
        .insert(X_CACHE, HeaderValue::from_static(outcome));
    response
}

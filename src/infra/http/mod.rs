//! HTTP surface: router assembly, envelopes, and middleware.

mod auth;
mod error;
mod handlers;
mod middleware;
mod response;
mod state;

pub use middleware::X_REQUEST_ID;
pub use state::HttpState;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{delete, get, post},
};

use crate::cache::response_cache_layer;

use self::auth::require_auth;
use self::handlers::{auth as auth_handlers, files, monitoring};
use self::middleware::{log_responses, set_request_context};

/// Slack on top of the file limit for multipart boundaries and headers.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn build_router(state: HttpState) -> Router {
    let cached = || {
        axum_middleware::from_fn_with_state(state.cache.clone(), response_cache_layer)
    };
    let upload_limit = state
        .upload_body_limit
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    let public_routes = Router::new()
        .route("/health", get(monitoring::health))
        .route("/api/auth/register", post(auth_handlers::register))
        .route("/api/auth/login", post(auth_handlers::login));

    // Authentication is a route layer so it wraps, and therefore runs
    // before, the per-route cache layer.
    let protected_routes = Router::new()
        .route("/api/profile", get(auth_handlers::profile))
        .route("/api/metrics", get(monitoring::metrics))
        .route("/api/logs", get(monitoring::logs))
        .route("/api/files/statistics", get(files::statistics))
        .route("/api/files", get(files::list_files).layer(cached()))
        .route("/api/files/", get(files::list_files).layer(cached()))
        .route("/api/files/deleted", get(files::list_deleted).layer(cached()))
        .route(
            "/api/files/upload",
            post(files::upload_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/api/files/{id}",
            get(files::get_file)
                .layer(cached())
                .delete(files::delete_file),
        )
        .route("/api/files/{id}/restore", post(files::restore_file))
        .route("/api/files/{id}/permanent", delete(files::purge_file))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    public_routes
        .merge(protected_routes)
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::application::auth::AuthUser;

use super::error::ApiError;
use super::state::HttpState;

/// Require a valid `Authorization: Bearer <token>` header.
///
/// The verified [`AuthUser`] is placed in the request extensions for
/// handlers and the response cache, and echoed on the response for the
/// request logger.
pub async fn require_auth(
    State(state): State<HttpState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&request) else {
        return ApiError::unauthorized("Authorization header required").into_response();
    };

    let user = match state.auth.authenticate(token) {
        Ok(user) => user,
        Err(err) => return ApiError::from(err).into_response(),
    };

    request.extensions_mut().insert(user.clone());
    let mut response = next.run(request).await;
    response.extensions_mut().insert::<AuthUser>(user);
    response
}

fn bearer_token(request: &Request<Body>) -> Option<&str> {
    let value = request.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

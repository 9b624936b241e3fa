use axum::Json;
use axum::extract::{Extension, State, rejection::JsonRejection};
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use crate::application::auth::{AuthUser, RegisterInput};
use crate::infra::http::error::ApiError;
use crate::infra::http::response::ApiSuccess;
use crate::infra::http::state::HttpState;

const SOURCE: &str = "infra::http::handlers::auth";

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user_id: i64,
    pub email: String,
}

pub async fn register(
    State(state): State<HttpState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = payload.map_err(json_rejection)?;
    let session = state
        .auth
        .register(RegisterInput {
            name: body.name,
            email: body.email,
            password: body.password,
        })
        .await?;

    Ok(ApiSuccess::created("User registered successfully", session))
}

pub async fn login(
    State(state): State<HttpState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = payload.map_err(json_rejection)?;
    let session = state.auth.login(&body.email, &body.password).await?;

    Ok(ApiSuccess::ok("Login successful", session))
}

pub async fn profile(Extension(user): Extension<AuthUser>) -> impl IntoResponse {
    ApiSuccess::ok(
        "Profile retrieved successfully",
        ProfileResponse {
            user_id: user.user_id,
            email: user.email,
        },
    )
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    ApiError::bad_request(SOURCE, rejection.body_text())
}

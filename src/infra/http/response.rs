use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Success envelope: `{"status":"success","message":..,"data":..}`.
#[derive(Debug, Serialize)]
pub struct ApiSuccess<T: Serialize> {
    #[serde(skip)]
    code: StatusCode,
    status: &'static str,
    message: &'static str,
    data: Option<T>,
}

impl<T: Serialize> ApiSuccess<T> {
    pub fn ok(message: &'static str, data: T) -> Self {
        Self::with_status(StatusCode::OK, message, Some(data))
    }

    pub fn created(message: &'static str, data: T) -> Self {
        Self::with_status(StatusCode::CREATED, message, Some(data))
    }

    fn with_status(code: StatusCode, message: &'static str, data: Option<T>) -> Self {
        Self {
            code,
            status: "success",
            message,
            data,
        }
    }
}

impl ApiSuccess<()> {
    /// A success response whose `data` is `null`.
    pub fn message_only(message: &'static str) -> Self {
        Self::with_status(StatusCode::OK, message, None)
    }
}

impl<T: Serialize> IntoResponse for ApiSuccess<T> {
    fn into_response(self) -> Response {
        (self.code, Json(self)).into_response()
    }
}

use std::borrow::Cow;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::auth::AuthError;
use crate::application::error::ErrorReport;
use crate::application::files::FileServiceError;
use crate::application::monitoring::MonitoringError;
use crate::application::repos::RepoError;
use crate::infra::uploads::UploadStorageError;

const BYTES_PER_MIB: u64 = 1024 * 1024;

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    status: &'static str,
    message: &'a str,
}

/// Error response rendered as `{"status":"error","message":..}`.
///
/// The client sees `message`; the attached [`ErrorReport`] carries the
/// full diagnostic chain for the response logger.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: Cow<'static, str>,
    report: ErrorReport,
}

impl ApiError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        let message = message.into();
        let report = ErrorReport::from_message(source, status, message.to_string());
        Self {
            status,
            message,
            report,
        }
    }

    /// Build an error whose report records `error` and its sources.
    pub fn with_cause(
        source: &'static str,
        status: StatusCode,
        message: impl Into<Cow<'static, str>>,
        error: &dyn std::error::Error,
    ) -> Self {
        Self {
            status,
            message: message.into(),
            report: ErrorReport::from_error(source, status, error),
        }
    }

    pub fn bad_request(source: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(source, StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: &'static str) -> Self {
        Self::new("infra::http::auth", StatusCode::UNAUTHORIZED, message)
    }

    fn from_repo(source: &'static str, err: RepoError) -> Self {
        let (status, message) = match &err {
            RepoError::Timeout => (StatusCode::SERVICE_UNAVAILABLE, "Database timeout"),
            RepoError::Duplicate { .. } | RepoError::Integrity { .. } => {
                (StatusCode::CONFLICT, "Conflicting record")
            }
            RepoError::NotFound => (StatusCode::NOT_FOUND, "Resource not found"),
            RepoError::InvalidInput { .. } => (StatusCode::BAD_REQUEST, "Invalid input"),
            RepoError::Persistence(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };
        Self::with_cause(source, status, message, &err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            status: "error",
            message: &self.message,
        };
        let mut response = (self.status, Json(body)).into_response();
        self.report.attach(&mut response);
        response
    }
}

impl From<FileServiceError> for ApiError {
    fn from(err: FileServiceError) -> Self {
        const SOURCE: &str = "infra::http::files";
        match err {
            FileServiceError::NotFound | FileServiceError::DeletedNotFound => {
                let message = err.to_string();
                Self::new(SOURCE, StatusCode::NOT_FOUND, message)
            }
            FileServiceError::InvalidInput(message) => Self::bad_request(SOURCE, message),
            FileServiceError::Storage(storage) => Self::from_storage(SOURCE, storage),
            FileServiceError::Repo(repo) => Self::from_repo(SOURCE, repo),
        }
    }
}

impl ApiError {
    fn from_storage(source: &'static str, err: UploadStorageError) -> Self {
        match &err {
            UploadStorageError::PayloadTooLarge { limit } => {
                let message = format!("File size exceeds {}MB limit", limit / BYTES_PER_MIB);
                Self::with_cause(source, StatusCode::BAD_REQUEST, message, &err)
            }
            UploadStorageError::PayloadStream { .. } => Self::with_cause(
                source,
                StatusCode::BAD_REQUEST,
                "Failed to read uploaded file",
                &err,
            ),
            UploadStorageError::InvalidPath
            | UploadStorageError::Io(_)
            | UploadStorageError::SizeOverflow => Self::with_cause(
                source,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to save file",
                &err,
            ),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        const SOURCE: &str = "infra::http::auth";
        match err {
            AuthError::InvalidInput(message) => Self::bad_request(SOURCE, message),
            AuthError::EmailTaken => {
                Self::new(SOURCE, StatusCode::CONFLICT, "Email already registered")
            }
            AuthError::InvalidCredentials => Self::new(
                SOURCE,
                StatusCode::UNAUTHORIZED,
                "Invalid email or password",
            ),
            AuthError::InvalidToken(_) => Self::with_cause(
                SOURCE,
                StatusCode::UNAUTHORIZED,
                "Invalid or expired token",
                &err,
            ),
            AuthError::Issue(_) => Self::with_cause(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to generate token",
                &err,
            ),
            AuthError::Hashing(_) => Self::with_cause(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to hash password",
                &err,
            ),
            AuthError::Repo(repo) => Self::from_repo(SOURCE, repo),
        }
    }
}

impl From<MonitoringError> for ApiError {
    fn from(err: MonitoringError) -> Self {
        const SOURCE: &str = "infra::http::monitoring";
        match err {
            MonitoringError::Repo(repo) => Self::from_repo(SOURCE, repo),
            MonitoringError::NoLogFile | MonitoringError::Io(_) => Self::with_cause(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read logs",
                &err,
            ),
        }
    }
}

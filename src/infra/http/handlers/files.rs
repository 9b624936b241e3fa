//! File routes. Reads are wrapped by the response cache in the router;
//! mutations invalidate it through [`FileService`](crate::application::files::FileService).

use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Extension, Multipart, Path, Query, State};
use axum::response::IntoResponse;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use crate::application::auth::AuthUser;
use crate::application::files::ListQuery;
use crate::domain::entities::FileRecord;
use crate::infra::http::error::ApiError;
use crate::infra::http::response::ApiSuccess;
use crate::infra::http::state::HttpState;
use crate::infra::uploads::UploadStorageError;

const SOURCE: &str = "infra::http::handlers::files";
const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    #[serde(rename = "type")]
    pub file_type: Option<String>,
    pub status: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub search: Option<String>,
}

impl From<ListParams> for ListQuery {
    fn from(params: ListParams) -> Self {
        Self {
            page: params.page,
            limit: params.limit,
            file_type: params.file_type,
            status: params.status,
            sort: params.sort,
            order: params.order,
            search: params.search,
        }
    }
}

#[derive(Debug, Serialize)]
struct FilePayload {
    file: FileRecord,
}

pub async fn list_files(
    State(state): State<HttpState>,
    Extension(user): Extension<AuthUser>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(params) = params.map_err(|err| ApiError::bad_request(SOURCE, err.body_text()))?;
    let query = ListQuery::from(params).resolve();
    let listing = state.files.list(user.user_id, query).await?;

    Ok(ApiSuccess::ok("Files retrieved successfully", listing))
}

pub async fn list_deleted(
    State(state): State<HttpState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let listing = state.files.list_deleted(user.user_id).await?;
    Ok(ApiSuccess::ok("Deleted files retrieved successfully", listing))
}

pub async fn get_file(
    State(state): State<HttpState>,
    Extension(user): Extension<AuthUser>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = file_id(id)?;
    let file = state.files.find(user.user_id, id).await?;
    Ok(ApiSuccess::ok("File retrieved successfully", FilePayload { file }))
}

pub async fn upload_file(
    State(state): State<HttpState>,
    Extension(user): Extension<AuthUser>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::bad_request(SOURCE, err.body_text()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let original_name = field.file_name().unwrap_or_default().to_string();
        let payload = field.map_err(UploadStorageError::stream);
        let file = state
            .files
            .upload(user.user_id, &original_name, payload)
            .await?;

        return Ok(ApiSuccess::created(
            "File uploaded successfully",
            FilePayload { file },
        ));
    }

    Err(ApiError::bad_request(SOURCE, "File is required"))
}

pub async fn delete_file(
    State(state): State<HttpState>,
    Extension(user): Extension<AuthUser>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = file_id(id)?;
    state.files.delete(user.user_id, id).await?;
    Ok(ApiSuccess::message_only("File deleted successfully"))
}

pub async fn restore_file(
    State(state): State<HttpState>,
    Extension(user): Extension<AuthUser>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = file_id(id)?;
    let file = state.files.restore(user.user_id, id).await?;
    Ok(ApiSuccess::ok("File restored successfully", FilePayload { file }))
}

pub async fn purge_file(
    State(state): State<HttpState>,
    Extension(user): Extension<AuthUser>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = file_id(id)?;
    state.files.purge(user.user_id, id).await?;
    Ok(ApiSuccess::message_only("File permanently deleted"))
}

pub async fn statistics(
    State(state): State<HttpState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = state.files.statistics(user.user_id).await?;
    Ok(ApiSuccess::ok("Statistics retrieved successfully", stats))
}

fn file_id(id: Result<Path<i64>, PathRejection>) -> Result<i64, ApiError> {
    match id {
        Ok(Path(id)) if id > 0 => Ok(id),
        Ok(_) | Err(_) => Err(ApiError::bad_request(SOURCE, "Invalid file ID")),
    }
}

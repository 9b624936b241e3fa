//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;

use crate::application::pagination::{OffsetPage, PageRequest};
use crate::domain::entities::{FileRecord, UserRecord};
use crate::domain::types::{FileKind, FileStatus};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFile {
    pub user_id: i64,
    pub file_name: String,
    pub original_name: String,
    pub file_path: String,
    pub file_size: i64,
    pub file_type: FileKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileSortField {
    #[default]
    CreatedAt,
    FileSize,
    FileName,
    OriginalName,
    FileType,
}

impl FileSortField {
    /// Whitelisted sort column; unknown names fall back to `created_at`.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("file_size") => Self::FileSize,
            Some("file_name") => Self::FileName,
            Some("original_name") => Self::OriginalName,
            Some("file_type") => Self::FileType,
            _ => Self::CreatedAt,
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::FileSize => "file_size",
            Self::FileName => "file_name",
            Self::OriginalName => "original_name",
            Self::FileType => "file_type",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some(value) if value.eq_ignore_ascii_case("asc") => Self::Asc,
            _ => Self::Desc,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileQueryFilter {
    pub file_type: Option<FileKind>,
    pub status: Option<FileStatus>,
    pub search: Option<String>,
    pub sort: FileSortField,
    pub order: SortOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FileKindCount {
    pub file_type: FileKind,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FileStatusCount {
    pub status: FileStatus,
    pub count: u64,
}

/// Aggregates over one user's live files.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileAggregates {
    pub total_files: u64,
    pub total_bytes: u64,
    pub by_type: Vec<FileKindCount>,
    pub by_status: Vec<FileStatusCount>,
    pub created_since: u64,
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    /// Insert a user; a taken email yields [`RepoError::Duplicate`].
    async fn insert_user(&self, user: NewUser) -> Result<UserRecord, RepoError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError>;
    async fn count_users(&self) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait FilesRepo: Send + Sync {
    async fn insert_file(&self, file: NewFile) -> Result<FileRecord, RepoError>;

    /// A live (not soft-deleted) file owned by `user_id`.
    async fn find_live_file(&self, user_id: i64, id: i64)
    -> Result<Option<FileRecord>, RepoError>;

    async fn list_live_files(
        &self,
        user_id: i64,
        filter: &FileQueryFilter,
        page: PageRequest,
    ) -> Result<OffsetPage<FileRecord>, RepoError>;

    /// Soft-deleted files owned by `user_id`, most recently deleted first.
    async fn list_deleted_files(&self, user_id: i64) -> Result<Vec<FileRecord>, RepoError>;

    /// Stamp `deleted_at` on a live file. Returns the file as it was, or `None`.
    async fn soft_delete_file(&self, user_id: i64, id: i64)
    -> Result<Option<FileRecord>, RepoError>;

    /// Clear `deleted_at` on a soft-deleted file. Returns the restored file, or `None`.
    async fn restore_file(&self, user_id: i64, id: i64) -> Result<Option<FileRecord>, RepoError>;

    /// Remove the row outright. Returns the removed file, or `None`.
    async fn purge_file(&self, user_id: i64, id: i64) -> Result<Option<FileRecord>, RepoError>;

    /// Unconditional status write used by background processing.
    async fn update_file_status(
        &self,
        id: i64,
        status: FileStatus,
        processed_at: Option<OffsetDateTime>,
    ) -> Result<(), RepoError>;

    async fn file_aggregates(
        &self,
        user_id: i64,
        created_since: OffsetDateTime,
    ) -> Result<FileAggregates, RepoError>;

    /// Row count across every user, soft-deleted rows included.
    async fn count_all_files(&self) -> Result<u64, RepoError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_field_whitelist() {
        assert_eq!(FileSortField::parse(Some("file_size")), FileSortField::FileSize);
        assert_eq!(
            FileSortField::parse(Some("original_name")),
            FileSortField::OriginalName
        );
        assert_eq!(
            FileSortField::parse(Some("id; DROP TABLE files")),
            FileSortField::CreatedAt
        );
        assert_eq!(FileSortField::parse(None), FileSortField::CreatedAt);
    }

    #[test]
    fn sort_order_defaults_to_desc() {
        assert_eq!(SortOrder::parse(Some("asc")), SortOrder::Asc);
        assert_eq!(SortOrder::parse(Some("ASC")), SortOrder::Asc);
        assert_eq!(SortOrder::parse(Some("sideways")), SortOrder::Desc);
        assert_eq!(SortOrder::parse(None), SortOrder::Desc);
    }
}

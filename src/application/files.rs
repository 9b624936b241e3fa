//! File record service.
//!
//! Owns the user-scoped file operations. Every committed mutation is
//! followed by a cache invalidation before the call returns.

use std::sync::Arc;

use bytes::Bytes;
use futures::Stream;
use serde::Serialize;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};

use crate::application::pagination::{OffsetPage, PageInfo, PageRequest};
use crate::application::processing::FileProcessor;
use crate::application::repos::{
    FileKindCount, FileQueryFilter, FileSortField, FileStatusCount, FilesRepo, NewFile,
    RepoError, SortOrder,
};
use crate::cache::{CacheTrigger, Mutation};
use crate::domain::entities::FileRecord;
use crate::domain::types::{FileKind, FileStatus};
use crate::infra::uploads::{UploadStorage, UploadStorageError};

const RECENT_WINDOW: Duration = Duration::days(7);
const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Error)]
pub enum FileServiceError {
    #[error("File not found")]
    NotFound,
    #[error("Deleted file not found")]
    DeletedNotFound,
    #[error("{0}")]
    InvalidInput(String),
    #[error(transparent)]
    Storage(#[from] UploadStorageError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Raw listing query values as received from the client.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub file_type: Option<String>,
    pub status: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub search: Option<String>,
}

/// A listing query after parsing.
///
/// `filter` is `None` when a type or status value names no known variant;
/// such a query matches no rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedListQuery {
    pub filter: Option<FileQueryFilter>,
    pub page: PageRequest,
    pub echo: FilterEcho,
}

impl ListQuery {
    pub fn resolve(&self) -> ResolvedListQuery {
        let raw_type = non_empty(self.file_type.as_deref());
        let raw_status = non_empty(self.status.as_deref());
        let search = non_empty(self.search.as_deref()).map(str::to_string);
        let sort = FileSortField::parse(self.sort.as_deref());
        let order = SortOrder::parse(self.order.as_deref());
        let page = PageRequest::from_query(self.page.as_deref(), self.limit.as_deref());

        let echo = FilterEcho {
            file_type: raw_type.map(str::to_string),
            status: raw_status.map(str::to_string),
            sort_by: sort,
            sort_order: order,
            search: search.clone(),
        };

        let file_type = raw_type.map(str::parse::<FileKind>).transpose();
        let status = raw_status.map(str::parse::<FileStatus>).transpose();
        let filter = match (file_type, status) {
            (Ok(file_type), Ok(status)) => Some(FileQueryFilter {
                file_type,
                status,
                search,
                sort,
                order,
            }),
            _ => None,
        };

        ResolvedListQuery { filter, page, echo }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// Filter values echoed back as the client sent them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterEcho {
    #[serde(rename = "type")]
    pub file_type: Option<String>,
    pub status: Option<String>,
    pub sort_by: FileSortField,
    pub sort_order: SortOrder,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileListing {
    pub files: Vec<FileRecord>,
    pub pagination: PageInfo,
    pub filter: FilterEcho,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletedListing {
    pub files: Vec<FileRecord>,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileStatistics {
    pub total_files: u64,
    pub total_storage: u64,
    pub total_storage_mb: f64,
    pub files_by_type: Vec<FileKindCount>,
    pub files_by_status: Vec<FileStatusCount>,
    pub recent_files_7d: u64,
}

#[derive(Clone)]
pub struct FileService {
    repo: Arc<dyn FilesRepo>,
    storage: Arc<UploadStorage>,
    trigger: CacheTrigger,
    processor: FileProcessor,
}

impl FileService {
    pub fn new(
        repo: Arc<dyn FilesRepo>,
        storage: Arc<UploadStorage>,
        trigger: CacheTrigger,
        processor: FileProcessor,
    ) -> Self {
        Self {
            repo,
            storage,
            trigger,
            processor,
        }
    }

    /// Persist an uploaded payload, record it, and start processing.
    pub async fn upload<S>(
        &self,
        user_id: i64,
        original_name: &str,
        payload: S,
    ) -> Result<FileRecord, FileServiceError>
    where
        S: Stream<Item = Result<Bytes, UploadStorageError>>,
    {
        let original_name = original_name.trim();
        if original_name.is_empty() {
            return Err(FileServiceError::InvalidInput(
                "uploaded file has no name".to_string(),
            ));
        }

        let stored = self
            .storage
            .store_stream(user_id, original_name, payload)
            .await?;

        let new_file = NewFile {
            user_id,
            file_name: stored.file_name.clone(),
            original_name: original_name.to_string(),
            file_path: stored.relative_path.clone(),
            file_size: stored.size_bytes,
            file_type: FileKind::from_file_name(original_name),
        };

        let record = match self.repo.insert_file(new_file).await {
            Ok(record) => record,
            Err(err) => {
                if let Err(cleanup) = self.storage.delete(&stored.relative_path).await {
                    warn!(
                        target = "smartfile::application::files",
                        path = %stored.relative_path,
                        error = %cleanup,
                        "Failed to remove orphaned upload"
                    );
                }
                return Err(err.into());
            }
        };

        info!(
            target = "smartfile::application::files",
            user_id,
            file_id = record.id,
            size = record.file_size,
            file_type = %record.file_type,
            "File uploaded"
        );

        self.processor.spawn(record.id);
        self.trigger
            .after_mutation(Mutation::Uploaded { file_id: record.id })
            .await;

        Ok(record)
    }

    pub async fn list(
        &self,
        user_id: i64,
        query: ResolvedListQuery,
    ) -> Result<FileListing, FileServiceError> {
        let result = match &query.filter {
            Some(filter) => self.repo.list_live_files(user_id, filter, query.page).await?,
            None => OffsetPage::new(Vec::new(), 0),
        };
        Ok(FileListing {
            files: result.items,
            pagination: PageInfo::new(query.page, result.total_rows),
            filter: query.echo,
        })
    }

    pub async fn list_deleted(&self, user_id: i64) -> Result<DeletedListing, FileServiceError> {
        let files = self.repo.list_deleted_files(user_id).await?;
        Ok(DeletedListing {
            total: files.len() as u64,
            files,
        })
    }

    pub async fn find(&self, user_id: i64, id: i64) -> Result<FileRecord, FileServiceError> {
        self.repo
            .find_live_file(user_id, id)
            .await?
            .ok_or(FileServiceError::NotFound)
    }

    /// Soft delete a live file and remove its payload from disk.
    pub async fn delete(&self, user_id: i64, id: i64) -> Result<FileRecord, FileServiceError> {
        let record = self
            .repo
            .soft_delete_file(user_id, id)
            .await?
            .ok_or(FileServiceError::NotFound)?;

        self.remove_payload(&record).await;
        self.trigger
            .after_mutation(Mutation::Deleted { file_id: record.id })
            .await;

        Ok(record)
    }

    pub async fn restore(&self, user_id: i64, id: i64) -> Result<FileRecord, FileServiceError> {
        let record = self
            .repo
            .restore_file(user_id, id)
            .await?
            .ok_or(FileServiceError::DeletedNotFound)?;

        self.trigger
            .after_mutation(Mutation::Restored { file_id: record.id })
            .await;

        Ok(record)
    }

    /// Remove a file row for good, whether or not it was soft deleted.
    pub async fn purge(&self, user_id: i64, id: i64) -> Result<FileRecord, FileServiceError> {
        let record = self
            .repo
            .purge_file(user_id, id)
            .await?
            .ok_or(FileServiceError::NotFound)?;

        self.remove_payload(&record).await;
        self.trigger
            .after_mutation(Mutation::Purged { file_id: record.id })
            .await;

        Ok(record)
    }

    pub async fn statistics(&self, user_id: i64) -> Result<FileStatistics, FileServiceError> {
        let since = OffsetDateTime::now_utc() - RECENT_WINDOW;
        let aggregates = self.repo.file_aggregates(user_id, since).await?;
        Ok(FileStatistics {
            total_files: aggregates.total_files,
            total_storage: aggregates.total_bytes,
            total_storage_mb: aggregates.total_bytes as f64 / BYTES_PER_MIB,
            files_by_type: aggregates.by_type,
            files_by_status: aggregates.by_status,
            recent_files_7d: aggregates.created_since,
        })
    }

    async fn remove_payload(&self, record: &FileRecord) {
        if let Err(err) = self.storage.delete(&record.file_path).await {
            warn!(
                target = "smartfile::application::files",
                file_id = record.id,
                path = %record.file_path,
                error = %err,
                "Failed to remove stored payload"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_query_applies_defaults() {
        let resolved = ListQuery::default().resolve();
        assert_eq!(resolved.filter, Some(FileQueryFilter::default()));
        assert_eq!(resolved.page, PageRequest::default());
    }

    #[test]
    fn list_query_parses_filters() {
        let query = ListQuery {
            page: Some("2".into()),
            limit: Some("5".into()),
            file_type: Some("image".into()),
            status: Some("completed".into()),
            sort: Some("file_size".into()),
            order: Some("asc".into()),
            search: Some("  holiday ".into()),
        };
        let resolved = query.resolve();
        let filter = resolved.filter.expect("known filter values");

        assert_eq!(filter.file_type, Some(FileKind::Image));
        assert_eq!(filter.status, Some(FileStatus::Completed));
        assert_eq!(filter.sort, FileSortField::FileSize);
        assert_eq!(filter.order, SortOrder::Asc);
        assert_eq!(filter.search.as_deref(), Some("holiday"));
        assert_eq!(resolved.page.offset(), 5);
        assert_eq!(resolved.echo.file_type.as_deref(), Some("image"));
    }

    #[test]
    fn unknown_filter_values_match_nothing() {
        for query in [
            ListQuery {
                file_type: Some("spreadsheet".into()),
                ..ListQuery::default()
            },
            ListQuery {
                status: Some("archived".into()),
                ..ListQuery::default()
            },
        ] {
            let resolved = query.resolve();
            assert!(resolved.filter.is_none());
        }

        let echo = ListQuery {
            file_type: Some("spreadsheet".into()),
            ..ListQuery::default()
        }
        .resolve()
        .echo;
        assert_eq!(echo.file_type.as_deref(), Some("spreadsheet"));
    }

    #[test]
    fn blank_filters_are_ignored() {
        let query = ListQuery {
            file_type: Some("".into()),
            status: Some("  ".into()),
            search: Some("".into()),
            ..ListQuery::default()
        };
        assert_eq!(query.resolve().filter, Some(FileQueryFilter::default()));
    }
}

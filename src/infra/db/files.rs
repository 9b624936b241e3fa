use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::{
    application::{
        pagination::{OffsetPage, PageRequest},
        repos::{
            FileAggregates, FileKindCount, FileQueryFilter, FileStatusCount, FilesRepo, NewFile,
            RepoError,
        },
    },
    domain::{
        entities::FileRecord,
        types::{FileKind, FileStatus},
    },
};

use super::{PostgresRepositories, map_sqlx_error, util::escape_like};

const FILE_COLUMNS: &str = "id, user_id, file_name, original_name, file_path, file_size, \
     file_type, status, processed_at, created_at, updated_at, deleted_at";

#[derive(sqlx::FromRow)]
struct FileRow {
    id: i64,
    user_id: i64,
    file_name: String,
    original_name: String,
    file_path: String,
    file_size: i64,
    file_type: FileKind,
    status: FileStatus,
    processed_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    deleted_at: Option<OffsetDateTime>,
}

impl From<FileRow> for FileRecord {
    fn from(row: FileRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            file_name: row.file_name,
            original_name: row.original_name,
            file_path: row.file_path,
            file_size: row.file_size,
            file_type: row.file_type,
            status: row.status,
            processed_at: row.processed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct KindCountRow {
    file_type: FileKind,
    count: i64,
}

#[derive(sqlx::FromRow)]
struct StatusCountRow {
    status: FileStatus,
    count: i64,
}

impl PostgresRepositories {
    fn apply_file_filter<'q>(
        qb: &mut QueryBuilder<'q, Postgres>,
        user_id: i64,
        filter: &'q FileQueryFilter,
    ) {
        qb.push(" WHERE user_id = ");
        qb.push_bind(user_id);
        qb.push(" AND deleted_at IS NULL");

        if let Some(file_type) = filter.file_type {
            qb.push(" AND file_type = ");
            qb.push_bind(file_type);
        }

        if let Some(status) = filter.status {
            qb.push(" AND status = ");
            qb.push_bind(status);
        }

        if let Some(search) = filter.search.as_ref() {
            let pattern = format!("%{}%", escape_like(search));
            qb.push(" AND (file_name ILIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" OR original_name ILIKE ");
            qb.push_bind(pattern);
            qb.push(")");
        }
    }

    async fn fetch_file(
        &self,
        sql: &str,
        user_id: i64,
        id: i64,
    ) -> Result<Option<FileRecord>, RepoError> {
        let row = sqlx::query_as::<_, FileRow>(sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(FileRecord::from))
    }
}

#[async_trait]
impl FilesRepo for PostgresRepositories {
    async fn insert_file(&self, file: NewFile) -> Result<FileRecord, RepoError> {
        let sql = format!(
            "INSERT INTO files (user_id, file_name, original_name, file_path, file_size, file_type, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {FILE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, FileRow>(&sql)
            .bind(file.user_id)
            .bind(&file.file_name)
            .bind(&file.original_name)
            .bind(&file.file_path)
            .bind(file.file_size)
            .bind(file.file_type)
            .bind(FileStatus::Pending)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn find_live_file(
        &self,
        user_id: i64,
        id: i64,
    ) -> Result<Option<FileRecord>, RepoError> {
        let sql = format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL"
        );
        self.fetch_file(&sql, user_id, id).await
    }

    async fn list_live_files(
        &self,
        user_id: i64,
        filter: &FileQueryFilter,
        page: PageRequest,
    ) -> Result<OffsetPage<FileRecord>, RepoError> {
        let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM files");
        Self::apply_file_filter(&mut count_qb, user_id, filter);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut qb = QueryBuilder::new(format!("SELECT {FILE_COLUMNS} FROM files"));
        Self::apply_file_filter(&mut qb, user_id, filter);
        qb.push(" ORDER BY ");
        qb.push(filter.sort.column());
        qb.push(" ");
        qb.push(filter.order.keyword());
        qb.push(", id ");
        qb.push(filter.order.keyword());
        qb.push(" LIMIT ");
        qb.push_bind(i64::from(page.limit()));
        qb.push(" OFFSET ");
        qb.push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));

        let rows = qb
            .build_query_as::<FileRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(OffsetPage::new(
            rows.into_iter().map(FileRecord::from).collect(),
            Self::convert_count(total)?,
        ))
    }

    async fn list_deleted_files(&self, user_id: i64) -> Result<Vec<FileRecord>, RepoError> {
        let sql = format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE user_id = $1 AND deleted_at IS NOT NULL \
             ORDER BY deleted_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, FileRow>(&sql)
            .bind(user_id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(FileRecord::from).collect())
    }

    async fn soft_delete_file(
        &self,
        user_id: i64,
        id: i64,
    ) -> Result<Option<FileRecord>, RepoError> {
        let sql = format!(
            "UPDATE files SET deleted_at = now(), updated_at = now() \
             WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL RETURNING {FILE_COLUMNS}"
        );
        self.fetch_file(&sql, user_id, id).await
    }

    async fn restore_file(&self, user_id: i64, id: i64) -> Result<Option<FileRecord>, RepoError> {
        let sql = format!(
            "UPDATE files SET deleted_at = NULL, updated_at = now() \
             WHERE id = $1 AND user_id = $2 AND deleted_at IS NOT NULL RETURNING {FILE_COLUMNS}"
        );
        self.fetch_file(&sql, user_id, id).await
    }

    async fn purge_file(&self, user_id: i64, id: i64) -> Result<Option<FileRecord>, RepoError> {
        let sql =
            format!("DELETE FROM files WHERE id = $1 AND user_id = $2 RETURNING {FILE_COLUMNS}");
        self.fetch_file(&sql, user_id, id).await
    }

    async fn update_file_status(
        &self,
        id: i64,
        status: FileStatus,
        processed_at: Option<OffsetDateTime>,
    ) -> Result<(), RepoError> {
        let result = sqlx::query(
            "UPDATE files SET status = $1, processed_at = COALESCE($2, processed_at), \
             updated_at = now() WHERE id = $3",
        )
        .bind(status)
        .bind(processed_at)
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn file_aggregates(
        &self,
        user_id: i64,
        created_since: OffsetDateTime,
    ) -> Result<FileAggregates, RepoError> {
        let (total_files, total_bytes, recent): (i64, i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(file_size), 0)::BIGINT, \
             COUNT(*) FILTER (WHERE created_at >= $2) \
             FROM files WHERE user_id = $1 AND deleted_at IS NULL",
        )
        .bind(user_id)
        .bind(created_since)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let kind_rows = sqlx::query_as::<_, KindCountRow>(
            "SELECT file_type, COUNT(*) AS count FROM files \
             WHERE user_id = $1 AND deleted_at IS NULL GROUP BY file_type ORDER BY file_type",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let status_rows = sqlx::query_as::<_, StatusCountRow>(
            "SELECT status, COUNT(*) AS count FROM files \
             WHERE user_id = $1 AND deleted_at IS NULL GROUP BY status ORDER BY status",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let by_type = kind_rows
            .into_iter()
            .map(|row| {
                Ok(FileKindCount {
                    file_type: row.file_type,
                    count: Self::convert_count(row.count)?,
                })
            })
            .collect::<Result<Vec<_>, RepoError>>()?;

        let by_status = status_rows
            .into_iter()
            .map(|row| {
                Ok(FileStatusCount {
                    status: row.status,
                    count: Self::convert_count(row.count)?,
                })
            })
            .collect::<Result<Vec<_>, RepoError>>()?;

        Ok(FileAggregates {
            total_files: Self::convert_count(total_files)?,
            total_bytes: u64::try_from(total_bytes)
                .map_err(|_| RepoError::from_persistence("storage total out of range"))?,
            by_type,
            by_status,
            created_since: Self::convert_count(recent)?,
        })
    }

    async fn count_all_files(&self) -> Result<u64, RepoError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files")
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Self::convert_count(count)
    }
}

//! Health, metrics, and log-tail reporting.

use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::warn;

use crate::application::repos::{FilesRepo, RepoError, UsersRepo};
use crate::cache::{CacheHandle, INVALIDATION_PATTERN};
use crate::infra::uploads::UploadStorage;

const LOG_TAIL_BYTES: u64 = 10 * 1024;
const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Error)]
pub enum MonitoringError {
    #[error("no log file is configured")]
    NoLogFile,
    #[error("failed to read log file: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
    pub uptime: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub uptime: String,
    pub database: DatabaseMetrics,
    pub cache: CacheMetrics,
    pub storage: StorageMetrics,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseMetrics {
    pub total_users: u64,
    pub total_files: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheMetrics {
    pub backend: &'static str,
    pub connected: bool,
    pub cache_keys: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StorageMetrics {
    pub uploads_size_bytes: u64,
    pub uploads_size_mb: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogTail {
    pub logs: String,
    pub file_size: u64,
}

#[derive(Clone)]
pub struct MonitoringService {
    started: Instant,
    users: Arc<dyn UsersRepo>,
    files: Arc<dyn FilesRepo>,
    cache: CacheHandle,
    storage: Arc<UploadStorage>,
    log_file: Option<PathBuf>,
}

impl MonitoringService {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        files: Arc<dyn FilesRepo>,
        cache: CacheHandle,
        storage: Arc<UploadStorage>,
        log_file: Option<PathBuf>,
    ) -> Self {
        Self {
            started: Instant::now(),
            users,
            files,
            cache,
            storage,
            log_file,
        }
    }

    pub fn health(&self) -> HealthReport {
        let elapsed = self.started.elapsed();
        HealthReport {
            status: "healthy",
            time: OffsetDateTime::now_utc(),
            uptime: format_uptime(elapsed.as_secs()),
            uptime_seconds: elapsed.as_secs(),
        }
    }

    pub async fn metrics(&self) -> Result<MetricsReport, MonitoringError> {
        let total_users = self.users.count_users().await?;
        let total_files = self.files.count_all_files().await?;

        let cache_keys = match self.cache.count_matching(INVALIDATION_PATTERN).await {
            Ok(count) => count,
            Err(err) => {
                warn!(
                    target = "smartfile::application::monitoring",
                    error = %err,
                    "Could not count cache keys"
                );
                0
            }
        };

        let uploads_size_bytes = match self.storage.total_size().await {
            Ok(size) => size,
            Err(err) => {
                warn!(
                    target = "smartfile::application::monitoring",
                    error = %err,
                    "Could not measure upload directory"
                );
                0
            }
        };

        Ok(MetricsReport {
            uptime: format_uptime(self.started.elapsed().as_secs()),
            database: DatabaseMetrics {
                total_users,
                total_files,
            },
            cache: CacheMetrics {
                backend: self.cache.backend(),
                connected: self.cache.ping().await.is_ok(),
                cache_keys,
            },
            storage: StorageMetrics {
                uploads_size_bytes,
                uploads_size_mb: uploads_size_bytes as f64 / BYTES_PER_MIB,
            },
            timestamp: OffsetDateTime::now_utc(),
        })
    }

    /// The last 10 KiB of the log file.
    pub async fn log_tail(&self) -> Result<LogTail, MonitoringError> {
        let path = self.log_file.as_ref().ok_or(MonitoringError::NoLogFile)?;
        let mut file = tokio::fs::File::open(path).await?;
        let file_size = file.metadata().await?.len();

        let window = file_size.min(LOG_TAIL_BYTES);
        file.seek(SeekFrom::Start(file_size - window)).await?;

        let mut buffer = Vec::with_capacity(window as usize);
        file.take(window).read_to_end(&mut buffer).await?;

        Ok(LogTail {
            logs: String::from_utf8_lossy(&buffer).into_owned(),
            file_size,
        })
    }
}

fn format_uptime(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_formatting() {
        assert_eq!(format_uptime(5), "5s");
        assert_eq!(format_uptime(65), "1m5s");
        assert_eq!(format_uptime(3_725), "1h2m5s");
    }
}

//! Post-upload processing.
//!
//! Each recorded upload gets one detached task that walks its status
//! `pending -> processing -> completed`. Writes are unconditional; a
//! concurrent delete or purge simply wins or loses on the row.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::application::repos::{FilesRepo, RepoError};
use crate::domain::types::FileStatus;

#[derive(Clone)]
pub struct FileProcessor {
    repo: Arc<dyn FilesRepo>,
    delay: Duration,
}

impl FileProcessor {
    pub fn new(repo: Arc<dyn FilesRepo>, delay: Duration) -> Self {
        Self { repo, delay }
    }

    /// Start processing `file_id` in the background.
    pub fn spawn(&self, file_id: i64) -> JoinHandle<()> {
        let repo = Arc::clone(&self.repo);
        let delay = self.delay;
        tokio::spawn(async move {
            match process(repo.as_ref(), file_id, delay).await {
                Ok(()) => info!(
                    target = "smartfile::application::processing",
                    file_id, "File processing completed"
                ),
                Err(RepoError::NotFound) => debug!(
                    target = "smartfile::application::processing",
                    file_id, "File removed before processing finished"
                ),
                Err(err) => error!(
                    target = "smartfile::application::processing",
                    file_id,
                    error = %err,
                    "File processing failed"
                ),
            }
        })
    }
}

async fn process(repo: &dyn FilesRepo, file_id: i64, delay: Duration) -> Result<(), RepoError> {
    repo.update_file_status(file_id, FileStatus::Processing, None)
        .await?;

    tokio::time::sleep(delay).await;

    repo.update_file_status(
        file_id,
        FileStatus::Completed,
        Some(OffsetDateTime::now_utc()),
    )
    .await
}

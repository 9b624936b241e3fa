//! Shared harness: in-memory repositories and a fully wired router.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, Bytes},
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use serde_json::Value;
use smartfile::{
    application::{
        auth::{AuthService, TokenIssuer},
        files::FileService,
        monitoring::MonitoringService,
        pagination::{OffsetPage, PageRequest},
        processing::FileProcessor,
        repos::{
            FileAggregates, FileKindCount, FileQueryFilter, FileSortField, FileStatusCount,
            FilesRepo, NewFile, NewUser, RepoError, SortOrder, UsersRepo,
        },
    },
    cache::{CacheError, CacheHandle, CacheState, CacheStore, CacheTrigger},
    domain::{
        entities::{FileRecord, UserRecord},
        types::{FileKind, FileStatus},
    },
    infra::{
        http::{HttpState, build_router},
        uploads::UploadStorage,
    },
};
use tempfile::TempDir;
use time::OffsetDateTime;
use tower::ServiceExt;

pub const JWT_SECRET: &str = "integration-secret";
pub const MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;
pub const CACHE_TTL: Duration = Duration::from_secs(300);
const BOUNDARY: &str = "smartfile-test-boundary";

#[derive(Default)]
struct RepoState {
    users: Vec<UserRecord>,
    files: Vec<FileRecord>,
    next_user_id: i64,
    next_file_id: i64,
}

/// Repositories backed by vectors, mirroring the Postgres semantics the
/// services rely on.
#[derive(Default)]
pub struct InMemoryRepos {
    state: Mutex<RepoState>,
}

impl InMemoryRepos {
    pub fn file(&self, id: i64) -> Option<FileRecord> {
        let state = self.state.lock().unwrap();
        state.files.iter().find(|file| file.id == id).cloned()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut RepoState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }
}

#[async_trait]
impl UsersRepo for InMemoryRepos {
    async fn insert_user(&self, user: NewUser) -> Result<UserRecord, RepoError> {
        self.with_state(|state| {
            if state.users.iter().any(|existing| existing.email == user.email) {
                return Err(RepoError::Duplicate {
                    constraint: "users_email_key".to_string(),
                });
            }
            state.next_user_id += 1;
            let now = OffsetDateTime::now_utc();
            let record = UserRecord {
                id: state.next_user_id,
                name: user.name,
                email: user.email,
                password_hash: user.password_hash,
                created_at: now,
                updated_at: now,
            };
            state.users.push(record.clone());
            Ok(record)
        })
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError> {
        Ok(self.with_state(|state| {
            state.users.iter().find(|user| user.email == email).cloned()
        }))
    }

    async fn count_users(&self) -> Result<u64, RepoError> {
        Ok(self.with_state(|state| state.users.len() as u64))
    }
}

fn matches_filter(file: &FileRecord, user_id: i64, filter: &FileQueryFilter) -> bool {
    if file.user_id != user_id || file.is_deleted() {
        return false;
    }
    if filter.file_type.is_some_and(|kind| kind != file.file_type) {
        return false;
    }
    if filter.status.is_some_and(|status| status != file.status) {
        return false;
    }
    match filter.search.as_deref() {
        Some(needle) => {
            let needle = needle.to_lowercase();
            file.file_name.to_lowercase().contains(&needle)
                || file.original_name.to_lowercase().contains(&needle)
        }
        None => true,
    }
}

fn compare(a: &FileRecord, b: &FileRecord, sort: FileSortField) -> std::cmp::Ordering {
    let primary = match sort {
        FileSortField::CreatedAt => a.created_at.cmp(&b.created_at),
        FileSortField::FileSize => a.file_size.cmp(&b.file_size),
        FileSortField::FileName => a.file_name.cmp(&b.file_name),
        FileSortField::OriginalName => a.original_name.cmp(&b.original_name),
        FileSortField::FileType => a.file_type.as_str().cmp(b.file_type.as_str()),
    };
    primary.then(a.id.cmp(&b.id))
}

#[async_trait]
impl FilesRepo for InMemoryRepos {
    async fn insert_file(&self, file: NewFile) -> Result<FileRecord, RepoError> {
        self.with_state(|state| {
            if !state.users.iter().any(|user| user.id == file.user_id) {
                return Err(RepoError::InvalidInput {
                    message: "unknown user".to_string(),
                });
            }
            state.next_file_id += 1;
            let now = OffsetDateTime::now_utc();
            let record = FileRecord {
                id: state.next_file_id,
                user_id: file.user_id,
                file_name: file.file_name,
                original_name: file.original_name,
                file_path: file.file_path,
                file_size: file.file_size,
                file_type: file.file_type,
                status: FileStatus::Pending,
                processed_at: None,
                created_at: now,
                updated_at: now,
                deleted_at: None,
            };
            state.files.push(record.clone());
            Ok(record)
        })
    }

    async fn find_live_file(
        &self,
        user_id: i64,
        id: i64,
    ) -> Result<Option<FileRecord>, RepoError> {
        Ok(self.with_state(|state| {
            state
                .files
                .iter()
                .find(|file| file.id == id && file.user_id == user_id && !file.is_deleted())
                .cloned()
        }))
    }

    async fn list_live_files(
        &self,
        user_id: i64,
        filter: &FileQueryFilter,
        page: PageRequest,
    ) -> Result<OffsetPage<FileRecord>, RepoError> {
        Ok(self.with_state(|state| {
            let mut matching: Vec<FileRecord> = state
                .files
                .iter()
                .filter(|file| matches_filter(file, user_id, filter))
                .cloned()
                .collect();
            matching.sort_by(|a, b| {
                let ordering = compare(a, b, filter.sort);
                match filter.order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                }
            });
            let total = matching.len() as u64;
            let items = matching
                .into_iter()
                .skip(page.offset() as usize)
                .take(page.limit() as usize)
                .collect();
            OffsetPage::new(items, total)
        }))
    }

    async fn list_deleted_files(&self, user_id: i64) -> Result<Vec<FileRecord>, RepoError> {
        Ok(self.with_state(|state| {
            let mut deleted: Vec<FileRecord> = state
                .files
                .iter()
                .filter(|file| file.user_id == user_id && file.is_deleted())
                .cloned()
                .collect();
            deleted.sort_by(|a, b| b.deleted_at.cmp(&a.deleted_at).then(b.id.cmp(&a.id)));
            deleted
        }))
    }

    async fn soft_delete_file(
        &self,
        user_id: i64,
        id: i64,
    ) -> Result<Option<FileRecord>, RepoError> {
        Ok(self.with_state(|state| {
            let file = state
                .files
                .iter_mut()
                .find(|file| file.id == id && file.user_id == user_id && !file.is_deleted())?;
            let now = OffsetDateTime::now_utc();
            file.deleted_at = Some(now);
            file.updated_at = now;
            Some(file.clone())
        }))
    }

    async fn restore_file(&self, user_id: i64, id: i64) -> Result<Option<FileRecord>, RepoError> {
        Ok(self.with_state(|state| {
            let file = state
                .files
                .iter_mut()
                .find(|file| file.id == id && file.user_id == user_id && file.is_deleted())?;
            file.deleted_at = None;
            file.updated_at = OffsetDateTime::now_utc();
            Some(file.clone())
        }))
    }

    async fn purge_file(&self, user_id: i64, id: i64) -> Result<Option<FileRecord>, RepoError> {
        Ok(self.with_state(|state| {
            let index = state
                .files
                .iter()
                .position(|file| file.id == id && file.user_id == user_id)?;
            Some(state.files.remove(index))
        }))
    }

    async fn update_file_status(
        &self,
        id: i64,
        status: FileStatus,
        processed_at: Option<OffsetDateTime>,
    ) -> Result<(), RepoError> {
        self.with_state(|state| {
            let file = state
                .files
                .iter_mut()
                .find(|file| file.id == id)
                .ok_or(RepoError::NotFound)?;
            file.status = status;
            if processed_at.is_some() {
                file.processed_at = processed_at;
            }
            file.updated_at = OffsetDateTime::now_utc();
            Ok(())
        })
    }

    async fn file_aggregates(
        &self,
        user_id: i64,
        created_since: OffsetDateTime,
    ) -> Result<FileAggregates, RepoError> {
        Ok(self.with_state(|state| {
            let live: Vec<&FileRecord> = state
                .files
                .iter()
                .filter(|file| file.user_id == user_id && !file.is_deleted())
                .collect();

            let by_type = FileKind::ALL
                .iter()
                .map(|kind| FileKindCount {
                    file_type: *kind,
                    count: live.iter().filter(|file| file.file_type == *kind).count() as u64,
                })
                .filter(|entry| entry.count > 0)
                .collect();
            let by_status = FileStatus::ALL
                .iter()
                .map(|status| FileStatusCount {
                    status: *status,
                    count: live.iter().filter(|file| file.status == *status).count() as u64,
                })
                .filter(|entry| entry.count > 0)
                .collect();

            FileAggregates {
                total_files: live.len() as u64,
                total_bytes: live.iter().map(|file| file.file_size as u64).sum(),
                by_type,
                by_status,
                created_since: live
                    .iter()
                    .filter(|file| file.created_at >= created_since)
                    .count() as u64,
            }
        }))
    }

    async fn count_all_files(&self) -> Result<u64, RepoError> {
        Ok(self.with_state(|state| state.files.len() as u64))
    }
}

/// A store that fails every operation, as an unreachable backend would.
pub struct FailingStore;

#[async_trait]
impl CacheStore for FailingStore {
    fn backend(&self) -> &'static str {
        "failing"
    }

    async fn get(&self, _key: &str) -> Result<Option<Bytes>, CacheError> {
        Err(CacheError::Unavailable)
    }

    async fn set(&self, _key: &str, _value: Bytes, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Unavailable)
    }

    async fn delete(&self, _key: &str) -> Result<bool, CacheError> {
        Err(CacheError::Unavailable)
    }

    async fn delete_matching(&self, pattern: &str) -> Result<u64, CacheError> {
        Err(CacheError::enumeration(pattern, 0, CacheError::Unavailable))
    }

    async fn count_matching(&self, _pattern: &str) -> Result<u64, CacheError> {
        Err(CacheError::Unavailable)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Err(CacheError::Unavailable)
    }
}

pub struct TestAppBuilder {
    cache: CacheHandle,
    cache_ttl: Duration,
    processing_delay: Duration,
    log_file: Option<PathBuf>,
}

impl TestAppBuilder {
    pub fn cache(mut self, cache: CacheHandle) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn processing_delay(mut self, delay: Duration) -> Self {
        self.processing_delay = delay;
        self
    }

    pub fn log_file(mut self, path: PathBuf) -> Self {
        self.log_file = Some(path);
        self
    }

    pub fn build(self) -> TestApp {
        let uploads = tempfile::tempdir().expect("uploads tempdir");
        let storage = Arc::new(
            UploadStorage::new(uploads.path().to_path_buf(), MAX_FILE_BYTES)
                .expect("upload storage"),
        );
        let repos = Arc::new(InMemoryRepos::default());
        let users: Arc<dyn UsersRepo> = repos.clone();
        let files: Arc<dyn FilesRepo> = repos.clone();
        let tokens = Arc::new(TokenIssuer::new(JWT_SECRET, time::Duration::hours(24)));

        let state = HttpState {
            auth: Arc::new(AuthService::new(users.clone(), tokens.clone())),
            files: Arc::new(FileService::new(
                files.clone(),
                storage.clone(),
                CacheTrigger::new(self.cache.clone()),
                FileProcessor::new(files.clone(), self.processing_delay),
            )),
            monitoring: Arc::new(MonitoringService::new(
                users,
                files,
                self.cache.clone(),
                storage,
                self.log_file,
            )),
            cache: CacheState::new(self.cache.clone(), self.cache_ttl),
            upload_body_limit: MAX_FILE_BYTES as usize,
        };

        TestApp {
            router: build_router(state),
            repos,
            tokens,
            cache: self.cache,
            uploads,
        }
    }
}

pub struct TestApp {
    pub router: Router,
    pub repos: Arc<InMemoryRepos>,
    pub tokens: Arc<TokenIssuer>,
    pub cache: CacheHandle,
    pub uploads: TempDir,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response body is JSON")
    }

    pub fn x_cache(&self) -> Option<&str> {
        self.headers
            .get("x-cache")
            .and_then(|value| value.to_str().ok())
    }
}

impl TestApp {
    /// Memory-backed cache, processing effectively parked.
    pub fn builder() -> TestAppBuilder {
        TestAppBuilder {
            cache: CacheHandle::memory(&Default::default()),
            cache_ttl: CACHE_TTL,
            processing_delay: Duration::from_secs(3600),
            log_file: None,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router responds");
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body collects");
        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Create a user directly in the repository and mint a token for them.
    pub async fn user_with_token(&self, email: &str) -> (i64, String) {
        let user = self
            .repos
            .insert_user(NewUser {
                name: "Test User".to_string(),
                email: email.to_string(),
                password_hash: String::new(),
            })
            .await
            .expect("user inserted");
        let token = self.tokens.issue(&user).expect("token issued");
        (user.id, token)
    }

    pub async fn get(&self, uri: &str, token: &str) -> TestResponse {
        self.send(authorized(Method::GET, uri, token, Body::empty()))
            .await
    }

    pub async fn post(&self, uri: &str, token: &str) -> TestResponse {
        self.send(authorized(Method::POST, uri, token, Body::empty()))
            .await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> TestResponse {
        self.send(authorized(Method::DELETE, uri, token, Body::empty()))
            .await
    }

    pub async fn upload(&self, token: &str, file_name: &str, contents: &[u8]) -> TestResponse {
        let mut request = authorized(
            Method::POST,
            "/api/files/upload",
            token,
            Body::from(multipart_body("file", file_name, contents)),
        );
        request.headers_mut().insert(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}")
                .parse()
                .expect("content type"),
        );
        self.send(request).await
    }

    /// Upload and return the new file id.
    pub async fn upload_ok(&self, token: &str, file_name: &str, contents: &[u8]) -> i64 {
        let response = self.upload(token, file_name, contents).await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.json());
        response.json()["data"]["file"]["id"]
            .as_i64()
            .expect("file id")
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> TestResponse {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request builds");
        self.send(request).await
    }
}

pub fn authorized(method: Method, uri: &str, token: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(body)
        .expect("request builds")
}

pub fn multipart_body(field: &str, file_name: &str, contents: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn file_ids(response: &TestResponse) -> Vec<i64> {
    response.json()["data"]["files"]
        .as_array()
        .expect("files array")
        .iter()
        .map(|file| file["id"].as_i64().expect("id"))
        .collect()
}

use std::sync::Arc;

use crate::application::auth::AuthService;
use crate::application::files::FileService;
use crate::application::monitoring::MonitoringService;
use crate::cache::CacheState;

#[derive(Clone)]
pub struct HttpState {
    pub auth: Arc<AuthService>,
    pub files: Arc<FileService>,
    pub monitoring: Arc<MonitoringService>,
    pub cache: CacheState,
    /// Largest accepted request body on the upload route.
    pub upload_body_limit: usize,
}

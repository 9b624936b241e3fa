use std::{future::IntoFuture, pin::pin, process, sync::Arc};

use clap::Parser;
use smartfile::{
    application::{
        auth::{AuthService, TokenIssuer},
        error::AppError,
        files::FileService,
        monitoring::MonitoringService,
        processing::FileProcessor,
        repos::{FilesRepo, UsersRepo},
    },
    cache::{CacheConfig, CacheHandle, CacheState, CacheTrigger},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState},
        telemetry,
        uploads::UploadStorage,
    },
};
use sqlx::PgPool;
use tokio::sync::oneshot;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let cli_args = config::CliArgs::parse();
    let settings = config::load(&cli_args)
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrations(&settings).await,
    }
}

async fn run_migrations(settings: &config::Settings) -> Result<(), AppError> {
    let pool = connect_pool(&settings.database).await?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(InfraError::Migration)?;
    info!(target = "smartfile::bootstrap", "Migrations applied");
    Ok(())
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let pool = connect_pool(&settings.database).await?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(InfraError::Migration)?;

    let state = build_http_state(PostgresRepositories::new(pool), &settings).await?;
    serve_http(&settings.server, state).await
}

async fn connect_pool(database: &config::DatabaseSettings) -> Result<PgPool, AppError> {
    let database_url = database
        .url
        .as_deref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;

    let pool = PostgresRepositories::connect(database_url, database.max_connections.get())
        .await
        .map_err(InfraError::from)?;
    Ok(pool)
}

async fn build_http_state(
    repositories: PostgresRepositories,
    settings: &config::Settings,
) -> Result<HttpState, AppError> {
    let repositories = Arc::new(repositories);
    let users_repo: Arc<dyn UsersRepo> = repositories.clone();
    let files_repo: Arc<dyn FilesRepo> = repositories;

    let cache_config = CacheConfig::from(&settings.cache);
    let cache = CacheHandle::connect(&cache_config).await;
    info!(
        target = "smartfile::bootstrap",
        backend = cache.backend(),
        available = cache.is_available(),
        ttl_seconds = cache_config.ttl.as_secs(),
        "Response cache ready"
    );

    let storage = Arc::new(
        UploadStorage::new(
            settings.uploads.directory.clone(),
            settings.uploads.max_file_bytes.get(),
        )
        .map_err(InfraError::from)?,
    );

    let token_ttl = time::Duration::try_from(settings.auth.token_ttl)
        .map_err(|err| AppError::unexpected(format!("token ttl out of range: {err}")))?;
    let tokens = Arc::new(TokenIssuer::new(&settings.auth.jwt_secret, token_ttl));

    let processor = FileProcessor::new(files_repo.clone(), settings.processing.delay);
    let files = FileService::new(
        files_repo.clone(),
        storage.clone(),
        CacheTrigger::new(cache.clone()),
        processor,
    );
    let monitoring = MonitoringService::new(
        users_repo.clone(),
        files_repo,
        cache.clone(),
        storage,
        settings.logging.file.clone(),
    );

    Ok(HttpState {
        auth: Arc::new(AuthService::new(users_repo, tokens)),
        files: Arc::new(files),
        monitoring: Arc::new(monitoring),
        cache: CacheState::new(cache, cache_config.ttl),
        upload_body_limit: usize::try_from(settings.uploads.max_file_bytes.get())
            .unwrap_or(usize::MAX),
    })
}

async fn serve_http(server: &config::ServerSettings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(server.addr)
        .await
        .map_err(|source| InfraError::Bind {
            addr: server.addr,
            source,
        })?;
    info!(target = "smartfile::bootstrap", addr = %server.addr, "Listening");

    let (signalled_tx, signalled_rx) = oneshot::channel::<()>();
    let mut serving = pin!(
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                let _ = signalled_tx.send(());
            })
            .into_future()
    );

    tokio::select! {
        result = &mut serving => {
            return result.map_err(|err| AppError::from(InfraError::Io(err)));
        }
        _ = signalled_rx => {
            info!(
                target = "smartfile::bootstrap",
                grace_seconds = server.graceful_shutdown.as_secs(),
                "Shutdown signal received; draining connections"
            );
        }
    }

    match tokio::time::timeout(server.graceful_shutdown, serving).await {
        Ok(result) => result.map_err(|err| AppError::from(InfraError::Io(err))),
        Err(_) => {
            warn!(
                target = "smartfile::bootstrap",
                "Graceful shutdown timed out; dropping open connections"
            );
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(
            target = "smartfile::bootstrap",
            error = %err,
            "Failed to listen for shutdown signal"
        );
        std::future::pending::<()>().await;
    }
}

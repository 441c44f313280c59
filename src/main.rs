use std::{net::SocketAddr, process, sync::Arc};

use apalis::prelude::{Monitor, WorkerBuilder, WorkerFactoryFn};
use apalis_cron::CronStream;
use storytell::{
    application::{
        auth::TokenService,
        error::AppError,
        jobs::{CacheSweepContext, cache_sweep_schedule, process_cache_sweep_job},
        repos::Repositories,
    },
    cache::{CacheConfig, CacheStore, MemoryCacheStore, NoopCacheStore},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiRateLimiter, ApiState},
        telemetry,
    },
};
use tokio::task::JoinHandle;
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
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let pool = PostgresRepositories::connect(&settings.database)
        .await
        .map_err(InfraError::from)?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(InfraError::from)?;
    info!(target = "storytell::migrate", "migrations applied");
    Ok(())
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let secret = settings
        .auth
        .jwt_secret
        .as_deref()
        .ok_or_else(|| InfraError::configuration("auth.jwt_secret is required to serve"))?;

    let pool = PostgresRepositories::connect(&settings.database)
        .await
        .map_err(InfraError::from)?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(InfraError::from)?;
    let repositories = Arc::new(PostgresRepositories::new(pool));

    let cache_config = CacheConfig::from(&settings.cache);
    let memory_store = cache_config
        .enabled
        .then(|| Arc::new(MemoryCacheStore::new(&cache_config)));
    let cache_store: Arc<dyn CacheStore> = match &memory_store {
        Some(store) => store.clone(),
        None => {
            warn!(target = "storytell::cache", "view cache disabled");
            Arc::new(NoopCacheStore)
        }
    };

    let state = ApiState::new(
        Repositories::from_backend(repositories.clone()),
        cache_store,
        &cache_config,
        TokenService::new(secret, settings.auth.token_ttl),
        ApiRateLimiter::from_settings(&settings.rate_limit),
    )
    .with_database(repositories);

    let monitor_handle = match memory_store {
        Some(store) => Some(spawn_job_monitor(store)?),
        None => None,
    };

    let result = serve_http(&settings, state).await;

    if let Some(handle) = monitor_handle {
        handle.abort();
        let _ = handle.await;
    }

    result
}

fn spawn_job_monitor(store: Arc<MemoryCacheStore>) -> Result<JoinHandle<()>, AppError> {
    let schedule = cache_sweep_schedule()?;
    let cache_sweep_worker = WorkerBuilder::new("cache-sweep-worker")
        .data(CacheSweepContext { store })
        .backend(CronStream::new(schedule))
        .build_fn(process_cache_sweep_job);

    let monitor = Monitor::new().register(cache_sweep_worker);

    Ok(tokio::spawn(async move {
        if let Err(err) = monitor.run().await {
            error!(target = "storytell::jobs", error = %err, "job monitor stopped");
        }
    }))
}

async fn serve_http(settings: &config::Settings, state: ApiState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "storytell::http",
        addr = %settings.server.addr,
        "listening"
    );

    let grace = settings.server.graceful_shutdown;
    let server = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal());

    // Bound the drain once the signal arrives so a stuck connection cannot hold the process.
    let served = tokio::spawn(async move { server.await });
    let abort = served.abort_handle();
    tokio::select! {
        joined = served => joined
            .map_err(|err| AppError::unexpected(format!("server task failed: {err}")))?
            .map_err(|err| AppError::unexpected(format!("server error: {err}")))?,
        () = async {
            shutdown_signal().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(
                target = "storytell::http",
                grace_seconds = grace.as_secs(),
                "graceful shutdown timed out"
            );
            abort.abort();
        }
    }

    info!(target = "storytell::http", "server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(target = "storytell::http", error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

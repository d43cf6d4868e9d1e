use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use toki_bot::backend::{HttpAccountBackend, HttpProvisioner};
use toki_bot::channels::{OutboundChannel, WhatsAppChannel};
use toki_bot::config::AppConfig;
use toki_bot::dialogue::{DialogueEngine, EngineSettings};
use toki_bot::dispatcher::Dispatcher;
use toki_bot::profile::{ProfileCache, ProfileResolver};
use toki_bot::store::{LibSqlBackend, ProfileStore};
use toki_bot::sweeper::{CompletionSweeper, SweepPacing};
use toki_bot::webhook::{AppState, router};

/// Stdout logging, plus a daily-rotating file when `log_dir` is set.
/// The returned guard flushes the file writer on drop.
fn init_tracing(log_dir: Option<&str>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout = tracing_subscriber::fmt::layer().with_target(false);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "toki-bot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stdout)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stdout).init();
            None
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;
    let _log_guard = init_tracing(config.log_dir.as_deref());

    eprintln!("💳 Toki Bot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Webhook: http://0.0.0.0:{}/whatsapp", config.port);
    eprintln!("   Backend: {}", config.backend_url);

    // ── Database ─────────────────────────────────────────────────────────
    let db = Arc::new(
        LibSqlBackend::new_local(Path::new(&config.db_path))
            .await
            .with_context(|| format!("opening database at {}", config.db_path))?,
    );
    let store: Arc<dyn ProfileStore> = db;
    tracing::info!(path = %config.db_path, "Database ready");

    // ── Collaborators ────────────────────────────────────────────────────
    let backend = Arc::new(HttpAccountBackend::new(
        config.backend_url.clone(),
        config.http_timeout,
        config.ngn_rate,
    )?);
    let provisioner = Arc::new(HttpProvisioner::new(
        config.backend_url.clone(),
        config.http_timeout,
        config.ngn_rate,
    )?);
    let channel: Arc<dyn OutboundChannel> = Arc::new(WhatsAppChannel::new(
        config.whatsapp_api_base.clone(),
        config.whatsapp_phone_id.clone(),
        config.whatsapp_token.clone(),
        config.http_timeout,
    )?);

    // ── Core services ────────────────────────────────────────────────────
    let cache = Arc::new(ProfileCache::new(config.profile_cache_ttl));
    let resolver = Arc::new(ProfileResolver::new(
        Arc::clone(&store),
        backend.clone(),
        Arc::clone(&cache),
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&store),
        backend,
        provisioner,
        cache,
    ));
    let engine = Arc::new(DialogueEngine::new(
        resolver,
        Arc::clone(&dispatcher),
        Arc::clone(&channel),
        EngineSettings {
            webapp_url: config.webapp_url.clone(),
            activation_policy: config.activation_policy,
        },
    ));

    let app = router(AppState {
        engine,
        dispatcher: Arc::clone(&dispatcher),
        channel: Arc::clone(&channel),
        verify_token: Arc::new(config.verify_token.clone()),
    });

    // ── HTTP server ──────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("binding port {}", config.port))?;
    tracing::info!(port = config.port, "Webhook server listening");

    // ── Completion sweeper ───────────────────────────────────────────────
    let sweeper = Arc::new(CompletionSweeper::new(
        store,
        dispatcher,
        channel,
        SweepPacing::default(),
    ));
    let sweeper_handle = sweeper.spawn(config.sweep_interval, config.sweep_initial_delay);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    sweeper_handle.stop().await;
    tracing::info!("Toki Bot stopped");
    Ok(())
}

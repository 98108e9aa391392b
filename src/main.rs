use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use companion::chat::{ChatRouteState, ChatService};
use companion::config::ServerConfig;
use companion::llm::{LlmBackend, LlmConfig, create_embedder, create_provider};
use companion::memory::{InMemoryVectorStore, MemoryExtractor, QdrantStore, VectorStore};
use companion::onboarding::{OnboardingRouteState, OnboardingSession, StepCatalog};
use companion::store::{LibSqlBackend, UserStore};
use companion::stream::{OpenAiTokenSource, TokenSource};

/// Stderr logging, plus a daily-rolling file when `log_dir` is set.
///
/// The returned guard flushes the file writer on drop.
fn init_tracing(log_dir: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "companion.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            None
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let config = ServerConfig::from_env().context("Failed to read configuration")?;
    let _log_guard = init_tracing(config.log_dir.as_deref());

    eprintln!("💬 Companion v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.chat_model);
    eprintln!("   Extraction model: {}", config.extraction_model);
    eprintln!("   Chat API: http://0.0.0.0:{}/api/chat", config.port);
    eprintln!("   Onboarding API: http://0.0.0.0:{}/api/onboarding", config.port);

    // ── Upstream model ──────────────────────────────────────────────────
    let token_source: Arc<dyn TokenSource> = Arc::new(OpenAiTokenSource::new(
        config.openai_base_url.clone(),
        config.openai_api_key.clone(),
    ));

    // ── Profile memory ──────────────────────────────────────────────────
    let extraction_llm = create_provider(&LlmConfig {
        backend: LlmBackend::OpenAi,
        api_key: config.openai_api_key.clone(),
        model: config.extraction_model.clone(),
    })?;
    let embedder = create_embedder(&config.openai_api_key, &config.embedding_model)?;

    let vectors: Arc<dyn VectorStore> = match &config.qdrant_url {
        Some(url) => {
            eprintln!("   Vector store: {url} ({})", config.profile_collection);
            Arc::new(QdrantStore::new(url.clone(), config.qdrant_api_key.clone()))
        }
        None => {
            eprintln!("   Vector store: in-memory (COMPANION_QDRANT_URL not set)");
            Arc::new(InMemoryVectorStore::new())
        }
    };
    let extractor = Arc::new(MemoryExtractor::new(
        extraction_llm,
        embedder,
        vectors,
        config.profile_collection.clone(),
    ));

    // ── Database ────────────────────────────────────────────────────────
    let users: Arc<dyn UserStore> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );
    eprintln!("   Database: {}\n", config.db_path.display());

    // ── HTTP ────────────────────────────────────────────────────────────
    let session = Arc::new(OnboardingSession::new(
        Arc::clone(&token_source),
        extractor,
        Arc::new(StepCatalog::default()),
        config.chat_model.clone(),
    ));
    let chat = Arc::new(ChatService::new(token_source, config.chat_model.clone()));

    let app = companion::router(
        ChatRouteState { chat },
        OnboardingRouteState { session, users },
    );

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "HTTP server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    Ok(())
}

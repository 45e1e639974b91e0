//! Gateway binary: configuration, wiring, and the HTTP listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::http::{header, HeaderValue, Method};
use embedding::OpenAiEmbedder;
use knowledge::KnowledgeIndex;
use llm_client::OpenAiResponsesClient;
use persona_core::SystemClock;
use persona_engine::PersonaEngine;
use persona_gateway::{router, AppConfig, AppState};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Expired rate-limit buckets are swept on this cadence.
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install terminate handler"),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    warn!("received shutdown signal");
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = AppConfig::load()?;
    let clock = Arc::new(SystemClock);

    let api_key = config.openai_api_key.clone().unwrap_or_default();
    let embedder = Arc::new(OpenAiEmbedder::new(api_key.clone()));
    let knowledge = Arc::new(KnowledgeIndex::new(
        config.knowledge_dir.clone(),
        embedder,
    ));
    let llm = Arc::new(
        OpenAiResponsesClient::new(api_key, config.openai_model.clone())
            .with_organization(config.openai_org_id.clone()),
    );
    let engine = Arc::new(PersonaEngine::new(
        llm,
        knowledge,
        config.openai_model.clone(),
        clock.clone(),
    ));

    let port = config.port;
    let state = Arc::new(AppState::new(config, engine, clock));

    // Bucket sweep runs off the request path; it only takes the limiter
    // lock long enough to drop expired entries.
    let sweeper = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let cleaned = sweeper.limiter.sweep();
            if cleaned > 0 {
                debug!(cleaned, "cleaned up expired rate limit buckets");
            }
        }
    });

    let app = router(state.clone())
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("service ready on http://{addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("http server closed, exiting");
    Ok(())
}

//! Climate Advisor HTTP Server
//!
//! Axum-based server providing REST API and WebSocket endpoints for the
//! climate-resilient agriculture assistant, plus plain endpoints for the
//! NOAA, NASA and Copernicus data clients.

mod config;
mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_core::{AgentBuilder, ChatService, GenerationOptions, LlmProvider, RetryingProvider, SessionManager};
use agent_runtime::{GroqConfig, GroqProvider, OllamaProvider};
use climate_advisor::sources::{
    CopernicusClient, CopernicusConfig, NasaConfig, NasaEarthClient, NoaaClient, NoaaConfig,
};
use climate_advisor::{ADVISOR_PROMPT, WikipediaClient, WikipediaConfig, build_registry};

use crate::config::{AppConfig, LlmBackend};
use crate::handlers::{
    chat_stream_handler, create_session, delete_session, era5_retrieve, get_session, health_check,
    nasa_asset, nasa_imagery, noaa_daily, send_message,
};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;
    config.validate()?;

    // Credentials are checked above; empty strings never reach the clients
    let secret = |value: &Option<String>| value.clone().unwrap_or_default();

    // Initialize LLM provider
    let backend: Arc<dyn LlmProvider> = match config.backend {
        LlmBackend::Groq => Arc::new(GroqProvider::new(GroqConfig::new(secret(&config.groq_api_key)))?),
        LlmBackend::Ollama => Arc::new(OllamaProvider::new(config.ollama_host.clone(), config.ollama_port)),
    };

    match backend.health_check().await {
        Ok(true) => {
            tracing::info!(backend = ?config.backend, model = config.model(), "✓ LLM backend reachable");
        }
        Ok(false) | Err(_) => {
            tracing::warn!(backend = ?config.backend, "⚠ LLM backend not reachable - answers will fail");
        }
    }

    let provider: Arc<dyn LlmProvider> = Arc::new(RetryingProvider::with_defaults(backend));

    // Initialize tools
    let knowledge = Arc::new(WikipediaClient::new(WikipediaConfig::default())?);
    let options = GenerationOptions {
        model: config.model().to_string(),
        ..Default::default()
    };
    let tools = build_registry(provider.clone(), knowledge, &options)?;

    tracing::info!("Registered {} tools:", tools.len());
    for name in tools.names() {
        tracing::info!("  • {}", name);
    }

    let agent = AgentBuilder::new()
        .provider(provider.clone())
        .tools(Arc::new(tools))
        .system_prompt(ADVISOR_PROMPT)
        .model(config.model())
        .max_iterations(config.max_iterations)
        .build()?;

    // Climate data clients
    let noaa = NoaaClient::new(NoaaConfig::new(secret(&config.noaa_api_key)))?;
    let nasa = NasaEarthClient::new(NasaConfig::new(secret(&config.nasa_api_key)))?;
    let copernicus = CopernicusClient::new(CopernicusConfig::new(
        secret(&config.copernicus_uid),
        secret(&config.copernicus_api_key),
    ))?;

    // Build application state
    let state = AppState {
        chat: Arc::new(ChatService::new(Arc::new(agent), Arc::new(SessionManager::new()))),
        provider,
        noaa: Arc::new(noaa),
        nasa: Arc::new(nasa),
        copernicus: Arc::new(copernicus),
    };

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🌱 climate-advisor server running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET    /health                     - Health check");
    tracing::info!("  POST   /api/sessions               - Start a session");
    tracing::info!("  GET    /api/sessions/{{id}}          - Transcript");
    tracing::info!("  DELETE /api/sessions/{{id}}          - End a session");
    tracing::info!("  POST   /api/sessions/{{id}}/messages - Ask a question");
    tracing::info!("  GET    /api/sessions/{{id}}/stream   - WebSocket streaming");
    tracing::info!("  GET    /api/climate/noaa/daily     - NOAA daily summaries");
    tracing::info!("  GET    /api/climate/nasa/asset     - Landsat asset");
    tracing::info!("  GET    /api/climate/nasa/imagery   - Landsat imagery URL");
    tracing::info!("  POST   /api/climate/era5           - Queue ERA5 retrieval");
    tracing::info!("");

    axum::serve(listener, app(state)).await?;

    Ok(())
}

/// Router with all routes and middleware
fn app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        // Chat sessions
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{id}", get(get_session).delete(delete_session))
        .route("/api/sessions/{id}/messages", post(send_message))
        .route("/api/sessions/{id}/stream", get(chat_stream_handler))
        // Climate data
        .route("/api/climate/noaa/daily", get(noaa_daily))
        .route("/api/climate/nasa/asset", get(nasa_asset))
        .route("/api/climate/nasa/imagery", get(nasa_imagery))
        .route("/api/climate/era5", post(era5_retrieve))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

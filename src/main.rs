//! Concierge - customer-support assistant backend
//!
//! Proxies chat messages to a hosted conversational assistant, keeps the
//! per-user thread mapping, and services the assistant's tool calls
//! (order-status lookup, human-handoff capture) against local stores.

mod actions;
mod api;
mod assistant;
mod db;
mod orchestrator;

use actions::ActionRegistry;
use api::{create_router, AppState};
use assistant::{AssistantConfig, LoggingAssistant, OpenAiAssistant};
use db::Database;
use orchestrator::Orchestrator;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "concierge=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let db_path = std::env::var("CONCIERGE_DB_PATH").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        format!("{home}/.concierge/concierge.db")
    });

    let port: u16 = std::env::var("CONCIERGE_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);

    let allowed_origin = std::env::var("CONCIERGE_ALLOWED_ORIGIN")
        .unwrap_or_else(|_| "http://localhost:3000".to_string());

    // Ensure database directory exists
    if let Some(parent) = PathBuf::from(&db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Initialize database and seed the order store on first start
    tracing::info!(path = %db_path, "Opening database");
    let db = Database::open(&db_path)?;
    let seeded = db.seed_orders_if_empty()?;
    if seeded > 0 {
        tracing::info!(seeded, "Seeded order store");
    }

    // Initialize the assistant client
    let Some(assistant_config) = AssistantConfig::from_env() else {
        tracing::error!("Assistant not configured. Set OPENAI_API_KEY and ASSISTANT_ID.");
        return Err("missing assistant configuration".into());
    };
    let assistant = Arc::new(LoggingAssistant::new(Arc::new(OpenAiAssistant::new(
        assistant_config,
    ))));

    // Create application state
    let actions = ActionRegistry::standard(db.clone());
    let orchestrator = Orchestrator::new(assistant, db, actions);
    let state = AppState::new(orchestrator);

    // Create router; cross-origin callers are restricted to one origin
    let cors = CorsLayer::new()
        .allow_origin(allowed_origin.parse::<axum::http::HeaderValue>()?)
        .allow_methods([axum::http::Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    let app = create_router(state).layer(cors).layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Concierge server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

//! # Member QA Server
//!
//! HTTP front end for the retrieval engine.
//!
//! ```text
//! messages API ──► MessagesClient ──► RetrievalEngine::rebuild
//!                                            │
//!   GET/POST /ask ──► RetrievalEngine::answer ┘──► "Member: … | Timestamp: … | Message: …"
//! ```
//!
//! Routes:
//! - `GET /ask?question=…`, `POST /ask` - answer a question
//! - `GET /health` - liveness and corpus size
//! - `POST /reload` - re-fetch messages and rebuild the index

pub mod config;
pub mod error;
pub mod messages;
pub mod routes;
pub mod state;

pub use config::ServiceConfig;
pub use error::{ApiError, MessagesError, ReloadError};
pub use messages::MessagesClient;
pub use state::AppState;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
};
use member_qa_retrieval::RetrievalEngine;
use tracing::info;

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ask", get(routes::ask_get).post(routes::ask_post))
        .route("/health", get(routes::health))
        .route("/reload", post(routes::reload))
        .with_state(state)
}

/// Build the engine, load the corpus and serve until Ctrl-C.
pub async fn run(config: ServiceConfig) -> anyhow::Result<()> {
    config.validate()?;

    let engine = RetrievalEngine::from_config(&config.retrieval)
        .context("failed to initialize the embedding model")?;
    let messages =
        MessagesClient::new(&config.messages).context("failed to build the messages client")?;
    let state = AppState::new(engine, messages);

    info!("Fetching member messages from {}", state.messages.messages_url());
    if let Some(report) = state.load_initial().await {
        info!(
            "Startup complete: {} messages indexed with {}",
            report.indexed, report.model
        );
    }

    let refresh = config
        .retrieval
        .refresh_interval()
        .map(|interval| state::spawn_refresh(Arc::clone(&state), interval));

    let addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on http://{addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    if let Some(task) = refresh {
        task.abort();
    }
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}

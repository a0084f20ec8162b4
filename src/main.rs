//! Persona Chat - character chat API
//!
//! Pick one of a handful of personas and talk to a hosted chat completion
//! model in its voice. Each browser session gets its own conversation held in
//! memory for as long as the process runs.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod conversation;
mod core;
mod providers;
mod routes;

use crate::config::Config;
use crate::core::SessionManager;
use crate::providers::{CompletionClient, OpenAiCompatClient, RetryPolicy, RetryingClient};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "persona_chat=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().inspect_err(|e| tracing::error!("{}", e))?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let deployment = &config.deployment;
    let client: Arc<dyn CompletionClient> = Arc::new(RetryingClient::new(
        OpenAiCompatClient::new(
            config.provider.clone(),
            deployment.model.clone(),
            &deployment.client,
        )?,
        RetryPolicy::from(&deployment.client),
    ));

    tracing::info!(
        "Using model {} via {:?} endpoint {}",
        deployment.model.name,
        config.provider.api_type,
        config.provider.api_base
    );

    let sessions = Arc::new(SessionManager::new(client, deployment.model.max_input_tokens));
    let _sweeper = sessions.spawn_sweeper(&deployment.sessions);

    let state = AppState { sessions };

    let app = Router::new()
        .merge(routes::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("Persona chat API running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

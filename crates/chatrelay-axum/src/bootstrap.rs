//! Axum server bootstrap - the composition root.
//!
//! This module is the ONLY place where the relay is wired together: the
//! hub, the generation client, the pipeline and the supervisor are all
//! instantiated here, and the two listeners are started and drained here.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chatrelay_core::{
    EventPublisher, GenerationClient, RelayConfig, RelayPipeline, SessionSupervisor,
};
use chatrelay_openai::OpenAiClient;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::pubsub::{ChannelHub, HubConfig};
use crate::routes::{create_pubsub_router, create_router};
use crate::state::AppState;

/// CORS configuration for both listeners.
#[derive(Debug, Clone, Default)]
pub enum CorsConfig {
    /// Allow all origins (development mode).
    #[default]
    AllowAll,
    /// Allow specific origins (production mode).
    AllowOrigins(Vec<String>),
}

impl CorsConfig {
    /// Allow-all for an empty list or a `*` entry, otherwise the listed
    /// origins.
    pub fn from_origins(origins: Vec<String>) -> Self {
        let origins: Vec<String> = origins
            .into_iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
        if origins.is_empty() || origins.iter().any(|o| o == "*") {
            Self::AllowAll
        } else {
            Self::AllowOrigins(origins)
        }
    }
}

/// Listener and request-level settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address for both listeners.
    pub host: String,
    /// Port for the chat API.
    pub port: u16,
    /// Port for the subscription endpoints.
    pub pubsub_port: u16,
    /// CORS configuration.
    pub cors: CorsConfig,
    /// How long shutdown waits for running sessions.
    pub shutdown_grace: Duration,
    /// Longest accepted chat message, in characters.
    pub max_message_chars: usize,
}

/// Application context for the Axum adapter.
///
/// Holds every service the handlers need; shared as [`AppState`].
#[derive(Debug)]
pub struct AxumContext {
    /// Launches and drains relay sessions.
    pub supervisor: Arc<SessionSupervisor>,
    /// The pub/sub hub sessions publish into and subscribers read from.
    pub hub: Arc<ChannelHub>,
    /// Longest accepted chat message, in characters.
    pub max_message_chars: usize,
}

/// Wire the relay around an arbitrary generation client.
pub fn assemble(
    generator: Arc<dyn GenerationClient>,
    relay: RelayConfig,
    hub: HubConfig,
    max_message_chars: usize,
) -> AxumContext {
    let hub = Arc::new(ChannelHub::new(hub));
    let publisher: Arc<dyn EventPublisher> = hub.clone();
    let pipeline = RelayPipeline::new(publisher, generator, relay);
    let supervisor = Arc::new(SessionSupervisor::new(pipeline, CancellationToken::new()));

    AxumContext {
        supervisor,
        hub,
        max_message_chars,
    }
}

/// Build the context with the OpenAI-compatible backend from `settings`.
pub fn bootstrap(settings: &Settings) -> Result<AxumContext> {
    let client = OpenAiClient::new(settings.generation.clone())
        .context("invalid generation backend configuration")?;

    info!(
        endpoint = %client.endpoint(),
        model = client.model(),
        chunk_fault_policy = %settings.relay.chunk_fault_policy,
        "Generation backend configured"
    );

    Ok(assemble(
        Arc::new(client),
        settings.relay,
        settings.hub,
        settings.server.max_message_chars,
    ))
}

/// Run both listeners until SIGINT/SIGTERM, then drain.
///
/// Shutdown order: stop accepting connections, cancel sessions and wait up
/// to the grace period, close the hub (which ends open subscriptions), then
/// wait for the servers to finish.
pub async fn start_server(settings: Settings) -> Result<()> {
    let state: AppState = Arc::new(bootstrap(&settings)?);
    let config = &settings.server;
    let reaper = state.hub.spawn_reaper();

    let api_addr = format!("{}:{}", config.host, config.port);
    let api_listener = TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {api_addr}"))?;
    let pubsub_addr = format!("{}:{}", config.host, config.pubsub_port);
    let pubsub_listener = TcpListener::bind(&pubsub_addr)
        .await
        .with_context(|| format!("failed to bind pub/sub listener on {pubsub_addr}"))?;

    info!("chatrelay API listening on http://{}", api_listener.local_addr()?);
    info!(
        "chatrelay pub/sub listening on http://{}",
        pubsub_listener.local_addr()?
    );

    let stop_accepting = CancellationToken::new();
    let api = spawn_listener(
        "api",
        api_listener,
        create_router(Arc::clone(&state), &config.cors),
        stop_accepting.clone(),
    );
    let pubsub = spawn_listener(
        "pubsub",
        pubsub_listener,
        create_pubsub_router(Arc::clone(&state), &config.cors),
        stop_accepting.clone(),
    );

    shutdown_signal().await;
    info!("Shutdown signal received");
    stop_accepting.cancel();

    let report = state.supervisor.shutdown(config.shutdown_grace).await;
    info!(
        drained = report.drained,
        abandoned = report.abandoned,
        "Relay sessions stopped"
    );

    state.hub.close().await;
    if let Err(e) = reaper.await {
        warn!("Channel reaper ended abnormally: {e}");
    }

    for (name, task) in [("api", api), ("pubsub", pubsub)] {
        match tokio::time::timeout(config.shutdown_grace, task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => error!(listener = name, "Server ended with error: {e}"),
            Ok(Err(e)) => error!(listener = name, "Server task panicked: {e}"),
            Err(_) => warn!(listener = name, "Server did not stop within the grace period"),
        }
    }

    info!("chatrelay stopped");
    Ok(())
}

fn spawn_listener(
    name: &'static str,
    listener: TcpListener,
    app: axum::Router,
    stop: CancellationToken,
) -> JoinHandle<std::io::Result<()>> {
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(stop.cancelled_owned())
            .await?;
        info!(listener = name, "Server shut down");
        Ok(())
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

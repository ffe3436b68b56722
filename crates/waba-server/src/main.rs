//! `waba-server`: the HTTP binary wiring every messaging automation core
//! crate onto a single `axum::Router` (spec §6).

mod dto;
mod error;
mod handlers;
mod reaper;
mod routes;
mod scheduler;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use waba_core::{MemoryGateway, PersistenceGateway, TraceEmitter};
use waba_dispatcher::CampaignDispatcher;
use waba_ingestor::ReplyIngestor;
use waba_postgres::PostgresGateway;
use waba_provider::HttpProviderClient;
use waba_trace::TraceSink;
use waba_turbo::TurboController;
use waba_workflow::WorkflowEngine;

use crate::state::AppState;

/// HTTP server for the WhatsApp messaging automation core.
#[derive(Parser)]
#[command(name = "waba-server")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Serves the workflow engine, campaign dispatcher, and reply ingestor over HTTP")]
struct Cli {
    /// Address to bind the HTTP listener to.
    #[arg(long, env = "WABA_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to bind the HTTP listener to.
    #[arg(long, env = "WABA_PORT", default_value_t = 8080)]
    port: u16,

    /// Postgres connection string. Falls back to an in-memory gateway
    /// when unset (development only; state does not survive a restart).
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Base URL of the upstream WhatsApp Business provider API.
    #[arg(long, env = "WABA_PROVIDER_BASE_URL")]
    provider_base_url: String,

    /// Access token for the upstream provider API.
    #[arg(long, env = "WABA_PROVIDER_ACCESS_TOKEN")]
    provider_access_token: String,

    /// Webhook verify token (spec §4.F). Stored into the settings store
    /// on startup if provided; an already-persisted value is left alone.
    #[arg(long, env = "WABA_WEBHOOK_VERIFY_TOKEN")]
    webhook_verify_token: Option<String>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("waba_server=info,tower_http=info"));
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true));
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install tracing subscriber: {e}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    info!(version = env!("CARGO_PKG_VERSION"), "waba-server starting");

    let (gateway, trace): (Arc<dyn PersistenceGateway>, Arc<dyn TraceEmitter>) = match &cli.database_url {
        Some(url) => {
            info!("connecting to postgres");
            let pg = Arc::new(PostgresGateway::connect(url).await.context("connecting to postgres")?);
            // Same connection backs both traits: the gateway and the trace
            // store share one `tokio_postgres::Client`.
            let trace_store: Arc<dyn waba_trace::TraceStore> = pg.clone();
            let trace: Arc<dyn TraceEmitter> = Arc::new(TraceSink::persistent(trace_store));
            let gateway: Arc<dyn PersistenceGateway> = pg;
            (gateway, trace)
        }
        None => {
            info!("no DATABASE_URL set, using in-memory gateway (state will not persist)");
            (Arc::new(MemoryGateway::new()), Arc::new(TraceSink::logging_only()))
        }
    };

    if let Some(token) = &cli.webhook_verify_token {
        gateway
            .put_setting(waba_core::settings::WEBHOOK_VERIFY_TOKEN, serde_json::Value::String(token.clone()))
            .await
            .context("persisting webhook verify token")?;
    }
    let verify_token = match gateway.get_setting(waba_core::settings::WEBHOOK_VERIFY_TOKEN).await? {
        Some(serde_json::Value::String(s)) => Some(s),
        _ => None,
    };

    let provider = Arc::new(
        HttpProviderClient::new(cli.provider_base_url.clone(), cli.provider_access_token.clone())
            .context("building provider client")?,
    );
    let turbo = Arc::new(TurboController::new(gateway.clone()));
    let engine = Arc::new(WorkflowEngine::new(gateway.clone(), provider.clone(), trace.clone()));
    let dispatcher = Arc::new(CampaignDispatcher::new(gateway.clone(), provider.clone(), turbo, trace.clone()));
    let ingestor = Arc::new(ReplyIngestor::new(gateway.clone(), provider.clone(), engine.clone(), trace.clone(), verify_token));

    let state = AppState { gateway, provider, engine, dispatcher, ingestor, trace };

    reaper::spawn(state.clone());
    scheduler::spawn(state.clone());

    let app = routes::router(state);
    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port)
        .parse()
        .context("parsing bind address")?;
    let listener = tokio::net::TcpListener::bind(addr).await.context("binding listener")?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("waba-server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
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
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

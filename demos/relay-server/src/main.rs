//! Chat relay HTTP server.
//!
//! Run with: cargo run -p relay-server -- --webhook-url <URL>
//!
//! Clients open `GET /api/mcp?client_id=<id>` as an event stream and post
//! messages to `POST /api/mcp` with the same id.

use std::{future::IntoFuture, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use chat_relay_session::{Relay, SessionRegistry};
use chat_relay_transport::{HttpBackend, WebhookConfig, create_router, cors_layer};
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "relay-server")]
#[command(version, about = "Relay client event streams to a conversational webhook")]
struct Args {
    /// Address to bind.
    #[arg(long, env = "RELAY_HOST", default_value = "127.0.0.1")]
    host: std::net::IpAddr,

    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Backend webhook endpoint receiving `new_message` posts.
    #[arg(long, env = "RELAY_WEBHOOK_URL")]
    webhook_url: String,

    /// Upper bound on a backend call, in seconds.
    #[arg(long, env = "RELAY_BACKEND_TIMEOUT", default_value_t = 30)]
    backend_timeout: u64,

    /// Output logs as JSON.
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    if args.log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let backend = HttpBackend::new(
        WebhookConfig::new(args.webhook_url)
            .with_timeout(Duration::from_secs(args.backend_timeout)),
    )
    .context("Failed to build webhook client")?;
    info!(webhook = %backend.url(), timeout_secs = args.backend_timeout, "Backend configured");

    let relay = Arc::new(Relay::new(SessionRegistry::new(), backend));

    let app = create_router(relay)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from((args.host, args.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Relay listening on http://{addr}");

    tokio::select! {
        result = axum::serve(listener, app).into_future() => {
            result.context("Server error")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Relay stopped");
    Ok(())
}

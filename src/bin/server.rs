// Copyright 2025 Cowboy AI, LLC.

//! Demo server binary for the partitioned delivery engine.
//!
//! Starts an axum HTTP server exposing the demo trigger endpoints, with
//! structured logging and graceful shutdown on SIGTERM/SIGINT. The transport
//! defaults to the in-memory broker; setting `NATS_URL` switches the wiring to
//! NATS JetStream.

use anyhow::Context;
use cim_partition::api::{router, AppState};
use cim_partition::demo::{DemoConfig, DemoRunner};
use cim_partition::infrastructure::{
    EventTransport, InMemoryTransport, NatsTransport, NatsTransportConfig,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

async fn build_transport() -> anyhow::Result<Arc<dyn EventTransport>> {
    match std::env::var("NATS_URL") {
        Ok(url) if !url.trim().is_empty() => {
            let config = NatsTransportConfig {
                url: url.clone(),
                ..Default::default()
            };
            let transport = NatsTransport::connect(config)
                .await
                .with_context(|| format!("failed to connect to NATS at {url}"))?;
            tracing::info!(%url, "using NATS JetStream transport");
            Ok(Arc::new(transport))
        }
        _ => {
            tracing::info!("using in-memory transport");
            Ok(Arc::new(InMemoryTransport::new()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("LOG_JSON").is_ok_and(|value| value == "1" || value == "true") {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let transport = build_transport().await?;
    let state = Arc::new(AppState {
        runner: DemoRunner::new(transport, DemoConfig::default()),
    });

    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
        .parse()
        .context("BIND_ADDR must be a socket address like 127.0.0.1:8080")?;

    tracing::info!(%addr, "starting booking demo server");
    tracing::info!("POST /api/bookings/demo-problem    unkeyed delivery, ordering anomalies expected");
    tracing::info!("POST /api/bookings/demo-solved     keyed delivery, per-booking order preserved");
    tracing::info!("POST /api/bookings/demo-multiple   several bookings interleaved, keyed");
    tracing::info!("POST /api/bookings/demo-comparison both pipelines side by side");

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("booking demo server shut down");
    Ok(())
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}

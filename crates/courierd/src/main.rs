//! courierd — Courier peer-to-peer file transfer daemon.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use courier_core::config::CourierConfig;
use courier_transfer::{accept_loop, dial_with_retry, receive_file, send_file, RetryPolicy};

mod session;

use session::{new_session_table, Direction, SessionMeta, SessionTable};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = CourierConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = CourierConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        CourierConfig::default()
    });

    let mode = std::env::args().nth(1).unwrap_or_default();
    match mode.as_str() {
        "server" => {
            let mut config = config;
            if let Some(port) = std::env::args().nth(2) {
                config.network.listen_port = port
                    .parse()
                    .with_context(|| format!("invalid port {port:?}"))?;
            }
            run_server(config).await
        }
        "client" => {
            let (target, file) = client_args(&config)?;
            run_client(config, target, file).await
        }
        _ => {
            eprintln!("Usage: courierd <mode> [args]");
            eprintln!("Modes:");
            eprintln!("  server [port]           Listen for inbound transfers (default port 8080)");
            eprintln!("  client [target] <file>  Send a file to a peer (default target localhost:8080)");
            Ok(())
        }
    }
}

/// `client [target] <file>` — with a single argument that names an
/// existing file, the default target is assumed.
fn client_args(config: &CourierConfig) -> Result<(String, PathBuf)> {
    let second = std::env::args().nth(2);
    let third = std::env::args().nth(3);
    match (second, third) {
        (Some(target), Some(file)) => Ok((target, PathBuf::from(file))),
        (Some(only), None) => {
            let path = PathBuf::from(&only);
            if path.exists() {
                Ok((config.network.target.clone(), path))
            } else {
                bail!("client mode needs a file to send (got target {only:?} but no file)")
            }
        }
        _ => bail!("client mode needs a file to send"),
    }
}

// ── Server ────────────────────────────────────────────────────────────────────

async fn run_server(config: CourierConfig) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", config.network.listen_port))
        .await
        .with_context(|| format!("failed to bind port {}", config.network.listen_port))?;
    tracing::info!(port = config.network.listen_port, "server listening");

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    let sessions = new_session_table();
    spawn_session_printer(sessions.clone(), shutdown_tx.subscribe());

    let config = Arc::new(config);
    let next_session = Arc::new(AtomicU64::new(0));

    accept_loop(listener, shutdown_tx.subscribe(), move |stream, peer_addr| {
        let config = config.clone();
        let sessions = sessions.clone();
        let session_id = next_session.fetch_add(1, Ordering::Relaxed);

        sessions.insert(
            session_id,
            SessionMeta {
                peer_addr,
                direction: Direction::Inbound,
                started_at: Instant::now(),
            },
        );

        tokio::spawn(async move {
            match receive_file(stream, &config).await {
                Ok(outcome) => tracing::info!(
                    session_id,
                    sender = %outcome.sender_id,
                    path = %outcome.path.display(),
                    chunks = outcome.chunks,
                    bytes = outcome.bytes,
                    "session complete"
                ),
                Err(e) => tracing::warn!(
                    session_id,
                    peer = %peer_addr,
                    error = %e,
                    "session failed"
                ),
            }
            sessions.remove(&session_id);
        });
    })
    .await
    .context("accept loop failed")
}

fn spawn_session_printer(sessions: SessionTable, mut shutdown: broadcast::Receiver<()>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(10));
        loop {
            tokio::select! {
                _ = shutdown.recv() => return,
                _ = interval.tick() => {
                    if sessions.is_empty() {
                        continue;
                    }
                    tracing::info!(count = sessions.len(), "session table snapshot");
                    for s in sessions.iter() {
                        tracing::info!(
                            session_id = s.key(),
                            peer = %s.peer_addr,
                            direction = %s.direction,
                            age_secs = s.started_at.elapsed().as_secs(),
                            "  session"
                        );
                    }
                }
            }
        }
    });
}

// ── Client ────────────────────────────────────────────────────────────────────

async fn run_client(config: CourierConfig, target: String, file: PathBuf) -> Result<()> {
    let sender_id = generate_sender_id();
    tracing::info!(
        sender_id = %sender_id,
        target = %target,
        file = %file.display(),
        direction = %Direction::Outbound,
        "client starting"
    );

    let policy = RetryPolicy::from_config(&config.network);

    loop {
        let stream = dial_with_retry(&target, &policy)
            .await
            .context("could not reach peer")?;

        match send_file(stream, &file, &sender_id, &config).await {
            Ok(outcome) => {
                tracing::info!(
                    chunks = outcome.chunks,
                    bytes = outcome.bytes,
                    root = %hex::encode(outcome.root),
                    "transfer complete"
                );
                return Ok(());
            }
            Err(e) if e.is_retryable() => {
                tracing::warn!(error = %e, "connection lost mid-transfer, redialing");
                continue;
            }
            Err(e) => return Err(e).context("transfer failed"),
        }
    }
}

/// Nanosecond timestamp ids keep concurrent senders in distinct storage
/// namespaces without any coordination.
fn generate_sender_id() -> String {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

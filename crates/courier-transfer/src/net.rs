//! Connection lifecycle — server accept loop and client dial-with-retry.

use std::net::SocketAddr;
use std::time::Duration;

use courier_core::config::NetworkConfig;
use courier_core::error::TransferError;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

/// Client reconnect policy.
///
/// The reference behavior is a fixed 5-second wait repeated forever;
/// here the wait doubles up to a ceiling, and `max_attempts` can bound
/// the loop (0 keeps the retry-forever reference semantics).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub backoff: Duration,
    pub backoff_cap: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn from_config(network: &NetworkConfig) -> Self {
        Self {
            backoff: Duration::from_secs(network.backoff_secs),
            backoff_cap: Duration::from_secs(network.backoff_cap_secs.max(network.backoff_secs)),
            max_attempts: network.max_dial_attempts,
        }
    }
}

/// Dial `target`, sleeping between failed attempts per `policy`.
///
/// Only the dialing task suspends during backoff; nothing else in the
/// process is affected.
pub async fn dial_with_retry(target: &str, policy: &RetryPolicy) -> Result<TcpStream, TransferError> {
    let mut attempt: u32 = 0;
    let mut backoff = policy.backoff;

    loop {
        attempt += 1;
        match TcpStream::connect(target).await {
            Ok(stream) => {
                tracing::info!(target, attempt, "connected to peer");
                return Ok(stream);
            }
            Err(e) => {
                if policy.max_attempts != 0 && attempt >= policy.max_attempts {
                    return Err(TransferError::Connection(format!(
                        "giving up on {target} after {attempt} attempts: {e}"
                    )));
                }
                tracing::warn!(
                    target,
                    attempt,
                    error = %e,
                    retry_in_secs = backoff.as_secs_f64(),
                    "dial failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(policy.backoff_cap);
            }
        }
    }
}

/// Run the accept loop until shutdown.
///
/// Each accepted connection is handed to `handler`, which is expected to
/// spawn its own task — one independent session per connection. A failed
/// accept is logged and the loop continues; a single bad accept never
/// stops the server.
pub async fn accept_loop<H>(
    listener: TcpListener,
    mut shutdown: broadcast::Receiver<()>,
    handler: H,
) -> Result<(), TransferError>
where
    H: Fn(TcpStream, SocketAddr),
{
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("accept loop shutting down");
                return Ok(());
            }

            result = listener.accept() => {
                match result {
                    Ok((stream, peer_addr)) => {
                        tracing::info!(peer = %peer_addr, "connection accepted");
                        handler(stream, peer_addr);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                        continue;
                    }
                }
            }
        }
    }
}

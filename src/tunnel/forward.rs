//! Local port forwarding.
//!
//! The accept loop hands every local connection to a [`Dialer`], which opens
//! the far side (an SSH `direct-tcpip` channel in production), and then copies
//! bytes both ways until either end closes.

use crate::error::{LoadError, LoadResult};
use async_trait::async_trait;
use russh::client;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use super::handler::TunnelHandler;

/// Byte stream to the far end of the tunnel.
pub trait TunnelStream: AsyncRead + AsyncWrite + Send {}

impl<T: AsyncRead + AsyncWrite + Send> TunnelStream for T {}

/// Opens the remote end of a forwarded connection.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// `originator` is the local peer that connected to the listener.
    async fn dial(&self, originator: SocketAddr) -> LoadResult<Self::Stream>;
}

/// Dials through an authenticated SSH session.
pub struct SshDialer {
    session: Arc<client::Handle<TunnelHandler>>,
    remote_host: String,
    remote_port: u16,
}

impl SshDialer {
    pub fn new(
        session: Arc<client::Handle<TunnelHandler>>,
        remote_host: impl Into<String>,
        remote_port: u16,
    ) -> Self {
        Self {
            session,
            remote_host: remote_host.into(),
            remote_port,
        }
    }
}

#[async_trait]
impl Dialer for SshDialer {
    type Stream = Pin<Box<dyn TunnelStream>>;

    async fn dial(&self, originator: SocketAddr) -> LoadResult<Self::Stream> {
        let channel = self
            .session
            .channel_open_direct_tcpip(
                self.remote_host.clone(),
                u32::from(self.remote_port),
                originator.ip().to_string(),
                u32::from(originator.port()),
            )
            .await?;
        Ok(Box::pin(channel.into_stream()))
    }
}

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);
const ACCEPT_RETRY_MAX_DELAY: Duration = Duration::from_secs(1);
const MAX_ACCEPT_FAILURES: u32 = 10;

/// Delay between failed `accept()` calls. Errors such as EMFILE persist, so
/// the loop waits longer after each one and gives up after a run of them.
#[derive(Debug)]
pub(crate) struct AcceptBackoff {
    failures: u32,
    max_failures: u32,
    base: Duration,
    max: Duration,
}

impl AcceptBackoff {
    pub(crate) fn new(base: Duration, max: Duration, max_failures: u32) -> Self {
        Self {
            failures: 0,
            max_failures,
            base,
            max,
        }
    }

    /// Record a failure. `None` means stop accepting.
    pub(crate) fn on_error(&mut self) -> Option<Duration> {
        self.failures += 1;
        if self.failures >= self.max_failures {
            return None;
        }
        Some((self.base * self.failures).min(self.max))
    }

    pub(crate) fn on_success(&mut self) {
        self.failures = 0;
    }
}

impl Default for AcceptBackoff {
    fn default() -> Self {
        Self::new(ACCEPT_RETRY_DELAY, ACCEPT_RETRY_MAX_DELAY, MAX_ACCEPT_FAILURES)
    }
}

/// Accept connections on `listener`, forwarding each through `dialer`.
///
/// Runs until aborted, or until `accept()` keeps failing; in that case
/// connections already in flight are left to finish.
///
/// Forwarded connections live in a `JoinSet`, so aborting the task running
/// this loop also tears down every connection in flight.
pub async fn forward_connections<D: Dialer>(listener: TcpListener, dialer: Arc<D>) {
    let mut connections = JoinSet::new();
    let mut backoff = AcceptBackoff::default();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    backoff.on_success();
                    let dialer = Arc::clone(&dialer);
                    connections.spawn(async move {
                        if let Err(e) = forward_one(socket, peer, dialer.as_ref()).await {
                            warn!(peer = %peer, error = %e, "Forwarded connection failed");
                        }
                    });
                }
                Err(e) => match backoff.on_error() {
                    Some(delay) => {
                        warn!(error = %e, retry_in = ?delay, "Tunnel listener accept failed");
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        error!(error = %e, "Tunnel listener keeps failing, no longer accepting");
                        break;
                    }
                },
            },
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = joined {
                    if e.is_panic() {
                        warn!(error = %e, "Forwarding task panicked");
                    }
                }
            }
        }
    }

    while let Some(joined) = connections.join_next().await {
        if let Err(e) = joined {
            if e.is_panic() {
                warn!(error = %e, "Forwarding task panicked");
            }
        }
    }
}

async fn forward_one<D: Dialer>(
    mut socket: TcpStream,
    peer: SocketAddr,
    dialer: &D,
) -> LoadResult<()> {
    debug!(peer = %peer, "Forwarding connection");
    let mut remote = dialer.dial(peer).await?;
    let (sent, received) = tokio::io::copy_bidirectional(&mut socket, &mut remote)
        .await
        .map_err(|e| LoadError::tunnel(format!("Forwarding I/O error: {}", e), "Retry the load"))?;
    debug!(peer = %peer, sent, received, "Forwarded connection closed");
    Ok(())
}

//! SSH tunnel to the database host.
//!
//! [`Tunnel::open`] authenticates to the SSH server, binds an ephemeral local
//! port and forwards every connection made to it to the database port on the
//! far side. [`Tunnel::close`] tears it down; dropping an open tunnel stops
//! forwarding as well.

pub mod forward;
pub mod handler;

pub use forward::{Dialer, SshDialer, forward_connections};
pub use handler::TunnelHandler;

use crate::config::{DatabaseConfig, SshConfig};
use crate::error::{LoadError, LoadResult};
use russh::{Disconnect, client};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub struct Tunnel {
    session: Arc<client::Handle<TunnelHandler>>,
    local_addr: SocketAddr,
    forwarder: Option<JoinHandle<()>>,
}

impl Tunnel {
    /// Open a tunnel from a local ephemeral port to
    /// `ssh.remote_bind_host:database.port` as seen from the SSH server.
    pub async fn open(ssh: &SshConfig, database: &DatabaseConfig) -> LoadResult<Self> {
        info!(
            address = %ssh.address(),
            user = %ssh.user,
            "Opening SSH tunnel"
        );

        let config = Arc::new(client::Config::default());
        let handler = TunnelHandler::new(ssh.host_key_fingerprint.clone());
        let mut session = client::connect(config, (ssh.host.as_str(), ssh.port), handler).await?;

        let authenticated = session
            .authenticate_password(ssh.user.as_str(), ssh.password.as_str())
            .await?;
        if !authenticated {
            return Err(LoadError::authentication(&ssh.user));
        }
        debug!(user = %ssh.user, "SSH authentication succeeded");

        let listener = TcpListener::bind((ssh.local_bind_host.as_str(), 0))
            .await
            .map_err(|e| {
                LoadError::tunnel(
                    format!("Cannot bind {}: {}", ssh.local_bind_host, e),
                    "Check SSH_LOCAL_BIND_HOST",
                )
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| LoadError::internal(format!("Listener has no local address: {}", e)))?;

        let session = Arc::new(session);
        let dialer = SshDialer::new(
            Arc::clone(&session),
            ssh.remote_bind_host.as_str(),
            database.port,
        );
        let forwarder = tokio::spawn(forward_connections(listener, Arc::new(dialer)));

        println!(
            "SSH tunnel established. Local bind port: {}",
            local_addr.port()
        );
        info!(
            local_port = local_addr.port(),
            remote = %format!("{}:{}", ssh.remote_bind_host, database.port),
            "SSH tunnel established"
        );

        Ok(Self {
            session,
            local_addr,
            forwarder: Some(forwarder),
        })
    }

    /// Local port forwarding to the database.
    pub fn local_port(&self) -> u16 {
        self.local_addr.port()
    }

    /// True while the tunnel still forwards connections.
    pub fn is_active(&self) -> bool {
        self.forwarder
            .as_ref()
            .is_some_and(|forwarder| !forwarder.is_finished())
    }

    /// Close the tunnel if it is still active. Best-effort: failures while
    /// disconnecting are logged and otherwise ignored.
    pub async fn close(mut self) {
        if !self.is_active() {
            return;
        }
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
            let _ = forwarder.await;
        }
        if let Err(e) = self
            .session
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            debug!(error = %e, "SSH disconnect failed");
        }
        println!("SSH tunnel closed.");
        info!(local_port = self.local_addr.port(), "SSH tunnel closed");
    }
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
            debug!(
                local_port = self.local_addr.port(),
                "Tunnel dropped without close - forwarding stopped"
            );
        }
    }
}

impl std::fmt::Debug for Tunnel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tunnel")
            .field("local_addr", &self.local_addr)
            .field("active", &self.is_active())
            .finish()
    }
}

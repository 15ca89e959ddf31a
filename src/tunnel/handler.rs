//! russh client handler.

use async_trait::async_trait;
use russh::client;
use russh_keys::key::PublicKey;
use tracing::{info, warn};

/// Client-side callbacks for the tunnel's SSH session.
///
/// Without a pinned fingerprint every host key is accepted and logged.
#[derive(Debug, Clone, Default)]
pub struct TunnelHandler {
    expected_fingerprint: Option<String>,
}

impl TunnelHandler {
    pub fn new(expected_fingerprint: Option<String>) -> Self {
        Self {
            expected_fingerprint,
        }
    }
}

#[async_trait]
impl client::Handler for TunnelHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint();
        match &self.expected_fingerprint {
            None => {
                info!(
                    algorithm = server_public_key.name(),
                    fingerprint = %fingerprint,
                    "Accepting SSH host key"
                );
                Ok(true)
            }
            Some(expected) if fingerprint_matches(expected, &fingerprint) => Ok(true),
            Some(expected) => {
                warn!(
                    expected = %expected,
                    actual = %fingerprint,
                    "SSH host key fingerprint mismatch"
                );
                Ok(false)
            }
        }
    }
}

/// Compare fingerprints as printed by `ssh-keygen -lf` (`SHA256:<base64>`) or
/// bare base64, ignoring base64 padding.
pub fn fingerprint_matches(expected: &str, actual: &str) -> bool {
    normalize(expected) == normalize(actual)
}

fn normalize(fingerprint: &str) -> &str {
    let trimmed = fingerprint.trim();
    let bare = trimmed.strip_prefix("SHA256:").unwrap_or(trimmed);
    bare.trim_end_matches('=')
}

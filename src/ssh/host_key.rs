//! Router host identity checks.
//!
//! With `ssh.verify_host_key = false` (the default) any host key is accepted,
//! which leaves sessions open to interception. `main` warns about it at
//! startup. With verification on, the server key's SHA-256 fingerprint must be
//! listed in `ssh.trusted_host_keys`.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use russh::client;
use russh_keys::key::PublicKey;
use tracing::{debug, warn};

use crate::config::SshConfig;

const FINGERPRINT_PREFIX: &str = "SHA256:";

/// Which router host keys a session accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Accept every host key without checking.
    AcceptAny,
    /// Accept only these SHA-256 fingerprints (base64, no prefix).
    Trusted(Arc<HashSet<String>>),
}

impl HostKeyPolicy {
    pub fn from_config(config: &SshConfig) -> Self {
        if config.verify_host_key {
            Self::trusted(config.trusted_host_keys.iter().map(String::as_str))
        } else {
            Self::AcceptAny
        }
    }

    pub fn trusted<'a>(fingerprints: impl IntoIterator<Item = &'a str>) -> Self {
        Self::Trusted(Arc::new(
            fingerprints
                .into_iter()
                .map(|f| normalize(f).to_string())
                .collect(),
        ))
    }

    pub fn is_verifying(&self) -> bool {
        matches!(self, Self::Trusted(_))
    }

    /// Whether a key with this fingerprint may be used.
    pub fn accepts(&self, fingerprint: &str) -> bool {
        match self {
            Self::AcceptAny => true,
            Self::Trusted(keys) => keys.contains(normalize(fingerprint)),
        }
    }
}

fn normalize(fingerprint: &str) -> &str {
    let trimmed = fingerprint.trim();
    trimmed.strip_prefix(FINGERPRINT_PREFIX).unwrap_or(trimmed)
}

/// russh client handler that applies a [`HostKeyPolicy`] during the handshake.
pub struct HostKeyCheck {
    policy: HostKeyPolicy,
    addr: String,
}

impl HostKeyCheck {
    pub fn new(policy: HostKeyPolicy, addr: String) -> Self {
        Self { policy, addr }
    }
}

#[async_trait]
impl client::Handler for HostKeyCheck {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint();
        if self.policy.accepts(&fingerprint) {
            debug!("Host key for {}: SHA256:{fingerprint}", self.addr);
            Ok(true)
        } else {
            warn!(
                "Untrusted host key for {}: SHA256:{fingerprint}",
                self.addr
            );
            Ok(false)
        }
    }
}

//! Outbound SSH sessions to routers.
//!
//! - [`session`] — [`ShellSession`], one password-authenticated connection
//!   with a `Disconnected → Connected → Closed` lifecycle
//! - [`host_key`] — host identity policy applied during the handshake
//!
//! Callers work against the [`RemoteShell`] trait and obtain sessions from a
//! [`ShellConnector`], so the provisioning pipeline doesn't depend on russh
//! directly.

pub mod host_key;
pub mod session;

#[cfg(test)]
pub(crate) mod mock_router;
#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::SshConfig;
pub use host_key::HostKeyPolicy;
pub use session::ShellSession;

/// Errors from the session layer.
#[derive(Debug, Error)]
pub enum SshError {
    #[error("not connected")]
    NotConnected,

    #[error("already connected")]
    AlreadyConnected,

    #[error("session already closed")]
    SessionClosed,

    /// Dial or handshake failure, including the connect deadline expiring.
    #[error("failed to connect to {addr}: {reason}")]
    Connect { addr: String, reason: String },

    #[error("authentication rejected for {username}@{addr}")]
    AuthRejected { addr: String, username: String },

    #[error("host key for {addr} is not trusted")]
    HostKeyRejected { addr: String },

    /// Opening or driving the per-command channel failed.
    #[error("failed to create session: {0}")]
    Channel(String),

    /// The remote command ran but did not exit cleanly. `output` holds the
    /// combined stdout/stderr it produced.
    #[error("command failed: {}", describe_exit(.exit_status))]
    CommandFailed {
        exit_status: Option<u32>,
        output: String,
    },

    #[error("command timed out after {limit:?}")]
    Timeout { limit: Duration, output: String },

    #[error("failed to disconnect: {0}")]
    Disconnect(String),
}

#[allow(clippy::ref_option)]
fn describe_exit(status: &Option<u32>) -> String {
    match status {
        Some(code) => format!("exit status {code}"),
        None => "exited without exit status".to_string(),
    }
}

impl SshError {
    /// Output the remote command produced before failing, if any.
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::CommandFailed { output, .. } | Self::Timeout { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// Everything needed to reach and log in to one router.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub connect_timeout: Duration,
    /// Per-command deadline. `None` waits for the command indefinitely.
    pub command_timeout: Option<Duration>,
}

impl SessionTarget {
    /// `host:port`, bracketing IPv6 literals.
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Debug for SessionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("connect_timeout", &self.connect_timeout)
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

/// A remote shell that runs commands one channel at a time.
///
/// `execute` is only valid between a successful `connect` and `close`.
/// `close` is idempotent.
#[async_trait]
pub trait RemoteShell: Send {
    fn target(&self) -> &SessionTarget;

    fn is_connected(&self) -> bool;

    async fn connect(&mut self) -> Result<(), SshError>;

    /// Run one command to completion and return its combined output.
    async fn execute(&mut self, command: &str) -> Result<String, SshError>;

    async fn close(&mut self) -> Result<(), SshError>;
}

/// Creates unconnected sessions for a target.
pub trait ShellConnector: Send + Sync {
    fn open(&self, target: SessionTarget) -> Box<dyn RemoteShell>;
}

/// [`ShellConnector`] producing real [`ShellSession`]s.
#[derive(Debug, Clone)]
pub struct SessionFactory {
    host_keys: HostKeyPolicy,
}

impl SessionFactory {
    pub fn new(host_keys: HostKeyPolicy) -> Self {
        Self { host_keys }
    }

    pub fn from_config(config: &SshConfig) -> Self {
        Self::new(HostKeyPolicy::from_config(config))
    }
}

impl ShellConnector for SessionFactory {
    fn open(&self, target: SessionTarget) -> Box<dyn RemoteShell> {
        Box::new(ShellSession::new(target, self.host_keys.clone()))
    }
}

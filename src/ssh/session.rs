//! A single SSH connection to a router.
//!
//! [`ShellSession`] owns the russh handle exclusively. Each [`execute`]
//! opens a fresh exec channel, so commands never share shell state on the
//! channel level; state left behind on the router itself (configuration
//! changes) is visible to later commands.
//!
//! Output is the interleaved stdout/stderr of the command, capped at
//! [`MAX_EXEC_OUTPUT`] bytes. Like a local exec, the rest of the stream is
//! still drained so the remote side can finish.
//!
//! [`execute`]: ShellSession::execute

use std::fmt::Write;
use std::sync::Arc;

use async_trait::async_trait;
use russh::client::{self, Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use tracing::{debug, warn};

use super::host_key::{HostKeyCheck, HostKeyPolicy};
use super::{RemoteShell, SessionTarget, SshError};

/// Max combined output kept per command (1 MB).
pub const MAX_EXEC_OUTPUT: usize = 1024 * 1024;

enum State {
    Disconnected,
    Connected(Handle<HostKeyCheck>),
    Closed,
}

/// Password-authenticated SSH session to one router.
pub struct ShellSession {
    target: SessionTarget,
    host_keys: HostKeyPolicy,
    state: State,
}

impl ShellSession {
    pub fn new(target: SessionTarget, host_keys: HostKeyPolicy) -> Self {
        Self {
            target,
            host_keys,
            state: State::Disconnected,
        }
    }

    /// Dial, handshake and authenticate, all under `connect_timeout`.
    async fn establish(&self) -> Result<Handle<HostKeyCheck>, SshError> {
        let addr = self.target.address();
        let config = Arc::new(client::Config::default());
        let handler = HostKeyCheck::new(self.host_keys.clone(), addr.clone());

        let mut handle = client::connect(
            config,
            (self.target.host.as_str(), self.target.port),
            handler,
        )
        .await
        .map_err(|e| match e {
            russh::Error::UnknownKey => SshError::HostKeyRejected { addr: addr.clone() },
            other => SshError::Connect {
                addr: addr.clone(),
                reason: other.to_string(),
            },
        })?;

        let authenticated = handle
            .authenticate_password(self.target.username.as_str(), self.target.password.as_str())
            .await
            .map_err(|e| SshError::Connect {
                addr: addr.clone(),
                reason: format!("authentication error: {e}"),
            })?;

        if !authenticated {
            if let Err(e) = handle
                .disconnect(Disconnect::ByApplication, "authentication failed", "en")
                .await
            {
                debug!("Disconnect after rejected login to {addr} failed: {e}");
            }
            return Err(SshError::AuthRejected {
                addr,
                username: self.target.username.clone(),
            });
        }

        Ok(handle)
    }
}

#[async_trait]
impl RemoteShell for ShellSession {
    fn target(&self) -> &SessionTarget {
        &self.target
    }

    fn is_connected(&self) -> bool {
        matches!(self.state, State::Connected(_))
    }

    async fn connect(&mut self) -> Result<(), SshError> {
        match self.state {
            State::Connected(_) => return Err(SshError::AlreadyConnected),
            State::Closed => return Err(SshError::SessionClosed),
            State::Disconnected => {}
        }

        let addr = self.target.address();
        debug!("Connecting to {addr} as {}", self.target.username);
        let handle = tokio::time::timeout(self.target.connect_timeout, self.establish())
            .await
            .map_err(|_| SshError::Connect {
                addr: addr.clone(),
                reason: format!("timed out after {:?}", self.target.connect_timeout),
            })??;

        self.state = State::Connected(handle);
        debug!("Connected to {addr}");
        Ok(())
    }

    async fn execute(&mut self, command: &str) -> Result<String, SshError> {
        let State::Connected(handle) = &self.state else {
            return Err(SshError::NotConnected);
        };

        let mut channel = handle
            .channel_open_session()
            .await
            .map_err(|e| SshError::Channel(e.to_string()))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| SshError::Channel(e.to_string()))?;

        let mut output = CapturedOutput::default();
        let exit_status = match self.target.command_timeout {
            Some(limit) => {
                let drained = tokio::time::timeout(limit, drain(&mut channel, &mut output)).await;
                match drained {
                    Ok(status) => status,
                    Err(_) => {
                        if let Err(e) = channel.close().await {
                            debug!("Closing timed-out channel failed: {e}");
                        }
                        return Err(SshError::Timeout {
                            limit,
                            output: output.finish(),
                        });
                    }
                }
            }
            None => drain(&mut channel, &mut output).await,
        };

        let output = output.finish();
        match exit_status {
            Some(0) => Ok(output),
            status => Err(SshError::CommandFailed {
                exit_status: status,
                output,
            }),
        }
    }

    async fn close(&mut self) -> Result<(), SshError> {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Connected(handle) => {
                debug!("Closing connection to {}", self.target.address());
                handle
                    .disconnect(Disconnect::ByApplication, "", "en")
                    .await
                    .map_err(|e| SshError::Disconnect(e.to_string()))
            }
            previous => {
                // Closing an unconnected session is a no-op
                self.state = previous;
                Ok(())
            }
        }
    }
}

impl Drop for ShellSession {
    fn drop(&mut self) {
        if let State::Connected(_) = self.state {
            warn!(
                "Session to {} dropped while connected",
                self.target.address()
            );
        }
    }
}

/// Read channel messages until the channel closes. Returns the exit status,
/// if the remote side reported one.
async fn drain(channel: &mut Channel<Msg>, output: &mut CapturedOutput) -> Option<u32> {
    let mut exit_status = None;
    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Data { ref data } | ChannelMsg::ExtendedData { ref data, .. } => {
                output.push(data);
            }
            ChannelMsg::ExitStatus { exit_status: code } => exit_status = Some(code),
            _ => {}
        }
    }
    exit_status
}

/// Output buffer that keeps the first [`MAX_EXEC_OUTPUT`] bytes and counts the rest.
#[derive(Default)]
struct CapturedOutput {
    buf: Vec<u8>,
    total: usize,
}

impl CapturedOutput {
    fn push(&mut self, data: &[u8]) {
        self.total += data.len();
        if self.buf.len() < MAX_EXEC_OUTPUT {
            let take = data.len().min(MAX_EXEC_OUTPUT - self.buf.len());
            self.buf.extend_from_slice(&data[..take]);
        }
    }

    fn finish(self) -> String {
        let mut s = String::from_utf8_lossy(&self.buf).into_owned();
        if self.total > MAX_EXEC_OUTPUT {
            let _ = write!(
                s,
                "\n[truncated: {} bytes total, showing first {MAX_EXEC_OUTPUT}]",
                self.total
            );
        }
        s
    }
}

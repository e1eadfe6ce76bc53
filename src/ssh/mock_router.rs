//! In-process SSH server standing in for a router in session tests.
//!
//! Accepts one username/password pair and answers `exec` requests from a
//! fixed script: stdout, stderr, an optional delay, then an optional exit
//! status followed by EOF and close.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::server::{Auth, Handler, Msg, Session};
use russh::{Channel, ChannelId, CryptoVec};
use russh_keys::key::KeyPair;
use tokio::net::TcpListener;

pub const USERNAME: &str = "admin";
pub const PASSWORD: &str = "x";

/// How the router answers one command.
#[derive(Debug, Clone, Default)]
pub struct Reply {
    pub stdout: String,
    pub stderr: String,
    /// Pause after writing output, before the exit status.
    pub delay: Option<Duration>,
    pub exit_status: Option<u32>,
}

impl Reply {
    pub fn ok(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            exit_status: Some(0),
            ..Self::default()
        }
    }

    pub fn exit(code: u32, stdout: &str, stderr: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_status: Some(code),
            ..Self::default()
        }
    }

    /// Output, then the channel closes without an exit status.
    pub fn vanish(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            ..Self::default()
        }
    }

    pub fn stall(stdout: &str, delay: Duration) -> Self {
        Self {
            stdout: stdout.to_string(),
            delay: Some(delay),
            exit_status: Some(0),
            ..Self::default()
        }
    }
}

/// A running mock router.
pub struct MockRouter {
    pub addr: SocketAddr,
    /// SHA-256 fingerprint of the host key, unprefixed.
    pub fingerprint: String,
}

impl MockRouter {
    /// Bind to an ephemeral loopback port and serve `script` until the test
    /// runtime shuts down. Unknown commands exit 127.
    pub async fn start(script: &[(&str, Reply)]) -> Self {
        let key = KeyPair::generate_ed25519().unwrap();
        let fingerprint = key.clone_public_key().unwrap().fingerprint();

        let mut config = russh::server::Config::default();
        config.keys.push(key);
        config.auth_rejection_time = Duration::from_millis(10);
        config.auth_rejection_time_initial = Some(Duration::ZERO);
        let config = Arc::new(config);

        let script: Arc<HashMap<String, Reply>> = Arc::new(
            script
                .iter()
                .map(|(cmd, reply)| ((*cmd).to_string(), reply.clone()))
                .collect(),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let handler = ScriptedRouter {
                    script: Arc::clone(&script),
                };
                let config = Arc::clone(&config);
                tokio::spawn(async move {
                    let _ = russh::server::run_stream(config, socket, handler).await;
                });
            }
        });

        Self { addr, fingerprint }
    }
}

struct ScriptedRouter {
    script: Arc<HashMap<String, Reply>>,
}

#[async_trait]
impl Handler for ScriptedRouter {
    type Error = russh::Error;

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        if user == USERNAME && password == PASSWORD {
            Ok(Auth::Accept)
        } else {
            Ok(Auth::Reject {
                proceed_with_methods: None,
            })
        }
    }

    async fn channel_open_session(
        &mut self,
        _channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let command = String::from_utf8_lossy(data).into_owned();
        let reply = self
            .script
            .get(&command)
            .cloned()
            .unwrap_or_else(|| Reply::exit(127, "", &format!("{command}: not found\n")));

        let handle = session.handle();
        tokio::spawn(async move {
            if !reply.stdout.is_empty() {
                let _ = handle
                    .data(channel, CryptoVec::from_slice(reply.stdout.as_bytes()))
                    .await;
            }
            if !reply.stderr.is_empty() {
                let _ = handle
                    .extended_data(channel, 1, CryptoVec::from_slice(reply.stderr.as_bytes()))
                    .await;
            }
            if let Some(delay) = reply.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(code) = reply.exit_status {
                let _ = handle.exit_status_request(channel, code).await;
            }
            let _ = handle.eof(channel).await;
            let _ = handle.close(channel).await;
        });
        Ok(())
    }
}

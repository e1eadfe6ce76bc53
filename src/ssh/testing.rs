//! Scripted [`RemoteShell`] for tests that must not touch the network.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{RemoteShell, SessionTarget, ShellConnector, SshError};

/// What the scripted sessions saw, shared across every session a
/// [`ScriptedConnector`] hands out.
#[derive(Debug, Default)]
pub struct ScriptLog {
    pub targets: Vec<SessionTarget>,
    pub executed: Vec<String>,
    pub connects: usize,
    pub closes: usize,
}

#[derive(Clone, Default)]
pub struct ScriptedConnector {
    pub fail_connect: bool,
    pub failing: HashSet<String>,
    pub log: Arc<Mutex<ScriptLog>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refusing() -> Self {
        Self {
            fail_connect: true,
            ..Self::default()
        }
    }

    pub fn failing_on(commands: &[&str]) -> Self {
        Self {
            failing: commands.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }

    pub fn log(&self) -> std::sync::MutexGuard<'_, ScriptLog> {
        self.log.lock().unwrap()
    }
}

impl ShellConnector for ScriptedConnector {
    fn open(&self, target: SessionTarget) -> Box<dyn RemoteShell> {
        self.log().targets.push(target.clone());
        Box::new(ScriptedShell {
            target,
            connected: false,
            closed: false,
            fail_connect: self.fail_connect,
            failing: self.failing.clone(),
            log: Arc::clone(&self.log),
        })
    }
}

/// Echoes `ok: <command>` for every command except the scripted failures,
/// which fail with exit status 1 and output `error: <command>`.
pub struct ScriptedShell {
    target: SessionTarget,
    connected: bool,
    closed: bool,
    fail_connect: bool,
    failing: HashSet<String>,
    log: Arc<Mutex<ScriptLog>>,
}

#[async_trait]
impl RemoteShell for ScriptedShell {
    fn target(&self) -> &SessionTarget {
        &self.target
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self) -> Result<(), SshError> {
        if self.connected {
            return Err(SshError::AlreadyConnected);
        }
        if self.closed {
            return Err(SshError::SessionClosed);
        }
        if self.fail_connect {
            return Err(SshError::Connect {
                addr: self.target.address(),
                reason: "connection refused".into(),
            });
        }
        self.connected = true;
        self.log.lock().unwrap().connects += 1;
        Ok(())
    }

    async fn execute(&mut self, command: &str) -> Result<String, SshError> {
        if !self.connected {
            return Err(SshError::NotConnected);
        }
        self.log.lock().unwrap().executed.push(command.to_string());
        if self.failing.contains(command) {
            return Err(SshError::CommandFailed {
                exit_status: Some(1),
                output: format!("error: {command}\n"),
            });
        }
        Ok(format!("ok: {command}\n"))
    }

    async fn close(&mut self) -> Result<(), SshError> {
        if self.connected {
            self.connected = false;
            self.closed = true;
        }
        self.log.lock().unwrap().closes += 1;
        Ok(())
    }
}

//! Provisioning pipeline: validate → connect → run batch → close.
//!
//! [`plan`] turns a request body into a [`ProvisionPlan`] without touching the
//! network, so malformed requests never open a connection. [`run`] executes a
//! plan on a fresh session and closes that session on every path. A failed
//! close is logged and never changes the reported outcome.

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::ApiError;
use crate::executor::{execute_multiple, CommandResult};
use crate::ssh::{RemoteShell, SessionTarget, ShellConnector};
use crate::state::Metrics;

/// Connection details and commands for one router, as sent by the backend.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RouterConfiguration {
    /// Public address of the router.
    pub ip_address: Option<String>,
    /// Tunnel address; preferred over `ip_address` when non-empty.
    pub vpn_ip: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// SSH port, defaults to `ssh.default_port`.
    pub port: Option<u16>,
    /// Opaque commands, run in order.
    pub commands: Option<Vec<String>>,
}

/// Where to connect, and whether the tunnel address was chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHost {
    pub host: String,
    pub via_vpn: bool,
}

/// A validated provisioning job.
#[derive(Debug, Clone)]
pub struct ProvisionPlan {
    pub target: SessionTarget,
    pub commands: Vec<String>,
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Pick the connection host: `vpn_ip` when present and non-empty, else
/// `ip_address`.
pub fn resolve_host(cfg: &RouterConfiguration) -> Result<ResolvedHost, ApiError> {
    if let Some(vpn) = non_empty(cfg.vpn_ip.as_ref()) {
        return Ok(ResolvedHost {
            host: vpn.to_string(),
            via_vpn: true,
        });
    }
    non_empty(cfg.ip_address.as_ref())
        .map(|ip| ResolvedHost {
            host: ip.to_string(),
            via_vpn: false,
        })
        .ok_or_else(|| ApiError::validation("Missing router IP address"))
}

/// Build the session target for `cfg` using the SSH defaults from `config`.
pub fn session_target(cfg: &RouterConfiguration, config: &Config) -> Result<SessionTarget, ApiError> {
    let resolved = resolve_host(cfg)?;
    if resolved.via_vpn {
        info!(vpn_ip = %resolved.host, "Using VPN IP for connection");
    }
    Ok(SessionTarget {
        host: resolved.host,
        port: cfg.port.unwrap_or(config.ssh.default_port),
        username: cfg.username.clone().unwrap_or_default(),
        password: cfg.password.clone().unwrap_or_default(),
        connect_timeout: config.ssh.connect_timeout(),
        command_timeout: config.ssh.command_timeout(),
    })
}

/// Require `router_id` and `tenant_id` to be non-blank.
pub fn require_ids(router_id: &str, tenant_id: &str) -> Result<(), ApiError> {
    if router_id.trim().is_empty() {
        return Err(ApiError::validation("router_id is required"));
    }
    if tenant_id.trim().is_empty() {
        return Err(ApiError::validation("tenant_id is required"));
    }
    Ok(())
}

/// Validate a provisioning request and turn it into a plan.
pub fn plan(cfg: &RouterConfiguration, config: &Config) -> Result<ProvisionPlan, ApiError> {
    let commands = match cfg.commands.as_deref() {
        None | Some([]) => return Err(ApiError::validation("No commands provided")),
        Some(commands) => commands,
    };
    if let Some(index) = commands.iter().position(|c| c.trim().is_empty()) {
        return Err(ApiError::validation(format!("commands[{index}] is empty")));
    }
    let max = config.server.max_batch_size;
    if commands.len() > max {
        return Err(ApiError::BatchTooLarge { max });
    }

    Ok(ProvisionPlan {
        target: session_target(cfg, config)?,
        commands: commands.to_vec(),
    })
}

/// Execute `plan` on a new session from `connector`.
pub async fn run(
    connector: &dyn ShellConnector,
    metrics: &Metrics,
    plan: ProvisionPlan,
) -> Result<Vec<CommandResult>, ApiError> {
    let mut shell = connector.open(plan.target);
    let outcome = match connect(shell.as_mut(), metrics).await {
        Ok(()) => execute_multiple(shell.as_mut(), &plan.commands)
            .await
            .map_err(|e| {
                error!("Command execution failed: {e}");
                ApiError::Execution(e)
            }),
        Err(e) => Err(e),
    };
    close(shell.as_mut(), metrics).await;
    outcome
}

/// Open and immediately close a session to check reachability and credentials.
pub async fn check_connectivity(
    connector: &dyn ShellConnector,
    metrics: &Metrics,
    target: SessionTarget,
) -> Result<(), ApiError> {
    let mut shell = connector.open(target);
    let outcome = connect(shell.as_mut(), metrics).await;
    close(shell.as_mut(), metrics).await;
    outcome
}

async fn connect(shell: &mut dyn RemoteShell, metrics: &Metrics) -> Result<(), ApiError> {
    match shell.connect().await {
        Ok(()) => {
            metrics.connection_opened();
            Ok(())
        }
        Err(e) => {
            error!("Failed to connect to router: {e}");
            Err(ApiError::Connection(e))
        }
    }
}

async fn close(shell: &mut dyn RemoteShell, metrics: &Metrics) {
    let was_connected = shell.is_connected();
    if let Err(e) = shell.close().await {
        warn!("Closing session to {} failed: {e}", shell.target().address());
    }
    if was_connected {
        metrics.connection_closed();
    }
}

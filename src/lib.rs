#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::unused_async)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::redundant_closure_for_method_calls)]

//! provctl library — router provisioning over SSH behind an authenticated,
//! rate-limited HTTP API.
//!
//! - `ssh` — session lifecycle against a single router
//! - `executor` — ordered, fail-fast command batches
//! - `provision` — request validation and the connect / run / close flow
//! - `ratelimit` — per-client token buckets and their sweeper
//! - `auth` — API key gate
//! - `config` — TOML + env-var configuration
//! - `routes` — REST handlers and the application router

pub mod auth;
pub mod config;
pub mod error;
pub mod executor;
pub mod provision;
pub mod ratelimit;
pub mod routes;
pub mod ssh;
pub mod state;

// Re-export key types at crate root for convenience.
pub use auth::ApiKey;
pub use config::Config;
pub use error::ApiError;
pub use executor::{execute_multiple, BatchError, CommandResult};
pub use ratelimit::RateLimiter;
pub use ssh::{RemoteShell, SessionFactory, SessionTarget, ShellConnector, SshError};
pub use state::{AppState, Metrics};

//! # trickd-server
//!
//! TCP server for trickd.
//!
//! This crate provides:
//! - TCP connection handling with async I/O
//! - JSON-lines framing and message dispatch
//! - Session management and bearer token identities
//! - Command handlers for every game operation
//! - Live game updates for watchers
//! - Prometheus metrics

pub mod auth;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod server;
pub mod session;

pub use auth::{IdentityProvider, TokenIdentities, TrustedIdentities};
pub use broadcast::{GameUpdate, UpdateBroadcaster};
pub use config::{
    AuthConfig, Config, ConfigError, GameConfig, MetricsConfig, NetworkConfig, RateLimitConfig,
    StorageConfig,
};
pub use error::ServerError;
pub use handler::{CommandHandler, ServerInfo, WatchSubscription};
pub use metrics::{run_metrics_server, Metrics};
pub use server::{Server, ServerConfig, ServerStats};
pub use session::{Session, SessionState};

//! Server configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via TRICKD_CONFIG)
//! 3. Environment variables

use crate::auth::{parse_identity_line, IdentityProvider, TokenIdentities, TrustedIdentities};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use trickd_core::engine::ops;
use trickd_core::{ClipPolicy, EngineConfig, FixedWindowLimiter, RateLimitRule};

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network configuration.
    pub network: NetworkConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Authentication configuration.
    pub auth: AuthConfig,
    /// Game engine tuning.
    pub game: GameConfig,
    /// Per-operation rate limits.
    pub rate_limits: RateLimitConfig,
    /// Metrics configuration.
    pub metrics: MetricsConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("TRICKD_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();
        config.load_secrets()?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))
    }

    fn apply_env_overrides(&mut self) {
        self.network.apply_env_overrides();
        self.storage.apply_env_overrides();
        self.auth.apply_env_overrides();
        self.game.apply_env_overrides();
        self.metrics.apply_env_overrides();
    }

    /// Loads identities from the external secrets file if configured.
    pub fn load_secrets(&mut self) -> Result<(), ConfigError> {
        self.auth.load_secrets()
    }

    /// Checks values that would otherwise fail at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.max_connections == 0 {
            return Err(ConfigError::Validation(
                "network.max_connections must be at least 1".to_string(),
            ));
        }
        if self.game.max_commit_attempts == 0 || self.game.max_code_attempts == 0 {
            return Err(ConfigError::Validation(
                "game.max_commit_attempts and game.max_code_attempts must be at least 1"
                    .to_string(),
            ));
        }
        if ClipPolicy::new(&self.game.clip_extensions)
            .allowed_extensions()
            .is_empty()
        {
            return Err(ConfigError::Validation(
                "game.clip_extensions must name at least one extension".to_string(),
            ));
        }
        self.auth.validate()
    }

    /// Engine settings derived from the `game` section.
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_commit_attempts: self.game.max_commit_attempts,
            max_code_attempts: self.game.max_code_attempts,
            clip_policy: ClipPolicy::new(&self.game.clip_extensions),
        }
    }

    /// Builds the limiter described by the `rate_limits` section.
    pub fn build_rate_limiter(&self) -> FixedWindowLimiter {
        self.rate_limits
            .operations
            .iter()
            .fold(
                FixedWindowLimiter::new(self.rate_limits.default),
                |limiter, (op, rule)| limiter.with_rule(op.clone(), *rule),
            )
    }

    /// Token identities when auth is required, trusted tokens otherwise.
    pub fn identity_provider(&self) -> Result<Arc<dyn IdentityProvider>, ConfigError> {
        if !self.auth.required {
            return Ok(Arc::new(TrustedIdentities));
        }
        Ok(Arc::new(TokenIdentities::new(self.auth.parsed_identities()?)))
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind to.
    #[serde(with = "socket_addr_serde")]
    pub bind_addr: SocketAddr,
    /// Idle connection timeout in seconds.
    pub idle_timeout_secs: u64,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Longest accepted request line.
    pub max_line_bytes: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], trickd_protocol::DEFAULT_PORT)),
            idle_timeout_secs: 300,
            max_connections: 1000,
            max_line_bytes: trickd_protocol::MAX_LINE_SIZE,
        }
    }
}

impl NetworkConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("TRICKD_BIND") {
            if let Ok(parsed) = addr.parse() {
                self.bind_addr = parsed;
            }
        }

        if let Ok(timeout) = std::env::var("TRICKD_IDLE_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.idle_timeout_secs = secs;
            }
        }

        if let Ok(max) = std::env::var("TRICKD_MAX_CONNECTIONS") {
            if let Ok(n) = max.parse() {
                self.max_connections = n;
            }
        }
    }

    /// Returns idle timeout as Duration.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory.
    pub data_dir: PathBuf,
    /// Write games through to disk. When off, games live in memory only.
    pub persist: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            persist: true,
        }
    }
}

impl StorageConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("TRICKD_DATA") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(persist) = std::env::var("TRICKD_PERSIST") {
            self.persist = parse_flag(&persist);
        }
    }
}

/// Authentication configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Whether tokens must match a configured identity. When false any
    /// non-empty token is taken as the player id.
    pub required: bool,
    /// `uid:sha256hex` entries.
    pub identities: Vec<String>,
    /// Optional file with one `uid:sha256hex` entry per line.
    pub secrets_file: Option<PathBuf>,
}

impl AuthConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(auth) = std::env::var("TRICKD_AUTH_REQUIRED") {
            self.required = parse_flag(&auth);
        }

        if let Ok(identity) = std::env::var("TRICKD_AUTH_IDENTITY") {
            if !identity.is_empty() {
                self.identities.push(identity);
            }
        }

        if let Ok(path) = std::env::var("TRICKD_AUTH_SECRETS_FILE") {
            self.secrets_file = Some(PathBuf::from(path));
        }
    }

    /// Appends identities from the secrets file if configured.
    pub fn load_secrets(&mut self) -> Result<(), ConfigError> {
        if let Some(ref path) = self.secrets_file {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.clone(), e))?;
            for line in content.lines() {
                let line = line.trim();
                // Skip empty lines and comments
                if !line.is_empty() && !line.starts_with('#') {
                    self.identities.push(line.to_string());
                }
            }
        }
        Ok(())
    }

    /// Parses every identity entry; the first malformed one is an error.
    pub fn parsed_identities(&self) -> Result<Vec<(String, String)>, ConfigError> {
        self.identities
            .iter()
            .enumerate()
            .map(|(i, line)| {
                parse_identity_line(line).ok_or_else(|| {
                    // Never echo the entry itself, it may hold a secret.
                    ConfigError::Validation(format!(
                        "auth identity #{} is not in uid:sha256hex form",
                        i + 1
                    ))
                })
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let identities = self.parsed_identities()?;
        if self.required && identities.is_empty() {
            return Err(ConfigError::Validation(
                "auth.required is set but no identities are configured".to_string(),
            ));
        }
        Ok(())
    }
}

/// Game engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub max_commit_attempts: u32,
    pub max_code_attempts: u32,
    /// Accepted clip file extensions.
    pub clip_extensions: Vec<String>,
    /// Buffered updates per watched game before slow watchers lag.
    pub broadcast_capacity: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            max_commit_attempts: engine.max_commit_attempts,
            max_code_attempts: engine.max_code_attempts,
            clip_extensions: engine.clip_policy.allowed_extensions().to_vec(),
            broadcast_capacity: 256,
        }
    }
}

impl GameConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(n) = std::env::var("TRICKD_MAX_COMMIT_ATTEMPTS") {
            if let Ok(n) = n.parse() {
                self.max_commit_attempts = n;
            }
        }
        if let Ok(n) = std::env::var("TRICKD_MAX_CODE_ATTEMPTS") {
            if let Ok(n) = n.parse() {
                self.max_code_attempts = n;
            }
        }
    }
}

/// Rate limits: a default rule plus overrides keyed by operation name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub default: RateLimitRule,
    pub operations: HashMap<String, RateLimitRule>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let mut operations = HashMap::new();
        operations.insert(ops::CREATE_GAME.to_string(), RateLimitRule::new(60, 5));
        operations.insert(ops::JOIN_GAME.to_string(), RateLimitRule::new(60, 10));
        Self {
            default: RateLimitRule::new(60, 30),
            operations,
        }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable metrics HTTP server.
    pub enabled: bool,
    /// Address to bind the metrics server to.
    #[serde(with = "socket_addr_serde")]
    pub bind_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 9090)),
        }
    }
}

impl MetricsConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(enabled) = std::env::var("TRICKD_METRICS_ENABLED") {
            self.enabled = parse_flag(&enabled);
        }
        if let Ok(addr) = std::env::var("TRICKD_METRICS_BIND") {
            if let Ok(parsed) = addr.parse() {
                self.bind_addr = parsed;
            }
        }
    }
}

fn parse_flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {err}", path = .0.display(), err = .1)]
    Io(PathBuf, std::io::Error),

    #[error("failed to parse config file '{path}': {err}", path = .0.display(), err = .1)]
    Parse(PathBuf, String),

    #[error("configuration validation failed: {0}")]
    Validation(String),
}

/// Custom serde module for SocketAddr (to handle as string in YAML).
mod socket_addr_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::net::SocketAddr;

    pub fn serialize<S>(addr: &SocketAddr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenIdentities;
    use tempfile::TempDir;
    use trickd_core::RateLimiter;

    fn identity(uid: &str, token: &str) -> String {
        format!("{}:{}", uid, TokenIdentities::hash_token(token))
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.network.bind_addr.port(), 7421);
        assert!(config.storage.persist);
        assert!(!config.auth.required);
        assert_eq!(config.game.max_commit_attempts, 5);
        assert_eq!(config.game.clip_extensions, vec!["mp4", "mov", "webm"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trickd.yaml");
        std::fs::write(
            &path,
            r#"
network:
  bind_addr: "0.0.0.0:9000"
  idle_timeout_secs: 30
game:
  clip_extensions: [".MP4"]
rate_limits:
  default: { window_secs: 10, max_requests: 2 }
  operations:
    judge_set: { window_secs: 10, max_requests: 0 }
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.network.bind_addr.port(), 9000);
        assert_eq!(config.network.idle_timeout(), Duration::from_secs(30));
        // Unspecified fields keep their defaults.
        assert_eq!(config.network.max_connections, 1000);
        assert_eq!(
            config.to_engine_config().clip_policy.allowed_extensions(),
            ["mp4".to_string()]
        );

        let limiter = config.build_rate_limiter();
        assert!(limiter.rule_for(ops::JUDGE_SET).is_disabled());
        assert!(limiter.check(ops::JOIN_GAME, "uid:a").is_ok());
        assert!(limiter.check(ops::JOIN_GAME, "uid:a").is_ok());
        assert!(limiter.check(ops::JOIN_GAME, "uid:a").is_err());
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "network: [").unwrap();
        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(..)));
        assert!(err.to_string().contains("bad.yaml"));
    }

    #[test]
    fn test_secrets_file_and_identity_provider() {
        let dir = TempDir::new().unwrap();
        let secrets = dir.path().join("secrets");
        std::fs::write(
            &secrets,
            format!("# players\n\n{}\n", identity("bob", "bob-token")),
        )
        .unwrap();

        let mut config = Config::default();
        config.auth.required = true;
        config.auth.identities.push(identity("alice", "alice-token"));
        config.auth.secrets_file = Some(secrets);
        config.load_secrets().unwrap();
        assert!(config.validate().is_ok());

        let provider = config.identity_provider().unwrap();
        assert_eq!(provider.resolve("alice-token").as_deref(), Some("alice"));
        assert_eq!(provider.resolve("bob-token").as_deref(), Some("bob"));
        assert!(provider.resolve("bob").is_none());
    }

    #[test]
    fn test_validation_failures() {
        let mut config = Config::default();
        config.auth.required = true;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        config.auth.identities.push("alice:not-a-hash".to_string());
        let err = config.validate().unwrap_err();
        assert!(!err.to_string().contains("not-a-hash"));

        let mut config = Config::default();
        config.game.clip_extensions = vec![".".to_string()];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.game.max_commit_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_trusted_identities_when_auth_off() {
        let provider = Config::default().identity_provider().unwrap();
        assert_eq!(provider.resolve("anyone").as_deref(), Some("anyone"));
        assert!(provider.resolve("  ").is_none());
    }
}

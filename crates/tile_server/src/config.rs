//! Configuration management for the tile server.
//!
//! This module handles loading, validation, and conversion of server configuration
//! from TOML files and command-line arguments.

use anyhow::{Context, Result};
use game_server::{Identity, ServerConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::cli::CliArgs;

/// Application configuration loaded from TOML file.
///
/// Sections other than `[server]` and `[logging]` may be omitted and take
/// their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Network and connection settings
    pub server: ServerSettings,
    /// Game rules and RNG seeding
    #[serde(default)]
    pub game: GameSettings,
    /// Ranking size and caching
    #[serde(default)]
    pub leaderboard: LeaderboardSettings,
    /// Durable store location
    #[serde(default)]
    pub storage: StorageSettings,
    /// Volatile cache tier
    #[serde(default)]
    pub cache: CacheSettings,
    /// Static token table
    #[serde(default)]
    pub auth: AuthSettings,
    /// Logging configuration settings
    pub logging: LoggingSettings,
}

/// Server-specific configuration settings.
///
/// Durations are in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Network address to bind the server to (e.g., "127.0.0.1:8080")
    pub bind_address: String,
    /// Maximum number of concurrent client connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Outbound frames buffered per connection before it is dropped
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
    /// Read deadline; must exceed the ping interval
    #[serde(default = "default_pong_wait")]
    pub pong_wait_secs: u64,
    #[serde(default = "default_write_wait")]
    pub write_wait_secs: u64,
}

fn default_max_connections() -> usize {
    1000
}

fn default_outbound_queue_capacity() -> usize {
    256
}

fn default_ping_interval() -> u64 {
    54
}

fn default_pong_wait() -> u64 {
    60
}

fn default_write_wait() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSettings {
    /// Tile value that wins a game; a power of two, at least 4
    #[serde(default = "default_victory_tile")]
    pub victory_tile: u32,
    /// Expiry of a cached session, refreshed on every write
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
    /// Fixed RNG seed; unset seeds from the OS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

fn default_victory_tile() -> u32 {
    board_engine::DEFAULT_VICTORY_TILE
}

fn default_session_ttl() -> u64 {
    3600
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            victory_tile: default_victory_tile(),
            session_ttl_secs: default_session_ttl(),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardSettings {
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_leaderboard_ttl")]
    pub cache_ttl_secs: u64,
    /// Push refreshed rankings to every connection when a game ends
    #[serde(default)]
    pub broadcast_updates: bool,
}

fn default_max_entries() -> usize {
    100
}

fn default_leaderboard_ttl() -> u64 {
    300
}

impl Default for LeaderboardSettings {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            cache_ttl_secs: default_leaderboard_ttl(),
            broadcast_updates: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite database file; parent directories are created on open
    pub path: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            path: "data/tile_server.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Disabled means every session write goes to the database
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// How often expired keys are swept from memory
    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_purge_interval() -> u64 {
    60
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            purge_interval_secs: default_purge_interval(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthSettings {
    #[serde(default)]
    pub users: Vec<AuthUser>,
}

/// One `[[auth.users]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub token: String,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub avatar: String,
}

impl AuthUser {
    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.user_id.clone(),
            name: self.name.clone(),
            avatar: self.avatar.clone(),
        }
    }
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                bind_address: "127.0.0.1:8080".to_string(),
                max_connections: default_max_connections(),
                outbound_queue_capacity: default_outbound_queue_capacity(),
                ping_interval_secs: default_ping_interval(),
                pong_wait_secs: default_pong_wait(),
                write_wait_secs: default_write_wait(),
            },
            game: GameSettings::default(),
            leaderboard: LeaderboardSettings::default(),
            storage: StorageSettings::default(),
            cache: CacheSettings::default(),
            auth: AuthSettings::default(),
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at the specified path
    /// and returns the default configuration.
    pub async fn load_from_file(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let config: AppConfig = toml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Applies command-line overrides on top of the file settings.
    pub fn apply_cli(&mut self, args: &CliArgs) {
        if let Some(bind_address) = &args.bind_address {
            self.server.bind_address = bind_address.clone();
        }
        if let Some(database) = &args.database {
            self.storage.path = database.to_string_lossy().to_string();
        }
        if let Some(log_level) = &args.log_level {
            self.logging.level = log_level.clone();
        }
        if args.json_logs {
            self.logging.json_format = true;
        }
        if args.seed.is_some() {
            self.game.seed = args.seed;
        }
    }

    /// Converts the application configuration to a game server configuration.
    pub fn to_server_config(&self) -> Result<ServerConfig> {
        Ok(ServerConfig {
            bind_address: self
                .server
                .bind_address
                .parse()
                .with_context(|| format!("Invalid bind address: {}", self.server.bind_address))?,
            max_connections: self.server.max_connections,
            outbound_queue_capacity: self.server.outbound_queue_capacity,
            ping_interval: Duration::from_secs(self.server.ping_interval_secs),
            pong_wait: Duration::from_secs(self.server.pong_wait_secs),
            write_wait: Duration::from_secs(self.server.write_wait_secs),
            victory_tile: self.game.victory_tile,
            session_ttl: Duration::from_secs(self.game.session_ttl_secs),
            leaderboard_max_entries: self.leaderboard.max_entries,
            leaderboard_cache_ttl: Duration::from_secs(self.leaderboard.cache_ttl_secs),
            broadcast_leaderboard_updates: self.leaderboard.broadcast_updates,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.storage.path)
    }

    /// Validates the configuration for consistency and correctness.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is valid, or an error string describing the issue.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!(
                "Invalid bind address: {}",
                &self.server.bind_address
            ));
        }

        if self.server.outbound_queue_capacity == 0 {
            return Err("Outbound queue capacity must be greater than zero".to_string());
        }

        if self.server.ping_interval_secs == 0 {
            return Err("Ping interval must be greater than zero".to_string());
        }
        if self.server.ping_interval_secs >= self.server.pong_wait_secs {
            return Err("Ping interval must be shorter than pong wait".to_string());
        }

        let tile = self.game.victory_tile;
        if tile < 4 || !tile.is_power_of_two() {
            return Err(format!(
                "Invalid victory tile: {tile}. Must be a power of two of at least 4"
            ));
        }

        if self.storage.path.trim().is_empty() {
            return Err("Storage path cannot be empty".to_string());
        }

        if self.cache.enabled && self.cache.purge_interval_secs == 0 {
            return Err("Cache purge interval must be greater than zero".to_string());
        }

        let mut tokens = HashSet::new();
        for user in &self.auth.users {
            if user.token.is_empty() {
                return Err(format!("Empty token for user {}", user.user_id));
            }
            if !tokens.insert(user.token.as_str()) {
                return Err(format!("Duplicate token for user {}", user.user_id));
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}

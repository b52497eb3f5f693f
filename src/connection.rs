//! Redis connection resolution and ownership
//!
//! Connection parameters are layered: built-in default, then the config
//! file, then `REDIS_URL`, then command-line flags. The resolved
//! [`ConnectionConfig`] opens a single multiplexed [`RedisHandle`] that every
//! gateway shares.

use color_eyre::eyre::{self, Context, Result};
use redis::aio::ConnectionManager;
use redis::{ConnectionAddr, ConnectionInfo, IntoConnectionInfo, RedisConnectionInfo};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::ConnectionSection;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 6379;
pub const DEFAULT_PREFIX: &str = "bull";

/// Startup connect and PING must finish within this window
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-field overrides taken from the command line
#[derive(Debug, Clone, Default)]
pub struct ConnectionOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub password: Option<String>,
    pub db: Option<i64>,
    pub prefix: Option<String>,
}

/// Fully resolved connection parameters
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub db: i64,
    /// BullMQ key prefix
    pub prefix: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            db: 0,
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

// Keep the password out of logs and `config` output
impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("db", &self.db)
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl ConnectionConfig {
    /// Resolve parameters from every source
    ///
    /// `redis_url` is the value of `REDIS_URL`, passed in so that resolution
    /// stays a pure function.
    ///
    /// # Errors
    /// Returns an error if `redis_url` is not a valid TCP Redis URL.
    pub fn resolve(
        overrides: &ConnectionOverrides,
        redis_url: Option<&str>,
        file: &ConnectionSection,
    ) -> Result<Self> {
        let mut cfg = Self::default();

        if let Some(host) = &file.host {
            cfg.host.clone_from(host);
        }
        if let Some(port) = file.port {
            cfg.port = port;
        }
        if file.password.is_some() {
            cfg.password.clone_from(&file.password);
        }
        if let Some(db) = file.db {
            cfg.db = db;
        }
        if let Some(prefix) = &file.prefix {
            cfg.prefix.clone_from(prefix);
        }

        if let Some(url) = redis_url.filter(|u| !u.trim().is_empty()) {
            cfg.apply_url(url)
                .wrap_err_with(|| format!("Invalid REDIS_URL '{url}'"))?;
        }

        if let Some(host) = &overrides.host {
            cfg.host.clone_from(host);
        }
        if let Some(port) = overrides.port {
            cfg.port = port;
        }
        if overrides.password.is_some() {
            cfg.password.clone_from(&overrides.password);
        }
        if let Some(db) = overrides.db {
            cfg.db = db;
        }
        if let Some(prefix) = &overrides.prefix {
            cfg.prefix.clone_from(prefix);
        }

        if cfg.prefix.is_empty() || cfg.prefix.contains(':') {
            eyre::bail!("Invalid key prefix '{}'", cfg.prefix);
        }

        Ok(cfg)
    }

    fn apply_url(&mut self, url: &str) -> Result<()> {
        let info = url.into_connection_info()?;
        match info.addr {
            ConnectionAddr::Tcp(host, port) => {
                self.host = host;
                self.port = port;
            }
            other => eyre::bail!("unsupported address {other:?}; only plain TCP is supported"),
        }
        self.db = info.redis.db;
        self.username = info.redis.username;
        self.password = info.redis.password;
        Ok(())
    }

    /// `host:port/db`, for display
    #[must_use]
    pub fn target(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.db)
    }

    fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.host.clone(), self.port),
            redis: RedisConnectionInfo {
                db: self.db,
                username: self.username.clone(),
                password: self.password.clone(),
                ..RedisConnectionInfo::default()
            },
        }
    }
}

/// The one Redis connection of the process
///
/// Created once at startup and cloned into the gateways. The underlying
/// multiplexed connection is released when the handle and every clone of
/// its manager are dropped.
pub struct RedisHandle {
    manager: ConnectionManager,
    config: ConnectionConfig,
}

impl RedisHandle {
    /// Open the connection and verify it with `PING`
    ///
    /// # Errors
    /// Returns an error if the server is unreachable, rejects the
    /// credentials, or does not answer within 5 seconds.
    pub async fn connect(config: ConnectionConfig) -> Result<Self> {
        debug!(addr = %config.target(), "Connecting to Redis");
        let client = redis::Client::open(config.connection_info())
            .wrap_err("Failed to build Redis client")?;

        let mut manager = tokio::time::timeout(CONNECT_TIMEOUT, client.get_connection_manager())
            .await
            .map_err(|_| eyre::eyre!("Timed out connecting to Redis at {}", config.target()))?
            .wrap_err_with(|| format!("Failed to connect to Redis at {}", config.target()))?;

        let ping = redis::cmd("PING");
        let pong: String = tokio::time::timeout(CONNECT_TIMEOUT, ping.query_async(&mut manager))
            .await
            .map_err(|_| eyre::eyre!("Redis at {} did not answer PING", config.target()))?
            .wrap_err("PING failed")?;
        debug!(reply = %pong, "Redis answered PING");

        info!(addr = %config.target(), prefix = %config.prefix, "Connected to Redis");
        Ok(Self { manager, config })
    }

    /// A clone of the shared connection manager
    #[must_use]
    pub fn manager(&self) -> ConnectionManager {
        self.manager.clone()
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.config.prefix
    }

    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Release the connection
    pub fn close(self) {
        info!(addr = %self.config.target(), "Closing Redis connection");
        drop(self.manager);
    }
}

/// Connection health as shown in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// No poll has completed yet
    #[default]
    Connecting,
    Connected,
    /// The last poll of at least one domain failed
    Degraded,
}

impl ConnectionStatus {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Degraded => "degraded",
        }
    }
}

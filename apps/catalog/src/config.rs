//! Configuration module for the catalog service.
//!
//! Loads configuration from `config.toml` with environment variable overrides.

use config::{Config as ConfigLoader, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

use crate::error::AppError;

const MIB: u64 = 1024 * 1024;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub uploads: UploadConfig,
}

/// Server configuration
#[derive(Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub jwt_secret: Option<String>,
    /// Lifetime of issued tokens
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: u64,
    /// Allowed CORS origins (empty means same-origin only)
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Maximum accepted request body, in bytes
    #[serde(default = "default_max_body_size")]
    pub max_body_size: u64,
}

// Custom Debug implementation to avoid exposing jwt_secret
impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field(
                "jwt_secret",
                &self.jwt_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_ttl_hours", &self.token_ttl_hours)
            .field("cors_origins", &self.cors_origins)
            .field("max_body_size", &self.max_body_size)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            jwt_secret: None,
            token_ttl_hours: default_token_ttl_hours(),
            cors_origins: Vec::new(),
            max_body_size: default_max_body_size(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_token_ttl_hours() -> u64 {
    24
}

fn default_max_body_size() -> u64 {
    200 * MIB
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/catalog.db")
}

/// Upload gate limits and storage location
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_upload_dir")]
    pub dir: PathBuf,
    /// Per-file ceiling, in bytes
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Per-request file part ceiling
    #[serde(default = "default_max_file_count")]
    pub max_file_count: usize,
    /// Restrict `coverImage` to images and `audioFile` to audio types
    #[serde(default)]
    pub enforce_mime_types: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: default_upload_dir(),
            max_file_size: default_max_file_size(),
            max_file_count: default_max_file_count(),
            enforce_mime_types: false,
        }
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./uploads")
}

fn default_max_file_size() -> u64 {
    100 * MIB
}

fn default_max_file_count() -> usize {
    10
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. `config.toml` in current directory (optional)
    /// 3. Environment variables with `CATALOG_` prefix
    ///
    /// Environment variables use double underscore for nesting:
    /// - `CATALOG_SERVER__PORT=9000` sets `server.port`
    /// - `CATALOG_SERVER__CORS_ORIGINS=https://a.example,https://b.example`
    /// - `CATALOG_UPLOADS__DIR=/srv/uploads` sets `uploads.dir`
    pub fn load() -> Result<Self, AppError> {
        Self::load_from("config.toml")
    }

    /// Load configuration from a specific file path.
    pub fn load_from(config_path: &str) -> Result<Self, AppError> {
        let config = ConfigLoader::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", i64::from(default_port()))?
            .set_default("server.token_ttl_hours", default_token_ttl_hours() as i64)?
            .set_default("server.max_body_size", default_max_body_size() as i64)?
            .set_default("database.path", "./data/catalog.db")?
            .set_default("uploads.dir", "./uploads")?
            .set_default("uploads.max_file_size", default_max_file_size() as i64)?
            .set_default("uploads.max_file_count", default_max_file_count() as i64)?
            .set_default("uploads.enforce_mime_types", false)?
            .add_source(File::with_name(config_path).required(false))
            // CATALOG_SERVER__PORT=9000 -> server.port = 9000
            .add_source(
                Environment::with_prefix("CATALOG")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.server.jwt_secret.is_none() {
            tracing::warn!("JWT secret not configured - a random one will be generated");
        }

        if self.uploads.max_file_count == 0 {
            return Err(AppError::Internal(
                "uploads.max_file_count must be at least 1".to_string(),
            ));
        }

        if self.uploads.max_file_size > self.server.max_body_size {
            tracing::warn!(
                max_file_size = self.uploads.max_file_size,
                max_body_size = self.server.max_body_size,
                "Per-file upload limit exceeds the request body limit"
            );
        }

        Ok(())
    }

    /// Get the server socket address
    pub fn server_addr(&self) -> std::net::SocketAddr {
        use std::net::{IpAddr, Ipv4Addr, SocketAddr};
        let ip: IpAddr = self.server.host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid host '{}', using 0.0.0.0", self.server.host);
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        });
        SocketAddr::new(ip, self.server.port)
    }

    /// Request body ceiling as accepted by `DefaultBodyLimit`.
    pub fn body_limit(&self) -> usize {
        usize::try_from(self.server.max_body_size).unwrap_or(usize::MAX)
    }
}

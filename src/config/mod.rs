use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Static bearer token that acts as a system administrator
    #[serde(default = "default_admin_token")]
    pub admin_token: String,
    /// Email of the administrator created at startup when missing
    pub admin_email: Option<String>,
    /// Password for the bootstrap administrator
    pub admin_password: Option<String>,
    /// Lifetime of login sessions in hours (default: 24)
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_token: default_admin_token(),
            admin_email: None,
            admin_password: None,
            session_ttl_hours: default_session_ttl_hours(),
        }
    }
}

fn default_admin_token() -> String {
    // Generate a random token if not provided
    uuid::Uuid::new_v4().to_string()
}

fn default_session_ttl_hours() -> i64 {
    24
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| "Failed to parse configuration file")?;
            Ok(config)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    /// Check the loaded values for settings the server cannot run with.
    /// Returns one message per problem; empty means the config is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.server.port == 0 {
            problems.push("server.port must be between 1 and 65535".to_string());
        }

        if self.auth.admin_token.trim().is_empty() {
            problems.push("auth.admin_token must not be empty".to_string());
        } else if self.auth.admin_token.len() < 16 {
            problems.push("auth.admin_token is too short (min 16 characters)".to_string());
        }

        match (&self.auth.admin_email, &self.auth.admin_password) {
            (Some(_), None) => {
                problems.push("auth.admin_password is required when auth.admin_email is set".to_string())
            }
            (None, Some(_)) => {
                problems.push("auth.admin_email is required when auth.admin_password is set".to_string())
            }
            _ => {}
        }

        if self.auth.session_ttl_hours <= 0 {
            problems.push("auth.session_ttl_hours must be positive".to_string());
        }

        problems
    }

    pub fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

//! Configuration management
//!
//! This module handles loading and parsing configuration for the Blogline server.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults. The one value
//! without a default is `auth.jwt_secret`; [`Config::validate`] rejects an
//! empty secret so the server never signs tokens with a built-in key.

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Token signing configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// AI suggestion provider configuration
    #[serde(default)]
    pub ai: AiConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Upper bound for a single store operation issued by a service
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
            operation_timeout_secs: default_operation_timeout(),
        }
    }
}

fn default_database_url() -> String {
    "data/blogline.db".to_string()
}

fn default_operation_timeout() -> u64 {
    5
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Token signing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret used to sign access tokens. Required.
    #[serde(default)]
    pub jwt_secret: String,
    /// Access token lifetime in hours
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_hours: default_token_ttl_hours(),
        }
    }
}

fn default_token_ttl_hours() -> i64 {
    72
}

/// AI suggestion provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Chat completions endpoint
    #[serde(default = "default_ai_endpoint")]
    pub endpoint: String,
    /// Model name sent with each request
    #[serde(default = "default_ai_model")]
    pub model: String,
    /// Provider API key; without one the service answers with a canned suggestion
    #[serde(default)]
    pub api_key: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_ai_timeout")]
    pub timeout_seconds: u64,
    /// Completion length cap
    #[serde(default = "default_ai_max_tokens")]
    pub max_tokens: u32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_ai_endpoint(),
            model: default_ai_model(),
            api_key: None,
            timeout_seconds: default_ai_timeout(),
            max_tokens: default_ai_max_tokens(),
        }
    }
}

fn default_ai_endpoint() -> String {
    "https://api.mistral.ai/v1/chat/completions".to_string()
}

fn default_ai_model() -> String {
    "mistral-medium".to_string()
}

fn default_ai_timeout() -> u64 {
    15
}

fn default_ai_max_tokens() -> u32 {
    500
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist or is empty, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - BLOGLINE_SERVER_HOST, BLOGLINE_SERVER_PORT, BLOGLINE_SERVER_CORS_ORIGIN
    /// - BLOGLINE_DATABASE_DRIVER, BLOGLINE_DATABASE_URL, BLOGLINE_DATABASE_OPERATION_TIMEOUT_SECS
    /// - BLOGLINE_AUTH_JWT_SECRET, BLOGLINE_AUTH_TOKEN_TTL_HOURS
    /// - BLOGLINE_AI_ENDPOINT, BLOGLINE_AI_MODEL, BLOGLINE_AI_API_KEY (falls back to M_API_KEY)
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Check values that have no usable default.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "auth.jwt_secret must be set (or BLOGLINE_AUTH_JWT_SECRET)".to_string(),
            ));
        }
        if self.auth.token_ttl_hours <= 0 {
            return Err(ConfigError::ValidationError(
                "auth.token_ttl_hours must be positive".to_string(),
            ));
        }
        if self.database.operation_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "database.operation_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        // Server configuration
        if let Ok(host) = std::env::var("BLOGLINE_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("BLOGLINE_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(cors_origin) = std::env::var("BLOGLINE_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }

        // Database configuration
        if let Ok(driver) = std::env::var("BLOGLINE_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(url) = std::env::var("BLOGLINE_DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(secs) = std::env::var("BLOGLINE_DATABASE_OPERATION_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse::<u64>() {
                self.database.operation_timeout_secs = secs;
            }
        }

        // Auth configuration
        if let Ok(secret) = std::env::var("BLOGLINE_AUTH_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Ok(hours) = std::env::var("BLOGLINE_AUTH_TOKEN_TTL_HOURS") {
            if let Ok(hours) = hours.parse::<i64>() {
                self.auth.token_ttl_hours = hours;
            }
        }

        // AI configuration
        if let Ok(endpoint) = std::env::var("BLOGLINE_AI_ENDPOINT") {
            self.ai.endpoint = endpoint;
        }
        if let Ok(model) = std::env::var("BLOGLINE_AI_MODEL") {
            self.ai.model = model;
        }
        let api_key = std::env::var("BLOGLINE_AI_API_KEY").or_else(|_| std::env::var("M_API_KEY"));
        if let Ok(key) = api_key {
            if !key.trim().is_empty() {
                self.ai.api_key = Some(key);
            }
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared by every test that touches process environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
const ENV_KEYS: &[&str] = &[
    "BLOGLINE_SERVER_HOST",
    "BLOGLINE_SERVER_PORT",
    "BLOGLINE_SERVER_CORS_ORIGIN",
    "BLOGLINE_DATABASE_DRIVER",
    "BLOGLINE_DATABASE_URL",
    "BLOGLINE_DATABASE_OPERATION_TIMEOUT_SECS",
    "BLOGLINE_AUTH_JWT_SECRET",
    "BLOGLINE_AUTH_TOKEN_TTL_HOURS",
    "BLOGLINE_AI_ENDPOINT",
    "BLOGLINE_AI_MODEL",
    "BLOGLINE_AI_API_KEY",
    "M_API_KEY",
];

#[cfg(test)]
fn clear_env() {
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
}

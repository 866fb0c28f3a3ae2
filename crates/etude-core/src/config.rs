use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::EtudeError;

const DEV_SECRET: &str = "etude-dev-secret-change-me";

/// Application configuration loaded from environment variables.
///
/// Read once at startup; nothing in the framework mutates it afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Secret used to sign every codec-managed cookie.
    pub secret_key: String,

    /// Issue and enforce XSRF tokens (default: true)
    pub xsrf_enabled: bool,

    /// Environment: development, production, test
    pub environment: String,

    /// Server host (default: 127.0.0.1)
    pub server_host: String,

    /// Server port (default: 8000)
    pub server_port: u16,

    /// Mark framework cookies `Secure` (default: false)
    pub cookie_secure: bool,

    /// Lifetime of the identity cookie in seconds (default: 14 days)
    pub identity_max_age_secs: u64,

    /// Largest request body the transport will read (default: 1MB)
    pub max_body_size: usize,

    /// Optional TOML route manifest, hot-reloaded in development.
    pub routes_manifest: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            secret_key: DEV_SECRET.to_string(),
            xsrf_enabled: true,
            environment: "development".to_string(),
            server_host: "127.0.0.1".to_string(),
            server_port: 8000,
            cookie_secure: false,
            identity_max_age_secs: 14 * 24 * 3600,
            max_body_size: 1_048_576,
            routes_manifest: None,
        }
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

impl Config {
    /// Load configuration from environment variables (with .env support).
    pub fn from_env() -> Result<Self, EtudeError> {
        // Load .env file if present (ignore errors if missing)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; unset keys take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, EtudeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let number = |key: &str, default: u64| -> Result<u64, EtudeError> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map_err(|_| EtudeError::Config(format!("{} must be a number, got `{}`", key, raw))),
                None => Ok(default),
            }
        };

        let server_port = number("SERVER_PORT", u64::from(defaults.server_port))?;
        let server_port = u16::try_from(server_port)
            .map_err(|_| EtudeError::Config(format!("SERVER_PORT out of range: {}", server_port)))?;
        let max_body_size = number("MAX_BODY_SIZE", defaults.max_body_size as u64)?;

        let config = Config {
            secret_key: lookup("SECRET_KEY").unwrap_or(defaults.secret_key),
            xsrf_enabled: lookup("XSRF_ENABLED")
                .map(|v| parse_bool(&v))
                .unwrap_or(defaults.xsrf_enabled),
            environment: lookup("ENVIRONMENT").unwrap_or(defaults.environment),
            server_host: lookup("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port,
            cookie_secure: lookup("COOKIE_SECURE")
                .map(|v| parse_bool(&v))
                .unwrap_or(defaults.cookie_secure),
            identity_max_age_secs: number("IDENTITY_MAX_AGE_SECS", defaults.identity_max_age_secs)?,
            max_body_size: usize::try_from(max_body_size)
                .map_err(|_| EtudeError::Config("MAX_BODY_SIZE out of range".to_string()))?,
            routes_manifest: lookup("ROUTES_MANIFEST").map(PathBuf::from),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the framework cannot run with.
    pub fn validate(&self) -> Result<(), EtudeError> {
        if self.secret_key.is_empty() {
            return Err(EtudeError::Config("SECRET_KEY must not be empty".to_string()));
        }
        if self.secret_key == DEV_SECRET && !self.is_dev() && self.environment != "test" {
            tracing::warn!(
                environment = %self.environment,
                "SECRET_KEY is unset; cookies are signed with the public development secret"
            );
        }
        Ok(())
    }

    /// Check if running in development mode.
    pub fn is_dev(&self) -> bool {
        self.environment == "development"
    }

    pub fn identity_max_age(&self) -> Duration {
        Duration::from_secs(self.identity_max_age_secs)
    }

    /// Get the full server address.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

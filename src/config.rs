use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub authority: AuthorityConfig,
    #[serde(default)]
    pub backend: BackendConfig,
}

// ---------------------------------------------------------------------------
// Authority
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorityConfig {
    /// Base URL of the internal authority API (e.g. `https://forge.internal`).
    /// Endpoint paths are appended to this value as-is.
    pub base_url: String,
    /// Name of the environment variable that holds the shared API secret.
    /// The secret itself is never stored in the config file.
    #[serde(default = "default_secret_env")]
    pub secret_env: String,
    /// Per-request timeout in seconds for authority calls.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

fn default_secret_env() -> String {
    "GITGATE_API_SECRET".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl AuthorityConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Resolve the shared API secret from the configured environment variable.
    pub fn resolve_secret(&self) -> Result<String> {
        let secret = std::env::var(&self.secret_env)
            .with_context(|| format!("missing API secret env var: {}", self.secret_env))?;
        anyhow::ensure!(
            !secret.is_empty(),
            "API secret env var {} is empty",
            self.secret_env
        );
        Ok(secret)
    }
}

// ---------------------------------------------------------------------------
// Backend transport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Connect timeout in seconds for the backend store transport.  The
    /// backend address itself comes from the authority's approval, not from
    /// configuration.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
        }
    }
}

fn default_connect_timeout() -> u64 {
    10
}

impl BackendConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load and validate a [`Config`] from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&contents)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Basic sanity checks that cannot be expressed purely with serde.
fn validate_config(config: &Config) -> Result<()> {
    anyhow::ensure!(
        config.authority.base_url.starts_with("http://")
            || config.authority.base_url.starts_with("https://"),
        "authority.base_url must be an http(s) URL"
    );
    anyhow::ensure!(
        !config.authority.base_url.ends_with('/'),
        "authority.base_url must not end with a slash"
    );
    anyhow::ensure!(
        config.authority.request_timeout > 0,
        "authority.request_timeout must be positive"
    );
    anyhow::ensure!(
        config.backend.connect_timeout > 0,
        "backend.connect_timeout must be positive"
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Result<Config> {
        let config: Config = serde_yaml::from_str(yaml)?;
        validate_config(&config)?;
        Ok(config)
    }

    #[test]
    fn minimal_config_with_defaults() {
        let config = parse("authority:\n  base_url: https://forge.internal\n").unwrap();
        assert_eq!(config.authority.base_url, "https://forge.internal");
        assert_eq!(config.authority.secret_env, "GITGATE_API_SECRET");
        assert_eq!(config.authority.request_timeout, 30);
        assert_eq!(config.backend.connect_timeout, 10);
    }

    #[test]
    fn explicit_values_override_defaults() {
        let yaml = "authority:\n  base_url: http://localhost:8080\n  secret_env: MY_SECRET\n  request_timeout: 5\nbackend:\n  connect_timeout: 2\n";
        let config = parse(yaml).unwrap();
        assert_eq!(config.authority.secret_env, "MY_SECRET");
        assert_eq!(config.authority.request_timeout, 5);
        assert_eq!(config.backend.connect_timeout, 2);
    }

    #[test]
    fn rejects_non_http_base_url() {
        assert!(parse("authority:\n  base_url: ftp://forge.internal\n").is_err());
    }

    #[test]
    fn rejects_trailing_slash() {
        assert!(parse("authority:\n  base_url: https://forge.internal/\n").is_err());
    }

    #[test]
    fn rejects_zero_timeout() {
        let yaml = "authority:\n  base_url: https://forge.internal\n  request_timeout: 0\n";
        assert!(parse(yaml).is_err());
    }
}

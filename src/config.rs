use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    /// Hostname reserved for the operator landing page (e.g. `sites.example.com`).
    pub operator_host: String,
    /// Root directory of the local mirror. One subdirectory per tenant.
    pub site_dir: String,
    #[serde(default)]
    pub auth: AuthConfig,
    pub sync: SyncConfig,
}

impl Config {
    /// Scheme used when generating absolute URLs (landing page tenant links).
    pub fn http_scheme(&self) -> &'static str {
        if self.server.tls {
            "https"
        } else {
            "http"
        }
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address for the HTTP listener (e.g. `0.0.0.0:3000`).
    pub listen: String,
    /// Whether requests reach us over TLS. Affects generated absolute URLs
    /// only; the listener itself is plain HTTP behind the terminating proxy.
    #[serde(default = "bool_true")]
    pub tls: bool,
}

fn bool_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Session gate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Name of the session cookie minted by the external identity layer.
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,
    /// Path on the identity layer that starts a login flow. Unauthenticated
    /// requests are redirected here on the same host.
    #[serde(default = "default_login_path")]
    pub login_path: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_cookie: default_session_cookie(),
            login_path: default_login_path(),
        }
    }
}

fn default_session_cookie() -> String {
    "auth-session".to_string()
}

fn default_login_path() -> String {
    "/auth/login".to_string()
}

// ---------------------------------------------------------------------------
// Bundle sync
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Master switch for the background bundle synchronizer.
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// Bucket holding one zip bundle per tenant.
    #[serde(default)]
    pub bucket: String,
    pub region: String,
    /// Seconds between sync cycles.
    #[serde(default = "default_sync_interval")]
    pub interval_secs: u64,
}

fn default_sync_interval() -> u64 {
    300
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
        !config.operator_host.is_empty(),
        "operator_host must not be empty"
    );
    anyhow::ensure!(!config.site_dir.is_empty(), "site_dir must not be empty");
    anyhow::ensure!(
        !config.sync.enabled || !config.sync.bucket.is_empty(),
        "sync.bucket is required when sync is enabled"
    );
    anyhow::ensure!(
        config.sync.interval_secs >= 1,
        "sync.interval_secs must be at least 1"
    );
    Ok(())
}

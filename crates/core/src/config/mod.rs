//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (OFFLINE_LOADER_*)
//! 2. Bare `PORT` environment variable
//! 3. TOML config file (if OFFLINE_LOADER_CONFIG_FILE set)
//! 4. Built-in defaults

use std::net::SocketAddr;
use std::path::PathBuf;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (OFFLINE_LOADER_*)
/// 2. `PORT`
/// 3. TOML config file (if OFFLINE_LOADER_CONFIG_FILE set)
/// 4. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Address the HTTP façade binds to.
    ///
    /// Set via OFFLINE_LOADER_HOST environment variable.
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port.
    ///
    /// Set via OFFLINE_LOADER_PORT or PORT environment variables.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Root directory of the snapshot tree.
    ///
    /// Set via OFFLINE_LOADER_STORAGE_ROOT environment variable.
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,

    /// Upper bound for a single page render in milliseconds.
    ///
    /// Set via OFFLINE_LOADER_RENDER_TIMEOUT_MS environment variable.
    #[serde(default = "default_render_timeout_ms")]
    pub render_timeout_ms: u64,

    /// How long the network must stay quiet before a page counts as settled.
    #[serde(default = "default_network_idle_ms")]
    pub network_idle_ms: u64,

    /// Requests allowed in flight while the network still counts as quiet.
    #[serde(default = "default_network_idle_max_inflight")]
    pub network_idle_max_inflight: usize,

    /// Whether pages are loaded with Content-Security-Policy bypassed.
    #[serde(default = "default_true")]
    pub bypass_csp: bool,

    /// Path to a Chrome/Chromium binary. Auto-detected when unset.
    ///
    /// Set via OFFLINE_LOADER_CHROME_EXECUTABLE environment variable.
    #[serde(default)]
    pub chrome_executable: Option<PathBuf>,

    /// Extra command-line switches passed to the browser.
    #[serde(default = "default_browser_args")]
    pub browser_args: Vec<String>,

    /// Browser viewport as (width, height).
    #[serde(default = "default_viewport")]
    pub viewport: (u32, u32),
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    5000
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./saved_sites")
}

fn default_render_timeout_ms() -> u64 {
    60_000
}

fn default_network_idle_ms() -> u64 {
    500
}

fn default_network_idle_max_inflight() -> usize {
    2
}

fn default_true() -> bool {
    true
}

fn default_browser_args() -> Vec<String> {
    ["--no-sandbox", "--disable-setuid-sandbox", "--disable-dev-shm-usage", "--disable-web-security"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_viewport() -> (u32, u32) {
    (1280, 720)
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            storage_root: default_storage_root(),
            render_timeout_ms: default_render_timeout_ms(),
            network_idle_ms: default_network_idle_ms(),
            network_idle_max_inflight: default_network_idle_max_inflight(),
            bypass_csp: true,
            chrome_executable: None,
            browser_args: default_browser_args(),
            viewport: default_viewport(),
        }
    }
}

impl AppConfig {
    /// Socket address the façade listens on.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `host` is not an IP address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip = self
            .host
            .parse()
            .map_err(|_| ConfigError::Invalid { field: "host".into(), reason: format!("not an IP address: {}", self.host) })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = Self::figment()
            .extract()
            .map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("OFFLINE_LOADER_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment
            .merge(Env::raw().only(&["PORT"]).map(|key| key.as_str().to_lowercase().into()))
            .merge(
                Env::prefixed("OFFLINE_LOADER_")
                    .ignore(&["CONFIG_FILE"])
                    .map(|key| key.as_str().to_lowercase().into())
                    .split("__"),
            )
    }
}

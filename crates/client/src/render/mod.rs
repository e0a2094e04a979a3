//! Headless browser rendering for JS-heavy pages.
//!
//! This module provides the renderer capability the capture pipeline
//! depends on, plus a feature-gated implementation using chromiumoxide
//! for headless Chrome/Chromium browser control.

use std::time::Duration;

use loader_core::{AppConfig, Error};
use thiserror::Error;
use url::Url;

#[cfg(feature = "render")]
mod chrome;

#[cfg(feature = "render")]
pub use chrome::{ChromeConfig, HeadlessRenderer};

/// Errors that can occur during page rendering.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Failed to launch or connect to browser.
    #[error("browser launch failed: {0}")]
    BrowserLaunch(String),

    /// Failed to navigate to URL.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// Failed to get page content.
    #[error("content retrieval failed: {0}")]
    ContentRetrieval(String),

    /// Timeout waiting for page to load.
    #[error("render timeout after {0}ms")]
    Timeout(u64),

    /// No renderer is available in this build.
    #[error("rendering is disabled")]
    Disabled,
}

impl From<RenderError> for Error {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::Timeout(ms) => Error::RenderTimeout(ms),
            RenderError::Disabled => Error::RenderDisabled,
            other => Error::RenderFailed(other.to_string()),
        }
    }
}

/// When a navigated page counts as finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCondition {
    /// The `load` event has fired.
    Load,
    /// Load has fired and no more than `max_inflight` network requests
    /// have been outstanding for `idle_ms`.
    NetworkIdle { idle_ms: u64, max_inflight: usize },
}

impl Default for WaitCondition {
    fn default() -> Self {
        WaitCondition::NetworkIdle { idle_ms: 500, max_inflight: 2 }
    }
}

/// Options for rendering a page.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Timeout in milliseconds (default: 60000).
    pub timeout_ms: u64,

    /// Settle condition before markup is extracted.
    pub wait: WaitCondition,

    /// Viewport dimensions (default: 1280x720).
    pub viewport: (u32, u32),

    /// Load the page with Content-Security-Policy bypassed (default: true).
    pub bypass_csp: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self { timeout_ms: 60_000, wait: WaitCondition::default(), viewport: (1280, 720), bypass_csp: true }
    }
}

impl RenderOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            timeout_ms: config.render_timeout_ms,
            wait: WaitCondition::NetworkIdle {
                idle_ms: config.network_idle_ms,
                max_inflight: config.network_idle_max_inflight,
            },
            viewport: config.viewport,
            bypass_csp: config.bypass_csp,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Result of rendering a page.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// Rendered HTML content.
    pub html: String,

    /// Final URL after redirects.
    pub final_url: Url,

    /// Time taken to render in milliseconds.
    pub render_time_ms: u64,
}

/// Renderer trait for headless browser page rendering.
///
/// Implementations own whatever browser resources they acquire and must
/// release them on every exit path, including when the returned future is
/// dropped before completion.
#[async_trait::async_trait]
pub trait Renderer: Send + Sync {
    /// Render a URL to HTML via headless browser.
    async fn render(&self, url: &Url, opts: &RenderOptions) -> Result<RenderedPage, RenderError>;
}

/// Renderer used when the binary is built without browser support.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledRenderer;

#[async_trait::async_trait]
impl Renderer for DisabledRenderer {
    async fn render(&self, _url: &Url, _opts: &RenderOptions) -> Result<RenderedPage, RenderError> {
        Err(RenderError::Disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_options_default() {
        let opts = RenderOptions::default();
        assert_eq!(opts.timeout(), Duration::from_secs(60));
        assert_eq!(opts.wait, WaitCondition::NetworkIdle { idle_ms: 500, max_inflight: 2 });
        assert!(opts.bypass_csp);
    }

    #[test]
    fn test_render_options_from_config() {
        let config = AppConfig {
            render_timeout_ms: 5_000,
            network_idle_ms: 250,
            network_idle_max_inflight: 0,
            bypass_csp: false,
            viewport: (800, 600),
            ..Default::default()
        };
        let opts = RenderOptions::from_config(&config);
        assert_eq!(opts.timeout_ms, 5_000);
        assert_eq!(opts.wait, WaitCondition::NetworkIdle { idle_ms: 250, max_inflight: 0 });
        assert_eq!(opts.viewport, (800, 600));
        assert!(!opts.bypass_csp);
    }

    #[test]
    fn test_render_error_conversion() {
        assert!(matches!(Error::from(RenderError::Timeout(60_000)), Error::RenderTimeout(60_000)));
        assert!(matches!(Error::from(RenderError::Disabled), Error::RenderDisabled));

        let err = Error::from(RenderError::Navigation("net::ERR_NAME_NOT_RESOLVED".into()));
        assert!(matches!(&err, Error::RenderFailed(msg) if msg.contains("ERR_NAME_NOT_RESOLVED")));
    }

    #[tokio::test]
    async fn test_disabled_renderer() {
        let url = Url::parse("https://example.com").unwrap();
        let result = DisabledRenderer.render(&url, &RenderOptions::default()).await;
        assert!(matches!(result, Err(RenderError::Disabled)));
    }
}

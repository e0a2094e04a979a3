//! Headless Chrome/Chromium renderer using chromiumoxide.
//!
//! Every render launches its own browser process with a throwaway
//! profile directory and tears it down afterwards. [`BrowserSession`]
//! guarantees the process and its CDP handler task are released even when
//! navigation fails, the timeout fires, or the render future is dropped.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent};
use chromiumoxide::cdp::browser_protocol::page::SetBypassCspParams;
use futures_util::{Stream, StreamExt};
use loader_core::AppConfig;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use url::Url;

use super::{RenderError, RenderOptions, RenderedPage, Renderer, WaitCondition};

/// Browser launch settings.
#[derive(Debug, Clone, Default)]
pub struct ChromeConfig {
    /// Chrome/Chromium binary; chromiumoxide searches the usual locations when unset.
    pub executable: Option<PathBuf>,
    /// Extra command-line switches.
    pub args: Vec<String>,
}

impl ChromeConfig {
    pub fn from_config(config: &AppConfig) -> Self {
        Self { executable: config.chrome_executable.clone(), args: config.browser_args.clone() }
    }
}

/// A launched browser plus the task pumping its CDP events.
///
/// Dropping the session aborts the handler; chromiumoxide kills the child
/// process when the `Browser` is dropped. The profile directory is removed
/// last.
struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    _profile: TempDir,
}

impl BrowserSession {
    async fn launch(config: &ChromeConfig, viewport: (u32, u32)) -> Result<Self, RenderError> {
        let profile = tempfile::Builder::new()
            .prefix("offline-loader-")
            .tempdir()
            .map_err(|e| RenderError::BrowserLaunch(format!("profile directory: {e}")))?;

        let mut builder = BrowserConfig::builder()
            .user_data_dir(profile.path())
            .window_size(viewport.0, viewport.1)
            .args(config.args.clone());
        if let Some(executable) = &config.executable {
            builder = builder.chrome_executable(executable);
        }

        let (browser, mut handler) = Browser::launch(builder.build().map_err(RenderError::BrowserLaunch)?)
            .await
            .map_err(|e| RenderError::BrowserLaunch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("browser handler event error: {e}");
                }
            }
        });

        Ok(Self { browser, handler, _profile: profile })
    }

    /// Close the browser gracefully and wait for the process to exit.
    async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            tracing::debug!("browser close failed, process will be killed: {e}");
        }
        if let Err(e) = self.browser.wait().await {
            tracing::debug!("waiting for browser exit failed: {e}");
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

/// Renderer that drives a fresh headless Chrome per page.
pub struct HeadlessRenderer {
    config: ChromeConfig,
}

impl HeadlessRenderer {
    pub fn new(config: ChromeConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl Renderer for HeadlessRenderer {
    async fn render(&self, url: &Url, opts: &RenderOptions) -> Result<RenderedPage, RenderError> {
        let start = Instant::now();
        let session = BrowserSession::launch(&self.config, opts.viewport).await?;

        let outcome = tokio::time::timeout(opts.timeout(), load_page(&session.browser, url, opts)).await;
        session.shutdown().await;

        let (html, final_url) = outcome.map_err(|_| RenderError::Timeout(opts.timeout_ms))??;
        let render_time_ms = start.elapsed().as_millis() as u64;

        tracing::debug!("rendered {} -> {} in {}ms ({} bytes)", url, final_url, render_time_ms, html.len());

        Ok(RenderedPage { html, final_url, render_time_ms })
    }
}

async fn load_page(browser: &Browser, url: &Url, opts: &RenderOptions) -> Result<(String, Url), RenderError> {
    let page = browser
        .new_page("about:blank")
        .await
        .map_err(|e| RenderError::Navigation(e.to_string()))?;

    let (width, height) = opts.viewport;
    page.execute(SetDeviceMetricsOverrideParams::new(i64::from(width), i64::from(height), 1.0, false))
        .await
        .map_err(|e| RenderError::Navigation(format!("viewport: {e}")))?;

    if opts.bypass_csp {
        page.execute(SetBypassCspParams::new(true))
            .await
            .map_err(|e| RenderError::Navigation(format!("bypass CSP: {e}")))?;
    }

    let listen_err = |e: chromiumoxide::error::CdpError| RenderError::Navigation(format!("network listener: {e}"));
    let mut started = page.event_listener::<EventRequestWillBeSent>().await.map_err(listen_err)?;
    let mut finished = page.event_listener::<EventLoadingFinished>().await.map_err(listen_err)?;
    let mut failed = page.event_listener::<EventLoadingFailed>().await.map_err(listen_err)?;

    page.goto(url.as_str())
        .await
        .map_err(|e| RenderError::Navigation(e.to_string()))?;

    if let WaitCondition::NetworkIdle { idle_ms, max_inflight } = opts.wait {
        wait_for_network_idle(&mut started, &mut finished, &mut failed, Duration::from_millis(idle_ms), max_inflight)
            .await;
    }

    let html = page
        .content()
        .await
        .map_err(|e| RenderError::ContentRetrieval(e.to_string()))?;

    let page_url = page
        .url()
        .await
        .map_err(|e| RenderError::ContentRetrieval(e.to_string()))?;

    let final_url = page_url
        .as_deref()
        .and_then(|u| Url::parse(u).ok())
        .unwrap_or_else(|| url.clone());

    page.close().await.ok();
    Ok((html, final_url))
}

/// Resolve once at most `max_inflight` requests have been outstanding for a
/// full `idle` window.
async fn wait_for_network_idle<S, F, X>(
    started: &mut S, finished: &mut F, failed: &mut X, idle: Duration, max_inflight: usize,
) where
    S: Stream<Item = Arc<EventRequestWillBeSent>> + Unpin,
    F: Stream<Item = Arc<EventLoadingFinished>> + Unpin,
    X: Stream<Item = Arc<EventLoadingFailed>> + Unpin,
{
    let mut inflight: HashSet<String> = HashSet::new();

    loop {
        let quiet = tokio::time::sleep(idle);
        tokio::select! {
            Some(ev) = started.next() => {
                inflight.insert(ev.request_id.inner().clone());
            }
            Some(ev) = finished.next() => {
                inflight.remove(ev.request_id.inner());
            }
            Some(ev) = failed.next() => {
                inflight.remove(ev.request_id.inner());
            }
            _ = quiet, if inflight.len() <= max_inflight => return,
            else => return,
        }
    }
}

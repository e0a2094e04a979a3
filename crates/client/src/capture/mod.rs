//! Capture orchestration.
//!
//! A capture either serves the stored snapshot for a URL's [`ResourceKey`]
//! or renders the page, rewrites its anchors and persists the result.
//! Misses for the same key are serialized, so at most one render per key
//! is ever in flight and later callers are served the first one's snapshot.

pub mod locks;
pub mod url;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use loader_core::{AppConfig, Error, ResourceKey, SnapshotStore, derive_key};
use ::url::Url;

use crate::render::{RenderError, RenderOptions, Renderer};
use crate::rewrite::rewrite_links;
use locks::KeyLocks;

/// Outcome of a successful capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureResult {
    /// Document markup with anchors rewritten.
    pub html: String,
    /// Whether the markup came from an existing snapshot.
    pub from_cache: bool,
    /// Path component of the requested URL, for display.
    pub path: String,
    /// Whether the markup is durably stored.
    pub persisted: bool,
}

struct Inner {
    store: SnapshotStore,
    renderer: Arc<dyn Renderer>,
    options: RenderOptions,
    locks: KeyLocks,
}

/// Capture pipeline shared by every request.
#[derive(Clone)]
pub struct CaptureService {
    inner: Arc<Inner>,
}

impl CaptureService {
    pub fn new(store: SnapshotStore, renderer: Arc<dyn Renderer>, options: RenderOptions) -> Self {
        Self { inner: Arc::new(Inner { store, renderer, options, locks: KeyLocks::new() }) }
    }

    pub fn from_config(config: &AppConfig, store: SnapshotStore, renderer: Arc<dyn Renderer>) -> Self {
        Self::new(store, renderer, RenderOptions::from_config(config))
    }

    /// Capture `raw`, a user-supplied URL that may lack its scheme.
    pub async fn capture(&self, raw: &str) -> Result<CaptureResult, Error> {
        let url = url::normalize(raw)?;
        let key = derive_key(&url)?;
        let path = url.path().to_string();

        if let Some(html) = self.cached(&key).await? {
            return Ok(CaptureResult { html, from_cache: true, path, persisted: true });
        }

        let _guard = self.inner.locks.acquire(&key).await;

        // A capture that held the lock before us may have just stored it.
        if let Some(html) = self.cached(&key).await? {
            return Ok(CaptureResult { html, from_cache: true, path, persisted: true });
        }

        tracing::info!(%url, %key, "capturing new page");
        let html = self.render(&url).await?;
        let persisted = self.persist(&key, &html).await;

        Ok(CaptureResult { html, from_cache: false, path, persisted })
    }

    async fn cached(&self, key: &ResourceKey) -> Result<Option<String>, Error> {
        let store = &self.inner.store;
        if !store.exists(key).await {
            return Ok(None);
        }

        let html = store.read(key).await?;
        tracing::info!(path = %store.path_for(key).display(), "serving cached snapshot");
        Ok(Some(html))
    }

    /// Render `url` and rewrite its anchors.
    async fn render(&self, url: &Url) -> Result<String, Error> {
        let opts = &self.inner.options;
        let start = Instant::now();

        let page = tokio::time::timeout(opts.timeout(), self.inner.renderer.render(url, opts))
            .await
            .map_err(|_| RenderError::Timeout(opts.timeout_ms))??;

        tracing::debug!(
            %url,
            final_url = %page.final_url,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "render complete"
        );

        Ok(rewrite_links(&page.html, &page.final_url)?)
    }

    /// Store `html` under `key`. A failed write is logged and reported
    /// through the return value; the caller still serves the markup.
    async fn persist(&self, key: &ResourceKey, html: &str) -> bool {
        match self.inner.store.write(key, html).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(%key, code = e.code(), "snapshot not persisted: {e}");
                false
            }
        }
    }

    /// Where the snapshot for `raw` lives or would live.
    pub fn snapshot_path(&self, raw: &str) -> Result<PathBuf, Error> {
        let url = url::normalize(raw)?;
        Ok(self.inner.store.path_for(&derive_key(&url)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RenderedPage;
    use crate::rewrite::TARGET_ATTR;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Renders a fixed document after an optional delay, counting calls.
    struct FakeRenderer {
        calls: AtomicUsize,
        delay: Duration,
        html: String,
    }

    impl FakeRenderer {
        fn new(html: &str) -> Arc<Self> {
            Self::with_delay(html, Duration::ZERO)
        }

        fn with_delay(html: &str, delay: Duration) -> Arc<Self> {
            Arc::new(Self { calls: AtomicUsize::new(0), delay, html: html.to_string() })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl Renderer for FakeRenderer {
        async fn render(&self, url: &Url, _opts: &RenderOptions) -> Result<RenderedPage, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(RenderedPage { html: self.html.clone(), final_url: url.clone(), render_time_ms: 0 })
        }
    }

    struct FailingRenderer;

    #[async_trait::async_trait]
    impl Renderer for FailingRenderer {
        async fn render(&self, _url: &Url, _opts: &RenderOptions) -> Result<RenderedPage, RenderError> {
            Err(RenderError::Navigation("net::ERR_NAME_NOT_RESOLVED".into()))
        }
    }

    struct HangingRenderer;

    #[async_trait::async_trait]
    impl Renderer for HangingRenderer {
        async fn render(&self, _url: &Url, _opts: &RenderOptions) -> Result<RenderedPage, RenderError> {
            std::future::pending().await
        }
    }

    /// Counts how many times it is dropped.
    struct SessionGuard(Arc<AtomicUsize>);

    impl Drop for SessionGuard {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Holds a resource for the whole render, then hangs or fails.
    struct ResourceRenderer {
        released: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Renderer for ResourceRenderer {
        async fn render(&self, _url: &Url, _opts: &RenderOptions) -> Result<RenderedPage, RenderError> {
            let _session = SessionGuard(Arc::clone(&self.released));
            if self.fail {
                return Err(RenderError::Navigation("net::ERR_CONNECTION_RESET".into()));
            }
            std::future::pending().await
        }
    }

    const PAGE: &str = r#"<html><body><h1>Play</h1><a href="/level/2">Next</a></body></html>"#;

    fn service(dir: &TempDir, renderer: Arc<dyn Renderer>) -> CaptureService {
        CaptureService::new(SnapshotStore::new(dir.path()), renderer, RenderOptions::default())
    }

    #[tokio::test]
    async fn test_capture_then_cache_hit() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = FakeRenderer::new(PAGE);
        let svc = service(&dir, renderer.clone());

        let first = svc.capture("example.com/play").await.unwrap();
        assert!(!first.from_cache);
        assert!(first.persisted);
        assert_eq!(first.path, "/play");
        assert!(dir.path().join("example_com/_play/index.html").is_file());
        assert_eq!(renderer.calls(), 1);

        let second = svc.capture("example.com/play").await.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.html, first.html);
        assert_eq!(renderer.calls(), 1);
    }

    #[tokio::test]
    async fn test_colliding_urls_share_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = FakeRenderer::new(PAGE);
        let svc = service(&dir, renderer.clone());

        let first = svc.capture("https://example.com/a-b").await.unwrap();
        let second = svc.capture("http://example.com/a.b?page=2").await.unwrap();

        assert!(second.from_cache);
        assert_eq!(second.html, first.html);
        assert_eq!(second.path, "/a.b");
        assert_eq!(renderer.calls(), 1);
    }

    #[tokio::test]
    async fn test_malformed_url_renders_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = FakeRenderer::new(PAGE);
        let svc = service(&dir, renderer.clone());

        for raw in ["http://", "", "   ", "ftp://example.com/x"] {
            let err = svc.capture(raw).await.unwrap_err();
            assert!(matches!(err, Error::MalformedUrl(_)), "{raw:?} gave {err:?}");
        }

        assert_eq!(renderer.calls(), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_render_failure_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir, Arc::new(FailingRenderer));

        let err = svc.capture("example.com/play").await.unwrap_err();
        assert!(matches!(&err, Error::RenderFailed(msg) if msg.contains("ERR_NAME_NOT_RESOLVED")));
        assert!(!svc.snapshot_path("example.com/play").unwrap().exists());
    }

    #[tokio::test]
    async fn test_render_timeout_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let options = RenderOptions { timeout_ms: 50, ..RenderOptions::default() };
        let svc = CaptureService::new(SnapshotStore::new(dir.path()), Arc::new(HangingRenderer), options);

        let err = svc.capture("example.com/play").await.unwrap_err();
        assert!(matches!(err, Error::RenderTimeout(50)));
        assert_eq!(err.code(), "RENDER_TIMEOUT");
        assert!(!svc.snapshot_path("example.com/play").unwrap().exists());
    }

    #[tokio::test]
    async fn test_timed_out_render_releases_session() {
        let dir = tempfile::tempdir().unwrap();
        let released = Arc::new(AtomicUsize::new(0));
        let renderer = Arc::new(ResourceRenderer { released: Arc::clone(&released), fail: false });
        let options = RenderOptions { timeout_ms: 50, ..RenderOptions::default() };
        let svc = CaptureService::new(SnapshotStore::new(dir.path()), renderer, options);

        let err = svc.capture("example.com/play").await.unwrap_err();
        assert!(matches!(err, Error::RenderTimeout(50)));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_render_releases_session() {
        let dir = tempfile::tempdir().unwrap();
        let released = Arc::new(AtomicUsize::new(0));
        let renderer = Arc::new(ResourceRenderer { released: Arc::clone(&released), fail: true });
        let svc = service(&dir, renderer);

        let err = svc.capture("example.com/play").await.unwrap_err();
        assert!(matches!(err, Error::RenderFailed(_)));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_persisted_snapshot_is_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir, FakeRenderer::new(PAGE));

        let result = svc.capture("example.com/play").await.unwrap();
        let stored = std::fs::read_to_string(dir.path().join("example_com/_play/index.html")).unwrap();

        assert_eq!(stored, result.html);
        assert!(stored.contains(&format!(r#"{TARGET_ATTR}="https://example.com/level/2""#)));
        assert!(stored.contains("postMessage"));
    }

    #[tokio::test]
    async fn test_cache_hit_is_served_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = FakeRenderer::new(PAGE);
        let svc = service(&dir, renderer.clone());

        let placed = r#"<html><body><a href="/raw">untouched</a></body></html>"#;
        let target = dir.path().join("example_com/_play/index.html");
        std::fs::create_dir_all(target.parent().unwrap()).unwrap();
        std::fs::write(&target, placed).unwrap();

        let result = svc.capture("example.com/play").await.unwrap();
        assert!(result.from_cache);
        assert_eq!(result.html, placed);
        assert_eq!(renderer.calls(), 0);
    }

    #[tokio::test]
    async fn test_write_failure_still_serves_page() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let renderer = FakeRenderer::new(PAGE);
        let svc = CaptureService::new(SnapshotStore::new(&blocker), renderer.clone(), RenderOptions::default());

        let result = svc.capture("example.com/play").await.unwrap();
        assert!(!result.from_cache);
        assert!(!result.persisted);
        assert!(result.html.contains("Play"));
        assert_eq!(renderer.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_render_once() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = FakeRenderer::with_delay(PAGE, Duration::from_millis(100));
        let svc = service(&dir, renderer.clone());

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let svc = svc.clone();
                tokio::spawn(async move { svc.capture("example.com/play").await })
            })
            .collect();

        let mut results = Vec::new();
        for task in tasks {
            results.push(task.await.unwrap().unwrap());
        }

        assert_eq!(renderer.calls(), 1);
        assert_eq!(results.iter().filter(|r| !r.from_cache).count(), 1);
        assert!(results.iter().all(|r| r.html == results[0].html));

        let files: Vec<_> = std::fs::read_dir(dir.path().join("example_com/_play"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(files, vec![std::ffi::OsString::from("index.html")]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_distinct_keys_render_independently() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = FakeRenderer::with_delay(PAGE, Duration::from_millis(50));
        let svc = service(&dir, renderer.clone());

        let (a, b) = tokio::join!(svc.capture("example.com/a"), svc.capture("example.com/b"));
        assert!(!a.unwrap().from_cache);
        assert!(!b.unwrap().from_cache);
        assert_eq!(renderer.calls(), 2);
    }
}

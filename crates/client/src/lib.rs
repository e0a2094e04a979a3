//! Client code for offline-loader.
//!
//! This crate provides the capture pipeline: request URL normalization,
//! page rendering, link rewriting and the orchestrator that ties them to
//! the snapshot store.

pub mod capture;
pub mod render;
pub mod rewrite;

pub use capture::{CaptureResult, CaptureService};
pub use render::{DisabledRenderer, RenderError, RenderOptions, RenderedPage, Renderer, WaitCondition};
pub use rewrite::{RewriteError, rewrite_links};

#[cfg(feature = "render")]
pub use render::{ChromeConfig, HeadlessRenderer};

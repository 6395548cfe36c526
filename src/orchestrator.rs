//! `render(url, opts) -> RenderResult`: cache lookup, fetch, detect,
//! render, chunk, cache store — the one public entry point composing every
//! other module.

use crate::browser::{self, BrowserOptions};
use crate::cache::Cache;
use crate::chunker::{self, ChunkOptions};
use crate::config::AgentWebConfig;
use crate::detector;
use crate::error::Error;
use crate::lite;
use crate::page::{BackendTag, Chunk, DetectionReport, RenderResult};
use once_cell::sync::OnceCell;
use std::sync::Mutex;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

const DEFAULT_CHUNK_LIMIT: usize = 8;
const DEFAULT_TIMEOUT_MS: u64 = 15_000;
const PLAYWRIGHT_TTL_MS: u64 = 5 * 60 * 1_000;
const LITE_TTL_MS: u64 = 10 * 60 * 1_000;

/// Which backend to force, overriding SPA detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceBackend {
    Lite,
    Playwright,
}

/// Options recognized by `render`.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub force: Option<ForceBackend>,
    pub query: Option<String>,
    pub chunk_limit: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub verbose: bool,
    pub no_cache: bool,
    pub cache_ttl_ms: Option<u64>,
    pub cancellation: Option<CancellationToken>,
}

static SHARED_CONFIG: OnceCell<AgentWebConfig> = OnceCell::new();
static SHARED_CACHE: OnceCell<Mutex<Cache>> = OnceCell::new();

fn shared_config() -> crate::error::Result<&'static AgentWebConfig> {
    SHARED_CONFIG.get_or_try_init(AgentWebConfig::from_env)
}

fn shared_cache() -> crate::error::Result<&'static Mutex<Cache>> {
    SHARED_CACHE.get_or_try_init(|| {
        let config = shared_config()?;
        Cache::open(&config.cache_config()).map(Mutex::new)
    })
}

fn is_cancelled(token: &Option<CancellationToken>) -> bool {
    token.as_ref().is_some_and(|t| t.is_cancelled())
}

/// Races `fut` against `token`'s cancellation, aborting the wait (though not
/// necessarily the underlying I/O, which may keep running on its own task)
/// the instant the token fires instead of only checking between awaits.
async fn run_cancellable<T>(
    fut: impl std::future::Future<Output = crate::error::Result<T>>,
    token: &Option<CancellationToken>,
) -> crate::error::Result<T> {
    match token {
        Some(token) => {
            tokio::select! {
                result = fut => result,
                _ = token.cancelled() => Err(Error::Cancelled),
            }
        }
        None => fut.await,
    }
}

/// `render(url, opts) -> RenderResult`.
pub async fn render(url: &str, opts: &RenderOptions) -> RenderResult {
    let start = Instant::now();
    let cache_key = opts.query.clone().unwrap_or_default();

    if is_cancelled(&opts.cancellation) {
        return cancelled_result(url, start);
    }

    if !opts.no_cache && opts.force.is_none() {
        match shared_cache() {
            Ok(cache) => {
                if let Ok(guard) = cache.lock() {
                    match guard.get(url, &cache_key) {
                        Ok(Some(mut hit)) => {
                            hit.cached = true;
                            hit.ms = start.elapsed().as_millis() as u64;
                            return hit;
                        }
                        Ok(None) => {}
                        Err(e) => {
                            tracing::warn!(url, error = %e, "cache read failed, treating as a miss");
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "cache unavailable, treating as a miss");
            }
        }
    }

    let timeout_ms = opts.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS);

    let (raw_html, fetch_final_url, http_status, content_type) =
        match run_cancellable(lite::fetch_raw_html(url, timeout_ms), &opts.cancellation).await {
            Ok(fetched) => fetched,
            Err(e) => return error_result(url, &e, start),
        };

    if is_cancelled(&opts.cancellation) {
        return cancelled_result(url, start);
    }

    let detection = detector::detect_spa(&raw_html);
    let backend = match opts.force {
        Some(ForceBackend::Lite) => ForceBackend::Lite,
        Some(ForceBackend::Playwright) => ForceBackend::Playwright,
        None if detection.is_spa => ForceBackend::Playwright,
        None => ForceBackend::Lite,
    };

    let render_outcome = match backend {
        ForceBackend::Lite => render_lite_path(&raw_html, &fetch_final_url, http_status, &content_type),
        ForceBackend::Playwright => {
            let browser_opts = BrowserOptions {
                timeout_ms,
                ..BrowserOptions::default()
            };
            match run_cancellable(browser::render_browser(url, &browser_opts), &opts.cancellation).await {
                Ok(page) => Ok(page),
                Err(e) => {
                    tracing::debug!(url, error = %e, "browser render failed, falling back to the lite path");
                    render_lite_path(&raw_html, &fetch_final_url, http_status, &content_type)
                }
            }
        }
    };

    // Tag `lite-fallback` distinctly from a plain lite render when the
    // browser path failed and we fell back to the already-fetched HTML.
    let mut page = match render_outcome {
        Ok(page) => page,
        Err(e) => return error_result(url, &e, start),
    };
    if backend == ForceBackend::Playwright && page.backend_tag == BackendTag::Lite {
        page.backend_tag = BackendTag::LiteFallback;
    }

    if is_cancelled(&opts.cancellation) {
        return cancelled_result(url, start);
    }

    let chunk_limit = opts.chunk_limit.unwrap_or(DEFAULT_CHUNK_LIMIT);
    let all_chunks = chunker::chunk_page(&page, &ChunkOptions::default());
    let selected_chunks: Vec<Chunk> = match &opts.query {
        Some(query) => chunker::find_relevant(&all_chunks, query, chunk_limit),
        None => all_chunks.into_iter().take(chunk_limit).collect(),
    };
    let summary = render_summary(&selected_chunks, &page.text_content);

    let backend_tag = page.backend_tag;
    let mut result = RenderResult {
        url: page.url.clone(),
        backend: backend_tag.to_string(),
        detection: Some(detection),
        data: Some(page),
        chunks: selected_chunks,
        summary,
        ms: start.elapsed().as_millis() as u64,
        cached: false,
        error: None,
    };

    if !opts.no_cache {
        let configured_default_ttl_ms = shared_config().ok().and_then(|c| c.cache_ttl_ms);
        let ttl_ms = opts.cache_ttl_ms.or(configured_default_ttl_ms).unwrap_or(match backend_tag {
            BackendTag::Playwright => PLAYWRIGHT_TTL_MS,
            BackendTag::Lite | BackendTag::LiteFallback => LITE_TTL_MS,
        });
        match shared_cache() {
            Ok(cache) => {
                if let Ok(guard) = cache.lock() {
                    if let Err(e) = guard.set(url, &cache_key, &result, ttl_ms) {
                        tracing::warn!(url, error = %e, "cache write failed, continuing without caching this result");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "cache unavailable, continuing without caching this result");
            }
        }
    }

    result.ms = start.elapsed().as_millis() as u64;
    result
}

fn render_lite_path(
    raw_html: &str,
    final_url: &str,
    http_status: u16,
    content_type: &str,
) -> crate::error::Result<crate::page::PageRecord> {
    lite::extract_page_record(
        raw_html,
        final_url,
        http_status,
        content_type,
        5_000,
        BackendTag::Lite,
        None,
        true,
        false,
    )
}

/// Renders the selected chunks in the canonical textual summary form.
fn render_summary(chunks: &[Chunk], _text_content: &str) -> String {
    chunks
        .iter()
        .map(|chunk| {
            let section_part = chunk
                .section
                .as_deref()
                .map(|s| format!(" section=\"{s}\""))
                .unwrap_or_default();
            format!(
                "[chunk:{id}] type={t}{section_part} score={score}\n{text}",
                id = chunk.id,
                t = chunk.chunk_type,
                score = chunk.score,
                text = chunk.text,
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

fn error_result(url: &str, err: &Error, start: Instant) -> RenderResult {
    RenderResult {
        url: url.to_string(),
        backend: "error".to_string(),
        detection: None,
        data: None,
        chunks: vec![],
        summary: String::new(),
        ms: start.elapsed().as_millis() as u64,
        cached: false,
        error: Some(err.to_string()),
    }
}

fn cancelled_result(url: &str, start: Instant) -> RenderResult {
    error_result(url, &Error::Cancelled, start)
}

/// `cacheStats()`.
pub fn cache_stats() -> crate::error::Result<crate::page::CacheStats> {
    let cache = shared_cache()?;
    let guard = cache
        .lock()
        .map_err(|_| Error::CacheIo("cache lock poisoned".to_string()))?;
    guard.stats()
}

/// `invalidateCache(url)`.
pub fn invalidate_cache(url: &str) -> crate::error::Result<u64> {
    let cache = shared_cache()?;
    let guard = cache
        .lock()
        .map_err(|_| Error::CacheIo("cache lock poisoned".to_string()))?;
    guard.invalidate(url)
}

/// `detectSPA(html)`.
pub fn detect_spa(html: &str) -> DetectionReport {
    detector::detect_spa(html)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::ChunkType;
    use std::collections::HashMap;

    #[test]
    fn summary_renders_canonical_chunk_headers() {
        let chunks = vec![Chunk {
            id: 0,
            chunk_type: ChunkType::Summary,
            section: Some("Intro".to_string()),
            text: "hello world".to_string(),
            score: 10,
            meta: HashMap::new(),
            relevance: None,
        }];
        let summary = render_summary(&chunks, "");
        assert!(summary.starts_with("[chunk:0] type=summary section=\"Intro\" score=10\nhello world"));
    }

    #[test]
    fn multiple_chunks_are_separated_by_dashes() {
        let chunks = vec![
            Chunk {
                id: 0,
                chunk_type: ChunkType::Summary,
                section: None,
                text: "a".to_string(),
                score: 10,
                meta: HashMap::new(),
                relevance: None,
            },
            Chunk {
                id: 1,
                chunk_type: ChunkType::Paragraph,
                section: None,
                text: "b".to_string(),
                score: 2,
                meta: HashMap::new(),
                relevance: None,
            },
        ];
        let summary = render_summary(&chunks, "");
        assert!(summary.contains("\n\n---\n\n"));
    }

    #[tokio::test]
    async fn cancelled_call_before_fetch_returns_cancelled_error() {
        let token = CancellationToken::new();
        token.cancel();
        let opts = RenderOptions {
            cancellation: Some(token),
            no_cache: true,
            ..RenderOptions::default()
        };
        let result = render("https://example.com", &opts).await;
        assert_eq!(result.backend, "error");
        assert_eq!(result.error.as_deref(), Some("call was cancelled"));
    }

    #[test]
    fn detect_spa_is_exposed_from_orchestrator() {
        let report = detect_spa("<html><body><div id=\"root\"></div></body></html>");
        assert!(!report.reasons.is_empty());
    }

    #[tokio::test]
    async fn run_cancellable_aborts_a_future_already_in_flight() {
        let token = CancellationToken::new();
        let waiting_token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            waiting_token.cancel();
        });

        let in_flight = async {
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            Ok(())
        };
        let result = run_cancellable(in_flight, &Some(token)).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn run_cancellable_without_a_token_just_awaits() {
        let result = run_cancellable(async { Ok(42) }, &None).await;
        assert_eq!(result.unwrap(), 42);
    }
}

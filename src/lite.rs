//! The scriptless fetch-and-parse renderer.
//!
//! `extract_page_record` is pure (no I/O) so `browser.rs` can reuse it on
//! HTML captured from a live DOM instead of duplicating the field-extraction
//! rules.

use crate::error::{Error, Result};
use crate::html::{clean_fragment, decode_entities, parse_attributes, strip_tags, truncate_chars};
use crate::page::{BackendTag, Form, FormField, Heading, Image, Link, PageRecord, PageStats, Table};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

pub const LITE_USER_AGENT: &str = "AgentWeb/0.2 (AI Agent Renderer)";
const DEFAULT_TIMEOUT_MS: u64 = 15_000;
const LITE_TEXT_LIMIT: usize = 5_000;
const MAX_HEADING_CHARS: usize = 200;
const MAX_LINK_TEXT_CHARS: usize = 120;
const MAX_IMAGES: usize = 50;
const MAX_TABLES: usize = 10;
const MAX_SELECT_OPTIONS: usize = 20;

/// Options recognized by `render_lite`.
#[derive(Debug, Clone, Default)]
pub struct LiteOptions {
    pub timeout_ms: Option<u64>,
    pub pre_fetched_html: Option<String>,
}

static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());
static META_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<meta\b([^>]*)>").unwrap());
static HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<h([1-6])\b[^>]*>(.*?)</h[1-6]>").unwrap());
static LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<a\s+([^>]*\bhref\s*=\s*(?:"[^"]*"|'[^']*')[^>]*)>(.*?)</a>"#).unwrap()
});
static FORM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<form\b([^>]*)>(.*?)</form>").unwrap());
static INPUT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<input\b([^>]*)/?>").unwrap());
static TEXTAREA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<textarea\b([^>]*)>(.*?)</textarea>").unwrap());
static SELECT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<select\b([^>]*)>(.*?)</select>").unwrap());
static OPTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<option\b[^>]*>(.*?)</option>").unwrap());
static IMG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<img\b([^>]*)/?>").unwrap());
static TABLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<table\b[^>]*>(.*?)</table>").unwrap());
static ROW_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr>").unwrap());
static CELL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<t[dh]\b[^>]*>(.*?)</t[dh]>").unwrap());
static MAIN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<main\b[^>]*>(.*?)</main>").unwrap());
static ARTICLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<article\b[^>]*>(.*?)</article>").unwrap());
static CONTENT_DIV_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<div\b[^>]*\b(?:class|id)\s*=\s*["'][^"']*(?:content|main|article)[^"']*["'][^>]*>(.*?)</div>"#)
        .unwrap()
});
static BODY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<body\b[^>]*>(.*?)</body>").unwrap());
static NOISE_BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style|nav|footer|header)\b[^>]*>.*?</\1>").unwrap()
});

/// Fetches raw HTML with the lite path's headers and deadline.
///
/// Returns `(html, final_url, http_status, content_type)`. Non-2xx responses
/// are a `FetchStatus` error, not a successful result.
pub async fn fetch_raw_html(
    url: &str,
    timeout_ms: u64,
) -> Result<(String, String, u16, String)> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .build()
        .map_err(|e| Error::FetchFailure(e.to_string()))?;

    let response = client
        .get(url)
        .header("User-Agent", LITE_USER_AGENT)
        .header("Accept", "text/html,application/xhtml+xml")
        .header("Accept-Language", "en-US,en;q=0.9")
        .send()
        .await
        .map_err(Error::from)?;

    let status = response.status();
    let final_url = response.url().to_string();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if !status.is_success() {
        return Err(Error::FetchStatus {
            status: status.as_u16(),
        });
    }

    let html = response.text().await.map_err(Error::from)?;
    Ok((html, final_url, status.as_u16(), content_type))
}

/// `renderLite(url, opts) -> PageRecord` per the lite renderer contract.
pub async fn render_lite(url: &str, opts: &LiteOptions) -> Result<PageRecord> {
    let (html, final_url, status, content_type) = match &opts.pre_fetched_html {
        Some(html) => (html.clone(), url.to_string(), 200, String::new()),
        None => {
            let timeout_ms = opts.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS);
            fetch_raw_html(url, timeout_ms).await?
        }
    };

    extract_page_record(
        &html,
        &final_url,
        status,
        &content_type,
        LITE_TEXT_LIMIT,
        BackendTag::Lite,
        None,
        true,
        false,
    )
}

/// Pure extraction of a `PageRecord` from already-fetched HTML.
///
/// `link_limit` caps the link list (the browser path caps at 100; the lite
/// path is uncapped but deduped). `dedupe_links` controls whether duplicate
/// hrefs are suppressed (lite: yes; browser: no, live DOM order carries
/// meaning). `preserve_meta_name_case` controls whether `<meta name=...>` keys
/// keep their original case (browser path) or are lowercased (lite path);
/// `property=` keys are always kept in their original case either way.
pub fn extract_page_record(
    html: &str,
    final_url: &str,
    http_status: u16,
    content_type: &str,
    text_limit: usize,
    backend_tag: BackendTag,
    link_limit: Option<usize>,
    dedupe_links: bool,
    preserve_meta_name_case: bool,
) -> Result<PageRecord> {
    let base = Url::parse(final_url).map_err(Error::from)?;

    let title = extract_title(html);
    let meta = extract_meta(html, preserve_meta_name_case);
    let headings = extract_headings(html);
    let links = extract_links(html, &base, link_limit, dedupe_links);
    let forms = extract_forms(html);
    let images = extract_images(html, &base);
    let tables = extract_tables(html);
    let text_content = truncate_chars(&extract_main_text(html), text_limit);

    let mut page = PageRecord {
        url: final_url.to_string(),
        title,
        meta,
        headings,
        links,
        forms,
        images,
        tables,
        text_content,
        stats: PageStats::default(),
        http_status,
        content_type: content_type.to_string(),
        backend_tag,
    };
    page.refresh_stats();
    Ok(page)
}

fn extract_title(html: &str) -> String {
    TITLE_RE
        .captures(html)
        .map(|c| clean_fragment(&c[1]))
        .unwrap_or_default()
}

fn extract_meta(html: &str, preserve_name_case: bool) -> HashMap<String, String> {
    let mut meta = HashMap::new();
    for caps in META_RE.captures_iter(html) {
        let attrs = parse_attributes(&caps[1]);
        let Some(content) = attrs.get("content") else {
            continue;
        };
        if let Some(name) = find_original_case_name(&caps[1]) {
            let key = if preserve_name_case { name } else { name.to_ascii_lowercase() };
            meta.insert(key, content.clone());
        } else if let Some(property) = find_original_case_property(&caps[1]) {
            meta.insert(property, content.clone());
        }
    }
    meta
}

/// `name=` keys as they literally appear in the markup, before any
/// case-folding the caller may apply.
fn find_original_case_name(attr_str: &str) -> Option<String> {
    static NAME_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r#"(?is)\bname\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap());
    let caps = NAME_RE.captures(attr_str)?;
    Some(
        caps.get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default(),
    )
}

/// `property=` keys are preserved in their original case, unlike `name=`.
fn find_original_case_property(attr_str: &str) -> Option<String> {
    static PROPERTY_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r#"(?is)\bproperty\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap()
    });
    let caps = PROPERTY_RE.captures(attr_str)?;
    Some(
        caps.get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default(),
    )
}

fn extract_headings(html: &str) -> Vec<Heading> {
    HEADING_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let level: u8 = caps[1].parse().ok()?;
            let text = truncate_chars(&clean_fragment(&caps[2]), MAX_HEADING_CHARS);
            if text.is_empty() {
                None
            } else {
                Some(Heading { level, text })
            }
        })
        .collect()
}

fn extract_links(html: &str, base: &Url, limit: Option<usize>, dedupe: bool) -> Vec<Link> {
    static HREF_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r#"(?is)href\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap());

    let mut seen = std::collections::HashSet::new();
    let mut links = Vec::new();

    for caps in LINK_RE.captures_iter(html) {
        let Some(href_caps) = HREF_RE.captures(&caps[1]) else {
            continue;
        };
        let href = href_caps
            .get(1)
            .or_else(|| href_caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();

        if href.is_empty() || href.starts_with("javascript:") || href.starts_with('#') {
            continue;
        }

        let absolute = match base.join(href) {
            Ok(u) => u.to_string(),
            Err(_) => continue,
        };

        let text = truncate_chars(&clean_fragment(&caps[2]), MAX_LINK_TEXT_CHARS);
        if text.is_empty() {
            continue;
        }

        if dedupe && !seen.insert(absolute.clone()) {
            continue;
        }

        links.push(Link {
            text,
            href: absolute,
        });

        if let Some(limit) = limit {
            if links.len() >= limit {
                break;
            }
        }
    }

    links
}

fn extract_forms(html: &str) -> Vec<Form> {
    FORM_RE
        .captures_iter(html)
        .map(|caps| {
            let attrs = parse_attributes(&caps[1]);
            let body = &caps[2];
            Form {
                action: attrs.get("action").cloned().unwrap_or_default(),
                method: attrs
                    .get("method")
                    .map(|m| m.to_ascii_uppercase())
                    .unwrap_or_else(|| "GET".to_string()),
                fields: extract_fields(body),
            }
        })
        .collect()
}

fn extract_fields(form_body: &str) -> Vec<FormField> {
    let mut fields = Vec::new();

    for caps in INPUT_RE.captures_iter(form_body) {
        let attrs = parse_attributes(&caps[1]);
        let input_type = attrs
            .get("type")
            .cloned()
            .unwrap_or_else(|| "text".to_string());
        if input_type.eq_ignore_ascii_case("hidden") {
            continue;
        }
        fields.push(FormField::Input {
            input_type,
            name: attrs.get("name").cloned().unwrap_or_default(),
            placeholder: attrs.get("placeholder").cloned().unwrap_or_default(),
            required: attrs.contains_key("required"),
        });
    }

    for caps in TEXTAREA_RE.captures_iter(form_body) {
        let attrs = parse_attributes(&caps[1]);
        fields.push(FormField::Textarea {
            name: attrs.get("name").cloned().unwrap_or_default(),
            placeholder: attrs.get("placeholder").cloned().unwrap_or_default(),
            required: attrs.contains_key("required"),
        });
    }

    for caps in SELECT_RE.captures_iter(form_body) {
        let attrs = parse_attributes(&caps[1]);
        let options = OPTION_RE
            .captures_iter(&caps[2])
            .map(|c| clean_fragment(&c[1]))
            .take(MAX_SELECT_OPTIONS)
            .collect();
        fields.push(FormField::Select {
            name: attrs.get("name").cloned().unwrap_or_default(),
            options,
        });
    }

    fields
}

fn extract_images(html: &str, base: &Url) -> Vec<Image> {
    IMG_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let attrs = parse_attributes(&caps[1]);
            let src = attrs.get("src")?;
            let absolute = base.join(src).ok()?.to_string();
            Some(Image {
                src: absolute,
                alt: attrs.get("alt").cloned().unwrap_or_default(),
                width: attrs.get("width").cloned(),
                height: attrs.get("height").cloned(),
            })
        })
        .take(MAX_IMAGES)
        .collect()
}

fn extract_tables(html: &str) -> Vec<Table> {
    TABLE_RE
        .captures_iter(html)
        .take(MAX_TABLES)
        .map(|table_caps| {
            ROW_RE
                .captures_iter(&table_caps[1])
                .map(|row_caps| {
                    CELL_RE
                        .captures_iter(&row_caps[1])
                        .map(|cell_caps| clean_fragment(&cell_caps[1]))
                        .collect::<Vec<_>>()
                })
                .filter(|row: &Vec<String>| !row.is_empty())
                .collect::<Table>()
        })
        .collect()
}

static BLOCK_CLOSE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)</(p|div|li|h[1-6]|blockquote|tr)\s*>").unwrap()
});
static BR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<br\s*/?>").unwrap());
static LIST_ITEM_OPEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<li\b[^>]*>").unwrap());
static BLANK_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Main-content selection: `<main>`, then `<article>`, then a content-ish
/// `<div>`, else the body with noise blocks stripped. Block-level closing
/// tags become blank lines and `<li>` becomes a `"\u{2022} "` marker so the
/// chunker can split on paragraph boundaries and recognize list items from
/// plain text alone, per the chunker's paragraph/type-detector rules.
fn extract_main_text(html: &str) -> String {
    let fragment = MAIN_RE
        .captures(html)
        .or_else(|| ARTICLE_RE.captures(html))
        .or_else(|| CONTENT_DIV_RE.captures(html))
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| {
            let body = BODY_RE
                .captures(html)
                .map(|c| c[1].to_string())
                .unwrap_or_else(|| html.to_string());
            NOISE_BLOCK_RE.replace_all(&body, "").into_owned()
        });

    let with_bullets = LIST_ITEM_OPEN_RE.replace_all(&fragment, "\u{2022} ");
    let with_breaks = BR_RE.replace_all(&with_bullets, "\n");
    let with_paragraph_breaks = BLOCK_CLOSE_RE.replace_all(&with_breaks, "\n\n");
    let stripped = strip_tags_preserving_newlines(&with_paragraph_breaks);
    let decoded = decode_entities(&stripped).into_owned();
    BLANK_RUN_RE.replace_all(&decoded, "\n\n").trim().to_string()
}

/// Like `strip_tags` but keeps the paragraph-boundary newlines inserted
/// above instead of collapsing all whitespace to single spaces.
fn strip_tags_preserving_newlines(input: &str) -> String {
    let without_tags = crate::html::TAG_RE.replace_all(input, "");
    without_tags
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
}

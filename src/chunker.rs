//! Decomposes a `PageRecord` into scored, typed chunks and supports
//! keyword-weighted retrieval against a query.
//!
//! Paragraph overflow handling (splitting an oversized paragraph on sentence
//! boundaries while keeping runs under `max_chunk_size`) reuses the
//! teacher's `find_good_split_point`/`SENTENCE_SPLIT_REGEX` strategy; the
//! chunk shape, generation order, and scoring rules are new.

use crate::page::{Chunk, ChunkType, PageRecord};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

const DEFAULT_MAX_CHUNK_SIZE: usize = 800;
const DEFAULT_MIN_SCORE: i32 = -1;

/// Options recognized by `chunk_page`.
#[derive(Debug, Clone)]
pub struct ChunkOptions {
    pub max_chunk_size: usize,
    pub min_score: i32,
    pub include_nav: bool,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            min_score: DEFAULT_MIN_SCORE,
            include_nav: false,
        }
    }
}

static BLANK_LINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());
static SENTENCE_BOUNDARY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]\s+(?=[A-Z])").unwrap());
static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://").unwrap());
static NAV_WORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(home|menu|search|login|sign in|sign up|subscribe|newsletter|cookie|privacy|terms)")
        .unwrap()
});
static SKIP_PREFIX_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(home|menu|back|next|prev|more|see all)").unwrap());
static COPYRIGHT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)copyright|all rights reserved|powered by").unwrap());
static CODE_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"`|```|\bconst\b|\bfunction\b|\bimport\b").unwrap());
static HOWTO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)how to|step|guide|tutorial|example|note:|warning:|important:").unwrap());
static CALLOUT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(note|warning|tip|important|caution|info):").unwrap());
static CODE_START_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(```|~~~|\$ |> )").unwrap());

/// `chunkPage(page, opts) -> ordered sequence of Chunk`, sorted by `score`
/// descending.
pub fn chunk_page(page: &PageRecord, opts: &ChunkOptions) -> Vec<Chunk> {
    let mut id = 0u32;
    let mut chunks = Vec::new();

    chunks.push(build_summary_chunk(page, &mut id));

    if !page.headings.is_empty() {
        chunks.push(build_toc_chunk(page, &mut id));
    }

    chunks.extend(build_paragraph_chunks(page, opts, &mut id));
    chunks.extend(build_form_chunks(page, &mut id));

    if let Some(links_chunk) = build_links_chunk(page, &mut id) {
        chunks.push(links_chunk);
    }

    let mut chunks: Vec<Chunk> = chunks
        .into_iter()
        .filter(|c| c.score >= opts.min_score)
        .collect();
    chunks.sort_by(|a, b| b.score.cmp(&a.score));
    chunks
}

fn next_id(id: &mut u32) -> u32 {
    let value = *id;
    *id += 1;
    value
}

fn build_summary_chunk(page: &PageRecord, id: &mut u32) -> Chunk {
    let description = page
        .meta
        .get("description")
        .cloned()
        .unwrap_or_default();
    let text = format!(
        "{title}\n{description}\n{url}\nheadings={h} links={l} forms={f} images={i} tables={t} text_length={len}",
        title = page.title,
        description = description,
        url = page.url,
        h = page.stats.heading_count,
        l = page.stats.link_count,
        f = page.stats.form_count,
        i = page.stats.image_count,
        t = page.stats.table_count,
        len = page.stats.text_length,
    );
    Chunk {
        id: next_id(id),
        chunk_type: ChunkType::Summary,
        section: None,
        text,
        score: 10,
        meta: HashMap::new(),
        relevance: None,
    }
}

fn build_toc_chunk(page: &PageRecord, id: &mut u32) -> Chunk {
    let text = page
        .headings
        .iter()
        .map(|h| format!("{}{}", "  ".repeat((h.level - 1) as usize), h.text))
        .collect::<Vec<_>>()
        .join("\n");
    Chunk {
        id: next_id(id),
        chunk_type: ChunkType::Toc,
        section: None,
        text,
        score: 5,
        meta: HashMap::new(),
        relevance: None,
    }
}

fn build_paragraph_chunks(page: &PageRecord, opts: &ChunkOptions, id: &mut u32) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut current_section: Option<String> = None;

    for raw_paragraph in BLANK_LINE_RE.split(&page.text_content) {
        let paragraph = raw_paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        if let Some(heading) = matching_heading(page, paragraph) {
            current_section = Some(heading);
            continue;
        }

        let word_count = paragraph.split_whitespace().count().max(1);
        let link_density = URL_RE.find_iter(paragraph).count() as f64 / word_count as f64;

        if !opts.include_nav && link_density > 0.5 {
            continue;
        }

        let score = score_paragraph(paragraph, link_density, current_section.is_some());
        let chunk_type = detect_type(paragraph, None);

        if paragraph.len() <= opts.max_chunk_size {
            chunks.push(Chunk {
                id: next_id(id),
                chunk_type,
                section: current_section.clone(),
                text: paragraph.to_string(),
                score,
                meta: HashMap::new(),
                relevance: None,
            });
        } else {
            for (part_index, part) in split_oversized(paragraph, opts.max_chunk_size)
                .into_iter()
                .enumerate()
            {
                let mut meta = HashMap::new();
                meta.insert("partial".to_string(), "true".to_string());
                meta.insert("part".to_string(), part_index.to_string());
                chunks.push(Chunk {
                    id: next_id(id),
                    chunk_type: detect_type(&part, None),
                    section: current_section.clone(),
                    text: part,
                    score,
                    meta,
                    relevance: None,
                });
            }
        }
    }

    chunks
}

/// True iff `paragraph` equals or is a prefix of one of the page's heading
/// texts — the chunker treats this as "the TOC already carries it" and
/// updates the current section rather than emitting a chunk.
fn matching_heading(page: &PageRecord, paragraph: &str) -> Option<String> {
    page.headings
        .iter()
        .find(|h| h.text == paragraph || h.text.starts_with(paragraph))
        .map(|h| h.text.clone())
}

fn score_paragraph(text: &str, link_density: f64, under_heading: bool) -> i32 {
    let mut score = 0;
    let len = text.len();

    if (50..=500).contains(&len) {
        score += 2;
    } else if len > 500 && len <= 2000 {
        score += 1;
    }
    if len < 20 {
        score -= 2;
    }

    if text.chars().any(|c| c.is_ascii_digit()) {
        score += 1;
    }
    if CODE_MARKER_RE.is_match(text) {
        score += 2;
    }
    if NAV_WORD_RE.is_match(text) {
        score -= 3;
    }
    if COPYRIGHT_RE.is_match(text) {
        score -= 2;
    }
    if link_density > 0.7 {
        score -= 2;
    }
    if under_heading {
        score += 1;
    }
    if HOWTO_RE.is_match(text) {
        score += 2;
    }

    score
}

/// Tag hints a caller can supply when the source element is known; the
/// paragraph-splitting loop above always passes `None` since `text_content`
/// no longer carries tag identity by the time it reaches the chunker.
#[derive(Debug, Clone, Copy)]
pub enum TagHint {
    Heading(u8),
    ListItem,
    TableCell,
}

fn detect_type(text: &str, tag_hint: Option<TagHint>) -> ChunkType {
    if matches!(tag_hint, Some(TagHint::Heading(_))) {
        return ChunkType::Heading;
    }
    if matches!(tag_hint, Some(TagHint::TableCell)) {
        return ChunkType::TableCell;
    }
    if CODE_START_RE.is_match(text) {
        return ChunkType::Code;
    }
    if matches!(tag_hint, Some(TagHint::ListItem))
        || text.starts_with('\u{2022}')
        || text.starts_with('-')
        || text.starts_with('*')
    {
        return ChunkType::ListItem;
    }
    if CALLOUT_RE.is_match(text) {
        return ChunkType::Callout;
    }
    if text.len() < 50 && !text.contains('\n') {
        return ChunkType::Label;
    }
    let word_count = text.split_whitespace().count();
    if URL_RE.is_match(text) && word_count < 5 {
        return ChunkType::Link;
    }
    ChunkType::Paragraph
}

/// Splits an oversized paragraph on sentence boundaries, keeping sentences
/// of at least 10 chars and grouping consecutive sentences while they stay
/// under `max_chunk_size`.
fn split_oversized(text: &str, max_chunk_size: usize) -> Vec<String> {
    let sentences: Vec<&str> = SENTENCE_BOUNDARY_RE
        .split(text)
        .filter(|s| s.trim().len() >= 10)
        .collect();

    if sentences.is_empty() {
        return text
            .as_bytes()
            .chunks(max_chunk_size)
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect();
    }

    let mut parts = Vec::new();
    let mut current = String::new();

    for sentence in sentences {
        let candidate_len = current.len() + sentence.len() + 1;
        if !current.is_empty() && candidate_len > max_chunk_size {
            parts.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(sentence.trim());
    }
    if !current.is_empty() {
        parts.push(current);
    }

    parts
}

fn build_form_chunks(page: &PageRecord, id: &mut u32) -> Vec<Chunk> {
    page.forms
        .iter()
        .map(|form| {
            let field_lines: Vec<String> = form
                .fields
                .iter()
                .map(|field| match field {
                    crate::page::FormField::Input {
                        input_type, name, ..
                    } => format!("input[{input_type}] {name}"),
                    crate::page::FormField::Textarea { name, .. } => {
                        format!("textarea {name}")
                    }
                    crate::page::FormField::Select { name, options } => {
                        format!("select {name} ({} options)", options.len())
                    }
                })
                .collect();

            let text = format!(
                "method={method} action={action}\n{fields}",
                method = form.method,
                action = form.action,
                fields = field_lines.join("\n"),
            );

            Chunk {
                id: next_id(id),
                chunk_type: ChunkType::Form,
                section: None,
                text,
                score: 7,
                meta: HashMap::new(),
                relevance: None,
            }
        })
        .collect()
}

fn build_links_chunk(page: &PageRecord, id: &mut u32) -> Option<Chunk> {
    let notable: Vec<&crate::page::Link> = page
        .links
        .iter()
        .filter(|link| {
            let len = link.text.len();
            (4..=79).contains(&len) && !SKIP_PREFIX_LINK_RE.is_match(&link.text)
        })
        .take(20)
        .collect();

    if notable.is_empty() {
        return None;
    }

    let text = notable
        .iter()
        .map(|l| format!("{} -> {}", l.text, l.href))
        .collect::<Vec<_>>()
        .join("\n");

    Some(Chunk {
        id: next_id(id),
        chunk_type: ChunkType::Links,
        section: None,
        text,
        score: 3,
        meta: HashMap::new(),
        relevance: None,
    })
}

/// `findRelevant(chunks, query, limit) -> chunks`, sorted by `relevance`
/// descending.
pub fn find_relevant(chunks: &[Chunk], query: &str, limit: usize) -> Vec<Chunk> {
    let tokens: Vec<String> = query
        .split_whitespace()
        .filter(|t| t.len() > 2)
        .map(|t| t.to_ascii_lowercase())
        .collect();

    let mut ranked: Vec<Chunk> = chunks
        .iter()
        .map(|chunk| {
            let mut ranked_chunk = chunk.clone();
            let lower_text = chunk.text.to_ascii_lowercase();
            let occurrences: usize = tokens
                .iter()
                .map(|token| lower_text.matches(token.as_str()).count())
                .sum();
            ranked_chunk.relevance = Some(chunk.score + 2 * occurrences as i32);
            ranked_chunk
        })
        .collect();

    ranked.sort_by(|a, b| b.relevance.cmp(&a.relevance));
    ranked.truncate(limit);
    ranked
}

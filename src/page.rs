//! The normalized page record and the types derived from it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One `hN` heading with its stripped text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

/// One absolutized, deduplicated outbound link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub text: String,
    pub href: String,
}

/// One form field, tagged by its HTML element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FormField {
    Input {
        #[serde(rename = "type")]
        input_type: String,
        name: String,
        placeholder: String,
        required: bool,
    },
    Textarea {
        name: String,
        placeholder: String,
        required: bool,
    },
    Select {
        name: String,
        options: Vec<String>,
    },
}

/// One `<form>` element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Form {
    pub action: String,
    pub method: String,
    pub fields: Vec<FormField>,
}

/// One `<img>` element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub src: String,
    pub alt: String,
    pub width: Option<String>,
    pub height: Option<String>,
}

/// One `<table>`, as an ordered sequence of row-arrays of cell strings.
pub type Table = Vec<Vec<String>>;

/// Counts mirroring the lengths of the corresponding `PageRecord` arrays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageStats {
    pub heading_count: usize,
    pub link_count: usize,
    pub form_count: usize,
    pub image_count: usize,
    pub table_count: usize,
    pub text_length: usize,
}

/// Which renderer produced a `PageRecord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendTag {
    Lite,
    Playwright,
    LiteFallback,
}

impl BackendTag {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendTag::Lite => "lite",
            BackendTag::Playwright => "playwright",
            BackendTag::LiteFallback => "lite-fallback",
        }
    }
}

impl std::fmt::Display for BackendTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The normalized representation of one rendered page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub url: String,
    pub title: String,
    pub meta: HashMap<String, String>,
    pub headings: Vec<Heading>,
    pub links: Vec<Link>,
    pub forms: Vec<Form>,
    pub images: Vec<Image>,
    pub tables: Vec<Table>,
    pub text_content: String,
    pub stats: PageStats,
    pub http_status: u16,
    pub content_type: String,
    pub backend_tag: BackendTag,
}

impl PageRecord {
    /// Recomputes `stats` from the current array lengths. Call after any
    /// mutation of `headings`/`links`/`forms`/`images`/`tables`/`text_content`
    /// to keep the invariant `stats.N == len(N)` from drifting.
    pub fn refresh_stats(&mut self) {
        self.stats = PageStats {
            heading_count: self.headings.len(),
            link_count: self.links.len(),
            form_count: self.forms.len(),
            image_count: self.images.len(),
            table_count: self.tables.len(),
            text_length: self.text_content.len(),
        };
    }
}

/// Confidence band attached to a `DetectionReport`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// The SPA detector's verdict for one raw HTML document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub is_spa: bool,
    pub score: i32,
    pub confidence: Confidence,
    pub reasons: Vec<String>,
}

/// The type of one semantic chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChunkType {
    Summary,
    Toc,
    Paragraph,
    Heading,
    ListItem,
    Callout,
    TableCell,
    Label,
    Link,
    Code,
    Form,
    Links,
}

impl ChunkType {
    pub fn as_str(self) -> &'static str {
        match self {
            ChunkType::Summary => "summary",
            ChunkType::Toc => "toc",
            ChunkType::Paragraph => "paragraph",
            ChunkType::Heading => "heading",
            ChunkType::ListItem => "list-item",
            ChunkType::Callout => "callout",
            ChunkType::TableCell => "table-cell",
            ChunkType::Label => "label",
            ChunkType::Link => "link",
            ChunkType::Code => "code",
            ChunkType::Form => "form",
            ChunkType::Links => "links",
        }
    }
}

impl std::fmt::Display for ChunkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scored, typed fragment derived from a `PageRecord`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: u32,
    #[serde(rename = "type")]
    pub chunk_type: ChunkType,
    pub section: Option<String>,
    pub text: String,
    pub score: i32,
    pub meta: HashMap<String, String>,
    /// Populated only by query-ranking (`find_relevant`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance: Option<i32>,
}

/// The orchestrator's top-level output for one render call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderResult {
    pub url: String,
    pub backend: String,
    pub detection: Option<DetectionReport>,
    pub data: Option<PageRecord>,
    pub chunks: Vec<Chunk>,
    pub summary: String,
    pub ms: u64,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate cache statistics returned by `Cache::stats`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: u64,
    pub expired: u64,
    pub active: u64,
    pub backends: HashMap<String, u64>,
    pub oldest_ms: Option<u64>,
    pub top_hits: Vec<CacheEntrySummary>,
}

/// A row summary used for `CacheStats::top_hits`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntrySummary {
    pub url: String,
    pub query: String,
    pub hit_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> PageRecord {
        PageRecord {
            url: "https://example.com".into(),
            title: "Example".into(),
            meta: HashMap::new(),
            headings: vec![Heading { level: 1, text: "Hi".into() }],
            links: vec![],
            forms: vec![],
            images: vec![],
            tables: vec![],
            text_content: "hello world".into(),
            stats: PageStats::default(),
            http_status: 200,
            content_type: "text/html".into(),
            backend_tag: BackendTag::Lite,
        }
    }

    #[test]
    fn refresh_stats_matches_array_lengths() {
        let mut page = sample_record();
        page.refresh_stats();
        assert_eq!(page.stats.heading_count, page.headings.len());
        assert_eq!(page.stats.text_length, page.text_content.len());
    }

    #[test]
    fn backend_tag_round_trips_through_display() {
        assert_eq!(BackendTag::LiteFallback.to_string(), "lite-fallback");
    }
}

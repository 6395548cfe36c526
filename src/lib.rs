//! Turns a URL into a structured, agent-friendly page representation:
//! fetch, detect whether a headless browser is needed, render, chunk, and
//! cache the result.
//!
//! [`render`] is the one entry point most callers need; the module-level
//! functions it composes (`lite::render_lite`, `browser::render_browser`,
//! `detector::detect_spa`, `chunker::chunk_page`) are public for callers who
//! want a single stage instead of the full pipeline.

pub mod browser;
pub mod cache;
pub mod chunker;
pub mod config;
pub mod detector;
pub mod error;
pub mod html;
pub mod lite;
pub mod logging;
pub mod orchestrator;
pub mod page;

pub use error::{Error, Result};
pub use orchestrator::{cache_stats, detect_spa, invalidate_cache, render, ForceBackend, RenderOptions};
pub use page::{
    BackendTag, Chunk, ChunkType, Confidence, DetectionReport, Form, FormField, Heading, Image,
    Link, PageRecord, PageStats, RenderResult, Table,
};

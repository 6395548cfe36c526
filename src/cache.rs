//! A durable `(url, query) -> RenderResult` store with TTL, LRU eviction,
//! and stats — the `page_cache` table per the persisted-state layout.

use crate::error::{Error, Result};
use crate::page::{CacheEntrySummary, CacheStats, RenderResult};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS page_cache (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    query TEXT NOT NULL DEFAULT '',
    backend TEXT NOT NULL,
    result_json TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL,
    hit_count INTEGER NOT NULL DEFAULT 0,
    last_hit INTEGER NOT NULL DEFAULT 0,
    UNIQUE(url, query)
);
CREATE INDEX IF NOT EXISTS idx_page_cache_expires_at ON page_cache(expires_at);
CREATE INDEX IF NOT EXISTS idx_page_cache_last_hit ON page_cache(last_hit);
";

const DEFAULT_MAX_ENTRIES: u64 = 500;
const NON_SERIALIZABLE_DEPTH_CAP: usize = 10;

/// Configuration accepted by `Cache::open`.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub db_path: PathBuf,
    pub max_entries: u64,
    pub verbose: bool,
}

/// The embedded relational cache described by the result cache contract.
///
/// Safe to open from a single process; cross-process concurrency is not
/// guaranteed (matches the host-process ownership model in the concurrency
/// design).
pub struct Cache {
    conn: Connection,
    max_entries: u64,
}

impl Cache {
    /// Opens (creating if absent) the cache database at `config.db_path`,
    /// creating parent directories as needed.
    pub fn open(config: &CacheConfig) -> Result<Self> {
        if let Some(parent) = config.db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| Error::CacheIo(e.to_string()))?;
            }
        }

        let conn = Connection::open(&config.db_path)?;
        Self::init_connection(&conn)?;

        Ok(Self {
            conn,
            max_entries: config.max_entries,
        })
    }

    /// Opens an in-memory cache. Used by tests and by callers that want a
    /// disposable cache for a single process lifetime.
    pub fn in_memory(max_entries: u64) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(&conn)?;
        Ok(Self { conn, max_entries })
    }

    fn init_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let _: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    /// `get(url, query) -> RenderResult | null`. Deletes and misses on an
    /// expired row instead of returning stale data; otherwise atomically
    /// bumps `hit_count`/`last_hit`.
    pub fn get(&self, url: &str, query: &str) -> Result<Option<RenderResult>> {
        let now = now_ms();

        let row: Option<(i64, i64, String)> = self
            .conn
            .query_row(
                "SELECT id, expires_at, result_json FROM page_cache WHERE url = ?1 AND query = ?2",
                params![url, query],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((id, expires_at, result_json)) = row else {
            return Ok(None);
        };

        if expires_at < now as i64 {
            self.conn
                .execute("DELETE FROM page_cache WHERE id = ?1", params![id])?;
            return Ok(None);
        }

        self.conn.execute(
            "UPDATE page_cache SET hit_count = hit_count + 1, last_hit = ?1 WHERE id = ?2",
            params![now as i64, id],
        )?;

        // A corrupted row is treated as a miss, not an error; it's left in
        // place rather than deleted, since a concurrent writer may be mid-set.
        match serde_json::from_str::<RenderResult>(&result_json) {
            Ok(result) => Ok(Some(result)),
            Err(_) => Ok(None),
        }
    }

    /// `set(url, query, result, ttlMs)`. Upserts on `(url, query)`, resets
    /// hit bookkeeping, then triggers eviction.
    pub fn set(&self, url: &str, query: &str, result: &RenderResult, ttl_ms: u64) -> Result<()> {
        let now = now_ms();
        let expires_at = now + ttl_ms;
        let stripped = strip_non_serializable(serde_json::to_value(result)?);
        let result_json = serde_json::to_string(&stripped)?;

        self.conn.execute(
            "INSERT INTO page_cache (url, query, backend, result_json, created_at, expires_at, hit_count, last_hit)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?5)
             ON CONFLICT(url, query) DO UPDATE SET
                backend = excluded.backend,
                result_json = excluded.result_json,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at,
                hit_count = 0,
                last_hit = excluded.last_hit",
            params![url, query, result.backend, result_json, now as i64, expires_at as i64],
        )?;

        self.evict()?;
        Ok(())
    }

    /// `invalidate(url) -> count`. Deletes every cached query variant for
    /// `url`.
    pub fn invalidate(&self, url: &str) -> Result<u64> {
        let count = self
            .conn
            .execute("DELETE FROM page_cache WHERE url = ?1", params![url])?;
        Ok(count as u64)
    }

    /// `purgeExpired() -> count`.
    pub fn purge_expired(&self) -> Result<u64> {
        let now = now_ms();
        let count = self.conn.execute(
            "DELETE FROM page_cache WHERE expires_at < ?1",
            params![now as i64],
        )?;
        Ok(count as u64)
    }

    /// `stats() -> CacheStats`.
    pub fn stats(&self) -> Result<CacheStats> {
        let now = now_ms();

        let entries: u64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM page_cache", [], |row| row.get(0))?;
        let expired: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM page_cache WHERE expires_at < ?1",
            params![now as i64],
            |row| row.get(0),
        )?;
        let oldest_ms: Option<i64> = self.conn.query_row(
            "SELECT MIN(created_at) FROM page_cache",
            [],
            |row| row.get::<_, Option<i64>>(0),
        )?;

        let mut backends: HashMap<String, u64> = HashMap::new();
        {
            let mut stmt = self
                .conn
                .prepare("SELECT backend, COUNT(*) FROM page_cache GROUP BY backend")?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let backend: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                backends.insert(backend, count as u64);
            }
        }

        let mut top_hits = Vec::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT url, query, hit_count FROM page_cache ORDER BY hit_count DESC LIMIT 5",
            )?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                top_hits.push(CacheEntrySummary {
                    url: row.get(0)?,
                    query: row.get(1)?,
                    hit_count: {
                        let count: i64 = row.get(2)?;
                        count as u64
                    },
                });
            }
        }

        Ok(CacheStats {
            entries,
            expired,
            active: entries.saturating_sub(expired),
            backends,
            oldest_ms: oldest_ms.map(|v| v as u64),
            top_hits,
        })
    }

    /// `close()`. Idempotent: dropping an already-closed `Cache` is a no-op
    /// since `Connection`'s own `Drop` handles the underlying handle.
    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, e)| Error::CacheIo(e.to_string()))
    }

    /// Deletes `count - max_entries` rows, expired rows first, then
    /// ascending `last_hit`, whenever the table exceeds `max_entries`.
    fn evict(&self) -> Result<()> {
        let entries: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM page_cache", [], |row| row.get(0))?;

        if (entries as u64) <= self.max_entries {
            return Ok(());
        }

        let excess = entries as u64 - self.max_entries;
        self.conn.execute(
            "DELETE FROM page_cache WHERE id IN (
                SELECT id FROM page_cache
                ORDER BY (expires_at < ?1) DESC, last_hit ASC
                LIMIT ?2
            )",
            params![now_ms() as i64, excess as i64],
        )?;
        Ok(())
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_millis() as u64
}

/// Recursively strips any object tagged as a non-serializable live handle
/// from a `serde_json::Value`, capped at `NON_SERIALIZABLE_DEPTH_CAP` levels
/// deep. `PageRecord` as modeled in this crate contains only owned,
/// `Serialize`-safe data, so this is a no-op today; it guards against a
/// future field that isn't.
fn strip_non_serializable(value: serde_json::Value) -> serde_json::Value {
    strip_at_depth(value, 0)
}

fn strip_at_depth(value: serde_json::Value, depth: usize) -> serde_json::Value {
    if depth >= NON_SERIALIZABLE_DEPTH_CAP {
        return value;
    }
    match value {
        serde_json::Value::Object(map) => {
            if map
                .get("$type")
                .and_then(|v| v.as_str())
                .is_some_and(|t| t == "Page")
            {
                return serde_json::Value::Null;
            }
            let cleaned = map
                .into_iter()
                .map(|(k, v)| (k, strip_at_depth(v, depth + 1)))
                .collect();
            serde_json::Value::Object(cleaned)
        }
        serde_json::Value::Array(items) => serde_json::Value::Array(
            items
                .into_iter()
                .map(|v| strip_at_depth(v, depth + 1))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::RenderResult;

    fn sample_result(url: &str) -> RenderResult {
        RenderResult {
            url: url.to_string(),
            backend: "lite".to_string(),
            detection: None,
            data: None,
            chunks: vec![],
            summary: "summary text".to_string(),
            ms: 12,
            cached: false,
            error: None,
        }
    }

    #[test]
    fn round_trip_get_after_set() {
        let cache = Cache::in_memory(DEFAULT_MAX_ENTRIES).unwrap();
        let result = sample_result("https://example.com");
        cache.set("https://example.com", "", &result, 60_000).unwrap();
        let fetched = cache.get("https://example.com", "").unwrap().unwrap();
        assert_eq!(fetched.url, result.url);
        assert_eq!(fetched.summary, result.summary);
    }

    #[test]
    fn expired_entry_is_absent_on_get() {
        let cache = Cache::in_memory(DEFAULT_MAX_ENTRIES).unwrap();
        let result = sample_result("https://example.com");
        cache.set("https://example.com", "", &result, 0).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(cache.get("https://example.com", "").unwrap().is_none());
        assert!(cache.get("https://example.com", "").unwrap().is_none());
    }

    #[test]
    fn invalidate_removes_every_query_variant() {
        let cache = Cache::in_memory(DEFAULT_MAX_ENTRIES).unwrap();
        let result = sample_result("https://example.com");
        cache.set("https://example.com", "", &result, 60_000).unwrap();
        cache.set("https://example.com", "q1", &result, 60_000).unwrap();
        let count = cache.invalidate("https://example.com").unwrap();
        assert_eq!(count, 2);
        assert!(cache.get("https://example.com", "").unwrap().is_none());
        assert!(cache.get("https://example.com", "q1").unwrap().is_none());
    }

    #[test]
    fn eviction_keeps_entries_at_or_under_max() {
        let cache = Cache::in_memory(3).unwrap();
        for i in 0..6 {
            let url = format!("https://example.com/{i}");
            let result = sample_result(&url);
            cache.set(&url, "", &result, 60_000).unwrap();
        }
        let stats = cache.stats().unwrap();
        assert!(stats.entries <= 3);
    }

    #[test]
    fn corrupted_result_json_is_a_miss_not_an_error() {
        let cache = Cache::in_memory(DEFAULT_MAX_ENTRIES).unwrap();
        let result = sample_result("https://example.com");
        cache.set("https://example.com", "", &result, 60_000).unwrap();
        cache
            .conn
            .execute(
                "UPDATE page_cache SET result_json = 'not json' WHERE url = ?1",
                params!["https://example.com"],
            )
            .unwrap();
        assert!(cache.get("https://example.com", "").unwrap().is_none());
    }

    #[test]
    fn stats_report_backend_counts() {
        let cache = Cache::in_memory(DEFAULT_MAX_ENTRIES).unwrap();
        cache
            .set("https://example.com", "", &sample_result("https://example.com"), 60_000)
            .unwrap();
        let stats = cache.stats().unwrap();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.backends.get("lite").copied(), Some(1));
    }
}

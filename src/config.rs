//! Environment-driven configuration with documented defaults. Programmatic
//! callers may bypass the environment entirely by constructing
//! `CacheConfig`/`RenderOptions` directly — this module only supplies the
//! defaults behind `Default::default()`.

use crate::cache::CacheConfig;
use crate::error::{Error, Result};
use std::path::PathBuf;

const ENV_CACHE_DB_PATH: &str = "AGENTWEB_CACHE_DB_PATH";
const ENV_CACHE_MAX_ENTRIES: &str = "AGENTWEB_CACHE_MAX_ENTRIES";
const ENV_CACHE_TTL_MS: &str = "AGENTWEB_CACHE_TTL_MS";
const ENV_VERBOSE: &str = "AGENTWEB_VERBOSE";

const DEFAULT_CACHE_MAX_ENTRIES: u64 = 500;

/// Crate-wide configuration resolved from the environment, with defaults
/// matching the result-cache contract.
#[derive(Debug, Clone)]
pub struct AgentWebConfig {
    pub cache_db_path: PathBuf,
    pub cache_max_entries: u64,
    /// Default cache TTL in milliseconds, read from `AGENTWEB_CACHE_TTL_MS`.
    /// `None` when the variable is unset, in which case `render()` falls
    /// back to its own per-backend defaults rather than a single fixed TTL.
    pub cache_ttl_ms: Option<u64>,
    pub verbose: bool,
}

impl AgentWebConfig {
    /// Reads configuration from the environment, falling back to the
    /// documented defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let cache_db_path = match std::env::var(ENV_CACHE_DB_PATH) {
            Ok(path) => PathBuf::from(path),
            Err(_) => default_cache_db_path()?,
        };

        let cache_max_entries = parse_env_or(ENV_CACHE_MAX_ENTRIES, DEFAULT_CACHE_MAX_ENTRIES)?;
        let cache_ttl_ms = match std::env::var(ENV_CACHE_TTL_MS) {
            Ok(v) => Some(
                v.parse::<u64>()
                    .map_err(|e| Error::Config(format!("invalid {ENV_CACHE_TTL_MS}: {e}")))?,
            ),
            Err(_) => None,
        };
        let verbose = match std::env::var(ENV_VERBOSE) {
            Ok(v) => v.eq_ignore_ascii_case("true") || v == "1",
            Err(_) => false,
        };

        Ok(Self {
            cache_db_path,
            cache_max_entries,
            cache_ttl_ms,
            verbose,
        })
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            db_path: self.cache_db_path.clone(),
            max_entries: self.cache_max_entries,
            verbose: self.verbose,
        }
    }
}

fn default_cache_db_path() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| Error::Config("could not resolve home directory".to_string()))?;
    Ok(home.join(".agentweb").join("cache.db"))
}

fn parse_env_or(key: &str, default: u64) -> Result<u64> {
    match std::env::var(key) {
        Ok(v) => v
            .parse::<u64>()
            .map_err(|e| Error::Config(format!("invalid {key}: {e}"))),
        Err(_) => Ok(default),
    }
}

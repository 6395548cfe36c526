use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds per the render pipeline's error handling design.
///
/// Not every variant bubbles out of `render()` as an `Err` — see each
/// module's docs for which failures degrade to a `backend="error"` result or
/// a cache no-op instead of propagating.
#[derive(Error, Debug)]
pub enum Error {
    #[error("fetch failed: {0}")]
    FetchFailure(String),

    #[error("fetch returned non-2xx status {status}")]
    FetchStatus { status: u16 },

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("browser renderer unavailable: {0}")]
    BrowserUnavailable(String),

    #[error("browser navigation failed: {0}")]
    BrowserNavigation(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("cache I/O error: {0}")]
    CacheIo(String),

    #[error("call was cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(std::time::Duration::default())
        } else {
            Error::FetchFailure(e.to_string())
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::CacheIo(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Parse(e.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::Parse(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_status_message() {
        let err = Error::FetchStatus { status: 404 };
        assert_eq!(err.to_string(), "fetch returned non-2xx status 404");
    }

    #[test]
    fn from_serde_json_error_is_parse() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn from_url_parse_error_is_parse() {
        let url_err = url::Url::parse("not a url").unwrap_err();
        let err: Error = url_err.into();
        assert!(matches!(err, Error::Parse(_)));
    }
}

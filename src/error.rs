//! Error types for the workflow engine.
//!
//! Per-entity faults never escape the entity boundary: they are folded into a
//! status write. Only setup failures and store failures stop a run.

use thiserror::Error;

/// Coarse classification of a page automation fault, used to decide whether
/// a retry is worthwhile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Element not rendered yet, navigation slow, wait elapsed.
    Timeout,
    /// Navigation failed before a response arrived.
    Navigation,
    /// The site answered with an error status.
    HttpStatus,
    /// A required control could not be located.
    NotFound,
    /// The view was closed underneath the operation.
    ViewClosed,
    /// Anything else reported by the automation backend.
    Backend,
}

impl ErrorKind {
    /// Kinds that the default retry policy absorbs.
    pub const TRANSIENT: &'static [ErrorKind] = &[ErrorKind::Timeout, ErrorKind::Navigation];
}

/// Implemented by errors that carry an [`ErrorKind`].
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

/// Faults reported by a page automation surface.
#[derive(Debug, Clone, Error)]
pub enum AutomationError {
    #[error("Timed out: {0}")]
    Timeout(String),
    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("HTTP {status} error when accessing {url}{}", http_status_hint(.status))]
    HttpStatus { url: String, status: u16 },
    #[error("Element not found: {0}")]
    NotFound(String),
    #[error("View is closed")]
    ViewClosed,
    #[error("Browser error: {0}")]
    Backend(String),
}

impl AutomationError {
    pub fn backend(e: impl std::fmt::Display) -> Self {
        Self::Backend(e.to_string())
    }

    /// Whether this error means the site is throttling or blocking us.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::HttpStatus { status, .. } if is_possible_rate_limit(*status))
    }
}

impl Classify for AutomationError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Navigation { .. } => ErrorKind::Navigation,
            Self::HttpStatus { .. } => ErrorKind::HttpStatus,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::ViewClosed => ErrorKind::ViewClosed,
            Self::Backend(_) => ErrorKind::Backend,
        }
    }
}

/// Check if a status code means we should stop hitting the site for this run.
pub fn is_possible_rate_limit(status_code: u16) -> bool {
    matches!(status_code, 429 | 403)
}

fn http_status_hint(status: &u16) -> &'static str {
    match *status {
        403 => " - Access forbidden (may be rate limited or blocked)",
        429 => " - Rate limited (too many requests)",
        500 => " - Server error",
        503 => " - Service unavailable",
        _ => "",
    }
}

/// Entity store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Failed to prepare database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unknown status value in store: {0}")]
    InvalidStatus(String),
}

/// Invalid configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name}: cannot parse '{value}' as a number")]
    Parse { name: String, value: String },
    #[error("{name} must be >= {min} (got {value})")]
    BelowMinimum { name: String, min: f64, value: f64 },
    #[error("{name} must be <= {max} (got {value})")]
    AboveMaximum { name: String, max: f64, value: f64 },
    #[error("{name}: minimum {min} is greater than maximum {max}")]
    InvertedRange { name: String, min: f64, max: f64 },
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config file {path}: {source}")]
    Toml {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Failures that prevent a run from starting at all.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Browser support not compiled. Rebuild with: cargo build --features browser")]
    BrowserUnavailable,
    #[error("Chrome/Chromium not found. Install chromium or google-chrome, or set browser.remote_url")]
    ChromeNotFound,
    #[error("Failed to launch browser: {0}")]
    Launch(String),
    #[error("Failed to connect to remote browser: {0}")]
    Remote(String),
    #[error("Login not completed within {0}s")]
    LoginTimeout(u64),
    #[error("Cookie file error: {0}")]
    Cookies(String),
    #[error(transparent)]
    Automation(#[from] AutomationError),
}

/// CSV import/export failures.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV file must have a 'URL' column. Found columns: {0:?}")]
    MissingUrlColumn(Vec<String>),
    #[error("CSV file is empty")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_message_includes_hint() {
        let err = AutomationError::HttpStatus {
            url: "https://example.com/in/a".to_string(),
            status: 429,
        };
        assert_eq!(
            err.to_string(),
            "HTTP 429 error when accessing https://example.com/in/a - Rate limited (too many requests)"
        );
        assert!(err.is_rate_limit());

        let err = AutomationError::HttpStatus {
            url: "u".to_string(),
            status: 404,
        };
        assert_eq!(err.to_string(), "HTTP 404 error when accessing u");
        assert!(!err.is_rate_limit());
    }

    #[test]
    fn test_transient_kinds() {
        assert!(ErrorKind::TRANSIENT.contains(&AutomationError::Timeout("x".into()).kind()));
        assert!(!ErrorKind::TRANSIENT.contains(&AutomationError::NotFound("x".into()).kind()));
        assert!(!ErrorKind::TRANSIENT.contains(&AutomationError::ViewClosed.kind()));
    }

    #[test]
    fn test_rate_limit_codes() {
        assert!(is_possible_rate_limit(429));
        assert!(is_possible_rate_limit(403));
        assert!(!is_possible_rate_limit(500));
        assert!(!is_possible_rate_limit(503));
    }
}

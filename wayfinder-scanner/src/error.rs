use thiserror::Error;

/// Run-level failures. Only these escape the explorer; everything that goes
/// wrong inside a single branch is a [`BranchFailure`] and ends up in the ledger.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Session expired (detected at {location})")]
    SessionExpired { location: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Ledger write failed: {0}")]
    Ledger(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Why a single branch of the exploration was abandoned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BranchFailure {
    #[error("no locator matched intent '{intent}'")]
    ResolutionFailure { intent: String },

    #[error("navigation for '{target}' did not settle within {timeout_ms}ms")]
    NavigationTimeout { target: String, timeout_ms: u64 },

    #[error("could not return to anchor {anchor}: {reason}")]
    AnchorRecoveryFailure { anchor: String, reason: String },

    #[error("activation of '{target}' failed: {reason}")]
    Activation { target: String, reason: String },
}

/// Errors raised by a [`crate::document::Document`] implementation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentError {
    #[error("invalid selector '{0}'")]
    InvalidSelector(String),

    #[error("element handle belongs to an older document snapshot")]
    StaleElement,

    #[error("operation timed out")]
    Timeout,

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("no document loaded")]
    NotLoaded,

    #[error("element <{0}> cannot be filled")]
    NotFillable(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for DocumentError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DocumentError::Timeout
        } else {
            DocumentError::Http(e.to_string())
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("probe failed: {0}")]
pub struct ProbeError(pub String);

pub type Result<T> = std::result::Result<T, ScanError>;

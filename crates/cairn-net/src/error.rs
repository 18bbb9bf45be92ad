#![forbid(unsafe_code)]

use thiserror::Error;

/// Result type used by `cairn-net`.
pub type NetResult<T> = Result<T, NetError>;

/// Errors produced by the fetch layer.
///
/// `Clone` is required: higher layers share fetch outcomes between
/// concurrent callers, so transport causes are captured as messages.
#[derive(Debug, Error, Clone)]
pub enum NetError {
    #[error("http request failed: {0}")]
    Http(String),

    #[error("http {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("request timed out")]
    Timeout,

    #[error("request failed after {max_retries} retries: {source}")]
    RetryExhausted {
        max_retries: u32,
        source: Box<NetError>,
    },
}

impl NetError {
    pub fn http<S: Into<String>>(msg: S) -> Self {
        Self::Http(msg.into())
    }

    pub fn http_status(status: u16, url: &url::Url) -> Self {
        Self::HttpStatus {
            status,
            url: url.to_string(),
        }
    }

    /// Whether a retry decorator may re-issue the request.
    pub fn is_retryable(&self) -> bool {
        match self {
            NetError::Timeout => true,
            NetError::HttpStatus { status, .. } => {
                *status >= 500 || *status == 429 || *status == 408
            }
            NetError::Http(msg) => {
                msg.contains("timeout") || msg.contains("connection") || msg.contains("network")
            }
            NetError::RetryExhausted { .. } => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, NetError::Timeout)
    }

    /// HTTP status code, when the server answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            NetError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for NetError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(error.to_string())
        }
    }
}

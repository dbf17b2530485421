use thiserror::Error;

/// Errors from talking to the upstream paged API.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("upstream returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("undecodable upstream response: {0}")]
    Decode(String),
}

impl FetchError {
    /// Check if retrying the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport(_) | FetchError::Timeout | FetchError::Decode(_) => true,
            FetchError::Status { status, .. } => {
                matches!(status, 408 | 429 | 500..=599)
            }
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_decode() {
            FetchError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            FetchError::Status {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

pub type FetchResult<T> = Result<T, FetchError>;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Partial result: {failed} of {total} shards failed ({successful} successful), timed out: {timed_out}")]
    Partial {
        total: u64,
        successful: u64,
        failed: u64,
        timed_out: bool,
    },
}

impl SearchError {
    /// Transient failures worth another attempt: connection problems,
    /// timeouts, throttling and server-side errors.
    pub fn is_retryable(&self) -> bool {
        match self {
            SearchError::Network(_) | SearchError::Timeout(_) | SearchError::Partial { .. } => true,
            SearchError::Api { status, .. } => *status == 429 || *status >= 500,
            SearchError::Parse(_) => false,
        }
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SearchError::Timeout(err.to_string())
        } else if err.is_decode() {
            SearchError::Parse(err.to_string())
        } else {
            SearchError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttling_and_server_errors_are_retryable() {
        for status in [429, 500, 502, 503] {
            let err = SearchError::Api {
                status,
                message: String::new(),
            };
            assert!(err.is_retryable(), "status {status} should be retryable");
        }
    }

    #[test]
    fn client_errors_are_not_retryable() {
        for status in [400, 401, 404, 409] {
            let err = SearchError::Api {
                status,
                message: String::new(),
            };
            assert!(!err.is_retryable(), "status {status} should not be retryable");
        }
        assert!(!SearchError::Parse("bad json".into()).is_retryable());
    }

    #[test]
    fn timeouts_and_network_errors_are_retryable() {
        assert!(SearchError::Timeout("180s".into()).is_retryable());
        assert!(SearchError::Network("connection refused".into()).is_retryable());
        assert!(SearchError::Partial {
            total: 2,
            successful: 1,
            failed: 1,
            timed_out: false,
        }
        .is_retryable());
    }
}

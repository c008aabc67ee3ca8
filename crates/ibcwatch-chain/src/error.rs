//! Chain error taxonomy.

use thiserror::Error;

/// Errors produced by chain sessions and the calls wrapped around them
#[derive(Error, Debug)]
pub enum ChainError {
    /// Endpoint unreachable or timed out at the transport level
    #[error("connection error:: {0}")]
    Connection(String),

    /// Protocol or handshake failure while opening a session
    #[error("init error:: {0}")]
    Init(String),

    /// Missing or invalid identifiers
    #[error("config error:: {0}")]
    Config(String),

    /// A single query failed; may succeed on retry
    #[error("rpc error:: {0}")]
    Rpc(String),

    /// Retry budget consumed; `source` is the last failure
    #[error("retries exhausted after {attempts} attempts:: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: Box<ChainError>,
    },

    /// Scrape deadline or process shutdown
    #[error("operation cancelled")]
    Cancelled,
}

impl ChainError {
    /// Only transport and per-query failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChainError::Connection(_) | ChainError::Rpc(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ChainError::Cancelled)
    }
}

/// Result type for chain operations
pub type Result<T> = std::result::Result<T, ChainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ChainError::Connection("refused".into()).is_retryable());
        assert!(ChainError::Rpc("code 5".into()).is_retryable());
        assert!(!ChainError::Init("wrong network".into()).is_retryable());
        assert!(!ChainError::Config("no client".into()).is_retryable());
        assert!(!ChainError::Cancelled.is_retryable());
    }

    #[test]
    fn test_exhausted_display_keeps_last_error() {
        let err = ChainError::Exhausted {
            attempts: 5,
            source: Box::new(ChainError::Rpc("timeout".into())),
        };
        assert_eq!(
            err.to_string(),
            "retries exhausted after 5 attempts:: rpc error:: timeout"
        );
    }
}

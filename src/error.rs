//! # Error Handling
//!
//! Custom error types for the relay. Almost every error in this service is
//! non-fatal: malformed client messages, malformed upstream events and audio
//! decode failures are logged and the connection survives (the message that
//! caused them is simply dropped). The one exception is configuration, which
//! surfaces through `main` and terminates the process.

use std::fmt;

/// Error categories for the relay pipeline.
///
/// ## Error Categories:
/// - **ClientMessage**: a frame from the browser could not be parsed
/// - **UpstreamMessage**: an event from the realtime API could not be parsed
/// - **AudioDecode**: an inbound audio blob could not be decoded to samples
/// - **TurnOverflow**: the per-turn accumulator exceeded its configured cap
/// - **Config**: configuration loading or validation failed (fatal)
#[derive(Debug)]
pub enum RelayError {
    /// Client sent a frame we could not interpret
    ClientMessage(String),

    /// Upstream sent an event we could not interpret
    UpstreamMessage(String),

    /// An inbound audio blob failed to decode
    AudioDecode(String),

    /// The turn accumulator exceeded its byte cap
    TurnOverflow { limit: usize, attempted: usize },

    /// Configuration file or environment variable problems
    Config(String),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::ClientMessage(msg) => write!(f, "client message error: {}", msg),
            RelayError::UpstreamMessage(msg) => write!(f, "upstream message error: {}", msg),
            RelayError::AudioDecode(msg) => write!(f, "audio decode error: {}", msg),
            RelayError::TurnOverflow { limit, attempted } => write!(
                f,
                "turn accumulator overflow: {} bytes attempted, cap is {}",
                attempted, limit
            ),
            RelayError::Config(msg) => write!(f, "configuration error: {}", msg),
        }
    }
}

impl std::error::Error for RelayError {}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::ClientMessage(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for RelayError {
    fn from(err: config::ConfigError) -> Self {
        RelayError::Config(err.to_string())
    }
}

impl From<anyhow::Error> for RelayError {
    fn from(err: anyhow::Error) -> Self {
        RelayError::Config(err.to_string())
    }
}

/// Shorthand for Results that use the relay error type.
pub type RelayResult<T> = Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_formatting() {
        let err = RelayError::AudioDecode("no audio track".to_string());
        assert_eq!(err.to_string(), "audio decode error: no audio track");

        let err = RelayError::TurnOverflow {
            limit: 1024,
            attempted: 2048,
        };
        assert!(err.to_string().contains("2048"));
        assert!(err.to_string().contains("1024"));
    }

    #[test]
    fn test_from_serde_error() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: RelayError = parse_err.into();
        assert!(matches!(err, RelayError::ClientMessage(_)));
    }
}

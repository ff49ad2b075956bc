use thiserror::Error;

use crate::probe::ProbeFailure;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("No network path available")]
    Connectivity,

    #[error("Generation service unavailable: {0}")]
    ServiceUnavailable(ProbeFailure),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Server rejected the request ({status}): {message}")]
    HttpStatus { status: u16, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Request abandoned before it resolved")]
    Abandoned,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DispatchError {
    /// Retryable failures put the request back in the queue instead of
    /// resolving it.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DispatchError::Connectivity
                | DispatchError::ServiceUnavailable(_)
                | DispatchError::Transport(_)
        )
    }
}

impl From<reqwest::Error> for DispatchError {
    fn from(err: reqwest::Error) -> Self {
        DispatchError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(DispatchError::Connectivity.is_retryable());
        assert!(DispatchError::Transport("reset".into()).is_retryable());
        assert!(DispatchError::ServiceUnavailable(ProbeFailure::RateLimited).is_retryable());
        assert!(
            !DispatchError::HttpStatus {
                status: 500,
                message: "boom".into()
            }
            .is_retryable()
        );
        assert!(!DispatchError::MalformedResponse("empty".into()).is_retryable());
    }

    #[test]
    fn test_http_status_display_carries_message() {
        let err = DispatchError::HttpStatus {
            status: 400,
            message: "bad model".into(),
        };
        assert_eq!(err.to_string(), "Server rejected the request (400): bad model");
    }
}

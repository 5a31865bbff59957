//! Errors returned by the API client.

use thiserror::Error;

/// Failure of a single GET-JSON request.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request did not complete within the configured timeout.
    #[error("request to {url} timed out after {seconds}s")]
    Timeout { url: String, seconds: u64 },

    /// Connection or protocol failure before a response arrived.
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// The server answered with a non-success status.
    #[error("GitLab API error {status} for {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// The response body was not valid JSON.
    #[error("invalid JSON from {url}: {message}")]
    Decode { url: String, message: String },

    /// The response was JSON, but not the shape the caller expected.
    #[error("unexpected response from {url}: {message}")]
    UnexpectedShape { url: String, message: String },
}

impl ClientError {
    /// Whether the failure came from bad credentials or missing permission.
    pub fn is_auth(&self) -> bool {
        matches!(self, ClientError::Status { status, .. } if *status == 401 || *status == 403)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_auth() {
        let err = ClientError::Status {
            url: "https://gitlab.example.com/api/v4/projects".to_string(),
            status: 401,
            body: r#"{"message":"401 Unauthorized"}"#.to_string(),
        };
        assert!(err.is_auth());
        assert!(err.to_string().contains("401"));

        let err = ClientError::Status {
            url: "u".to_string(),
            status: 500,
            body: String::new(),
        };
        assert!(!err.is_auth());
    }

    #[test]
    fn test_display_timeout() {
        let err = ClientError::Timeout {
            url: "https://gitlab.example.com".to_string(),
            seconds: 30,
        };
        assert_eq!(
            err.to_string(),
            "request to https://gitlab.example.com timed out after 30s"
        );
    }
}

//! Google Cloud Logging provider for runscope
//!
//! This crate implements the log provider contract on top of the Cloud
//! Logging `entries:list` API for Cloud Run services.

mod client;
mod token;

use thiserror::Error;

use runscope_logs::ProviderError;

pub use client::{CloudLoggingProvider, ENTRIES_LIST_URL};
pub use token::{ACCESS_TOKEN_ENV, CachedToken, TokenCache, TokenSource};

/// Errors talking to Cloud Logging
#[derive(Debug, Error)]
pub enum GcpError {
    #[error("failed to obtain access token: {0}")]
    Token(String),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Cloud Logging API returned {status}: {message}")]
    Api { status: u16, message: String },
}

impl From<GcpError> for ProviderError {
    fn from(err: GcpError) -> Self {
        match err {
            GcpError::Token(msg) => ProviderError::Auth(msg),
            GcpError::Api {
                status: 401 | 403,
                message,
            } => ProviderError::Auth(message),
            GcpError::Http(e) if e.is_decode() => ProviderError::Decode(e.to_string()),
            other => ProviderError::Request(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let denied = GcpError::Api {
            status: 403,
            message: "Permission denied".to_string(),
        };
        assert!(matches!(ProviderError::from(denied), ProviderError::Auth(m) if m == "Permission denied"));

        let throttled = GcpError::Api {
            status: 429,
            message: "Quota exceeded".to_string(),
        };
        match ProviderError::from(throttled) {
            ProviderError::Request(msg) => assert!(msg.contains("429")),
            other => panic!("unexpected {:?}", other),
        }

        assert!(matches!(
            ProviderError::from(GcpError::Token("no gcloud".to_string())),
            ProviderError::Auth(_)
        ));
    }
}

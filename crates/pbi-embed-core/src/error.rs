use http::StatusCode;
use thiserror::Error;

use crate::types::ErrorPayload;

pub type Result<T> = std::result::Result<T, EmbedError>;

/// Failure reported by an embed token provider.
///
/// The two variants only differ in how the message is rendered; callers
/// handle both the same way.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// The remote API answered with a non-success status.
    #[error(
        "Status: {} ({})\r\nResponse: {}\r\nRequestId: {}",
        .status.canonical_reason().unwrap_or("Unknown"),
        .status.as_u16(),
        .body,
        .request_id.as_deref().unwrap_or("")
    )]
    Api {
        status: StatusCode,
        body: String,
        request_id: Option<String>,
    },

    #[error("{message}")]
    Generic { message: String },
}

impl ProviderError {
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload::new(self.to_string())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EmbedError {
    /// Detected once at startup. Every operation returns it until restart.
    #[error("{0}")]
    Config(String),

    #[error("Invalid report id '{0}': expected a GUID")]
    InvalidReportId(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl EmbedError {
    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload::new(self.to_string())
    }
}

use async_trait::async_trait;
use thiserror::Error;

/// A single outbound webhook call: form-encoded POST of `params` to `url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackRequest {
    pub url: String,
    pub params: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyResponse {
    pub status: u16,
    pub body: String,
}

impl NotifyResponse {
    /// Merchants acknowledge a notification by answering 2xx with a body of exactly `success`.
    pub fn is_acknowledged(&self) -> bool {
        (200..300).contains(&self.status) && self.body == "success"
    }
}

/// Why a delivery attempt failed. Every variant is retryable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryFailure {
    #[error("The merchant did not answer within {0} seconds")]
    Timeout(u64),
    #[error("Could not reach the merchant: {0}")]
    Connection(String),
    #[error("The merchant answered with HTTP {status}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("The merchant did not acknowledge the notification")]
    NotAcknowledged { status: u16, body: String },
}

impl DeliveryFailure {
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::UnexpectedStatus { status, .. } | Self::NotAcknowledged { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// What gets written into the callback log's response column.
    pub fn response_body(&self) -> String {
        match self {
            Self::UnexpectedStatus { body, .. } | Self::NotAcknowledged { body, .. } => body.clone(),
            other => other.to_string(),
        }
    }
}

/// Delivers one webhook request. Implementations must bound the call with a timeout.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, request: &CallbackRequest) -> Result<NotifyResponse, DeliveryFailure>;
}

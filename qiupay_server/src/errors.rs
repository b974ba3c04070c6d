use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use qiupay_engine::OrderFlowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Invalid request. {0}")]
    InvalidRequest(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("{0}")]
    OrderFlow(#[from] OrderFlowError),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::OrderFlow(e) => match e {
                OrderFlowError::ValidationError(_) => StatusCode::BAD_REQUEST,
                OrderFlowError::InvalidSignature => StatusCode::FORBIDDEN,
                OrderFlowError::InvalidMerchantKey => StatusCode::FORBIDDEN,
                OrderFlowError::MerchantDisabled(_) => StatusCode::FORBIDDEN,
                OrderFlowError::MerchantNotFound(_) => StatusCode::NOT_FOUND,
                OrderFlowError::OrderNotFound(_) => StatusCode::NOT_FOUND,
                OrderFlowError::BillSourceNotConfigured(_) => StatusCode::CONFLICT,
                OrderFlowError::DuplicateOrder(_) => StatusCode::CONFLICT,
                OrderFlowError::OrderNotPaid(..) => StatusCode::CONFLICT,
                OrderFlowError::AllocationExhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
                OrderFlowError::BillAlreadyConsumed(_) => StatusCode::INTERNAL_SERVER_ERROR,
                OrderFlowError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Errors use the gateway's `{code: -1, msg}` envelope, so merchant SDKs can handle them uniformly.
    fn error_response(&self) -> HttpResponse {
        let msg = match self {
            Self::OrderFlow(OrderFlowError::DatabaseError(_)) | Self::BackendError(_) => {
                "Internal server error".to_string()
            },
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "code": -1, "msg": msg }).to_string())
    }
}

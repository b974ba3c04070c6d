use qpg_common::Money;
use thiserror::Error;

use crate::{
    db_types::{OrderStatusType, TradeNo},
    helpers::SignatureError,
    traits::PaymentGatewayError,
};

/// Everything that can go wrong in the order flow.
///
/// Validation, signature and merchant errors are synchronous rejections: nothing has been written when they are
/// returned. Conflicting transitions are *not* errors; they are reported through
/// [`crate::traits::TransitionOutcome::Conflict`].
#[derive(Debug, Clone, Error)]
pub enum OrderFlowError {
    #[error("Invalid request: {0}")]
    ValidationError(String),
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Merchant {0} does not exist")]
    MerchantNotFound(String),
    #[error("Merchant {0} has been disabled")]
    MerchantDisabled(i64),
    #[error("Merchant {0} has no payment account linked")]
    BillSourceNotConfigured(i64),
    #[error("The merchant key is incorrect")]
    InvalidMerchantKey,
    #[error("An order with merchant order number {0} already exists")]
    DuplicateOrder(String),
    #[error("No free amount is available near {0}. Please try again shortly.")]
    AllocationExhausted(Money),
    #[error("Order {0} does not exist")]
    OrderNotFound(String),
    #[error("Order {0} is {1}. Only paid orders can be notified.")]
    OrderNotPaid(TradeNo, OrderStatusType),
    #[error("Bill {0} has already paid another order")]
    BillAlreadyConsumed(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl OrderFlowError {
    /// True if the caller sent something wrong, as opposed to the engine failing.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::DatabaseError(_) | Self::BillAlreadyConsumed(_))
    }
}

impl From<PaymentGatewayError> for OrderFlowError {
    fn from(e: PaymentGatewayError) -> Self {
        match e {
            PaymentGatewayError::DuplicateOrder { out_trade_no, .. } => Self::DuplicateOrder(out_trade_no),
            PaymentGatewayError::MerchantNotFound(id) => Self::MerchantNotFound(id.to_string()),
            PaymentGatewayError::OrderNotFound(id) => Self::OrderNotFound(id),
            PaymentGatewayError::AmountTaken(amount) => Self::AllocationExhausted(amount),
            PaymentGatewayError::BillAlreadyConsumed(key) => Self::BillAlreadyConsumed(key),
            other => Self::DatabaseError(other.to_string()),
        }
    }
}

impl From<SignatureError> for OrderFlowError {
    fn from(e: SignatureError) -> Self {
        match e {
            SignatureError::MissingSignature => Self::ValidationError("sign is required".into()),
            SignatureError::Mismatch => Self::InvalidSignature,
        }
    }
}

use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use qpg_common::Money;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

//--------------------------------------        TradeNo        ---------------------------------------------------------
/// The platform-assigned order number. Unique across all merchants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct TradeNo(pub String);

impl FromStr for TradeNo {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for TradeNo {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for TradeNo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TradeNo {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// The order has been created and is waiting for a matching transfer.
    Pending,
    /// A matching transfer was observed before the order expired.
    Paid,
    /// The order expired before any matching transfer was observed.
    Timeout,
    /// The order was cancelled by an administrator.
    Canceled,
}

impl OrderStatusType {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// The numeric code used by the merchant-facing query API (1 = paid, 0 = anything else).
    pub fn api_code(&self) -> i32 {
        match self {
            Self::Paid => 1,
            _ => 0,
        }
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::Pending => write!(f, "Pending"),
            OrderStatusType::Paid => write!(f, "Paid"),
            OrderStatusType::Timeout => write!(f, "Timeout"),
            OrderStatusType::Canceled => write!(f, "Canceled"),
        }
    }
}

impl From<String> for OrderStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to Pending");
            OrderStatusType::Pending
        })
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid conversion: {0}")]
pub struct ConversionError(String);

impl FromStr for OrderStatusType {
    type Err = ConversionError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Paid" => Ok(Self::Paid),
            "Timeout" => Ok(Self::Timeout),
            "Canceled" => Ok(Self::Canceled),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------     NotifyStatus      ---------------------------------------------------------
/// Where the merchant notification for an order currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum NotifyStatus {
    /// No notification has been scheduled (the order is not paid).
    Idle,
    /// A delivery sequence is in progress.
    Pending,
    /// The merchant acknowledged the notification.
    Delivered,
    /// Every attempt of the latest sequence failed.
    Failed,
}

impl Display for NotifyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifyStatus::Idle => write!(f, "Idle"),
            NotifyStatus::Pending => write!(f, "Pending"),
            NotifyStatus::Delivered => write!(f, "Delivered"),
            NotifyStatus::Failed => write!(f, "Failed"),
        }
    }
}

//--------------------------------------       Merchant        ---------------------------------------------------------
#[derive(Clone, FromRow)]
pub struct Merchant {
    pub id: i64,
    pub name: String,
    pub secret_key: String,
    pub active: bool,
    /// Running total of confirmed receipts
    pub balance: Money,
    /// Opaque reference handed to the bill source when fetching this merchant's transfers.
    pub bill_credential: Option<String>,
    pub payment_code_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Keys and credentials stay out of the logs.
impl std::fmt::Debug for Merchant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Merchant")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("active", &self.active)
            .field("balance", &self.balance)
            .field("has_bill_credential", &self.bill_credential.is_some())
            .field("payment_code_url", &self.payment_code_url)
            .finish()
    }
}

impl Merchant {
    pub fn has_bill_source(&self) -> bool {
        self.bill_credential.as_deref().map(|c| !c.is_empty()).unwrap_or(false)
    }
}

/// How many orders a merchant has placed: in total, on the current UTC day and on the day before.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OrderCounts {
    pub total: i64,
    pub today: i64,
    pub yesterday: i64,
}

#[derive(Debug, Clone)]
pub struct NewMerchant {
    pub name: String,
    pub secret_key: String,
    pub bill_credential: Option<String>,
    pub payment_code_url: Option<String>,
}

impl NewMerchant {
    pub fn new<S: Into<String>>(name: S, secret_key: S) -> Self {
        Self { name: name.into(), secret_key: secret_key.into(), bill_credential: None, payment_code_url: None }
    }

    pub fn with_bill_credential<S: Into<String>>(mut self, credential: S) -> Self {
        self.bill_credential = Some(credential.into());
        self
    }

    pub fn with_payment_code_url<S: Into<String>>(mut self, url: S) -> Self {
        self.payment_code_url = Some(url.into());
        self
    }
}

//--------------------------------------        Order          ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub trade_no: TradeNo,
    pub out_trade_no: String,
    pub merchant_id: i64,
    pub pay_type: String,
    pub name: String,
    /// The amount the merchant asked for
    pub requested_amount: Money,
    /// The amount the payer must transfer. This is the matching key.
    pub amount: Money,
    pub status: OrderStatusType,
    pub notify_url: String,
    pub return_url: Option<String>,
    pub param: Option<String>,
    pub client_ip: Option<String>,
    pub device: String,
    pub notify_status: NotifyStatus,
    /// Attempts made in the current delivery sequence
    pub notify_attempts: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    /// When the order timed out or was cancelled
    pub closed_at: Option<DateTime<Utc>>,
}

impl Order {
    /// True if a transfer observed at `observed_at` falls inside this order's payment window.
    pub fn accepts_observation_at(&self, observed_at: DateTime<Utc>) -> bool {
        self.created_at <= observed_at && observed_at <= self.expires_at
    }
}

/// A validated order, with its final amount already allocated, ready to be stored.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub trade_no: TradeNo,
    pub out_trade_no: String,
    pub merchant_id: i64,
    pub pay_type: String,
    pub name: String,
    pub requested_amount: Money,
    pub amount: Money,
    pub notify_url: String,
    pub return_url: Option<String>,
    pub param: Option<String>,
    pub client_ip: Option<String>,
    pub device: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

//--------------------------------------      MatchEvent       ---------------------------------------------------------
/// The durable record of the observed transfer that paid an order.
#[derive(Debug, Clone, FromRow, PartialEq, Eq, Serialize)]
pub struct MatchEvent {
    pub id: i64,
    pub order_id: i64,
    pub merchant_id: i64,
    pub bill_key: String,
    pub amount: Money,
    pub counterparty: String,
    pub observed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------     CallbackJob       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum CallbackJobState {
    Queued,
    InFlight,
    Delivered,
    Failed,
}

impl Display for CallbackJobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallbackJobState::Queued => write!(f, "Queued"),
            CallbackJobState::InFlight => write!(f, "InFlight"),
            CallbackJobState::Delivered => write!(f, "Delivered"),
            CallbackJobState::Failed => write!(f, "Failed"),
        }
    }
}

/// The persisted retry timer for an order's merchant notification.
///
/// `generation` identifies the delivery sequence. A re-notify starts a new generation with a fresh attempt budget, and
/// any result belonging to an older generation can no longer modify the job.
#[derive(Debug, Clone, FromRow, PartialEq, Eq, Serialize)]
pub struct CallbackJob {
    pub id: i64,
    pub order_id: i64,
    pub generation: i64,
    pub attempts_made: i64,
    pub state: CallbackJobState,
    pub next_attempt_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------   CallbackAttempt     ---------------------------------------------------------
/// One row of the append-only callback log.
#[derive(Debug, Clone, FromRow, PartialEq, Eq, Serialize)]
pub struct CallbackAttempt {
    pub id: i64,
    pub order_id: i64,
    /// Position of this attempt in the order's whole log (1-based, across all generations)
    pub seq: i64,
    pub generation: i64,
    /// Position of this attempt inside its generation (1-based)
    pub attempt: i64,
    pub url: String,
    pub http_status: Option<i64>,
    pub response_body: Option<String>,
    pub success: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCallbackAttempt {
    pub order_id: i64,
    pub generation: i64,
    pub attempt: i64,
    pub url: String,
    pub http_status: Option<i64>,
    pub response_body: Option<String>,
    pub success: bool,
    pub created_at: DateTime<Utc>,
}

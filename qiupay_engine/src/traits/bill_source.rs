use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use qpg_common::{Money, Secret};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single incoming transfer observed in a merchant's payment-provider history.
///
/// Bills are ephemeral. Only the ones that pay an order leave a trace, as a match event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillRecord {
    pub amount: Money,
    pub observed_at: DateTime<Utc>,
    /// Payer reference as reported by the provider. May be empty.
    #[serde(default)]
    pub counterparty: String,
    #[serde(default)]
    pub provider_txn_id: Option<String>,
}

impl BillRecord {
    pub fn new<S: Into<String>>(amount: Money, observed_at: DateTime<Utc>, counterparty: S) -> Self {
        Self { amount, observed_at, counterparty: counterparty.into(), provider_txn_id: None }
    }

    pub fn with_provider_txn_id<S: Into<String>>(mut self, id: S) -> Self {
        self.provider_txn_id = Some(id.into());
        self
    }

    /// The identity of this bill across poll cycles: the provider's transaction id if it has one, otherwise
    /// `amount@observed_at#counterparty`.
    pub fn key(&self) -> String {
        match self.provider_txn_id.as_deref() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => format!(
                "{}@{}#{}",
                self.amount,
                self.observed_at.to_rfc3339_opts(SecondsFormat::Micros, true),
                self.counterparty
            ),
        }
    }
}

/// A merchant's bill-source credential. It is owned by the merchant record and handed to every fetch.
#[derive(Debug, Clone)]
pub struct BillCredential {
    pub merchant_id: i64,
    pub reference: Secret<String>,
}

impl BillCredential {
    pub fn new<S: Into<String>>(merchant_id: i64, reference: S) -> Self {
        Self { merchant_id, reference: Secret::new(reference.into()) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BillSourceError {
    #[error("The bill source is unavailable: {0}")]
    Unavailable(String),
    #[error("The bill source did not answer within {0} seconds")]
    Timeout(u64),
    #[error("The bill source returned data that could not be understood: {0}")]
    InvalidResponse(String),
}

/// Fetches a merchant's recent incoming transfers.
#[async_trait]
pub trait BillSource: Send + Sync {
    /// Returns every transfer observed at or after `since`, in any order.
    async fn fetch_bills(
        &self,
        credential: &BillCredential,
        since: DateTime<Utc>,
    ) -> Result<Vec<BillRecord>, BillSourceError>;
}

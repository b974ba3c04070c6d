use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::*;
use reqwest::Client;

use crate::traits::{BillCredential, BillRecord, BillSource, BillSourceError};

/// Reads a merchant's incoming transfers from an external provider-account service.
///
/// The service is queried at `GET {base_url}/bills?merchant_id=..&since=..`, with the merchant's credential sent as a
/// bearer token. It must answer with a JSON array of [`BillRecord`]s.
#[derive(Clone, Debug)]
pub struct HttpBillSource {
    base_url: String,
    client: Client,
    timeout: Duration,
}

impl HttpBillSource {
    pub fn new<S: Into<String>>(base_url: S, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { base_url, client, timeout })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_error(&self, e: reqwest::Error) -> BillSourceError {
        if e.is_timeout() {
            BillSourceError::Timeout(self.timeout.as_secs())
        } else if e.is_decode() {
            BillSourceError::InvalidResponse(e.to_string())
        } else {
            BillSourceError::Unavailable(e.to_string())
        }
    }
}

#[async_trait]
impl BillSource for HttpBillSource {
    async fn fetch_bills(
        &self,
        credential: &BillCredential,
        since: DateTime<Utc>,
    ) -> Result<Vec<BillRecord>, BillSourceError> {
        let url = format!("{}/bills", self.base_url);
        let merchant_id = credential.merchant_id.to_string();
        let since = since.to_rfc3339_opts(SecondsFormat::Micros, true);
        trace!("🔍️ GET {url} for merchant #{merchant_id} since {since}");
        let response = self
            .client
            .get(&url)
            .query(&[("merchant_id", merchant_id.as_str()), ("since", since.as_str())])
            .bearer_auth(credential.reference.reveal())
            .send()
            .await
            .map_err(|e| self.map_error(e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BillSourceError::Unavailable(format!("HTTP {status}: {body}")));
        }
        response.json::<Vec<BillRecord>>().await.map_err(|e| self.map_error(e))
    }
}

//! In-memory collaborators for tests.
use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    helpers::{sign_params, SIGN_TYPE_MD5},
    traits::{
        BillCredential,
        BillRecord,
        BillSource,
        BillSourceError,
        CallbackRequest,
        DeliveryFailure,
        Notifier,
        NotifyResponse,
    },
};

/// A bill source that replays a script.
///
/// Each merchant has a list of bills that are always visible (filtered by `since`), and an optional queue of failures
/// that are returned, one per call, before the bills are served again.
#[derive(Debug, Default)]
pub struct ScriptedBillSource {
    bills: Mutex<HashMap<i64, Vec<BillRecord>>>,
    failures: Mutex<HashMap<i64, VecDeque<BillSourceError>>>,
    calls: Mutex<HashMap<i64, usize>>,
}

impl ScriptedBillSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_bill(&self, merchant_id: i64, bill: BillRecord) {
        self.bills.lock().unwrap().entry(merchant_id).or_default().push(bill);
    }

    pub fn push_failure(&self, merchant_id: i64, error: BillSourceError) {
        self.failures.lock().unwrap().entry(merchant_id).or_default().push_back(error);
    }

    pub fn calls(&self, merchant_id: i64) -> usize {
        self.calls.lock().unwrap().get(&merchant_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl BillSource for ScriptedBillSource {
    async fn fetch_bills(
        &self,
        credential: &BillCredential,
        since: DateTime<Utc>,
    ) -> Result<Vec<BillRecord>, BillSourceError> {
        let id = credential.merchant_id;
        *self.calls.lock().unwrap().entry(id).or_default() += 1;
        if let Some(e) = self.failures.lock().unwrap().get_mut(&id).and_then(|q| q.pop_front()) {
            return Err(e);
        }
        let bills = self.bills.lock().unwrap().get(&id).cloned().unwrap_or_default();
        Ok(bills.into_iter().filter(|b| b.observed_at >= since).collect())
    }
}

/// A bill source that never answers.
pub struct HangingBillSource;

#[async_trait]
impl BillSource for HangingBillSource {
    async fn fetch_bills(&self, _: &BillCredential, _: DateTime<Utc>) -> Result<Vec<BillRecord>, BillSourceError> {
        std::future::pending().await
    }
}

/// A notifier that never answers requests to URLs containing `marker`, and acknowledges every other request.
pub struct HangingNotifier {
    pub marker: String,
}

impl HangingNotifier {
    pub fn new<S: Into<String>>(marker: S) -> Self {
        Self { marker: marker.into() }
    }
}

#[async_trait]
impl Notifier for HangingNotifier {
    async fn notify(&self, request: &CallbackRequest) -> Result<NotifyResponse, DeliveryFailure> {
        if request.url.contains(&self.marker) {
            std::future::pending::<()>().await;
        }
        Ok(NotifyResponse { status: 200, body: "success".into() })
    }
}

/// Builds a signed order-creation request, as a merchant would send it.
pub fn signed_order_request(
    pid: i64,
    key: &str,
    out_trade_no: &str,
    money: &str,
    extra: &[(&str, &str)],
) -> HashMap<String, String> {
    let mut params: HashMap<String, String> = [
        ("pid", pid.to_string()),
        ("type", "alipay".to_string()),
        ("out_trade_no", out_trade_no.to_string()),
        ("notify_url", "https://shop.example/notify".to_string()),
        ("name", "Test item".to_string()),
        ("money", money.to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    for (k, v) in extra {
        params.insert(k.to_string(), v.to_string());
    }
    let sign = sign_params(params.iter().map(|(k, v)| (k.as_str(), v.as_str())), key);
    params.insert("sign".into(), sign);
    params.insert("sign_type".into(), SIGN_TYPE_MD5.into());
    params
}

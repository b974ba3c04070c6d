use std::time::Duration;

use async_trait::async_trait;
use log::*;
use reqwest::Client;

use crate::traits::{CallbackRequest, DeliveryFailure, Notifier, NotifyResponse};

/// Delivers merchant notifications as form-encoded POST requests.
#[derive(Clone, Debug)]
pub struct HttpNotifier {
    client: Client,
    timeout: Duration,
}

impl HttpNotifier {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, request: &CallbackRequest) -> Result<NotifyResponse, DeliveryFailure> {
        trace!("📣️ POST {}", request.url);
        let response = self.client.post(&request.url).form(&request.params).send().await.map_err(|e| {
            if e.is_timeout() {
                DeliveryFailure::Timeout(self.timeout.as_secs())
            } else {
                DeliveryFailure::Connection(e.to_string())
            }
        })?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                DeliveryFailure::Timeout(self.timeout.as_secs())
            } else {
                DeliveryFailure::Connection(e.to_string())
            }
        })?;
        Ok(NotifyResponse { status, body })
    }
}

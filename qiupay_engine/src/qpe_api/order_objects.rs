use std::{collections::HashMap, str::FromStr};

use qpg_common::Money;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Merchant, Order, OrderCounts, TradeNo},
    helpers::SIGN_TYPE_MD5,
    qpe_api::errors::OrderFlowError,
};

const REQUIRED_FIELDS: [&str; 8] = ["pid", "type", "out_trade_no", "notify_url", "name", "money", "sign", "sign_type"];
pub const DEFAULT_DEVICE: &str = "pc";

/// A merchant's order-creation request, after the required fields have been checked and parsed.
///
/// The raw parameter map is still needed to verify the signature, since the merchant signs every field it sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderRequest {
    pub pid: i64,
    pub pay_type: String,
    pub out_trade_no: String,
    pub notify_url: String,
    pub return_url: Option<String>,
    pub name: String,
    pub money: Money,
    pub param: Option<String>,
    pub client_ip: Option<String>,
    pub device: String,
    pub sign: String,
}

impl NewOrderRequest {
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, OrderFlowError> {
        let missing = REQUIRED_FIELDS
            .iter()
            .filter(|f| params.get(**f).map(|v| v.trim().is_empty()).unwrap_or(true))
            .copied()
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(OrderFlowError::ValidationError(format!("Missing required parameters: {}", missing.join(", "))));
        }
        let field = |name: &str| params.get(name).cloned().unwrap_or_default();
        let optional = |name: &str| params.get(name).filter(|v| !v.is_empty()).cloned();

        let sign_type = field("sign_type");
        if !sign_type.eq_ignore_ascii_case(SIGN_TYPE_MD5) {
            return Err(OrderFlowError::ValidationError(format!("Unsupported sign_type: {sign_type}")));
        }
        let pid = field("pid")
            .trim()
            .parse::<i64>()
            .map_err(|_| OrderFlowError::ValidationError("Invalid merchant id".into()))?;
        let money = Money::from_str(field("money").trim())
            .ok()
            .filter(Money::is_positive)
            .ok_or_else(|| OrderFlowError::ValidationError(format!("Invalid amount: {}", field("money"))))?;
        let notify_url = field("notify_url");
        validate_url("notify_url", &notify_url)?;
        let return_url = optional("return_url");
        if let Some(url) = &return_url {
            validate_url("return_url", url)?;
        }
        Ok(Self {
            pid,
            pay_type: field("type"),
            out_trade_no: field("out_trade_no"),
            notify_url,
            return_url,
            name: field("name"),
            money,
            param: optional("param"),
            client_ip: optional("clientip"),
            device: optional("device").unwrap_or_else(|| DEFAULT_DEVICE.to_string()),
            sign: field("sign"),
        })
    }
}

fn validate_url(field: &str, url: &str) -> Result<(), OrderFlowError> {
    match Url::parse(url) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => Ok(()),
        _ => Err(OrderFlowError::ValidationError(format!("{field} must be an absolute http(s) URL"))),
    }
}

/// The answer to a successful order creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderCreated {
    pub trade_no: TradeNo,
    /// The amount the payer must transfer, which may differ from the requested amount
    pub money: Money,
    /// The merchant's payment-code reference
    pub qrcode: Option<String>,
    #[serde(skip)]
    pub order: Order,
}

/// A merchant's view of its own account.
#[derive(Debug, Clone)]
pub struct MerchantInfo {
    pub merchant: Merchant,
    pub orders: OrderCounts,
}

/// How a merchant identifies the order it is asking about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderLookup {
    TradeNo(TradeNo),
    OutTradeNo(String),
}

impl OrderLookup {
    /// The platform trade number is preferred when both are given.
    pub fn from_parts(trade_no: Option<String>, out_trade_no: Option<String>) -> Option<Self> {
        match (trade_no.filter(|s| !s.is_empty()), out_trade_no.filter(|s| !s.is_empty())) {
            (Some(t), _) => Some(Self::TradeNo(TradeNo(t))),
            (None, Some(o)) => Some(Self::OutTradeNo(o)),
            (None, None) => None,
        }
    }
}

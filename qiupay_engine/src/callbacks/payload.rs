use reqwest::Url;

use crate::{
    db_types::{Merchant, Order},
    helpers::{sign_params, SIGN_TYPE_MD5},
};

pub const TRADE_STATUS_SUCCESS: &str = "TRADE_SUCCESS";

/// The signed parameters sent to the merchant when `order` is paid.
///
/// The amount reported is the allocated amount, i.e. what the payer actually transferred.
pub fn notification_params(order: &Order, merchant: &Merchant) -> Vec<(String, String)> {
    let mut params = vec![
        ("pid".to_string(), order.merchant_id.to_string()),
        ("trade_no".to_string(), order.trade_no.to_string()),
        ("out_trade_no".to_string(), order.out_trade_no.clone()),
        ("type".to_string(), order.pay_type.clone()),
        ("name".to_string(), order.name.clone()),
        ("money".to_string(), order.amount.to_string()),
        ("trade_status".to_string(), TRADE_STATUS_SUCCESS.to_string()),
    ];
    if let Some(param) = order.param.as_ref().filter(|p| !p.is_empty()) {
        params.push(("param".to_string(), param.clone()));
    }
    let sign = sign_params(params.iter().map(|(k, v)| (k.as_str(), v.as_str())), &merchant.secret_key);
    params.push(("sign".to_string(), sign));
    params.push(("sign_type".to_string(), SIGN_TYPE_MD5.to_string()));
    params
}

/// The URL the payer's browser is sent to once the order is paid: the order's `return_url` with the signed
/// notification parameters merged into its query string. Notification parameters replace any existing query
/// parameter with the same name.
///
/// Returns `None` if the order has no return URL or it cannot be parsed.
pub fn build_return_url(order: &Order, merchant: &Merchant) -> Option<String> {
    let return_url = order.return_url.as_deref().filter(|u| !u.is_empty())?;
    let mut url = Url::parse(return_url).ok()?;
    let signed = notification_params(order, merchant);
    let mut existing: Vec<(String, String)> = Vec::new();
    for (k, v) in url.query_pairs() {
        let overridden = signed.iter().any(|(s, _)| *s == k);
        let seen = existing.iter().any(|(e, _)| *e == k);
        if !overridden && !seen {
            existing.push((k.into_owned(), v.into_owned()));
        }
    }
    url.query_pairs_mut().clear().extend_pairs(existing.iter()).extend_pairs(signed.iter());
    Some(url.to_string())
}

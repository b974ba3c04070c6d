use chrono::{DateTime, Utc};
use qiupay_engine::{
    db_types::{CallbackJob, Order, OrderStatusType, TradeNo},
    order_objects::{MerchantInfo, OrderCreated, OrderLookup},
};
use qpg_common::Money;
use serde::{Deserialize, Serialize};

pub const CODE_OK: i32 = 1;
pub const CODE_ERROR: i32 = -1;

/// The plain `{code, msg}` envelope used for acknowledgements and errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub code: i32,
    pub msg: String,
}

impl JsonResponse {
    pub fn success<S: ToString>(msg: S) -> Self {
        Self { code: CODE_OK, msg: msg.to_string() }
    }

    pub fn failure<S: ToString>(msg: S) -> Self {
        Self { code: CODE_ERROR, msg: msg.to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub code: i32,
    pub msg: String,
    pub trade_no: TradeNo,
    pub out_trade_no: String,
    /// The amount the payer must transfer
    pub money: Money,
    pub qrcode: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl From<OrderCreated> for SubmitResponse {
    fn from(created: OrderCreated) -> Self {
        Self {
            code: CODE_OK,
            msg: "success".into(),
            trade_no: created.trade_no,
            out_trade_no: created.order.out_trade_no,
            money: created.money,
            qrcode: created.qrcode,
            expires_at: created.order.expires_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderQueryParams {
    pub pid: i64,
    pub key: String,
    pub trade_no: Option<String>,
    pub out_trade_no: Option<String>,
}

impl OrderQueryParams {
    pub fn lookup(&self) -> Option<OrderLookup> {
        OrderLookup::from_parts(self.trade_no.clone(), self.out_trade_no.clone())
    }
}

/// The merchant's view of one of its orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderQueryResponse {
    pub code: i32,
    pub msg: String,
    pub pid: i64,
    pub trade_no: TradeNo,
    pub out_trade_no: String,
    #[serde(rename = "type")]
    pub pay_type: String,
    pub name: String,
    pub money: Money,
    pub requested_money: Money,
    /// 1 if paid, 0 otherwise
    pub status: i32,
    pub state: OrderStatusType,
    pub param: Option<String>,
    pub addtime: DateTime<Utc>,
    pub endtime: Option<DateTime<Utc>>,
}

impl From<Order> for OrderQueryResponse {
    fn from(order: Order) -> Self {
        Self {
            code: CODE_OK,
            msg: "success".into(),
            pid: order.merchant_id,
            status: order.status.api_code(),
            state: order.status,
            trade_no: order.trade_no,
            out_trade_no: order.out_trade_no,
            pay_type: order.pay_type,
            name: order.name,
            money: order.amount,
            requested_money: order.requested_amount,
            param: order.param,
            addtime: order.created_at,
            endtime: order.paid_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantQueryParams {
    pub pid: i64,
    pub key: String,
}

/// A merchant's account summary. Order counts are per UTC day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantInfoResponse {
    pub code: i32,
    pub msg: String,
    pub pid: i64,
    pub name: String,
    pub active: bool,
    /// Total of all confirmed receipts
    pub money: Money,
    pub has_bill_source: bool,
    pub orders: i64,
    pub order_today: i64,
    pub order_lastday: i64,
}

impl From<MerchantInfo> for MerchantInfoResponse {
    fn from(info: MerchantInfo) -> Self {
        let MerchantInfo { merchant, orders } = info;
        Self {
            code: CODE_OK,
            msg: "success".into(),
            pid: merchant.id,
            has_bill_source: merchant.has_bill_source(),
            name: merchant.name,
            active: merchant.active,
            money: merchant.balance,
            orders: orders.total,
            order_today: orders.today,
            order_lastday: orders.yesterday,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusResponse {
    pub code: i32,
    pub trade_no: TradeNo,
    pub status: OrderStatusType,
    pub paid_at: Option<DateTime<Utc>>,
    /// Where the payment page should send the browser once the order is paid
    pub return_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayPageOrder {
    pub trade_no: TradeNo,
    pub name: String,
    pub money: Money,
    pub status: OrderStatusType,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Everything the payment page needs to render an order and its payment code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayPageResponse {
    pub code: i32,
    pub order: PayPageOrder,
    pub qrcode_url: Option<String>,
    pub return_url: Option<String>,
}

impl PayPageResponse {
    pub fn new(order: Order, qrcode_url: Option<String>, return_url: Option<String>) -> Self {
        let order = PayPageOrder {
            trade_no: order.trade_no,
            name: order.name,
            money: order.amount,
            status: order.status,
            created_at: order.created_at,
            expires_at: order.expires_at,
        };
        Self { code: CODE_OK, order, qrcode_url, return_url }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenotifyResponse {
    pub code: i32,
    pub msg: String,
    pub generation: i64,
    pub next_attempt_at: DateTime<Utc>,
}

impl From<CallbackJob> for RenotifyResponse {
    fn from(job: CallbackJob) -> Self {
        Self {
            code: CODE_OK,
            msg: "Notification scheduled".into(),
            generation: job.generation,
            next_attempt_at: job.next_attempt_at,
        }
    }
}

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::db_types::TradeNo;

/// Generates a platform trade number: the creation time down to the microsecond followed by six random digits,
/// e.g. `20241018093015123456` + `042817`.
pub fn generate_trade_no(now: DateTime<Utc>) -> TradeNo {
    let suffix = rand::thread_rng().gen_range(0..1_000_000);
    TradeNo(format!("{}{suffix:06}", now.format("%Y%m%d%H%M%S%6f")))
}

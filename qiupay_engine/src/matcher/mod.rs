//! # Bill matching
//!
//! The payment provider never tells us when a payer has paid. Instead, each merchant with pending orders gets a
//! [`MerchantLane`] that periodically fetches the merchant's recent incoming transfers from a
//! [`crate::traits::BillSource`] and looks for a pending order expecting exactly that amount.
//!
//! * [`bill_matcher`] is the pure selection rule: which pending order, if any, a single bill pays.
//! * [`lane`] drives one merchant's polling cycle, with its own exponential backoff when the bill source fails.
pub mod bill_matcher;
pub mod lane;

pub use bill_matcher::{find_match, MatchDecision};
pub use lane::{backoff_delay, CycleReport, LaneError, LaneState, MerchantLane, PollerConfig};

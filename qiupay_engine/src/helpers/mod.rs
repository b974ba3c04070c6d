mod signature;
mod trade_no;

pub use signature::{sign_params, signing_string, verify_params, SignatureError, SIGN_TYPE_MD5};
pub use trade_no::generate_trade_no;

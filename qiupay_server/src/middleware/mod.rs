mod hmac;

pub use hmac::{HmacMiddlewareFactory, HmacMiddlewareService, ADMIN_HMAC_HEADER};

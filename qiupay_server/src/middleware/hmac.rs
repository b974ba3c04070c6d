//! HMAC middleware for Actix Web.
//!
//! Administrative requests must carry a base64-encoded HMAC-SHA256 of the request path in the `X-Qiupay-Hmac-Sha256`
//! header, keyed with `QPG_ADMIN_SECRET`. For example, to cancel order `T123`, sign `/admin/orders/T123/cancel`.
//!
//! Wrap the admin scope with this middleware. Requests with a missing or invalid signature are rejected with
//! `403 Forbidden` before they reach any handler.

use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    error::ErrorForbidden,
    http::header::HeaderMap,
    Error,
};
use futures::future::LocalBoxFuture;
use log::{trace, warn};
use qpg_common::Secret;

use crate::helpers::verify_hmac;

pub const ADMIN_HMAC_HEADER: &str = "X-Qiupay-Hmac-Sha256";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HmacRejection {
    Missing,
    Invalid,
}

impl HmacRejection {
    fn into_error(self) -> Error {
        match self {
            Self::Missing => ErrorForbidden("No HMAC signature found."),
            Self::Invalid => ErrorForbidden("Invalid HMAC signature."),
        }
    }
}

/// Which header to read, which key to check it with, and whether to check at all.
struct HmacPolicy {
    header: String,
    key: Secret<String>,
    enabled: bool,
}

impl HmacPolicy {
    fn check(&self, path: &str, headers: &HeaderMap) -> Result<(), HmacRejection> {
        if !self.enabled {
            trace!("🔐️ HMAC checks are disabled. Allowing request to {path}.");
            return Ok(());
        }
        let supplied = headers.get(self.header.as_str()).ok_or(HmacRejection::Missing)?;
        if verify_hmac(self.key.reveal(), path.as_bytes(), supplied.as_bytes()) {
            Ok(())
        } else {
            Err(HmacRejection::Invalid)
        }
    }
}

pub struct HmacMiddlewareFactory {
    policy: Rc<HmacPolicy>,
}

impl HmacMiddlewareFactory {
    /// With `enabled` false, every request is let through unchecked.
    pub fn new(hmac_header: &str, key: Secret<String>, enabled: bool) -> Self {
        Self { policy: Rc::new(HmacPolicy { header: hmac_header.to_string(), key, enabled }) }
    }
}

impl<S, B> Transform<S, ServiceRequest> for HmacMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = HmacMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(HmacMiddlewareService { policy: Rc::clone(&self.policy), service: Rc::new(service) }))
    }
}

pub struct HmacMiddlewareService<S> {
    policy: Rc<HmacPolicy>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for HmacMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let verdict = self.policy.check(req.path(), req.headers());
        Box::pin(async move {
            match verdict {
                Ok(()) => {
                    trace!("🔐️ HMAC check for {} ✅️", req.path());
                    service.call(req).await
                },
                Err(rejection) => {
                    warn!("🔐️ {rejection:?} HMAC signature on request to {}. Denying access.", req.path());
                    Err(rejection.into_error())
                },
            }
        })
    }
}

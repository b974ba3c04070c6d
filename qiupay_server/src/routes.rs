//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! Every handler is async. Database access and order-flow calls are awaited, so a slow request never blocks the
//! worker thread that serves it.
use std::collections::HashMap;

use actix_web::{get, web, HttpResponse, Responder};
use log::*;
use qiupay_engine::{
    callbacks::CallbackDispatcher,
    db_types::{OrderStatusType, TradeNo},
    traits::{MerchantManagement, PaymentGatewayDatabase, TransitionOutcome},
    OrderFlowApi,
};

use crate::{
    data_objects::{
        JsonResponse,
        MerchantInfoResponse,
        MerchantQueryParams,
        OrderQueryParams,
        OrderQueryResponse,
        OrderStatusResponse,
        PayPageResponse,
        RenotifyResponse,
        SubmitResponse,
        CODE_OK,
    },
    errors::ServerError,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

// ----------------------------------------------   Orders  ----------------------------------------------------
route!(submit => Post "/submit" impl PaymentGatewayDatabase);
/// Creates an order from a merchant's signed, form-encoded request.
pub async fn submit<B: PaymentGatewayDatabase>(
    form: web::Form<HashMap<String, String>>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let params = form.into_inner();
    trace!("💻️ New order request from merchant {:?}", params.get("pid"));
    let created = api.create_order(&params).await?;
    Ok(HttpResponse::Ok().json(SubmitResponse::from(created)))
}

route!(query_order => Get "/api/order" impl PaymentGatewayDatabase);
pub async fn query_order<B: PaymentGatewayDatabase>(
    query: web::Query<OrderQueryParams>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let lookup =
        query.lookup().ok_or_else(|| ServerError::InvalidRequest("trade_no or out_trade_no is required".into()))?;
    trace!("💻️ Merchant #{} queried order {lookup:?}", query.pid);
    let order = api.query_order(query.pid, &query.key, lookup).await?;
    Ok(HttpResponse::Ok().json(OrderQueryResponse::from(order)))
}

route!(merchant_info => Get "/api/merchant" impl PaymentGatewayDatabase);
/// A merchant's own status, balance and order counts.
pub async fn merchant_info<B: PaymentGatewayDatabase>(
    query: web::Query<MerchantQueryParams>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Merchant #{} queried its account", query.pid);
    let info = api.merchant_info(query.pid, &query.key).await?;
    Ok(HttpResponse::Ok().json(MerchantInfoResponse::from(info)))
}

route!(order_status => Get "/api/order/status/{trade_no}" impl PaymentGatewayDatabase);
/// Public status poll for the payment page. Reveals nothing the payer does not already know.
pub async fn order_status<B: PaymentGatewayDatabase>(
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let trade_no = TradeNo::from(path.into_inner());
    let order = api.order_status(&trade_no).await?;
    let return_url = api.return_url(&order).await?;
    Ok(HttpResponse::Ok().json(OrderStatusResponse {
        code: CODE_OK,
        trade_no: order.trade_no,
        status: order.status,
        paid_at: order.paid_at,
        return_url,
    }))
}

route!(pay_page => Get "/api/pay/{trade_no}" impl PaymentGatewayDatabase);
pub async fn pay_page<B: PaymentGatewayDatabase>(
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let trade_no = TradeNo::from(path.into_inner());
    let order = api.order_status(&trade_no).await?;
    // The payment code is only shown while the order can still be paid
    let qrcode_url = match order.status {
        OrderStatusType::Pending => api
            .db()
            .fetch_merchant(order.merchant_id)
            .await
            .map_err(|e| ServerError::BackendError(e.to_string()))?
            .and_then(|m| m.payment_code_url),
        _ => None,
    };
    let return_url = api.return_url(&order).await?;
    Ok(HttpResponse::Ok().json(PayPageResponse::new(order, qrcode_url, return_url)))
}

// ----------------------------------------------   Admin  ----------------------------------------------------
route!(cancel_order => Post "/orders/{trade_no}/cancel" impl PaymentGatewayDatabase);
pub async fn cancel_order<B: PaymentGatewayDatabase>(
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let trade_no = TradeNo::from(path.into_inner());
    info!("💻️ Admin request to cancel order [{trade_no}]");
    match api.cancel_order(&trade_no).await? {
        TransitionOutcome::Committed(_) => Ok(HttpResponse::Ok().json(JsonResponse::success("Order canceled"))),
        TransitionOutcome::Conflict { current } => Ok(HttpResponse::Conflict()
            .json(JsonResponse::failure(format!("Order {trade_no} is already {current}")))),
    }
}

route!(renotify_order => Post "/orders/{trade_no}/renotify" impl PaymentGatewayDatabase);
pub async fn renotify_order<B: PaymentGatewayDatabase>(
    path: web::Path<String>,
    dispatcher: web::Data<CallbackDispatcher<B>>,
) -> Result<HttpResponse, ServerError> {
    let trade_no = TradeNo::from(path.into_inner());
    info!("💻️ Admin request to re-notify the merchant of order [{trade_no}]");
    let job = dispatcher.renotify(&trade_no).await?;
    Ok(HttpResponse::Ok().json(RenotifyResponse::from(job)))
}

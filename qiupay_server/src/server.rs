use std::{sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use qiupay_engine::{
    adapters::{HttpBillSource, HttpNotifier},
    callbacks::CallbackDispatcher,
    OrderFlowApi,
    PaymentGatewayDatabase,
    SqliteDatabase,
};
use qpg_common::Secret;
use tokio::task::JoinHandle;

use crate::{
    callback_worker::start_callback_worker,
    config::ServerConfig,
    errors::ServerError,
    event_hooks::create_event_handlers,
    expiry_worker::{start_expiry_worker, EXPIRY_SWEEP_INTERVAL},
    middleware::{HmacMiddlewareFactory, ADMIN_HMAC_HEADER},
    poller_worker::start_poller_worker,
    routes::{
        health,
        CancelOrderRoute,
        MerchantInfoRoute,
        OrderStatusRoute,
        PayPageRoute,
        QueryOrderRoute,
        RenotifyOrderRoute,
        SubmitRoute,
    },
};

pub const DB_MAX_CONNECTIONS: u32 = 25;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, DB_MAX_CONNECTIONS)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    info!("🚀️ Database ready at {}", config.database_url);

    let handlers = create_event_handlers();
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let api = Arc::new(OrderFlowApi::new(db.clone(), producers).with_order_timeout(config.order_timeout));
    let notifier = HttpNotifier::new(config.callback_timeout).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let dispatcher =
        Arc::new(CallbackDispatcher::new(db, Arc::new(notifier)).with_notify_timeout(config.callback_timeout));

    let mut workers = vec![
        start_expiry_worker(Arc::clone(&api), EXPIRY_SWEEP_INTERVAL),
        start_callback_worker(Arc::clone(&dispatcher), config.callback_interval),
    ];
    if let Some(poller) = start_bill_poller(&config, Arc::clone(&api))? {
        workers.push(poller);
    }

    let srv = create_server_instance(config, api, dispatcher)?;
    let result = srv.await.map_err(|e| ServerError::Unspecified(e.to_string()));
    workers.iter().for_each(JoinHandle::abort);
    result
}

fn start_bill_poller(
    config: &ServerConfig,
    api: Arc<OrderFlowApi<SqliteDatabase>>,
) -> Result<Option<JoinHandle<()>>, ServerError> {
    let Some(url) = &config.bill_source_url else {
        warn!("🔍️ No bill source is configured. Orders will time out unpaid.");
        return Ok(None);
    };
    let source = HttpBillSource::new(url.as_str(), config.poller.fetch_timeout)
        .map_err(|e| ServerError::ConfigurationError(format!("Invalid bill source {url}. {e}")))?;
    info!("🔍️ Polling bills from {}", source.base_url());
    Ok(Some(start_poller_worker(api, Arc::new(source), config.poller.clone())))
}

pub fn create_server_instance(
    config: ServerConfig,
    api: Arc<OrderFlowApi<SqliteDatabase>>,
    dispatcher: Arc<CallbackDispatcher<SqliteDatabase>>,
) -> Result<Server, ServerError> {
    if config.admin_secret.is_some() && !config.admin_hmac_checks {
        warn!("🚨️ The admin routes are mounted without HMAC checks. 🚨️");
    }
    let admin_secret = config.admin_secret.clone();
    let hmac_checks = config.admin_hmac_checks;
    let srv = HttpServer::new(move || {
        let mut app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("qiupay::access_log"))
            .app_data(web::Data::from(Arc::clone(&api)))
            .app_data(web::Data::from(Arc::clone(&dispatcher)))
            .configure(configure_public_routes::<SqliteDatabase>);
        if let Some(secret) = admin_secret.clone() {
            app = app.configure(|cfg| configure_admin_routes::<SqliteDatabase>(cfg, secret, hmac_checks));
        }
        app
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

/// Merchant and payment-page routes. These carry their own authentication (signatures and merchant keys).
pub fn configure_public_routes<B: PaymentGatewayDatabase + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(SubmitRoute::<B>::new())
        .service(QueryOrderRoute::<B>::new())
        .service(MerchantInfoRoute::<B>::new())
        .service(OrderStatusRoute::<B>::new())
        .service(PayPageRoute::<B>::new());
}

/// Administrative routes under `/admin`, behind the HMAC check.
pub fn configure_admin_routes<B: PaymentGatewayDatabase + 'static>(
    cfg: &mut web::ServiceConfig,
    key: Secret<String>,
    hmac_checks: bool,
) {
    let scope = web::scope("/admin")
        .wrap(HmacMiddlewareFactory::new(ADMIN_HMAC_HEADER, key, hmac_checks))
        .service(CancelOrderRoute::<B>::new())
        .service(RenotifyOrderRoute::<B>::new());
    cfg.service(scope);
}

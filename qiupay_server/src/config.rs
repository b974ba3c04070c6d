use std::{env, fmt::Display, str::FromStr, time::Duration};

use log::*;
use qiupay_engine::{matcher::PollerConfig, DEFAULT_ORDER_TIMEOUT_MINUTES};
use qpg_common::{parse_boolean_flag, Secret};

const DEFAULT_QPG_HOST: &str = "127.0.0.1";
const DEFAULT_QPG_PORT: u16 = 8370;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/qiupay.db";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_POLL_MAX_BACKOFF_SECS: u64 = 300;
const DEFAULT_BILL_SOURCE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CALLBACK_INTERVAL_SECS: u64 = 1;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// How long a new order stays payable.
    pub order_timeout: chrono::Duration,
    /// Polling cadence, backoff cap and bill-source timeout of the merchant lanes.
    pub poller: PollerConfig,
    /// Base URL of the bill-source service. Without it, no bills are ever fetched and orders can only time out.
    pub bill_source_url: Option<String>,
    /// Timeout of a single merchant notification.
    pub callback_timeout: Duration,
    /// How often the callback worker looks for due notifications.
    pub callback_interval: Duration,
    /// Key for the admin route HMAC. The admin routes are not mounted at all if this is `None`.
    pub admin_secret: Option<Secret<String>>,
    /// If false, admin requests are not authenticated. **DANGER**
    pub admin_hmac_checks: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_QPG_HOST.to_string(),
            port: DEFAULT_QPG_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            order_timeout: chrono::Duration::minutes(DEFAULT_ORDER_TIMEOUT_MINUTES),
            poller: PollerConfig {
                interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
                max_backoff: Duration::from_secs(DEFAULT_POLL_MAX_BACKOFF_SECS),
                fetch_timeout: Duration::from_secs(DEFAULT_BILL_SOURCE_TIMEOUT_SECS),
            },
            bill_source_url: None,
            callback_timeout: Duration::from_secs(DEFAULT_CALLBACK_TIMEOUT_SECS),
            callback_interval: Duration::from_secs(DEFAULT_CALLBACK_INTERVAL_SECS),
            admin_secret: None,
            admin_hmac_checks: true,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("QPG_HOST").ok().unwrap_or_else(|| DEFAULT_QPG_HOST.into());
        let port = env_or_default("QPG_PORT", DEFAULT_QPG_PORT);
        let database_url = env::var("QPG_DATABASE_URL").ok().unwrap_or_else(|| {
            info!("🪛️ QPG_DATABASE_URL is not set. Using {DEFAULT_DATABASE_URL}");
            DEFAULT_DATABASE_URL.to_string()
        });
        let order_timeout = env_or_default("QPG_ORDER_TIMEOUT", DEFAULT_ORDER_TIMEOUT_MINUTES);
        let order_timeout = if order_timeout > 0 {
            chrono::Duration::minutes(order_timeout)
        } else {
            warn!("🪛️ QPG_ORDER_TIMEOUT must be positive. Using the default of {DEFAULT_ORDER_TIMEOUT_MINUTES} min.");
            chrono::Duration::minutes(DEFAULT_ORDER_TIMEOUT_MINUTES)
        };
        let poller = PollerConfig {
            interval: seconds("QPG_POLL_INTERVAL", DEFAULT_POLL_INTERVAL_SECS),
            max_backoff: seconds("QPG_POLL_MAX_BACKOFF", DEFAULT_POLL_MAX_BACKOFF_SECS),
            fetch_timeout: seconds("QPG_BILL_SOURCE_TIMEOUT", DEFAULT_BILL_SOURCE_TIMEOUT_SECS),
        };
        let bill_source_url = env::var("QPG_BILL_SOURCE_URL").ok().filter(|s| !s.trim().is_empty());
        if bill_source_url.is_none() {
            warn!(
                "🪛️ QPG_BILL_SOURCE_URL is not set. Bill polling is disabled, so no order can be confirmed as paid."
            );
        }
        let callback_timeout = seconds("QPG_CALLBACK_TIMEOUT", DEFAULT_CALLBACK_TIMEOUT_SECS);
        let callback_interval = seconds("QPG_CALLBACK_INTERVAL", DEFAULT_CALLBACK_INTERVAL_SECS);
        let admin_secret = env::var("QPG_ADMIN_SECRET").ok().filter(|s| !s.is_empty()).map(Secret::new);
        if admin_secret.is_none() {
            info!("🪛️ QPG_ADMIN_SECRET is not set. The admin routes are disabled.");
        }
        let admin_hmac_checks = parse_boolean_flag(env::var("QPG_ADMIN_HMAC_CHECKS").ok(), true);
        if !admin_hmac_checks {
            warn!("🚨️ Admin HMAC checks are disabled. Anyone can cancel orders and trigger notifications. 🚨️");
        }
        Self {
            host,
            port,
            database_url,
            order_timeout,
            poller,
            bill_source_url,
            callback_timeout,
            callback_interval,
            admin_secret,
            admin_hmac_checks,
        }
    }
}

fn env_or_default<T>(name: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(name) {
        Ok(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            warn!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => {
            debug!("🪛️ {name} is not set. Using the default value of {default}.");
            default
        },
    }
}

fn seconds(name: &str, default: u64) -> Duration {
    match env_or_default(name, default) {
        0 => {
            warn!("🪛️ {name} must be at least one second. Using the default, {default}s, instead.");
            Duration::from_secs(default)
        },
        secs => Duration::from_secs(secs),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8370);
        assert_eq!(config.order_timeout, chrono::Duration::minutes(10));
        assert_eq!(config.poller.interval, Duration::from_secs(5));
        assert_eq!(config.poller.max_backoff, Duration::from_secs(300));
        assert!(config.admin_secret.is_none());
        assert!(config.admin_hmac_checks);
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        env::set_var("QPG_TEST_PORT_VALUE", "not-a-port");
        assert_eq!(env_or_default("QPG_TEST_PORT_VALUE", 8370u16), 8370);
        env::set_var("QPG_TEST_SECONDS_VALUE", "0");
        assert_eq!(seconds("QPG_TEST_SECONDS_VALUE", 7), Duration::from_secs(7));
        env::set_var("QPG_TEST_SECONDS_VALUE", "42");
        assert_eq!(seconds("QPG_TEST_SECONDS_VALUE", 7), Duration::from_secs(42));
        assert_eq!(env_or_default("QPG_TEST_UNSET_VALUE", 3i64), 3);
    }
}

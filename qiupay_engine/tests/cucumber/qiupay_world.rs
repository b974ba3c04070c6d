use std::{collections::HashMap, sync::Arc};

use cucumber::World;
use log::*;
use qiupay_engine::{
    db_types::Merchant,
    events::EventProducers,
    order_objects::OrderCreated,
    test_utils::{
        fakes::ScriptedBillSource,
        prepare_env::{prepare_test_env, random_db_path},
    },
    OrderFlowApi,
    OrderFlowError,
    SqliteDatabase,
};

#[derive(Default, Debug, World)]
pub struct QiuPayWorld {
    pub system: Option<PaymentSystem>,
}

#[derive(Debug)]
pub struct PaymentSystem {
    pub db_path: String,
    pub api: Arc<OrderFlowApi<SqliteDatabase>>,
    pub bills: Arc<ScriptedBillSource>,
    pub merchants: HashMap<String, Merchant>,
    pub orders: HashMap<String, OrderCreated>,
    pub last_error: Option<OrderFlowError>,
}

impl QiuPayWorld {
    pub fn system(&mut self) -> &mut PaymentSystem {
        self.system.as_mut().expect("Payment system not initialised")
    }
}

impl PaymentSystem {
    pub async fn new() -> Self {
        let db_path = random_db_path();
        let db = prepare_test_env(&db_path).await;
        debug!("Created database: {db_path}");
        let api = Arc::new(OrderFlowApi::new(db, EventProducers::default()));
        Self {
            db_path,
            api,
            bills: Arc::new(ScriptedBillSource::new()),
            merchants: HashMap::new(),
            orders: HashMap::new(),
            last_error: None,
        }
    }

    pub fn merchant(&self, name: &str) -> &Merchant {
        self.merchants.get(name).unwrap_or_else(|| panic!("Unknown merchant {name}"))
    }

    pub fn order(&self, out_trade_no: &str) -> &OrderCreated {
        self.orders.get(out_trade_no).unwrap_or_else(|| panic!("Unknown order {out_trade_no}"))
    }
}

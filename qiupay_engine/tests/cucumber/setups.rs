use cucumber::given;
use qiupay_engine::{db_types::NewMerchant, MerchantManagement};

use crate::cucumber::{qiupay_world::PaymentSystem, QiuPayWorld};

pub const MERCHANT_KEY: &str = "cucumber-merchant-key";

#[given("a fresh install")]
async fn fresh_database(world: &mut QiuPayWorld) {
    let system = PaymentSystem::new().await;
    world.system = Some(system);
}

#[given(expr = "merchant '{word}' with a linked payment account")]
async fn merchant_with_account(world: &mut QiuPayWorld, name: String) {
    let system = world.system();
    let merchant = NewMerchant::new(name.as_str(), MERCHANT_KEY).with_bill_credential(format!("cred-{name}"));
    let merchant = system.api.db().insert_merchant(merchant).await.expect("Error inserting merchant");
    system.merchants.insert(name, merchant);
}

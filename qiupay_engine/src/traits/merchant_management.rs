use crate::{
    db_types::{Merchant, NewMerchant},
    traits::PaymentGatewayError,
};

/// The `MerchantManagement` trait defines behaviour for managing merchants.
///
/// Merchant records are created and edited by the administrative interface. The engine only needs to look them up,
/// toggle them, and know which of them should be polled.
#[allow(async_fn_in_trait)]
pub trait MerchantManagement {
    async fn insert_merchant(&self, merchant: NewMerchant) -> Result<Merchant, PaymentGatewayError>;

    /// Fetches the merchant with the given id. If no merchant exists, `None` is returned.
    async fn fetch_merchant(&self, merchant_id: i64) -> Result<Option<Merchant>, PaymentGatewayError>;

    async fn set_merchant_active(&self, merchant_id: i64, active: bool) -> Result<Merchant, PaymentGatewayError>;

    /// Replaces (or with `None`, removes) the merchant's bill-source credential.
    async fn update_bill_credential(
        &self,
        merchant_id: i64,
        credential: Option<String>,
    ) -> Result<Merchant, PaymentGatewayError>;

    /// Merchants that have at least one pending order and a configured bill source.
    async fn fetch_pollable_merchants(&self) -> Result<Vec<Merchant>, PaymentGatewayError>;
}

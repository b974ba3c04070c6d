use async_trait::async_trait;
use mockall::mock;
use qiupay_engine::traits::{CallbackRequest, DeliveryFailure, Notifier, NotifyResponse};

mock! {
    pub Notifier {}
    #[async_trait]
    impl Notifier for Notifier {
        async fn notify(&self, request: &CallbackRequest) -> Result<NotifyResponse, DeliveryFailure>;
    }
}

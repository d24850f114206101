use crate::domain_model::*;
use crate::domain_port::StoreError;

#[async_trait::async_trait]
pub trait PaymentRepo: Send + Sync {
    async fn insert(&self, payment: &Payment) -> Result<(), StoreError>;

    async fn get(&self, payment_id: &PaymentId) -> Result<Option<Payment>, StoreError>;
}

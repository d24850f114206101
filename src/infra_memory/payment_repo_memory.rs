use crate::domain_model::*;
use crate::domain_port::*;
use dashmap::DashMap;

#[derive(Default)]
pub struct MemoryPaymentRepo {
    payments: DashMap<PaymentId, Payment>,
}

impl MemoryPaymentRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.payments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payments.is_empty()
    }
}

#[async_trait::async_trait]
impl PaymentRepo for MemoryPaymentRepo {
    async fn insert(&self, payment: &Payment) -> Result<(), StoreError> {
        if self.payments.contains_key(&payment.payment_id) {
            return Err(StoreError::DuplicateKey);
        }
        self.payments
            .insert(payment.payment_id.clone(), payment.clone());
        Ok(())
    }

    async fn get(&self, payment_id: &PaymentId) -> Result<Option<Payment>, StoreError> {
        Ok(self.payments.get(payment_id).map(|p| p.value().clone()))
    }
}

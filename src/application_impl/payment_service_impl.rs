use super::IdempotencyEngine;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::logger::*;
use chrono::Utc;
use std::sync::Arc;

pub struct RealPaymentService {
    engine: Arc<IdempotencyEngine>,
    payment_repo: Arc<dyn PaymentRepo>,
}

impl RealPaymentService {
    pub fn new(engine: Arc<IdempotencyEngine>, payment_repo: Arc<dyn PaymentRepo>) -> Self {
        Self {
            engine,
            payment_repo,
        }
    }

    fn validate(request: &TransferRequest) -> Result<(), PaymentError> {
        if request.from_account.trim().is_empty() || request.to_account.trim().is_empty() {
            return Err(PaymentError::InvalidTransfer(
                "both accounts are required".to_string(),
            ));
        }
        if request.from_account == request.to_account {
            return Err(PaymentError::InvalidTransfer(
                "cannot transfer to the same account".to_string(),
            ));
        }
        if request.amount < 1 {
            return Err(PaymentError::InvalidTransfer(
                "amount must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

async fn transfer(
    payment_repo: Arc<dyn PaymentRepo>,
    request: TransferRequest,
) -> Result<PaymentReceipt, StoreError> {
    let payment = Payment {
        payment_id: PaymentId::generate(),
        from_account: request.from_account,
        to_account: request.to_account,
        amount: request.amount,
        status: PaymentStatus::Success,
        created_at: Utc::now(),
    };
    payment_repo.insert(&payment).await?;
    info!(payment_id = %payment.payment_id, amount = payment.amount, "transfer recorded");

    Ok(PaymentReceipt {
        success: true,
        payment_id: payment.payment_id,
    })
}

#[async_trait::async_trait]
impl PaymentService for RealPaymentService {
    async fn pay(
        &self,
        key: IdempotencyKey,
        request: TransferRequest,
    ) -> Result<PaymentReceipt, PaymentError> {
        Self::validate(&request)?;

        let payment_repo = self.payment_repo.clone();
        let receipt = self
            .engine
            .execute(&key, request, move |request| transfer(payment_repo, request))
            .await?;
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application_impl::IdempotencyConfig;
    use crate::infra_memory::{MemoryIdempotencyRepo, MemoryPaymentRepo};

    fn service() -> (RealPaymentService, Arc<MemoryPaymentRepo>) {
        let payments = Arc::new(MemoryPaymentRepo::new());
        let engine = Arc::new(IdempotencyEngine::new(
            Arc::new(MemoryIdempotencyRepo::new()),
            IdempotencyConfig::default(),
        ));
        (RealPaymentService::new(engine, payments.clone()), payments)
    }

    fn request(amount: u64) -> TransferRequest {
        TransferRequest {
            from_account: "acc-a".to_string(),
            to_account: "acc-b".to_string(),
            amount,
        }
    }

    #[tokio::test]
    async fn retry_returns_the_first_receipt_without_a_second_transfer() {
        let (service, payments) = service();
        let key = IdempotencyKey::parse("k1").unwrap();

        let first = service.pay(key.clone(), request(10)).await.unwrap();
        let retry = service.pay(key, request(10)).await.unwrap();

        assert!(first.success);
        assert_eq!(first, retry);
        assert_eq!(payments.len(), 1);
        let stored = payments.get(&first.payment_id).await.unwrap().unwrap();
        assert_eq!(stored.amount, 10);
        assert_eq!(stored.status, PaymentStatus::Success);
    }

    #[tokio::test]
    async fn different_amount_under_same_key_conflicts() {
        let (service, payments) = service();
        let key = IdempotencyKey::parse("k1").unwrap();

        service.pay(key.clone(), request(10)).await.unwrap();
        let err = service.pay(key, request(11)).await.unwrap_err();

        assert!(matches!(err, PaymentError::KeyConflict));
        assert_eq!(payments.len(), 1);
    }

    #[tokio::test]
    async fn invalid_transfers_are_rejected_before_claiming_the_key() {
        let (service, payments) = service();
        let key = IdempotencyKey::parse("k1").unwrap();

        let err = service.pay(key.clone(), request(0)).await.unwrap_err();
        assert!(matches!(err, PaymentError::InvalidTransfer(_)));

        let same_account = TransferRequest {
            from_account: "acc-a".to_string(),
            to_account: "acc-a".to_string(),
            amount: 5,
        };
        let err = service.pay(key.clone(), same_account).await.unwrap_err();
        assert!(matches!(err, PaymentError::InvalidTransfer(_)));

        // The key was never claimed, so a valid request may still use it.
        service.pay(key, request(5)).await.unwrap();
        assert_eq!(payments.len(), 1);
    }
}

use crate::application_port::IdempotencyError;
use crate::domain_model::*;
use crate::domain_port::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("invalid transfer: {0}")]
    InvalidTransfer(String),
    #[error("idempotency key reused with a different payload")]
    KeyConflict,
    #[error("payment is still being processed")]
    InFlight,
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

/// The transfer itself only fails when the payment row cannot be written.
impl From<IdempotencyError<StoreError>> for PaymentError {
    fn from(err: IdempotencyError<StoreError>) -> Self {
        match err {
            IdempotencyError::KeyConflict => PaymentError::KeyConflict,
            IdempotencyError::OperationInFlight => PaymentError::InFlight,
            IdempotencyError::Operation(StoreError::Unavailable(e))
            | IdempotencyError::StoreUnavailable(e) => PaymentError::StoreUnavailable(e),
            IdempotencyError::Operation(e) => PaymentError::InternalError(e.to_string()),
            IdempotencyError::Internal(e) => PaymentError::InternalError(e),
        }
    }
}

#[async_trait::async_trait]
pub trait PaymentService: Send + Sync {
    /// Execute a transfer at most once per idempotency key. Retries with the
    /// same key and payload get the original receipt back.
    async fn pay(
        &self,
        key: IdempotencyKey,
        request: TransferRequest,
    ) -> Result<PaymentReceipt, PaymentError>;
}

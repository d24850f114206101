use crate::domain_port::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum IdempotencyError<E> {
    /// The key was already used for a request with a different payload.
    #[error("idempotency key reused with a different payload")]
    KeyConflict,
    /// Another attempt holding this key has not finished yet.
    #[error("operation with this idempotency key is still in flight")]
    OperationInFlight,
    #[error("operation failed: {0}")]
    Operation(E),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl<E> From<StoreError> for IdempotencyError<E> {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(e) => IdempotencyError::StoreUnavailable(e),
            other => IdempotencyError::Internal(other.to_string()),
        }
    }
}

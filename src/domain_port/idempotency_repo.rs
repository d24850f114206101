use crate::domain_model::*;
use crate::domain_port::StoreError;
use chrono::{DateTime, Utc};

pub enum IdempotencyClaim {
    /// The record was created by this call; the caller owns execution.
    Won,
    /// A record with this key already exists.
    Existing(IdempotencyRecord),
}

#[async_trait::async_trait]
pub trait IdempotencyRepo: Send + Sync {
    /// Create-if-absent. On a uniqueness violation the stored record is re-read
    /// and returned as `Existing`.
    async fn claim(&self, record: &IdempotencyRecord) -> Result<IdempotencyClaim, StoreError>;

    /// Take ownership of a released `Processing` record with the same digest.
    /// Returns `true` only for the single caller whose conditional update won.
    async fn reclaim(
        &self,
        key: &IdempotencyKey,
        digest: &RequestDigest,
        token: ClaimToken,
    ) -> Result<bool, StoreError>;

    /// `Processing` → `Completed` with the result attached, only while `token`
    /// owns the record. Returns `false` otherwise.
    async fn complete(
        &self,
        key: &IdempotencyKey,
        token: ClaimToken,
        result: &serde_json::Value,
    ) -> Result<bool, StoreError>;

    /// Give up ownership after a failed attempt, leaving the record in
    /// `Processing`. A no-op unless `token` owns the record.
    async fn release(&self, key: &IdempotencyKey, token: ClaimToken) -> Result<bool, StoreError>;

    /// Delete records created before `created_before`.
    async fn purge_expired(&self, created_before: DateTime<Utc>) -> Result<u64, StoreError>;
}

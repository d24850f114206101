use crate::domain_model::*;
use crate::domain_port::StoreError;
use chrono::{DateTime, Utc};

#[async_trait::async_trait]
pub trait RefreshSessionRepo: Send + Sync {
    /// Persist a new session for `user_id`. Fails with `DuplicateKey` if the hash
    /// is already in use.
    async fn create(
        &self,
        user_id: UserId,
        secret_hash: &SecretHash,
        now: DateTime<Utc>,
    ) -> Result<RefreshSession, StoreError>;

    /// Atomically consume the live session holding `consumed` and create its
    /// successor for the same user, recording a tombstone for `consumed`.
    /// Sessions created before `valid_since` are not redeemable.
    ///
    /// Of several concurrent calls with the same `consumed` hash at most one
    /// returns `Some`.
    async fn rotate(
        &self,
        consumed: &SecretHash,
        successor: &SecretHash,
        now: DateTime<Utc>,
        valid_since: DateTime<Utc>,
    ) -> Result<Option<RefreshSession>, StoreError>;

    /// Owner of a secret that was already redeemed, if its tombstone is still kept.
    async fn find_consumed(&self, secret_hash: &SecretHash) -> Result<Option<UserId>, StoreError>;

    /// Delete one session. Returns whether it existed.
    async fn revoke(&self, secret_hash: &SecretHash) -> Result<bool, StoreError>;

    /// Delete every session owned by `user_id`. Returns the number removed.
    async fn revoke_user(&self, user_id: UserId) -> Result<u64, StoreError>;

    /// Delete sessions and tombstones older than `valid_since`.
    async fn purge_expired(&self, valid_since: DateTime<Utc>) -> Result<u64, StoreError>;
}

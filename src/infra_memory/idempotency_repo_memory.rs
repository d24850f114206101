use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Single-process idempotency store. Each primitive runs under the shard lock of
/// its key, which gives the same create-if-absent and conditional-update
/// guarantees as the SQL adapter.
#[derive(Default)]
pub struct MemoryIdempotencyRepo {
    records: DashMap<IdempotencyKey, IdempotencyRecord>,
}

impl MemoryIdempotencyRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &IdempotencyKey) -> Option<IdempotencyRecord> {
        self.records.get(key).map(|r| r.value().clone())
    }
}

#[async_trait::async_trait]
impl IdempotencyRepo for MemoryIdempotencyRepo {
    async fn claim(&self, record: &IdempotencyRecord) -> Result<IdempotencyClaim, StoreError> {
        match self.records.entry(record.key.clone()) {
            Entry::Occupied(existing) => Ok(IdempotencyClaim::Existing(existing.get().clone())),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(IdempotencyClaim::Won)
            }
        }
    }

    async fn reclaim(
        &self,
        key: &IdempotencyKey,
        digest: &RequestDigest,
        token: ClaimToken,
    ) -> Result<bool, StoreError> {
        let Some(mut record) = self.records.get_mut(key) else {
            return Ok(false);
        };
        if record.request_digest != *digest || !record.is_released() {
            return Ok(false);
        }
        record.claim_token = Some(token);
        Ok(true)
    }

    async fn complete(
        &self,
        key: &IdempotencyKey,
        token: ClaimToken,
        result: &serde_json::Value,
    ) -> Result<bool, StoreError> {
        let Some(mut record) = self.records.get_mut(key) else {
            return Ok(false);
        };
        if record.status != IdempotencyStatus::Processing || record.claim_token != Some(token) {
            return Ok(false);
        }
        record.status = IdempotencyStatus::Completed;
        record.cached_result = Some(result.clone());
        record.claim_token = None;
        Ok(true)
    }

    async fn release(&self, key: &IdempotencyKey, token: ClaimToken) -> Result<bool, StoreError> {
        let Some(mut record) = self.records.get_mut(key) else {
            return Ok(false);
        };
        if record.status != IdempotencyStatus::Processing || record.claim_token != Some(token) {
            return Ok(false);
        }
        record.claim_token = None;
        Ok(true)
    }

    async fn purge_expired(&self, created_before: DateTime<Utc>) -> Result<u64, StoreError> {
        let before = self.records.len();
        self.records.retain(|_, r| r.created_at >= created_before);
        Ok(before.saturating_sub(self.records.len()) as u64)
    }
}

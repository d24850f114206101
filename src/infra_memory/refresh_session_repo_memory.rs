use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

struct Tombstone {
    user_id: UserId,
    consumed_at: DateTime<Utc>,
}

/// Single-process refresh-session store. `DashMap::remove` is the gate that
/// decides which of several concurrent rotations owns a secret.
#[derive(Default)]
pub struct MemoryRefreshSessionRepo {
    sessions: DashMap<SecretHash, RefreshSession>,
    consumed: DashMap<SecretHash, Tombstone>,
}

impl MemoryRefreshSessionRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_count(&self, user_id: UserId) -> usize {
        self.sessions
            .iter()
            .filter(|s| s.value().user_id == user_id)
            .count()
    }

    fn insert_new(&self, session: RefreshSession) -> Result<RefreshSession, StoreError> {
        match self.sessions.entry(session.secret_hash.clone()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateKey),
            Entry::Vacant(slot) => {
                slot.insert(session.clone());
                Ok(session)
            }
        }
    }
}

#[async_trait::async_trait]
impl RefreshSessionRepo for MemoryRefreshSessionRepo {
    async fn create(
        &self,
        user_id: UserId,
        secret_hash: &SecretHash,
        now: DateTime<Utc>,
    ) -> Result<RefreshSession, StoreError> {
        self.insert_new(RefreshSession::new(user_id, secret_hash.clone(), now))
    }

    async fn rotate(
        &self,
        consumed: &SecretHash,
        successor: &SecretHash,
        now: DateTime<Utc>,
        valid_since: DateTime<Utc>,
    ) -> Result<Option<RefreshSession>, StoreError> {
        let Some((_, session)) = self.sessions.remove(consumed) else {
            return Ok(None);
        };
        if !session.is_live(valid_since) {
            return Ok(None);
        }
        self.consumed.insert(
            consumed.clone(),
            Tombstone {
                user_id: session.user_id,
                consumed_at: now,
            },
        );
        self.insert_new(RefreshSession::new(session.user_id, successor.clone(), now))
            .map(Some)
    }

    async fn find_consumed(&self, secret_hash: &SecretHash) -> Result<Option<UserId>, StoreError> {
        Ok(self.consumed.get(secret_hash).map(|t| t.user_id))
    }

    async fn revoke(&self, secret_hash: &SecretHash) -> Result<bool, StoreError> {
        Ok(self.sessions.remove(secret_hash).is_some())
    }

    async fn revoke_user(&self, user_id: UserId) -> Result<u64, StoreError> {
        let owned: Vec<SecretHash> = self
            .sessions
            .iter()
            .filter(|s| s.value().user_id == user_id)
            .map(|s| s.key().clone())
            .collect();
        let removed = owned
            .iter()
            .filter(|hash| {
                self.sessions
                    .remove_if(*hash, |_, s| s.user_id == user_id)
                    .is_some()
            })
            .count();
        Ok(removed as u64)
    }

    async fn purge_expired(&self, valid_since: DateTime<Utc>) -> Result<u64, StoreError> {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.is_live(valid_since));
        self.consumed.retain(|_, t| t.consumed_at >= valid_since);
        Ok(before.saturating_sub(self.sessions.len()) as u64)
    }
}

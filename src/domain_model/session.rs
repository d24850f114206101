use super::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct SessionId(pub uuid::Uuid);

impl SessionId {
    pub fn new_random() -> Self {
        SessionId(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lowercase hex SHA-256 of a refresh secret. The plaintext is never stored.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SecretHash(pub String);

impl fmt::Display for SecretHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One redeemable refresh secret. Rotation deletes this record and creates a
/// successor; the secret hash of a record never changes.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RefreshSession {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub secret_hash: SecretHash,
    pub created_at: DateTime<Utc>,
}

impl RefreshSession {
    pub fn new(user_id: UserId, secret_hash: SecretHash, created_at: DateTime<Utc>) -> Self {
        Self {
            session_id: SessionId::new_random(),
            user_id,
            secret_hash,
            created_at,
        }
    }

    /// A session issued before `valid_since` can no longer be redeemed.
    pub fn is_live(&self, valid_since: DateTime<Utc>) -> bool {
        self.created_at >= valid_since
    }
}

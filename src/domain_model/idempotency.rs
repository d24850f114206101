use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest key accepted; matches the width of the `idem_key` column.
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// Client-chosen token naming one logical operation attempt.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdempotencyKey(String);

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum InvalidIdempotencyKey {
    #[error("idempotency key is empty")]
    Empty,
    #[error("idempotency key longer than {MAX_IDEMPOTENCY_KEY_LEN} bytes")]
    TooLong,
}

impl IdempotencyKey {
    /// Keys are opaque: stored byte for byte, compared exactly. Only a blank
    /// or oversized key is refused.
    pub fn parse(raw: impl Into<String>) -> Result<Self, InvalidIdempotencyKey> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(InvalidIdempotencyKey::Empty);
        }
        if raw.len() > MAX_IDEMPOTENCY_KEY_LEN {
            return Err(InvalidIdempotencyKey::TooLong);
        }
        Ok(IdempotencyKey(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for IdempotencyKey {
    type Error = InvalidIdempotencyKey;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        IdempotencyKey::parse(value)
    }
}

impl From<IdempotencyKey> for String {
    fn from(key: IdempotencyKey) -> Self {
        key.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies the one attempt currently allowed to execute under a key.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct ClaimToken(pub uuid::Uuid);

impl ClaimToken {
    pub fn new_random() -> Self {
        ClaimToken(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for ClaimToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lowercase hex SHA-256 of a normalized request payload.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct RequestDigest(pub String);

impl fmt::Display for RequestDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum IdempotencyStatus {
    Processing,
    Completed,
}

impl IdempotencyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdempotencyStatus::Processing => "processing",
            IdempotencyStatus::Completed => "completed",
        }
    }
}

impl std::str::FromStr for IdempotencyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(IdempotencyStatus::Processing),
            "completed" => Ok(IdempotencyStatus::Completed),
            other => Err(format!("unknown idempotency status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IdempotencyRecord {
    pub key: IdempotencyKey,
    pub request_digest: RequestDigest,
    pub status: IdempotencyStatus,
    /// Set only once `status` is `Completed`.
    pub cached_result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    /// Attempt that owns execution. Cleared when that attempt fails, which is
    /// the only way a `Processing` record becomes claimable again.
    pub claim_token: Option<ClaimToken>,
}

impl IdempotencyRecord {
    pub fn new_processing(
        key: IdempotencyKey,
        request_digest: RequestDigest,
        now: DateTime<Utc>,
        claim_token: ClaimToken,
    ) -> Self {
        Self {
            key,
            request_digest,
            status: IdempotencyStatus::Processing,
            cached_result: None,
            created_at: now,
            claim_token: Some(claim_token),
        }
    }

    /// A released `Processing` record: its last attempt failed and nobody owns it.
    pub fn is_released(&self) -> bool {
        self.status == IdempotencyStatus::Processing && self.claim_token.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_opaque_and_bounded() {
        assert_eq!(IdempotencyKey::parse(" k1").unwrap().as_str(), " k1");
        assert_ne!(
            IdempotencyKey::parse(" k1").unwrap(),
            IdempotencyKey::parse("k1").unwrap()
        );
        assert_ne!(
            IdempotencyKey::parse("abc").unwrap(),
            IdempotencyKey::parse("ABC").unwrap()
        );
        assert_eq!(
            IdempotencyKey::parse("   "),
            Err(InvalidIdempotencyKey::Empty)
        );
        let long = "x".repeat(MAX_IDEMPOTENCY_KEY_LEN + 1);
        assert_eq!(
            IdempotencyKey::parse(long),
            Err(InvalidIdempotencyKey::TooLong)
        );
    }

    #[test]
    fn status_round_trips_through_column_text() {
        for status in [IdempotencyStatus::Processing, IdempotencyStatus::Completed] {
            assert_eq!(status.as_str().parse::<IdempotencyStatus>(), Ok(status));
        }
        assert!("failed".parse::<IdempotencyStatus>().is_err());
    }

    #[test]
    fn only_unowned_processing_records_are_released() {
        let mut record = IdempotencyRecord::new_processing(
            IdempotencyKey::parse("k").unwrap(),
            RequestDigest("d".into()),
            Utc::now(),
            ClaimToken::new_random(),
        );
        assert!(!record.is_released());
        record.claim_token = None;
        assert!(record.is_released());
        record.status = IdempotencyStatus::Completed;
        assert!(!record.is_released());
    }
}

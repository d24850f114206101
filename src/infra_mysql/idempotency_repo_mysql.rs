use super::util::{is_dup_key, store_err};
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};

pub struct MySqlIdempotencyRepo {
    pool: MySqlPool,
}

impl MySqlIdempotencyRepo {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: MySqlRow) -> Result<IdempotencyRecord, StoreError> {
        let key: String = row
            .try_get("idem_key")
            .map_err(|e| store_err("idem key decode", e))?;
        let key = IdempotencyKey::parse(key).map_err(|e| StoreError::Corrupt(e.to_string()))?;

        let request_digest: String = row
            .try_get("request_digest")
            .map_err(|e| store_err("digest decode", e))?;

        let status = row
            .try_get::<&str, _>("status")
            .map_err(|e| store_err("status decode", e))?
            .parse::<IdempotencyStatus>()
            .map_err(StoreError::Corrupt)?;

        let cached_result = row
            .try_get::<Option<String>, _>("cached_result")
            .map_err(|e| store_err("result decode", e))?
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(|e| StoreError::Corrupt(format!("cached result json: {e}")))?;

        let created_at: DateTime<Utc> = row
            .try_get("created_at")
            .map_err(|e| store_err("created_at decode", e))?;
        let claim_token = row
            .try_get::<Option<uuid::Uuid>, _>("claim_token")
            .map_err(|e| store_err("claim_token decode", e))?
            .map(ClaimToken);

        Ok(IdempotencyRecord {
            key,
            request_digest: RequestDigest(request_digest),
            status,
            cached_result,
            created_at,
            claim_token,
        })
    }
}

#[async_trait::async_trait]
impl IdempotencyRepo for MySqlIdempotencyRepo {
    async fn claim(&self, record: &IdempotencyRecord) -> Result<IdempotencyClaim, StoreError> {
        let res = sqlx::query(
            r#"
INSERT INTO idempotency_record (idem_key, request_digest, status, created_at, claim_token)
VALUES (?, ?, 'processing', ?, ?)
"#,
        )
        .bind(record.key.as_str())
        .bind(&record.request_digest.0)
        .bind(record.created_at)
        .bind(record.claim_token.map(|t| t.0))
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => Ok(IdempotencyClaim::Won),
            Err(e) if is_dup_key(&e) => {
                let row = sqlx::query(
                    r#"
SELECT idem_key, request_digest, status, cached_result, created_at, claim_token
FROM idempotency_record
WHERE idem_key=?
"#,
                )
                .bind(record.key.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| store_err("idem select", e))?;

                Ok(IdempotencyClaim::Existing(Self::row_to_record(row)?))
            }
            Err(e) => Err(store_err("idem insert", e)),
        }
    }

    async fn reclaim(
        &self,
        key: &IdempotencyKey,
        digest: &RequestDigest,
        token: ClaimToken,
    ) -> Result<bool, StoreError> {
        let res = sqlx::query(
            r#"
UPDATE idempotency_record SET claim_token=?
WHERE idem_key=? AND status='processing' AND request_digest=? AND claim_token IS NULL
"#,
        )
        .bind(token.0)
        .bind(key.as_str())
        .bind(&digest.0)
        .execute(&self.pool)
        .await
        .map_err(|e| store_err("idem reclaim", e))?;

        Ok(res.rows_affected() == 1)
    }

    async fn complete(
        &self,
        key: &IdempotencyKey,
        token: ClaimToken,
        result: &serde_json::Value,
    ) -> Result<bool, StoreError> {
        let res = sqlx::query(
            r#"
UPDATE idempotency_record SET status='completed', cached_result=?, claim_token=NULL
WHERE idem_key=? AND status='processing' AND claim_token=?
"#,
        )
        .bind(result.to_string())
        .bind(key.as_str())
        .bind(token.0)
        .execute(&self.pool)
        .await
        .map_err(|e| store_err("idem complete", e))?;

        Ok(res.rows_affected() == 1)
    }

    async fn release(&self, key: &IdempotencyKey, token: ClaimToken) -> Result<bool, StoreError> {
        let res = sqlx::query(
            r#"
UPDATE idempotency_record SET claim_token=NULL
WHERE idem_key=? AND status='processing' AND claim_token=?
"#,
        )
        .bind(key.as_str())
        .bind(token.0)
        .execute(&self.pool)
        .await
        .map_err(|e| store_err("idem release", e))?;

        Ok(res.rows_affected() == 1)
    }

    async fn purge_expired(&self, created_before: DateTime<Utc>) -> Result<u64, StoreError> {
        let res = sqlx::query("DELETE FROM idempotency_record WHERE created_at < ?")
            .bind(created_before)
            .execute(&self.pool)
            .await
            .map_err(|e| store_err("idem purge", e))?;

        Ok(res.rows_affected())
    }
}

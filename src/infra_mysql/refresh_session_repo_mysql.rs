use super::util::store_err;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use sqlx::{MySqlConnection, MySqlPool, Row};

pub struct MySqlRefreshSessionRepo {
    pool: MySqlPool,
}

impl MySqlRefreshSessionRepo {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn insert_session(
        conn: &mut MySqlConnection,
        session: &RefreshSession,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
INSERT INTO refresh_session (session_id, user_id, secret_hash, created_at)
VALUES (?, ?, ?, ?)
"#,
        )
        .bind(session.session_id)
        .bind(session.user_id)
        .bind(&session.secret_hash.0)
        .bind(session.created_at)
        .execute(conn)
        .await
        .map_err(|e| store_err("session insert", e))?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl RefreshSessionRepo for MySqlRefreshSessionRepo {
    async fn create(
        &self,
        user_id: UserId,
        secret_hash: &SecretHash,
        now: DateTime<Utc>,
    ) -> Result<RefreshSession, StoreError> {
        let session = RefreshSession::new(user_id, secret_hash.clone(), now);
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| store_err("session acquire", e))?;
        Self::insert_session(&mut *conn, &session).await?;
        Ok(session)
    }

    async fn rotate(
        &self,
        consumed: &SecretHash,
        successor: &SecretHash,
        now: DateTime<Utc>,
        valid_since: DateTime<Utc>,
    ) -> Result<Option<RefreshSession>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_err("session begin", e))?;

        let row = sqlx::query(
            r#"
SELECT user_id, created_at FROM refresh_session
WHERE secret_hash=?
FOR UPDATE
"#,
        )
        .bind(&consumed.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| store_err("session select", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let user_id: UserId = row
            .try_get("user_id")
            .map_err(|e| store_err("user_id decode", e))?;
        let created_at: DateTime<Utc> = row
            .try_get("created_at")
            .map_err(|e| store_err("created_at decode", e))?;

        // The delete decides the winner: a concurrent rotation that got past the
        // select sees zero affected rows.
        let deleted = sqlx::query("DELETE FROM refresh_session WHERE secret_hash=?")
            .bind(&consumed.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| store_err("session delete", e))?;
        if deleted.rows_affected() != 1 {
            return Ok(None);
        }

        if created_at < valid_since {
            tx.commit()
                .await
                .map_err(|e| store_err("session commit", e))?;
            return Ok(None);
        }

        sqlx::query(
            r#"
INSERT INTO refresh_session_consumed (secret_hash, user_id, consumed_at)
VALUES (?, ?, ?)
"#,
        )
        .bind(&consumed.0)
        .bind(user_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| store_err("tombstone insert", e))?;

        let session = RefreshSession::new(user_id, successor.clone(), now);
        Self::insert_session(&mut *tx, &session).await?;

        tx.commit()
            .await
            .map_err(|e| store_err("session commit", e))?;

        Ok(Some(session))
    }

    async fn find_consumed(&self, secret_hash: &SecretHash) -> Result<Option<UserId>, StoreError> {
        let row = sqlx::query("SELECT user_id FROM refresh_session_consumed WHERE secret_hash=?")
            .bind(&secret_hash.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_err("tombstone select", e))?;

        row.map(|r| {
            r.try_get::<UserId, _>("user_id")
                .map_err(|e| store_err("user_id decode", e))
        })
        .transpose()
    }

    async fn revoke(&self, secret_hash: &SecretHash) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM refresh_session WHERE secret_hash=?")
            .bind(&secret_hash.0)
            .execute(&self.pool)
            .await
            .map_err(|e| store_err("session revoke", e))?;

        Ok(res.rows_affected() == 1)
    }

    async fn revoke_user(&self, user_id: UserId) -> Result<u64, StoreError> {
        let res = sqlx::query("DELETE FROM refresh_session WHERE user_id=?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| store_err("session revoke_user", e))?;

        Ok(res.rows_affected())
    }

    async fn purge_expired(&self, valid_since: DateTime<Utc>) -> Result<u64, StoreError> {
        let res = sqlx::query("DELETE FROM refresh_session WHERE created_at < ?")
            .bind(valid_since)
            .execute(&self.pool)
            .await
            .map_err(|e| store_err("session purge", e))?;

        sqlx::query("DELETE FROM refresh_session_consumed WHERE consumed_at < ?")
            .bind(valid_since)
            .execute(&self.pool)
            .await
            .map_err(|e| store_err("tombstone purge", e))?;

        Ok(res.rows_affected())
    }
}

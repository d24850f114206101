use super::util::store_err;
use crate::domain_port::*;
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};

pub struct MySqlAuthRepo {
    pool: MySqlPool,
}

impl MySqlAuthRepo {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlAuthRepo { pool }
    }

    fn row_to_record(row: MySqlRow) -> Result<AuthCredentialsRecord, StoreError> {
        Ok(AuthCredentialsRecord {
            user_id: row
                .try_get("user_id")
                .map_err(|e| store_err("user_id decode", e))?,
            username: row
                .try_get("username")
                .map_err(|e| store_err("username decode", e))?,
            password_hash: row
                .try_get("password_hash")
                .map_err(|e| store_err("password_hash decode", e))?,
            is_active: row
                .try_get("is_active")
                .map_err(|e| store_err("is_active decode", e))?,
            created_at: row
                .try_get("created_at")
                .map_err(|e| store_err("created_at decode", e))?,
        })
    }
}

#[async_trait::async_trait]
impl AuthRepo for MySqlAuthRepo {
    async fn create_credentials(&self, record: &AuthCredentialsRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
INSERT INTO auth_credential (user_id, username, password_hash, is_active, created_at)
VALUES (?, ?, ?, ?, ?)
"#,
        )
        .bind(record.user_id)
        .bind(&record.username)
        .bind(&record.password_hash)
        .bind(record.is_active)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| store_err("credential insert", e))?;

        Ok(())
    }

    async fn get_by_username(
        &self,
        username: &str,
    ) -> Result<Option<AuthCredentialsRecord>, StoreError> {
        let row_opt: Option<MySqlRow> = sqlx::query(
            r#"
SELECT user_id, username, password_hash, is_active, created_at
FROM auth_credential
WHERE username = ?
"#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_err("credential select", e))?;

        row_opt.map(Self::row_to_record).transpose()
    }
}

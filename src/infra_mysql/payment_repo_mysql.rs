use super::util::store_err;
use crate::domain_model::*;
use crate::domain_port::*;
use sqlx::{MySqlPool, Row};

pub struct MySqlPaymentRepo {
    pool: MySqlPool,
}

impl MySqlPaymentRepo {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl PaymentRepo for MySqlPaymentRepo {
    async fn insert(&self, payment: &Payment) -> Result<(), StoreError> {
        sqlx::query(
            r#"
INSERT INTO payment (payment_id, from_account, to_account, amount, status, created_at)
VALUES (?, ?, ?, ?, ?, ?)
"#,
        )
        .bind(&payment.payment_id.0)
        .bind(&payment.from_account)
        .bind(&payment.to_account)
        .bind(payment.amount)
        .bind(payment.status.as_str())
        .bind(payment.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| store_err("payment insert", e))?;

        Ok(())
    }

    async fn get(&self, payment_id: &PaymentId) -> Result<Option<Payment>, StoreError> {
        let row = sqlx::query(
            r#"
SELECT payment_id, from_account, to_account, amount, status, created_at
FROM payment
WHERE payment_id=?
"#,
        )
        .bind(&payment_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_err("payment select", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let status = match row
            .try_get::<&str, _>("status")
            .map_err(|e| store_err("status decode", e))?
        {
            "success" => PaymentStatus::Success,
            other => return Err(StoreError::Corrupt(format!("payment bad status: {other}"))),
        };

        Ok(Some(Payment {
            payment_id: PaymentId(
                row.try_get("payment_id")
                    .map_err(|e| store_err("payment_id decode", e))?,
            ),
            from_account: row
                .try_get("from_account")
                .map_err(|e| store_err("from_account decode", e))?,
            to_account: row
                .try_get("to_account")
                .map_err(|e| store_err("to_account decode", e))?,
            amount: row
                .try_get("amount")
                .map_err(|e| store_err("amount decode", e))?,
            status,
            created_at: row
                .try_get("created_at")
                .map_err(|e| store_err("created_at decode", e))?,
        }))
    }
}

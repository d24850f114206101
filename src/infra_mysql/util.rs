use crate::domain_port::StoreError;
use sqlx::mysql::MySqlDatabaseError;

pub fn is_dup_key(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db) = err {
        if let Some(mysql_err) = db.try_downcast_ref::<MySqlDatabaseError>() {
            return mysql_err.number() == 1062; // ER_DUP_ENTRY
        }
    }

    false
}

/// Classify a driver error. Anything that is not a constraint violation or a
/// decode failure is treated as the store being unavailable.
pub fn store_err(context: &str, err: sqlx::Error) -> StoreError {
    if is_dup_key(&err) {
        return StoreError::DuplicateKey;
    }
    match err {
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Corrupt(format!("{context}: {err}"))
        }
        other => StoreError::Unavailable(format!("{context}: {other}")),
    }
}

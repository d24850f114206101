use crate::domain_model::*;
use crate::domain_port::StoreError;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct AuthCredentialsRecord {
    pub user_id: UserId,
    pub username: String,
    pub password_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait AuthRepo: Send + Sync {
    /// Insert a row. Fails with `DuplicateKey` when the username is taken.
    async fn create_credentials(&self, record: &AuthCredentialsRecord) -> Result<(), StoreError>;

    /// Fetch credentials by username (for login).
    async fn get_by_username(
        &self,
        username: &str,
    ) -> Result<Option<AuthCredentialsRecord>, StoreError>;
}

use crate::domain_model::*;
use crate::domain_port::StoreError;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("user already exists")]
    UserExists,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid or reused refresh token")]
    InvalidOrReusedToken,
    #[error("invalid or expired access token")]
    InvalidOrExpiredAccessToken,
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(e) => AuthError::StoreUnavailable(e),
            other => AuthError::InternalError(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignupInput {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct LoginResult {
    pub user_id: UserId,
    pub tokens: AuthTokens,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct AccessToken(pub String);

/// Plaintext refresh secret. Handed to the client once, never persisted.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct RefreshToken(pub String);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
    pub access_token_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AccessClaims {
    pub user_id: UserId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// What to do when an already redeemed refresh secret is presented again.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReusePolicy {
    /// Refuse the request; other sessions of the user stay valid.
    #[default]
    Reject,
    /// Refuse the request and revoke every session of the owning user.
    RevokeUser,
}

#[async_trait::async_trait]
pub trait TokenCodec: Send + Sync {
    async fn issue_access_token(
        &self,
        user: UserId,
    ) -> Result<(AccessToken, DateTime<Utc>), AuthError>;
    async fn verify_access_token(&self, token: &AccessToken) -> Result<AccessClaims, AuthError>;
    fn generate_refresh_token(&self) -> RefreshToken;
    fn hash_refresh_token(&self, token: &RefreshToken) -> SecretHash;
}

#[async_trait::async_trait]
pub trait CredentialHasher: Send + Sync {
    async fn hash_password(&self, password: &str) -> Result<String, AuthError>;
    async fn verify_password(&self, password: &str, password_hash: &str)
    -> Result<bool, AuthError>;
}

#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    async fn signup(&self, request: SignupInput) -> Result<UserId, AuthError>;
    async fn login(&self, request: LoginInput) -> Result<LoginResult, AuthError>;
    /// Start a new session lineage for an already authenticated user.
    async fn issue(&self, user_id: UserId) -> Result<AuthTokens, AuthError>;
    /// Redeem a refresh secret for a fresh pair. Each secret works once.
    async fn rotate(&self, refresh_token: &str) -> Result<AuthTokens, AuthError>;
    /// Stateless: never touches the session store.
    async fn verify_access(&self, access_token: &str) -> Result<UserId, AuthError>;
    async fn logout(&self, refresh_token: &str) -> Result<(), AuthError>;
    async fn logout_all(&self, user_id: UserId) -> Result<u64, AuthError>;
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthError>;
}

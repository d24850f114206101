use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::logger::*;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Lifetime of a refresh secret; a secret issued earlier cannot be redeemed.
    pub refresh_ttl: Duration,
    pub reuse_policy: ReusePolicy,
    pub min_username_len: usize,
    pub min_password_len: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_ttl: Duration::days(7),
            reuse_policy: ReusePolicy::Reject,
            min_username_len: 6,
            min_password_len: 6,
        }
    }
}

/// Issues access tokens and single-use refresh secrets, rotating the secret on
/// every refresh.
pub struct RealAuthService {
    auth_repo: Arc<dyn AuthRepo>,
    session_repo: Arc<dyn RefreshSessionRepo>,
    credential_hasher: Arc<dyn CredentialHasher>,
    token_codec: Arc<dyn TokenCodec>,
    config: SessionConfig,
}

impl RealAuthService {
    pub fn new(
        auth_repo: Arc<dyn AuthRepo>,
        session_repo: Arc<dyn RefreshSessionRepo>,
        credential_hasher: Arc<dyn CredentialHasher>,
        token_codec: Arc<dyn TokenCodec>,
        config: SessionConfig,
    ) -> Self {
        Self {
            auth_repo,
            session_repo,
            credential_hasher,
            token_codec,
            config,
        }
    }

    fn validate_signup(&self, username: &str, password: &str) -> Result<(), AuthError> {
        if username.len() < self.config.min_username_len {
            return Err(AuthError::InvalidInput("username too short".to_string()));
        }
        if password.len() < self.config.min_password_len {
            return Err(AuthError::InvalidInput("password too short".to_string()));
        }
        Ok(())
    }

    async fn tokens_for(
        &self,
        user_id: UserId,
        refresh_token: RefreshToken,
    ) -> Result<AuthTokens, AuthError> {
        let (access_token, access_exp) = self.token_codec.issue_access_token(user_id).await?;
        Ok(AuthTokens {
            access_token,
            refresh_token,
            access_token_expires_at: access_exp,
        })
    }

    /// Called when a presented secret has no live session. Whatever is found,
    /// the caller still answers `InvalidOrReusedToken`.
    async fn on_unredeemable(&self, secret_hash: &SecretHash) -> Result<(), AuthError> {
        let Some(owner) = self.session_repo.find_consumed(secret_hash).await? else {
            debug!("refresh token unknown or expired");
            return Ok(());
        };

        warn!(user_id = %owner, "refresh token reuse detected");
        if self.config.reuse_policy == ReusePolicy::RevokeUser {
            let revoked = self.session_repo.revoke_user(owner).await?;
            warn!(user_id = %owner, revoked, "revoked all sessions after refresh token reuse");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl AuthService for RealAuthService {
    async fn signup(&self, request: SignupInput) -> Result<UserId, AuthError> {
        let SignupInput { username, password } = request;

        self.validate_signup(&username, &password)?;

        let password_hash = self.credential_hasher.hash_password(&password).await?;
        let record = AuthCredentialsRecord {
            user_id: UserId::new_random(),
            username,
            password_hash,
            is_active: true,
            created_at: Utc::now(),
        };
        match self.auth_repo.create_credentials(&record).await {
            Ok(()) => {}
            Err(StoreError::DuplicateKey) => return Err(AuthError::UserExists),
            Err(e) => return Err(e.into()),
        }

        info!(user_id = %record.user_id, "user signed up");
        Ok(record.user_id)
    }

    async fn login(&self, request: LoginInput) -> Result<LoginResult, AuthError> {
        let LoginInput { username, password } = request;

        let rec = self
            .auth_repo
            .get_by_username(&username)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !rec.is_active {
            return Err(AuthError::InvalidCredentials);
        }

        let ok = self
            .credential_hasher
            .verify_password(&password, &rec.password_hash)
            .await?;
        if !ok {
            return Err(AuthError::InvalidCredentials);
        }

        let tokens = self.issue(rec.user_id).await?;
        Ok(LoginResult {
            user_id: rec.user_id,
            tokens,
        })
    }

    async fn issue(&self, user_id: UserId) -> Result<AuthTokens, AuthError> {
        let refresh_token = self.token_codec.generate_refresh_token();
        let secret_hash = self.token_codec.hash_refresh_token(&refresh_token);

        let session = self
            .session_repo
            .create(user_id, &secret_hash, Utc::now())
            .await?;
        info!(%user_id, session_id = %session.session_id, "refresh session issued");

        self.tokens_for(user_id, refresh_token).await
    }

    async fn rotate(&self, refresh_token: &str) -> Result<AuthTokens, AuthError> {
        if refresh_token.is_empty() {
            return Err(AuthError::InvalidOrReusedToken);
        }
        let presented = self
            .token_codec
            .hash_refresh_token(&RefreshToken(refresh_token.to_string()));

        let successor_token = self.token_codec.generate_refresh_token();
        let successor_hash = self.token_codec.hash_refresh_token(&successor_token);

        let now = Utc::now();
        let valid_since = now - self.config.refresh_ttl;
        let Some(successor) = self
            .session_repo
            .rotate(&presented, &successor_hash, now, valid_since)
            .await?
        else {
            self.on_unredeemable(&presented).await?;
            return Err(AuthError::InvalidOrReusedToken);
        };

        debug!(
            user_id = %successor.user_id,
            session_id = %successor.session_id,
            "refresh token rotated"
        );
        self.tokens_for(successor.user_id, successor_token).await
    }

    async fn verify_access(&self, access_token: &str) -> Result<UserId, AuthError> {
        let claims = self
            .token_codec
            .verify_access_token(&AccessToken(access_token.to_string()))
            .await?;
        Ok(claims.user_id)
    }

    async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        let secret_hash = self
            .token_codec
            .hash_refresh_token(&RefreshToken(refresh_token.to_string()));
        if self.session_repo.revoke(&secret_hash).await? {
            debug!("refresh session revoked");
        }
        Ok(())
    }

    async fn logout_all(&self, user_id: UserId) -> Result<u64, AuthError> {
        let revoked = self.session_repo.revoke_user(user_id).await?;
        info!(%user_id, revoked, "all refresh sessions revoked");
        Ok(revoked)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthError> {
        let purged = self
            .session_repo
            .purge_expired(now - self.config.refresh_ttl)
            .await?;
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application_impl::{Argon2PasswordHasher, JwtConfig, JwtHs256Codec};
    use crate::infra_memory::{MemoryAuthRepo, MemoryRefreshSessionRepo};
    use futures_util::future::join_all;

    struct Fixture {
        service: Arc<RealAuthService>,
        sessions: Arc<MemoryRefreshSessionRepo>,
        codec: Arc<JwtHs256Codec>,
    }

    fn fixture(reuse_policy: ReusePolicy) -> Fixture {
        let sessions = Arc::new(MemoryRefreshSessionRepo::new());
        let codec = Arc::new(JwtHs256Codec::new(JwtConfig {
            issuer: "tollgate.test".to_string(),
            audience: "tollgate-client".to_string(),
            access_ttl: Duration::minutes(15),
            signing_key: b"test-signing-key".to_vec(),
        }));
        let service = RealAuthService::new(
            Arc::new(MemoryAuthRepo::new()),
            sessions.clone(),
            Arc::new(Argon2PasswordHasher),
            codec.clone(),
            SessionConfig {
                reuse_policy,
                ..SessionConfig::default()
            },
        );
        Fixture {
            service: Arc::new(service),
            sessions,
            codec,
        }
    }

    #[tokio::test]
    async fn rotation_chain_rejects_replayed_secret() {
        let fx = fixture(ReusePolicy::Reject);
        let u1 = UserId::new_random();

        let first = fx.service.issue(u1).await.unwrap();
        let second = fx.service.rotate(&first.refresh_token.0).await.unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);

        let replay = fx.service.rotate(&first.refresh_token.0).await.unwrap_err();
        assert!(matches!(replay, AuthError::InvalidOrReusedToken));

        let third = fx.service.rotate(&second.refresh_token.0).await.unwrap();
        assert_eq!(
            fx.service.verify_access(&third.access_token.0).await.unwrap(),
            u1
        );
        assert_eq!(fx.sessions.session_count(u1), 1);
    }

    #[tokio::test]
    async fn unknown_and_reused_secrets_look_the_same() {
        let fx = fixture(ReusePolicy::Reject);
        let tokens = fx.service.issue(UserId::new_random()).await.unwrap();
        fx.service.rotate(&tokens.refresh_token.0).await.unwrap();

        let reused = fx.service.rotate(&tokens.refresh_token.0).await.unwrap_err();
        let unknown = fx.service.rotate("never-issued").await.unwrap_err();
        let empty = fx.service.rotate("").await.unwrap_err();

        assert_eq!(reused.to_string(), unknown.to_string());
        assert!(matches!(empty, AuthError::InvalidOrReusedToken));
    }

    #[tokio::test]
    async fn concurrent_rotations_of_one_secret_have_one_winner() {
        let fx = fixture(ReusePolicy::Reject);
        let user = UserId::new_random();
        let tokens = fx.service.issue(user).await.unwrap();

        let attempts = (0..8).map(|_| {
            let service = fx.service.clone();
            let secret = tokens.refresh_token.0.clone();
            tokio::spawn(async move { service.rotate(&secret).await })
        });
        let outcomes = join_all(attempts).await;

        let winners = outcomes
            .into_iter()
            .map(|joined| joined.unwrap())
            .filter(|outcome| match outcome {
                Ok(_) => true,
                Err(AuthError::InvalidOrReusedToken) => false,
                Err(other) => panic!("unexpected error: {other}"),
            })
            .count();
        assert_eq!(winners, 1);
        assert_eq!(fx.sessions.session_count(user), 1);
    }

    #[tokio::test]
    async fn revoke_user_policy_kills_the_lineage_on_reuse() {
        let fx = fixture(ReusePolicy::RevokeUser);
        let user = UserId::new_random();
        let r1 = fx.service.issue(user).await.unwrap();
        let r2 = fx.service.rotate(&r1.refresh_token.0).await.unwrap();
        let other_device = fx.service.issue(user).await.unwrap();

        let replay = fx.service.rotate(&r1.refresh_token.0).await.unwrap_err();
        assert!(matches!(replay, AuthError::InvalidOrReusedToken));

        assert!(fx.service.rotate(&r2.refresh_token.0).await.is_err());
        assert!(fx.service.rotate(&other_device.refresh_token.0).await.is_err());
        assert_eq!(fx.sessions.session_count(user), 0);
    }

    #[tokio::test]
    async fn expired_refresh_session_cannot_rotate() {
        let fx = fixture(ReusePolicy::Reject);
        let user = UserId::new_random();
        let stale = fx.codec.generate_refresh_token();
        fx.sessions
            .create(
                user,
                &fx.codec.hash_refresh_token(&stale),
                Utc::now() - Duration::days(8),
            )
            .await
            .unwrap();

        let err = fx.service.rotate(&stale.0).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidOrReusedToken));
    }

    #[tokio::test]
    async fn logout_all_invalidates_every_refresh_secret() {
        let fx = fixture(ReusePolicy::Reject);
        let user = UserId::new_random();
        let a = fx.service.issue(user).await.unwrap();
        let b = fx.service.issue(user).await.unwrap();

        assert_eq!(fx.service.logout_all(user).await.unwrap(), 2);
        assert!(fx.service.rotate(&a.refresh_token.0).await.is_err());
        assert!(fx.service.rotate(&b.refresh_token.0).await.is_err());
        // Access tokens are stateless and stay valid until they expire.
        assert_eq!(fx.service.verify_access(&a.access_token.0).await.unwrap(), user);
    }

    #[tokio::test]
    async fn logout_revokes_a_single_session() {
        let fx = fixture(ReusePolicy::Reject);
        let user = UserId::new_random();
        let a = fx.service.issue(user).await.unwrap();
        let b = fx.service.issue(user).await.unwrap();

        fx.service.logout(&a.refresh_token.0).await.unwrap();
        fx.service.logout("unknown").await.unwrap();

        assert!(fx.service.rotate(&a.refresh_token.0).await.is_err());
        assert!(fx.service.rotate(&b.refresh_token.0).await.is_ok());
    }

    #[tokio::test]
    async fn signup_then_login_issues_working_tokens() {
        let fx = fixture(ReusePolicy::Reject);
        let user_id = fx
            .service
            .signup(SignupInput {
                username: "alice01".to_string(),
                password: "s3cret-pw".to_string(),
            })
            .await
            .unwrap();

        let dup = fx
            .service
            .signup(SignupInput {
                username: "alice01".to_string(),
                password: "another-pw".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(dup, AuthError::UserExists));

        let bad = fx
            .service
            .login(LoginInput {
                username: "alice01".to_string(),
                password: "wrong-pw".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(bad, AuthError::InvalidCredentials));

        let login = fx
            .service
            .login(LoginInput {
                username: "alice01".to_string(),
                password: "s3cret-pw".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(login.user_id, user_id);
        assert_eq!(
            fx.service
                .verify_access(&login.tokens.access_token.0)
                .await
                .unwrap(),
            user_id
        );
    }

    #[tokio::test]
    async fn short_credentials_are_rejected() {
        let fx = fixture(ReusePolicy::Reject);
        let err = fx
            .service
            .signup(SignupInput {
                username: "bob".to_string(),
                password: "s3cret-pw".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidInput(_)));
    }
}

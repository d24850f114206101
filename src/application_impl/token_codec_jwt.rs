use crate::application_port::*;
use crate::domain_model::*;
use argon2::password_hash::rand_core::{OsRng, RngCore};
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Bytes of entropy in a refresh secret before hex encoding.
const REFRESH_SECRET_BYTES: usize = 64;

#[derive(Clone)]
pub struct JwtConfig {
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub signing_key: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct JwtAccessClaims {
    sub: String, // user id as string
    exp: i64,
    iat: i64,
    iss: String,
    aud: String,
    jti: String,
}

fn encode_access(
    uid: UserId,
    issued_at: DateTime<Utc>,
    cfg: &JwtConfig,
) -> Result<(String, DateTime<Utc>), AuthError> {
    let expires_at = issued_at + cfg.access_ttl;
    let claims = JwtAccessClaims {
        sub: uid.0.to_string(),
        exp: expires_at.timestamp(),
        iat: issued_at.timestamp(),
        iss: cfg.issuer.clone(),
        aud: cfg.audience.clone(),
        jti: uuid::Uuid::new_v4().to_string(),
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(&cfg.signing_key),
    )
    .map_err(|e| AuthError::InternalError(e.to_string()))?;
    Ok((token, expires_at))
}

fn decode_access(token: &str, cfg: &JwtConfig) -> Result<JwtAccessClaims, AuthError> {
    let mut v = Validation::new(Algorithm::HS256);
    v.validate_exp = true;
    v.leeway = 0;
    v.set_audience(&[cfg.audience.clone()]);
    v.set_issuer(&[cfg.issuer.clone()]);
    let data = decode::<JwtAccessClaims>(token, &DecodingKey::from_secret(&cfg.signing_key), &v)
        .map_err(|_| AuthError::InvalidOrExpiredAccessToken)?;
    Ok(data.claims)
}

/// HS256 access tokens plus random hex refresh secrets hashed with SHA-256.
pub struct JwtHs256Codec {
    cfg: JwtConfig,
}

impl JwtHs256Codec {
    pub fn new(cfg: JwtConfig) -> Self {
        JwtHs256Codec { cfg }
    }

    #[inline]
    fn parse_user_id(sub: &str) -> Result<UserId, AuthError> {
        sub.parse::<UserId>()
            .map_err(|_| AuthError::InvalidOrExpiredAccessToken)
    }

    #[inline]
    fn timestamp(secs: i64) -> Result<DateTime<Utc>, AuthError> {
        Utc.timestamp_opt(secs, 0)
            .single()
            .ok_or(AuthError::InvalidOrExpiredAccessToken)
    }
}

#[async_trait::async_trait]
impl TokenCodec for JwtHs256Codec {
    async fn issue_access_token(
        &self,
        user: UserId,
    ) -> Result<(AccessToken, DateTime<Utc>), AuthError> {
        let (token, expires_at) = encode_access(user, Utc::now(), &self.cfg)?;
        Ok((AccessToken(token), expires_at))
    }

    async fn verify_access_token(&self, token: &AccessToken) -> Result<AccessClaims, AuthError> {
        let claims = decode_access(&token.0, &self.cfg)?;
        Ok(AccessClaims {
            user_id: Self::parse_user_id(&claims.sub)?,
            issued_at: Self::timestamp(claims.iat)?,
            expires_at: Self::timestamp(claims.exp)?,
        })
    }

    fn generate_refresh_token(&self) -> RefreshToken {
        let mut bytes = [0u8; REFRESH_SECRET_BYTES];
        OsRng.fill_bytes(&mut bytes);
        RefreshToken(hex::encode(bytes))
    }

    fn hash_refresh_token(&self, token: &RefreshToken) -> SecretHash {
        SecretHash(hex::encode(Sha256::digest(token.0.as_bytes())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(key: &str) -> JwtConfig {
        JwtConfig {
            issuer: "tollgate.test".to_string(),
            audience: "tollgate-client".to_string(),
            access_ttl: Duration::minutes(15),
            signing_key: key.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn fresh_token_verifies() {
        let codec = JwtHs256Codec::new(config("k1"));
        let user = UserId::new_random();

        let (token, expires_at) = codec.issue_access_token(user).await.unwrap();
        let claims = codec.verify_access_token(&token).await.unwrap();

        assert_eq!(claims.user_id, user);
        assert_eq!(claims.expires_at.timestamp(), expires_at.timestamp());
        assert_eq!((claims.expires_at - claims.issued_at), Duration::minutes(15));
    }

    #[tokio::test]
    async fn token_from_another_key_is_rejected() {
        let ours = JwtHs256Codec::new(config("k1"));
        let theirs = JwtHs256Codec::new(config("k2"));
        let (token, _) = theirs.issue_access_token(UserId::new_random()).await.unwrap();

        let err = ours.verify_access_token(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidOrExpiredAccessToken));
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let cfg = config("k1");
        let codec = JwtHs256Codec::new(cfg.clone());
        let issued_at = Utc::now() - Duration::hours(1);
        let (token, expires_at) = encode_access(UserId::new_random(), issued_at, &cfg).unwrap();
        assert!(expires_at < Utc::now());

        let err = codec
            .verify_access_token(&AccessToken(token))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidOrExpiredAccessToken));
    }

    #[tokio::test]
    async fn wrong_audience_and_garbage_are_rejected() {
        let codec = JwtHs256Codec::new(config("k1"));
        let mut other = config("k1");
        other.audience = "someone-else".to_string();
        let (token, _) = JwtHs256Codec::new(other)
            .issue_access_token(UserId::new_random())
            .await
            .unwrap();

        assert!(codec.verify_access_token(&token).await.is_err());
        assert!(
            codec
                .verify_access_token(&AccessToken("not.a.jwt".to_string()))
                .await
                .is_err()
        );
    }

    #[test]
    fn refresh_secrets_are_random_and_hash_deterministically() {
        let codec = JwtHs256Codec::new(config("k1"));
        let a = codec.generate_refresh_token();
        let b = codec.generate_refresh_token();

        assert_ne!(a, b);
        assert_eq!(a.0.len(), REFRESH_SECRET_BYTES * 2);
        assert_eq!(codec.hash_refresh_token(&a), codec.hash_refresh_token(&a));
        assert_ne!(codec.hash_refresh_token(&a), codec.hash_refresh_token(&b));
        assert_eq!(codec.hash_refresh_token(&a).0.len(), 64);
    }
}

use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Duration, Utc};
use redis::aio::ConnectionManager;
use redis::{
    AsyncCommands, FromRedisValue, RedisError, RedisResult, RedisWrite, Script, ToRedisArgs, Value,
};

const SESSION_CREATE: &str = include_str!("session_create.lua");
const SESSION_ROTATE: &str = include_str!("session_rotate.lua");
const SESSION_REVOKE: &str = include_str!("session_revoke.lua");
const SESSION_REVOKE_USER: &str = include_str!("session_revoke_user.lua");

/// Refresh sessions in Redis. Each session is a hash that expires after the
/// refresh TTL; every multi-key transition runs as one Lua script.
pub struct RedisRefreshSessionRepo {
    conn: ConnectionManager,
    prefix: String,
    refresh_ttl: Duration,
    create_script: Script,
    rotate_script: Script,
    revoke_script: Script,
    revoke_user_script: Script,
}

impl RedisRefreshSessionRepo {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>, refresh_ttl: Duration) -> Self {
        RedisRefreshSessionRepo {
            conn,
            prefix: prefix.into(),
            refresh_ttl,
            create_script: Script::new(SESSION_CREATE),
            rotate_script: Script::new(SESSION_ROTATE),
            revoke_script: Script::new(SESSION_REVOKE),
            revoke_user_script: Script::new(SESSION_REVOKE_USER),
        }
    }

    fn session_prefix(&self) -> String {
        format!("{}:session:", self.prefix)
    }

    fn user_prefix(&self) -> String {
        format!("{}:user:", self.prefix)
    }

    fn session_key(&self, hash: &SecretHash) -> String {
        format!("{}{}", self.session_prefix(), hash)
    }

    fn user_key(&self, user_id: UserId) -> String {
        format!("{}{}", self.user_prefix(), user_id)
    }

    fn consumed_key(&self, hash: &SecretHash) -> String {
        format!("{}:consumed:{}", self.prefix, hash)
    }

    /// Seconds left before a session created at `created_at` stops being redeemable.
    fn ttl_secs(&self, created_at: DateTime<Utc>) -> i64 {
        let secs = (created_at + self.refresh_ttl - Utc::now()).num_seconds();
        if secs <= 0 { 1 } else { secs }
    }
}

fn redis_err(context: &str, err: RedisError) -> StoreError {
    match err.kind() {
        redis::ErrorKind::TypeError => StoreError::Corrupt(format!("{context}: {err}")),
        _ => StoreError::Unavailable(format!("{context}: {err}")),
    }
}

impl ToRedisArgs for UserId {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        out.write_arg(self.to_string().as_bytes())
    }
}

impl FromRedisValue for UserId {
    fn from_redis_value(v: &Value) -> RedisResult<Self> {
        let s: String = redis::from_redis_value(v)?;
        let user_id = s.parse::<UserId>().map_err(|e| {
            RedisError::from((
                redis::ErrorKind::TypeError,
                "invalid UserId string",
                e.to_string(),
            ))
        })?;
        Ok(user_id)
    }
}

#[async_trait::async_trait]
impl RefreshSessionRepo for RedisRefreshSessionRepo {
    async fn create(
        &self,
        user_id: UserId,
        secret_hash: &SecretHash,
        now: DateTime<Utc>,
    ) -> Result<RefreshSession, StoreError> {
        let session = RefreshSession::new(user_id, secret_hash.clone(), now);
        let mut conn = self.conn.clone();
        let created: i64 = self
            .create_script
            .key(self.session_key(secret_hash))
            .key(self.user_key(user_id))
            .arg(session.session_id.to_string())
            .arg(user_id)
            .arg(now.timestamp())
            .arg(self.ttl_secs(now))
            .arg(&secret_hash.0)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| redis_err("session create", e))?;

        if created == 0 {
            return Err(StoreError::DuplicateKey);
        }
        Ok(session)
    }

    async fn rotate(
        &self,
        consumed: &SecretHash,
        successor: &SecretHash,
        now: DateTime<Utc>,
        _valid_since: DateTime<Utc>,
    ) -> Result<Option<RefreshSession>, StoreError> {
        let session_id = SessionId::new_random();
        let mut conn = self.conn.clone();
        let owner: Option<UserId> = self
            .rotate_script
            .key(self.session_key(consumed))
            .key(self.session_key(successor))
            .key(self.consumed_key(consumed))
            .arg(session_id.to_string())
            .arg(now.timestamp())
            .arg(self.ttl_secs(now))
            .arg(self.user_prefix())
            .arg(&consumed.0)
            .arg(&successor.0)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| redis_err("session rotate", e))?;

        Ok(owner.map(|user_id| RefreshSession {
            session_id,
            user_id,
            secret_hash: successor.clone(),
            created_at: now,
        }))
    }

    async fn find_consumed(&self, secret_hash: &SecretHash) -> Result<Option<UserId>, StoreError> {
        let mut conn = self.conn.clone();
        let owner: Option<UserId> = conn
            .get(self.consumed_key(secret_hash))
            .await
            .map_err(|e| redis_err("tombstone get", e))?;
        Ok(owner)
    }

    async fn revoke(&self, secret_hash: &SecretHash) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let removed: i64 = self
            .revoke_script
            .key(self.session_key(secret_hash))
            .arg(self.user_prefix())
            .arg(&secret_hash.0)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| redis_err("session revoke", e))?;
        Ok(removed == 1)
    }

    async fn revoke_user(&self, user_id: UserId) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let removed: u64 = self
            .revoke_user_script
            .key(self.user_key(user_id))
            .arg(self.session_prefix())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| redis_err("session revoke_user", e))?;
        Ok(removed)
    }

    async fn purge_expired(&self, _valid_since: DateTime<Utc>) -> Result<u64, StoreError> {
        // Sessions and tombstones carry a TTL; Redis expires them itself.
        Ok(0)
    }
}

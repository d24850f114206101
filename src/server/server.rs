use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_port::*;
use crate::infra_memory::*;
use crate::infra_mysql::*;
use crate::infra_redis::*;
use crate::logger::*;
use crate::server::Purger;
use crate::settings::Settings;
use anyhow::{Context, anyhow};
use sqlx::{MySql, Pool};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct Server {
    pub auth_service: Arc<dyn AuthService>,
    pub payment_service: Arc<dyn PaymentService>,
    purger_handle: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    pool: Option<Pool<MySql>>,
}

impl Server {
    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let needs_mysql =
            settings.store.backend == "mysql" || settings.session.backend == "mysql";
        let pool = if needs_mysql {
            let dsn = settings
                .store
                .mysql_dsn
                .as_deref()
                .ok_or_else(|| anyhow!("store.mysql_dsn is required by the mysql backend"))?;
            Some(Pool::<MySql>::connect(dsn).await?)
        } else {
            None
        };
        let mysql_pool = || pool.clone().ok_or_else(|| anyhow!("mysql pool not configured"));

        let (idempotency_repo, payment_repo, auth_repo): (
            Arc<dyn IdempotencyRepo>,
            Arc<dyn PaymentRepo>,
            Arc<dyn AuthRepo>,
        ) = match settings.store.backend.as_str() {
            "memory" => (
                Arc::new(MemoryIdempotencyRepo::new()),
                Arc::new(MemoryPaymentRepo::new()),
                Arc::new(MemoryAuthRepo::new()),
            ),
            "mysql" => {
                let pool = mysql_pool()?;
                (
                    Arc::new(MySqlIdempotencyRepo::new(pool.clone())),
                    Arc::new(MySqlPaymentRepo::new(pool.clone())),
                    Arc::new(MySqlAuthRepo::new(pool)),
                )
            }
            other => return Err(anyhow!("Unknown store backend: {}", other)),
        };

        let refresh_ttl = chrono::Duration::seconds(settings.auth.refresh_ttl_secs as i64);

        let session_repo: Arc<dyn RefreshSessionRepo> = match settings.session.backend.as_str() {
            "memory" => Arc::new(MemoryRefreshSessionRepo::new()),
            "mysql" => Arc::new(MySqlRefreshSessionRepo::new(mysql_pool()?)),
            "redis" => {
                let dsn = settings
                    .session
                    .redis_dsn
                    .as_deref()
                    .ok_or_else(|| anyhow!("session.redis_dsn is required by the redis backend"))?;
                let redis_client = redis::Client::open(dsn)?;
                let redis_manager = redis_client.get_connection_manager().await?;
                Arc::new(RedisRefreshSessionRepo::new(
                    redis_manager,
                    settings.session.key_prefix.clone(),
                    refresh_ttl,
                ))
            }
            other => return Err(anyhow!("Unknown session backend: {}", other)),
        };

        let key = std::env::var(&settings.auth.signing_key_env)
            .with_context(|| format!("missing signing key in ${}", settings.auth.signing_key_env))?
            .into_bytes();
        if key.is_empty() {
            return Err(anyhow!("signing key in ${} is empty", settings.auth.signing_key_env));
        }
        let token_codec: Arc<dyn TokenCodec> = Arc::new(JwtHs256Codec::new(JwtConfig {
            issuer: settings.auth.issuer.clone(),
            audience: settings.auth.audience.clone(),
            access_ttl: chrono::Duration::seconds(settings.auth.access_ttl_secs as i64),
            signing_key: key,
        }));
        let credential_hasher: Arc<dyn CredentialHasher> = Arc::new(Argon2PasswordHasher);

        let auth_service: Arc<dyn AuthService> = Arc::new(RealAuthService::new(
            auth_repo,
            session_repo,
            credential_hasher,
            token_codec,
            SessionConfig {
                refresh_ttl,
                reuse_policy: settings.auth.reuse_policy,
                min_username_len: settings.auth.min_username_len,
                min_password_len: settings.auth.min_password_len,
            },
        ));

        let engine = Arc::new(IdempotencyEngine::new(
            idempotency_repo,
            IdempotencyConfig {
                retention: chrono::Duration::seconds(settings.idempotency.retention_secs as i64),
            },
        ));
        let payment_service: Arc<dyn PaymentService> =
            Arc::new(RealPaymentService::new(engine.clone(), payment_repo));

        let cancel = CancellationToken::new();
        let purger = Purger::new(
            engine,
            auth_service.clone(),
            Duration::from_secs(settings.idempotency.purge_interval_secs.max(1)),
            cancel.clone(),
        );
        let purger_handle = tokio::spawn(async move {
            purger.run().await;
        });

        info!(
            store = %settings.store.backend,
            session = %settings.session.backend,
            reuse_policy = ?settings.auth.reuse_policy,
            "server started"
        );

        Ok(Self {
            auth_service,
            payment_service,
            purger_handle: Mutex::new(Some(purger_handle)),
            cancel,
            pool,
        })
    }

    /// Server around prebuilt services, without background tasks or pools.
    pub fn from_services(
        auth_service: Arc<dyn AuthService>,
        payment_service: Arc<dyn PaymentService>,
    ) -> Self {
        Self {
            auth_service,
            payment_service,
            purger_handle: Mutex::new(None),
            cancel: CancellationToken::new(),
            pool: None,
        }
    }

    pub async fn shutdown(&self) {
        info!("server shutting down...");

        self.cancel.cancel();

        let handle = self.purger_handle.lock().ok().and_then(|mut lock| lock.take());
        if let Some(handle) = handle {
            let r = handle.await;
            info!("purger handle dropped: {:?}", r);
        }

        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}

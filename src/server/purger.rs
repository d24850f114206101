use crate::application_impl::IdempotencyEngine;
use crate::application_port::AuthService;
use crate::logger::*;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Periodically drops idempotency records past retention and refresh
/// sessions past their lifetime.
pub struct Purger {
    engine: Arc<IdempotencyEngine>,
    auth_service: Arc<dyn AuthService>,
    interval: Duration,
    cancellation_token: CancellationToken,
}

impl Purger {
    pub fn new(
        engine: Arc<IdempotencyEngine>,
        auth_service: Arc<dyn AuthService>,
        interval: Duration,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            engine,
            auth_service,
            interval,
            cancellation_token,
        }
    }

    pub async fn tick_once(&self) -> anyhow::Result<()> {
        let now = Utc::now();
        let records = self.engine.purge_expired(now).await?;
        let sessions = self.auth_service.purge_expired(now).await?;
        if records > 0 || sessions > 0 {
            debug!(records, sessions, "purged expired entries");
        }
        Ok(())
    }

    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                biased;
                _ = self.cancellation_token.cancelled() => {
                    info!("Purger shutting down...");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick_once().await {
                        error!("Purger error: {:#}", e);
                    }
                }
            }
        }
    }
}

use super::fingerprint;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::logger::*;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct IdempotencyConfig {
    /// How long records are kept after creation.
    pub retention: Duration,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            retention: Duration::hours(24),
        }
    }
}

/// Runs an operation at most once per idempotency key and replays its result
/// to every later request carrying the same key and payload.
pub struct IdempotencyEngine {
    repo: Arc<dyn IdempotencyRepo>,
    config: IdempotencyConfig,
}

impl IdempotencyEngine {
    pub fn new(repo: Arc<dyn IdempotencyRepo>, config: IdempotencyConfig) -> Self {
        Self { repo, config }
    }

    pub async fn execute<P, R, E, F, Fut>(
        &self,
        key: &IdempotencyKey,
        payload: P,
        operation: F,
    ) -> Result<R, IdempotencyError<E>>
    where
        P: Serialize + Send,
        R: Serialize + DeserializeOwned + Send,
        E: Send,
        F: FnOnce(P) -> Fut + Send,
        Fut: Future<Output = Result<R, E>> + Send,
    {
        let digest = fingerprint(&payload).map_err(|e| IdempotencyError::Internal(e.to_string()))?;
        let token = ClaimToken::new_random();
        let claim =
            IdempotencyRecord::new_processing(key.clone(), digest.clone(), Utc::now(), token);

        match self.repo.claim(&claim).await? {
            IdempotencyClaim::Won => debug!(%key, "idempotency key claimed"),
            IdempotencyClaim::Existing(existing) => {
                if let Some(cached) = self.resolve_existing(existing, &digest, token).await? {
                    return Ok(cached);
                }
            }
        }

        match operation(payload).await {
            Ok(result) => {
                self.store_result(key, token, &result).await;
                Ok(result)
            }
            Err(e) => {
                match self.repo.release(key, token).await {
                    Ok(true) => {}
                    Ok(false) => warn!(%key, "idempotency claim was not held at release"),
                    Err(store_err) => warn!(%key, "releasing idempotency claim: {store_err}"),
                }
                Err(IdempotencyError::Operation(e))
            }
        }
    }

    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        self.repo.purge_expired(now - self.config.retention).await
    }

    /// `Some(result)` replays a completed attempt, `None` means this caller has
    /// re-claimed a released record and must run the operation itself.
    async fn resolve_existing<R, E>(
        &self,
        existing: IdempotencyRecord,
        digest: &RequestDigest,
        token: ClaimToken,
    ) -> Result<Option<R>, IdempotencyError<E>>
    where
        R: DeserializeOwned,
    {
        if existing.request_digest != *digest {
            warn!(key = %existing.key, "idempotency key reused with a different payload");
            return Err(IdempotencyError::KeyConflict);
        }

        match existing.status {
            IdempotencyStatus::Completed => {
                let cached = existing.cached_result.ok_or_else(|| {
                    IdempotencyError::Internal("completed record without result".to_string())
                })?;
                let result = serde_json::from_value(cached)
                    .map_err(|e| IdempotencyError::Internal(format!("cached result: {e}")))?;
                debug!(key = %existing.key, "replaying cached result");
                Ok(Some(result))
            }
            IdempotencyStatus::Processing if existing.is_released() => {
                let won = self.repo.reclaim(&existing.key, digest, token).await?;
                if won {
                    info!(key = %existing.key, "retrying released idempotency key");
                    Ok(None)
                } else {
                    Err(IdempotencyError::OperationInFlight)
                }
            }
            IdempotencyStatus::Processing => Err(IdempotencyError::OperationInFlight),
        }
    }

    // The operation already ran, so a failure here is logged rather than
    // turned into an error for the caller. The record keeps its owner and
    // later retries see it in flight until retention purges it.
    async fn store_result<R: Serialize>(
        &self,
        key: &IdempotencyKey,
        token: ClaimToken,
        result: &R,
    ) {
        let value = match serde_json::to_value(result) {
            Ok(value) => value,
            Err(e) => {
                error!(%key, "serializing result for idempotency cache: {e}");
                return;
            }
        };
        match self.repo.complete(key, token, &value).await {
            Ok(true) => {}
            Ok(false) => warn!(%key, "idempotency claim was not held at completion"),
            Err(e) => error!(%key, "caching idempotent result: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra_memory::MemoryIdempotencyRepo;
    use futures_util::future::join_all;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Transfer {
        amt: u64,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Receipt {
        id: usize,
    }

    fn engine() -> (Arc<IdempotencyEngine>, Arc<MemoryIdempotencyRepo>) {
        let repo = Arc::new(MemoryIdempotencyRepo::new());
        let engine = IdempotencyEngine::new(repo.clone(), IdempotencyConfig::default());
        (Arc::new(engine), repo)
    }

    fn key(raw: &str) -> IdempotencyKey {
        IdempotencyKey::parse(raw).unwrap()
    }

    async fn transfer(
        calls: &AtomicUsize,
        _request: Transfer,
    ) -> Result<Receipt, String> {
        let id = calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Receipt { id })
    }

    #[tokio::test]
    async fn identical_retries_run_the_operation_once() {
        let (engine, _) = engine();
        let calls = AtomicUsize::new(0);

        let mut results = Vec::new();
        for _ in 0..5 {
            let result = engine
                .execute(&key("k1"), Transfer { amt: 10 }, |t| transfer(&calls, t))
                .await
                .unwrap();
            results.push(result);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| *r == Receipt { id: 1 }));
    }

    #[tokio::test]
    async fn same_key_different_payload_is_a_conflict() {
        let (engine, _) = engine();
        let calls = AtomicUsize::new(0);

        engine
            .execute(&key("k1"), Transfer { amt: 10 }, |t| transfer(&calls, t))
            .await
            .unwrap();
        let second = engine
            .execute(&key("k1"), Transfer { amt: 20 }, |t| transfer(&calls, t))
            .await;

        assert!(matches!(second, Err(IdempotencyError::KeyConflict)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_first_requests_execute_once() {
        let (engine, _) = engine();
        let calls = Arc::new(AtomicUsize::new(0));

        let attempts = (0..16).map(|_| {
            let engine = engine.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                engine
                    .execute(&key("race"), Transfer { amt: 10 }, |_t| async move {
                        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                        let id = calls.fetch_add(1, Ordering::SeqCst) + 1;
                        Ok::<_, String>(Receipt { id })
                    })
                    .await
            })
        });
        let outcomes = join_all(attempts).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let mut succeeded = 0;
        for outcome in outcomes {
            match outcome.unwrap() {
                Ok(receipt) => {
                    assert_eq!(receipt, Receipt { id: 1 });
                    succeeded += 1;
                }
                Err(IdempotencyError::OperationInFlight) => {}
                Err(other) => panic!("unexpected outcome: {other:?}"),
            }
        }
        assert!(succeeded >= 1);
    }

    #[tokio::test]
    async fn failed_operation_can_be_retried() {
        let (engine, repo) = engine();
        let calls = AtomicUsize::new(0);

        let failed = engine
            .execute(&key("k1"), Transfer { amt: 10 }, |_t| async {
                Err::<Receipt, _>("ledger offline".to_string())
            })
            .await;
        assert!(matches!(failed, Err(IdempotencyError::Operation(ref e)) if e == "ledger offline"));
        let record = repo.get(&key("k1")).unwrap();
        assert_eq!(record.status, IdempotencyStatus::Processing);
        assert!(record.cached_result.is_none());

        let retried = engine
            .execute(&key("k1"), Transfer { amt: 10 }, |t| transfer(&calls, t))
            .await
            .unwrap();
        assert_eq!(retried, Receipt { id: 1 });
        assert_eq!(
            repo.get(&key("k1")).unwrap().status,
            IdempotencyStatus::Completed
        );
    }

    #[tokio::test]
    async fn owned_record_reports_in_flight() {
        let (engine, repo) = engine();
        let calls = AtomicUsize::new(0);
        let digest = fingerprint(&Transfer { amt: 10 }).unwrap();
        repo.claim(&IdempotencyRecord::new_processing(
            key("k1"),
            digest,
            Utc::now() - Duration::hours(1),
            ClaimToken::new_random(),
        ))
        .await
        .unwrap();

        let outcome = engine
            .execute(&key("k1"), Transfer { amt: 10 }, |t| transfer(&calls, t))
            .await;

        assert!(matches!(outcome, Err(IdempotencyError::OperationInFlight)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn purge_respects_retention() {
        let (engine, repo) = engine();
        let calls = AtomicUsize::new(0);
        engine
            .execute(&key("k1"), Transfer { amt: 10 }, |t| transfer(&calls, t))
            .await
            .unwrap();

        assert_eq!(engine.purge_expired(Utc::now()).await.unwrap(), 0);
        let purged = engine
            .purge_expired(Utc::now() + Duration::hours(25))
            .await
            .unwrap();
        assert_eq!(purged, 1);
        assert!(repo.get(&key("k1")).is_none());
    }

    #[tokio::test]
    async fn slow_operation_is_never_run_twice() {
        let (engine, _) = engine();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = {
            let engine = engine.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                engine
                    .execute(&key("slow"), Transfer { amt: 10 }, |_t| async move {
                        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                        let id = calls.fetch_add(1, Ordering::SeqCst) + 1;
                        Ok::<_, String>(Receipt { id })
                    })
                    .await
            })
        };

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        let retry = engine
            .execute(&key("slow"), Transfer { amt: 10 }, |t| transfer(&calls, t))
            .await;
        assert!(matches!(retry, Err(IdempotencyError::OperationInFlight)));

        let first = first.await.unwrap().unwrap();
        assert_eq!(first, Receipt { id: 1 });
        let replay = engine
            .execute(&key("slow"), Transfer { amt: 10 }, |t| transfer(&calls, t))
            .await
            .unwrap();
        assert_eq!(replay, first);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// Store whose `complete` is unreachable; everything else is in memory.
    struct CompleteFails(Arc<MemoryIdempotencyRepo>);

    #[async_trait::async_trait]
    impl IdempotencyRepo for CompleteFails {
        async fn claim(&self, record: &IdempotencyRecord) -> Result<IdempotencyClaim, StoreError> {
            self.0.claim(record).await
        }

        async fn reclaim(
            &self,
            key: &IdempotencyKey,
            digest: &RequestDigest,
            token: ClaimToken,
        ) -> Result<bool, StoreError> {
            self.0.reclaim(key, digest, token).await
        }

        async fn complete(
            &self,
            _key: &IdempotencyKey,
            _token: ClaimToken,
            _result: &serde_json::Value,
        ) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("connection reset".to_string()))
        }

        async fn release(
            &self,
            key: &IdempotencyKey,
            token: ClaimToken,
        ) -> Result<bool, StoreError> {
            self.0.release(key, token).await
        }

        async fn purge_expired(&self, created_before: DateTime<Utc>) -> Result<u64, StoreError> {
            self.0.purge_expired(created_before).await
        }
    }

    #[tokio::test]
    async fn result_is_returned_when_caching_it_fails() {
        let repo = Arc::new(MemoryIdempotencyRepo::new());
        let engine = IdempotencyEngine::new(
            Arc::new(CompleteFails(repo.clone())),
            IdempotencyConfig::default(),
        );
        let calls = AtomicUsize::new(0);

        let result = engine
            .execute(&key("k1"), Transfer { amt: 10 }, |t| transfer(&calls, t))
            .await
            .unwrap();
        assert_eq!(result, Receipt { id: 1 });

        let record = repo.get(&key("k1")).unwrap();
        assert_eq!(record.status, IdempotencyStatus::Processing);
        assert!(record.cached_result.is_none());
        assert!(!record.is_released());

        let retry = engine
            .execute(&key("k1"), Transfer { amt: 10 }, |t| transfer(&calls, t))
            .await;
        assert!(matches!(retry, Err(IdempotencyError::OperationInFlight)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

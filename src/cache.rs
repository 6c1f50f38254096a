//! APR Data Cache
//!
//! Holds the last good snapshot and rebuilds it through a [`SnapshotBuilder`]
//! once it is older than the TTL.
//!
//! - Concurrent callers share one in-flight rebuild.
//! - A failed rebuild keeps the previous snapshot and serves it as stale.
//! - Without a previous snapshot the failure is returned.

use crate::error::CacheError;
use crate::pipeline::{AprDataCache, SnapshotBuilder};
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
struct Snapshot {
    data: Arc<AprDataCache>,
    built_at: Instant,
    generated_at: DateTime<Utc>,
}

impl Snapshot {
    fn new(data: AprDataCache) -> Self {
        Self {
            data: Arc::new(data),
            built_at: Instant::now(),
            generated_at: Utc::now(),
        }
    }

    fn is_stale(&self, ttl: Duration) -> bool {
        self.built_at.elapsed() >= ttl
    }
}

/// What a reader gets back
#[derive(Debug, Clone)]
pub struct CacheRead {
    pub data: Arc<AprDataCache>,
    pub generated_at: DateTime<Utc>,
    /// Set when the rebuild failed and this is the previous snapshot
    pub stale_error: Option<String>,
}

impl CacheRead {
    fn fresh(snapshot: &Snapshot) -> Self {
        Self {
            data: snapshot.data.clone(),
            generated_at: snapshot.generated_at,
            stale_error: None,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.stale_error.is_some()
    }
}

type Rebuild = Shared<BoxFuture<'static, Result<Snapshot, CacheError>>>;

struct Inner {
    builder: Arc<dyn SnapshotBuilder>,
    ttl: Duration,
    snapshot: RwLock<Option<Snapshot>>,
    in_flight: Mutex<Option<Rebuild>>,
}

#[derive(Clone)]
pub struct AprCache {
    inner: Arc<Inner>,
}

impl AprCache {
    pub fn new(builder: Arc<dyn SnapshotBuilder>, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                builder,
                ttl,
                snapshot: RwLock::new(None),
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// Current snapshot, rebuilding first if missing or older than the TTL
    pub async fn get(&self) -> Result<CacheRead, CacheError> {
        {
            let snapshot = self.inner.snapshot.read().await;
            if let Some(ref s) = *snapshot {
                if !s.is_stale(self.inner.ttl) {
                    return Ok(CacheRead::fresh(s));
                }
            }
        }

        self.refresh().await
    }

    /// Rebuild now, regardless of age
    pub async fn force_refresh(&self) -> Result<CacheRead, CacheError> {
        info!("🔄 Forced APR cache refresh");
        self.refresh().await
    }

    async fn refresh(&self) -> Result<CacheRead, CacheError> {
        match self.rebuild().await {
            Ok(snapshot) => Ok(CacheRead::fresh(&snapshot)),
            Err(e) => {
                let previous = self.inner.snapshot.read().await;
                match previous.as_ref() {
                    Some(s) => {
                        warn!("⚠️  APR rebuild failed, serving stale snapshot: {}", e);
                        Ok(CacheRead {
                            data: s.data.clone(),
                            generated_at: s.generated_at,
                            stale_error: Some(e.to_string()),
                        })
                    }
                    None => Err(e),
                }
            }
        }
    }

    /// Join the running rebuild or start one
    fn rebuild(&self) -> Rebuild {
        let mut in_flight = self.inner.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(running) = in_flight.as_ref() {
            debug!("Joining in-flight APR rebuild");
            return running.clone();
        }

        let inner = self.inner.clone();
        let rebuild = async move {
            let result = inner.builder.build().await.map(Snapshot::new);
            if let Ok(ref snapshot) = result {
                *inner.snapshot.write().await = Some(snapshot.clone());
            }
            *inner.in_flight.lock().unwrap_or_else(|e| e.into_inner()) = None;
            result
        }
        .boxed()
        .shared();

        *in_flight = Some(rebuild.clone());
        rebuild
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct CountingBuilder {
        builds: AtomicUsize,
        fail: AtomicBool,
        delay: Duration,
    }

    impl CountingBuilder {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                builds: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
                delay,
            })
        }
    }

    #[async_trait]
    impl SnapshotBuilder for CountingBuilder {
        async fn build(&self) -> Result<AprDataCache, CacheError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail.load(Ordering::SeqCst) {
                return Err(CacheError::VaultFetch("ydaemon down".to_string()));
            }
            Ok(AprDataCache::default())
        }
    }

    #[tokio::test]
    async fn test_concurrent_gets_share_one_rebuild() {
        let builder = CountingBuilder::new(Duration::from_millis(50));
        let cache = AprCache::new(builder.clone(), Duration::from_secs(60));

        let (a, b, c) = tokio::join!(cache.get(), cache.get(), cache.force_refresh());
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(builder.builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fresh_snapshot_is_reused() {
        let builder = CountingBuilder::new(Duration::ZERO);
        let cache = AprCache::new(builder.clone(), Duration::from_secs(60));

        cache.get().await.unwrap();
        cache.get().await.unwrap();
        assert_eq!(builder.builds.load(Ordering::SeqCst), 1);

        cache.force_refresh().await.unwrap();
        assert_eq!(builder.builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_expired_snapshot_rebuilds() {
        let builder = CountingBuilder::new(Duration::ZERO);
        let cache = AprCache::new(builder.clone(), Duration::ZERO);

        cache.get().await.unwrap();
        cache.get().await.unwrap();
        assert_eq!(builder.builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_serves_stale() {
        let builder = CountingBuilder::new(Duration::ZERO);
        let cache = AprCache::new(builder.clone(), Duration::ZERO);

        let first = cache.get().await.unwrap();
        assert!(!first.is_stale());

        builder.fail.store(true, Ordering::SeqCst);
        let second = cache.get().await.unwrap();
        assert!(second.is_stale());
        assert_eq!(second.generated_at, first.generated_at);
        assert!(second.stale_error.unwrap().contains("ydaemon down"));
    }

    #[tokio::test]
    async fn test_failure_without_snapshot_is_error() {
        let builder = CountingBuilder::new(Duration::ZERO);
        builder.fail.store(true, Ordering::SeqCst);
        let cache = AprCache::new(builder.clone(), Duration::from_secs(60));

        let err = cache.get().await.unwrap_err();
        assert_eq!(err, CacheError::VaultFetch("ydaemon down".to_string()));

        // guard was released: the next call tries again
        tokio_test::assert_err!(cache.get().await);
        assert_eq!(builder.builds.load(Ordering::SeqCst), 2);
    }
}

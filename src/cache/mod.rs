//! Previously generated analyses.
//!
//! Two physical tiers hold the same records: the primary tier (point lookup
//! by composite key) and a legacy tier kept for older readers. `TieredCache`
//! reads through both and writes to both; dropping the legacy tier means
//! constructing it without one.

pub mod legacy;
pub mod primary;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::analysis::{AnalysisKey, CachedAnalysis};
use crate::date_util::timestamp;
use crate::error::{Error, Result};
use crate::storage::repository::AnalysisRow;

pub use legacy::LegacyCache;
pub use primary::PrimaryCache;

/// Legacy entries older than this are pruned after each fresh generation.
pub const LEGACY_RETENTION_DAYS: i64 = 30;

#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short tier name for logs.
    fn tier(&self) -> &'static str;

    async fn get(&self, key: &AnalysisKey) -> Result<Option<CachedAnalysis>>;

    async fn put(&self, analysis: &CachedAnalysis) -> Result<()>;
}

/// A tier whose entries age out.
#[async_trait]
pub trait PrunableBackend: CacheBackend {
    /// Delete this user's entries created before `cutoff`. Returns rows removed.
    async fn prune_before(&self, user_id: &str, cutoff: DateTime<Utc>) -> Result<usize>;
}

/// Read-through-both, write-to-both decorator over the two tiers.
#[derive(Clone)]
pub struct TieredCache {
    primary: Arc<dyn CacheBackend>,
    legacy: Option<Arc<dyn PrunableBackend>>,
}

impl TieredCache {
    pub fn new(primary: Arc<dyn CacheBackend>, legacy: Option<Arc<dyn PrunableBackend>>) -> Self {
        Self { primary, legacy }
    }

    /// Spawn a detached prune of this user's stale legacy entries. The
    /// outcome only reaches the log; the handle is returned for callers that
    /// want to wait on it.
    pub fn schedule_prune(&self, user_id: &str) -> Option<tokio::task::JoinHandle<()>> {
        let legacy = self.legacy.clone()?;
        let user_id = user_id.to_string();
        let cutoff = Utc::now() - Duration::days(LEGACY_RETENTION_DAYS);
        Some(tokio::spawn(async move {
            match legacy.prune_before(&user_id, cutoff).await {
                Ok(0) => log::debug!("No stale {} cache entries for {user_id}", legacy.tier()),
                Ok(n) => log::info!("Pruned {n} stale {} cache entries for {user_id}", legacy.tier()),
                Err(e) => log::warn!("Failed to prune {} cache for {user_id}: {e}", legacy.tier()),
            }
        }))
    }

    /// Prune synchronously with an explicit age, for maintenance commands.
    pub async fn prune_now(&self, user_id: &str, max_age_days: i64) -> Result<usize> {
        match &self.legacy {
            Some(legacy) => {
                let cutoff = Utc::now() - Duration::days(max_age_days);
                legacy.prune_before(user_id, cutoff).await
            }
            None => Ok(0),
        }
    }
}

#[async_trait]
impl CacheBackend for TieredCache {
    fn tier(&self) -> &'static str {
        "tiered"
    }

    async fn get(&self, key: &AnalysisKey) -> Result<Option<CachedAnalysis>> {
        if let Some(hit) = lookup(self.primary.as_ref(), key).await {
            return Ok(Some(hit));
        }
        match &self.legacy {
            Some(legacy) => Ok(lookup(legacy.as_ref(), key).await),
            None => Ok(None),
        }
    }

    /// The primary write decides the result; the legacy write is best-effort.
    async fn put(&self, analysis: &CachedAnalysis) -> Result<()> {
        self.primary.put(analysis).await?;
        if let Some(legacy) = &self.legacy {
            if let Err(e) = legacy.put(analysis).await {
                log::warn!(
                    "Failed to write {} cache for {}/{}: {e}",
                    legacy.tier(),
                    analysis.key.user_id,
                    analysis.key.page_type
                );
            }
        }
        Ok(())
    }
}

/// Read failures degrade to a miss.
async fn lookup<B>(backend: &B, key: &AnalysisKey) -> Option<CachedAnalysis>
where
    B: CacheBackend + ?Sized,
{
    match backend.get(key).await {
        Ok(Some(hit)) => {
            log::debug!(
                "Cache hit in {} tier for {}/{}",
                backend.tier(),
                key.user_id,
                key.page_type
            );
            Some(hit)
        }
        Ok(None) => None,
        Err(e) => {
            log::warn!("{} cache read failed, treating as miss: {e}", backend.tier());
            None
        }
    }
}

pub(crate) fn to_row(analysis: &CachedAnalysis) -> Result<AnalysisRow> {
    Ok(AnalysisRow {
        summary: analysis.summary.clone(),
        recommendations: serde_json::to_string(&analysis.recommendations)?,
        generated_at: timestamp(analysis.generated_at),
    })
}

pub(crate) fn from_row(key: &AnalysisKey, row: AnalysisRow) -> Result<CachedAnalysis> {
    let recommendations = serde_json::from_str(&row.recommendations)?;
    let generated_at = DateTime::parse_from_rfc3339(&row.generated_at)
        .map_err(|e| Error::Internal(format!("bad generated_at '{}': {e}", row.generated_at)))?
        .with_timezone(&Utc);
    Ok(CachedAnalysis {
        key: key.clone(),
        summary: row.summary,
        recommendations,
        generated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Category, Priority, RecommendationRecord};
    use crate::date_util::DateRange;
    use crate::page_type::PageType;
    use crate::storage::{repository, Database};
    use chrono::TimeZone;

    fn sample(user: &str) -> CachedAnalysis {
        CachedAnalysis {
            key: AnalysisKey {
                user_id: user.to_string(),
                site_id: "site-1".to_string(),
                page_type: PageType::Summary,
                range: DateRange::parse("2025-01-01", "2025-01-31").unwrap(),
            },
            summary: "好調な一ヶ月でした。".to_string(),
            recommendations: vec![RecommendationRecord {
                title: "導線".to_string(),
                description: "短くする".to_string(),
                category: Category::Design,
                priority: Priority::High,
                expected_impact: None,
            }],
            generated_at: Utc.with_ymd_and_hms(2025, 2, 1, 9, 0, 0).unwrap(),
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl CacheBackend for FailingBackend {
        fn tier(&self) -> &'static str {
            "failing"
        }
        async fn get(&self, _key: &AnalysisKey) -> Result<Option<CachedAnalysis>> {
            Err(Error::Database("unavailable".into()))
        }
        async fn put(&self, _analysis: &CachedAnalysis) -> Result<()> {
            Err(Error::Database("unavailable".into()))
        }
    }

    #[async_trait]
    impl PrunableBackend for FailingBackend {
        async fn prune_before(&self, _user_id: &str, _cutoff: DateTime<Utc>) -> Result<usize> {
            Err(Error::Database("unavailable".into()))
        }
    }

    fn tiered(db: &Database) -> TieredCache {
        TieredCache::new(
            Arc::new(PrimaryCache::new(db.clone())),
            Some(Arc::new(LegacyCache::new(db.clone()))),
        )
    }

    #[tokio::test]
    async fn test_write_to_both_read_primary() {
        let db = Database::open_memory().await.unwrap();
        let cache = tiered(&db);
        let analysis = sample("u1");

        cache.put(&analysis).await.unwrap();
        assert_eq!(cache.get(&analysis.key).await.unwrap(), Some(analysis.clone()));

        let legacy = LegacyCache::new(db.clone());
        assert_eq!(legacy.get(&analysis.key).await.unwrap(), Some(analysis));
    }

    #[tokio::test]
    async fn test_read_through_to_legacy() {
        let db = Database::open_memory().await.unwrap();
        let cache = tiered(&db);
        let analysis = sample("u1");

        LegacyCache::new(db.clone()).put(&analysis).await.unwrap();
        assert_eq!(cache.get(&analysis.key).await.unwrap(), Some(analysis));
    }

    #[tokio::test]
    async fn test_older_prompt_version_misses_both_tiers() {
        let db = Database::open_memory().await.unwrap();
        let cache = tiered(&db);
        let analysis = sample("u1");
        let row = to_row(&analysis).unwrap();

        db.writer()
            .call({
                let key = analysis.key.clone();
                move |conn| {
                    repository::put_primary_analysis(conn, &key, &row, "analysis-v0")?;
                    repository::insert_legacy_analysis(
                        conn,
                        &key,
                        &row,
                        "analysis-v0",
                        "2025-02-01T09:00:00Z",
                    )?;
                    Ok::<(), rusqlite::Error>(())
                }
            })
            .await
            .unwrap();

        assert_eq!(cache.get(&analysis.key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_without_legacy_tier() {
        let db = Database::open_memory().await.unwrap();
        let cache = TieredCache::new(Arc::new(PrimaryCache::new(db.clone())), None);
        let analysis = sample("u1");

        LegacyCache::new(db.clone()).put(&analysis).await.unwrap();
        assert_eq!(cache.get(&analysis.key).await.unwrap(), None);
        assert!(cache.schedule_prune("u1").is_none());
        assert_eq!(cache.prune_now("u1", 0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_legacy_failures_are_swallowed() {
        let db = Database::open_memory().await.unwrap();
        let cache = TieredCache::new(
            Arc::new(PrimaryCache::new(db.clone())),
            Some(Arc::new(FailingBackend)),
        );
        let analysis = sample("u1");

        cache.put(&analysis).await.unwrap();
        assert_eq!(cache.get(&analysis.key).await.unwrap(), Some(analysis));

        let handle = cache.schedule_prune("u1").unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_primary_read_failure_is_a_miss() {
        let db = Database::open_memory().await.unwrap();
        let cache = TieredCache::new(
            Arc::new(FailingBackend),
            Some(Arc::new(LegacyCache::new(db.clone()))),
        );
        let analysis = sample("u1");
        assert_eq!(cache.get(&analysis.key).await.unwrap(), None);
        assert!(cache.put(&analysis).await.is_err());
    }

    #[tokio::test]
    async fn test_scheduled_prune_removes_stale_entries() {
        let db = Database::open_memory().await.unwrap();
        let cache = tiered(&db);
        let legacy = LegacyCache::new(db.clone());
        let analysis = sample("u1");

        legacy
            .put_at(&analysis, Utc::now() - Duration::days(LEGACY_RETENTION_DAYS + 5))
            .await
            .unwrap();
        legacy.put_at(&analysis, Utc::now() - Duration::days(1)).await.unwrap();
        assert_eq!(legacy.count("u1").await.unwrap(), 2);

        cache.schedule_prune("u1").unwrap().await.unwrap();
        assert_eq!(legacy.count("u1").await.unwrap(), 1);
    }
}

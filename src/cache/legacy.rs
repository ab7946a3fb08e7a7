use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{from_row, to_row, CacheBackend, PrunableBackend};
use crate::analysis::{AnalysisKey, CachedAnalysis};
use crate::date_util::timestamp;
use crate::error::Result;
use crate::prompt::PROMPT_VERSION;
use crate::storage::repository;
use crate::storage::Database;

/// Append-only tier kept for older readers. Lookups match on equality and
/// the current prompt version, and take the most recently created entry;
/// there is no update path.
#[derive(Clone)]
pub struct LegacyCache {
    db: Database,
}

impl LegacyCache {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert with an explicit creation time.
    pub async fn put_at(&self, analysis: &CachedAnalysis, created_at: DateTime<Utc>) -> Result<()> {
        let row = to_row(analysis)?;
        let created_at = timestamp(created_at);
        self.db
            .writer()
            .call({
                let key = analysis.key.clone();
                move |conn| {
                    repository::insert_legacy_analysis(
                        conn,
                        &key,
                        &row,
                        PROMPT_VERSION,
                        &created_at,
                    )
                }
            })
            .await?;
        Ok(())
    }

    pub async fn count(&self, user_id: &str) -> Result<i64> {
        let user_id = user_id.to_string();
        Ok(self
            .db
            .reader()
            .call(move |conn| repository::count_legacy_analyses(conn, &user_id))
            .await?)
    }
}

#[async_trait]
impl CacheBackend for LegacyCache {
    fn tier(&self) -> &'static str {
        "legacy"
    }

    async fn get(&self, key: &AnalysisKey) -> Result<Option<CachedAnalysis>> {
        let row = self
            .db
            .reader()
            .call({
                let key = key.clone();
                move |conn| repository::get_legacy_analysis(conn, &key, PROMPT_VERSION)
            })
            .await?;
        row.map(|row| from_row(key, row)).transpose()
    }

    async fn put(&self, analysis: &CachedAnalysis) -> Result<()> {
        self.put_at(analysis, Utc::now()).await
    }
}

#[async_trait]
impl PrunableBackend for LegacyCache {
    async fn prune_before(&self, user_id: &str, cutoff: DateTime<Utc>) -> Result<usize> {
        let user_id = user_id.to_string();
        let cutoff = timestamp(cutoff);
        Ok(self
            .db
            .writer()
            .call(move |conn| repository::delete_legacy_before(conn, &user_id, &cutoff))
            .await?)
    }
}

use async_trait::async_trait;

use super::{from_row, to_row, CacheBackend};
use crate::analysis::{AnalysisKey, CachedAnalysis};
use crate::error::Result;
use crate::prompt::PROMPT_VERSION;
use crate::storage::repository;
use crate::storage::Database;

/// Point lookup by composite key. Entries from another prompt version miss.
#[derive(Clone)]
pub struct PrimaryCache {
    db: Database,
}

impl PrimaryCache {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CacheBackend for PrimaryCache {
    fn tier(&self) -> &'static str {
        "primary"
    }

    async fn get(&self, key: &AnalysisKey) -> Result<Option<CachedAnalysis>> {
        let row = self
            .db
            .reader()
            .call({
                let key = key.clone();
                move |conn| repository::get_primary_analysis(conn, &key, PROMPT_VERSION)
            })
            .await?;
        row.map(|row| from_row(key, row)).transpose()
    }

    async fn put(&self, analysis: &CachedAnalysis) -> Result<()> {
        let row = to_row(analysis)?;
        self.db
            .writer()
            .call({
                let key = analysis.key.clone();
                move |conn| repository::put_primary_analysis(conn, &key, &row, PROMPT_VERSION)
            })
            .await?;
        Ok(())
    }
}

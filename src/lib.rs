pub mod analysis;
pub mod cache;
pub mod date_util;
pub mod dedup;
pub mod error;
pub mod extract;
pub mod gate;
pub mod llm;
pub mod page_type;
pub mod pipeline;
pub mod prompt;
pub mod settings;
pub mod storage;
pub mod usage;

use std::sync::Arc;

use chrono::Utc;

pub use analysis::{
    AnalysisRequest, AnalysisResponse, CachedAnalysis, Category, Priority, RecommendationRecord,
};
pub use error::{Error, ErrorKind, Result};
pub use llm::GenerationClient;
pub use page_type::{PageType, UsageCategory};
pub use pipeline::AnalysisService;
pub use prompt::{KnowledgeBase, PromptBuilder};
pub use settings::Settings;
pub use storage::Database;
pub use usage::UsageCounter;

use cache::{LegacyCache, PrimaryCache, TieredCache};
use usage::SqliteUsageLedger;

/// Main entry point: analytics narratives with structured recommendations.
pub struct SiteInsight {
    settings: Settings,
    ledger: SqliteUsageLedger,
    service: AnalysisService,
}

impl SiteInsight {
    /// Wire up collaborators from the database's configuration. A model
    /// service that cannot be configured is not fatal here; requests that
    /// need a fresh generation fail with `Unconfigured` instead.
    pub async fn open(db: Database) -> Result<Self> {
        let client = match llm::create_client(&db).await {
            Ok(client) => Some(client),
            Err(Error::Unconfigured(reason)) => {
                log::warn!("Model service unavailable: {reason}");
                None
            }
            Err(e) => return Err(e),
        };
        Self::with_client(db, client).await
    }

    /// Same as `open` but with an explicit generation client.
    pub async fn with_client(
        db: Database,
        client: Option<Arc<dyn GenerationClient>>,
    ) -> Result<Self> {
        let settings = Settings::new(db.clone());
        // An empty path selects the built-in knowledge base.
        let knowledge_base = match settings.get("knowledge_base_path").await? {
            Some(path) if !path.trim().is_empty() => {
                log::debug!("Loading knowledge base from {path}");
                KnowledgeBase::load(&path)?
            }
            _ => KnowledgeBase::builtin(),
        };

        let ledger = SqliteUsageLedger::new(db.clone());
        let cache = TieredCache::new(
            Arc::new(PrimaryCache::new(db.clone())),
            Some(Arc::new(LegacyCache::new(db.clone()))),
        );
        let service = AnalysisService::new(
            cache,
            Arc::new(ledger.clone()),
            client,
            PromptBuilder::new(knowledge_base),
        );
        Ok(Self {
            settings,
            ledger,
            service,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run one request. A request without a caller identity falls back to
    /// the configured `user_id`.
    pub async fn analyze(&self, mut request: AnalysisRequest) -> Result<AnalysisResponse> {
        if request.user_id.is_none() {
            request.user_id = self.settings.get("user_id").await?;
        }
        self.service.generate(&request).await
    }

    // ── Usage ──────────────────────────────────────────────────────

    /// This month's standing in every category.
    pub async fn usage_report(&self, user_id: &str) -> Result<Vec<UsageCounter>> {
        let now = Utc::now();
        let mut report = Vec::with_capacity(UsageCategory::ALL.len());
        for category in UsageCategory::ALL {
            report.push(self.ledger.counter_at(user_id, category, now).await?);
        }
        Ok(report)
    }

    pub async fn set_usage_limit(
        &self,
        user_id: &str,
        category: UsageCategory,
        limit: i64,
    ) -> Result<()> {
        self.ledger.set_limit(user_id, category, limit).await?;
        log::info!("Set monthly {category} limit for {user_id} to {limit}");
        Ok(())
    }

    // ── Cache maintenance ──────────────────────────────────────────

    /// Delete this user's legacy cache entries older than `max_age_days`.
    pub async fn prune_legacy_cache(&self, user_id: &str, max_age_days: i64) -> Result<usize> {
        if max_age_days < 0 {
            return Err(Error::InvalidArgument(format!(
                "max age must be non-negative, got {max_age_days}"
            )));
        }
        let removed = self.service.cache().prune_now(user_id, max_age_days).await?;
        log::info!("Pruned {removed} legacy cache entries for {user_id}");
        Ok(removed)
    }
}

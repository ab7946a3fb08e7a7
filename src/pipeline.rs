//! Gate, prompt, generate, extract, strip, persist.
//!
//! Every request is independent; nothing here is shared across requests
//! except the collaborators themselves. There is no lock around the
//! check-then-increment sequence, so concurrent misses on one key may both
//! generate and both count against the quota.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chrono::Utc;

use crate::analysis::{
    AnalysisKey, AnalysisRequest, AnalysisResponse, CachedAnalysis, RecommendationRecord,
};
use crate::cache::{CacheBackend, TieredCache};
use crate::dedup;
use crate::error::{Error, Result};
use crate::extract;
use crate::gate;
use crate::llm::GenerationClient;
use crate::page_type::PageType;
use crate::prompt::PromptBuilder;
use crate::usage::UsageLedger;

#[derive(Clone)]
pub struct AnalysisService {
    cache: TieredCache,
    ledger: Arc<dyn UsageLedger>,
    client: Option<Arc<dyn GenerationClient>>,
    prompts: PromptBuilder,
}

impl AnalysisService {
    /// `client` is `None` when no model service is configured; cache hits
    /// are still served in that case.
    pub fn new(
        cache: TieredCache,
        ledger: Arc<dyn UsageLedger>,
        client: Option<Arc<dyn GenerationClient>>,
        prompts: PromptBuilder,
    ) -> Self {
        Self {
            cache,
            ledger,
            client,
            prompts,
        }
    }

    pub fn cache(&self) -> &TieredCache {
        &self.cache
    }

    pub async fn generate(&self, request: &AnalysisRequest) -> Result<AnalysisResponse> {
        let key = request.validate()?;

        let decision =
            gate::evaluate(&self.cache, self.ledger.as_ref(), &key, request.force_regenerate)
                .await?;
        if let Some(hit) = decision.into_result()? {
            return Ok(AnalysisResponse::from_cached(hit, true));
        }

        let client = self
            .client
            .as_ref()
            .ok_or_else(|| Error::Unconfigured("no model service configured".into()))?;

        let prompt = self.prompts.build(&key.page_type, &key.range, &request.metrics);
        log::info!(
            "Generating {} analysis for {}/{} ({} prompt chars)",
            key.page_type,
            key.user_id,
            key.site_id,
            prompt.chars().count()
        );
        let raw = client.generate(&prompt).await?;
        log::info!(
            "Model returned {} chars for {} analysis",
            raw.chars().count(),
            key.page_type
        );

        let recommendations = recover_recommendations(&raw, &key, extract::extract);
        let summary = recover_summary(&raw, &key, dedup::strip);

        let analysis = CachedAnalysis {
            key,
            summary,
            recommendations,
            generated_at: Utc::now(),
        };
        self.persist(&analysis).await;

        Ok(AnalysisResponse::from_cached(analysis, false))
    }

    /// Side effects of a fresh generation. None of them can fail the request.
    async fn persist(&self, analysis: &CachedAnalysis) {
        let key = &analysis.key;

        if let Err(e) = self.cache.put(analysis).await {
            log::warn!(
                "Failed to cache {} analysis for {}: {e}",
                key.page_type,
                key.user_id
            );
        }

        let category = key.page_type.usage_category();
        if let Err(e) = self.ledger.increment(&key.user_id, category).await {
            log::warn!(
                "Failed to record {category} usage for {}: {e}",
                key.user_id
            );
        }

        // Detached; the request does not wait for it.
        drop(self.cache.schedule_prune(&key.user_id));
    }
}

type Extractor = fn(&str, &PageType) -> Vec<RecommendationRecord>;
type Stripper = fn(&str, &PageType) -> String;

fn recover_recommendations(
    raw: &str,
    key: &AnalysisKey,
    extractor: Extractor,
) -> Vec<RecommendationRecord> {
    match catch_unwind(AssertUnwindSafe(|| extractor(raw, &key.page_type))) {
        Ok(records) => records,
        Err(_) => {
            log::error!(
                "Recommendation extraction panicked for {} ({}); returning none",
                key.page_type,
                key.user_id
            );
            Vec::new()
        }
    }
}

fn recover_summary(raw: &str, key: &AnalysisKey, stripper: Stripper) -> String {
    match catch_unwind(AssertUnwindSafe(|| stripper(raw, &key.page_type))) {
        Ok(summary) => summary,
        Err(_) => {
            log::error!(
                "Section stripping panicked for {} ({}); showing raw text",
                key.page_type,
                key.user_id
            );
            raw.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::cache::{LegacyCache, PrimaryCache};
    use crate::date_util::DateRange;
    use crate::page_type::UsageCategory;
    use crate::storage::Database;
    use crate::usage::SqliteUsageLedger;

    struct ScriptedClient {
        replies: Mutex<Vec<Result<String>>>,
        calls: AtomicUsize,
    }

    impl ScriptedClient {
        fn new(replies: Vec<Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl GenerationClient for ScriptedClient {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                Err(Error::UpstreamFailure("script exhausted".into()))
            } else {
                replies.remove(0)
            }
        }
    }

    struct CountingLedger {
        increments: AtomicUsize,
    }

    #[async_trait]
    impl UsageLedger for CountingLedger {
        async fn can_generate(&self, _user_id: &str, _category: UsageCategory) -> Result<bool> {
            Ok(true)
        }
        async fn increment(&self, _user_id: &str, _category: UsageCategory) -> Result<()> {
            self.increments.fetch_add(1, Ordering::SeqCst);
            Err(Error::Database("counter store offline".into()))
        }
    }

    struct BrokenCache;

    #[async_trait]
    impl CacheBackend for BrokenCache {
        fn tier(&self) -> &'static str {
            "broken"
        }
        async fn get(&self, _key: &AnalysisKey) -> Result<Option<CachedAnalysis>> {
            Err(Error::Database("disk I/O error".into()))
        }
        async fn put(&self, _analysis: &CachedAnalysis) -> Result<()> {
            Err(Error::Database("disk I/O error".into()))
        }
    }

    fn panicking_extractor(_raw: &str, _page_type: &PageType) -> Vec<RecommendationRecord> {
        panic!("extractor bug")
    }

    fn panicking_stripper(_raw: &str, _page_type: &PageType) -> String {
        panic!("stripper bug")
    }

    fn key() -> AnalysisKey {
        AnalysisKey {
            user_id: "u1".into(),
            site_id: "site-1".into(),
            page_type: PageType::Summary,
            range: DateRange::parse("2025-04-01", "2025-04-30").unwrap(),
        }
    }

    fn request(page_type: &str) -> AnalysisRequest {
        AnalysisRequest {
            user_id: Some("u1".into()),
            site_id: "site-1".into(),
            page_type: page_type.into(),
            start_date: "2025-04-01".into(),
            end_date: "2025-04-30".into(),
            metrics: json!({"sessions": 1000, "conversions": 10}),
            force_regenerate: false,
        }
    }

    fn tiered(db: &Database) -> TieredCache {
        TieredCache::new(
            Arc::new(PrimaryCache::new(db.clone())),
            Some(Arc::new(LegacyCache::new(db.clone()))),
        )
    }

    #[tokio::test]
    async fn test_fresh_generation_strips_list() {
        let db = Database::open_memory().await.unwrap();
        let raw = "## 概況\n訪問は安定しています。\n\n## 改善提案\n1. 導線改善: CTAを上部に移動\n2. 表示速度: 画像を圧縮";
        let client = Arc::new(ScriptedClient::new(vec![Ok(raw.to_string())]));
        let service = AnalysisService::new(
            tiered(&db),
            Arc::new(SqliteUsageLedger::new(db.clone())),
            Some(client.clone()),
            PromptBuilder::default(),
        );

        let response = service.generate(&request("summary")).await.unwrap();
        assert!(!response.from_cache);
        assert_eq!(response.summary, "## 概況\n訪問は安定しています。");
        assert_eq!(response.recommendations.len(), 2);
        assert_eq!(response.recommendations[0].title, "導線改善");

        let again = service.generate(&request("summary")).await.unwrap();
        assert!(again.from_cache);
        assert_eq!(again.summary, response.summary);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_persistence_failures_do_not_fail_request() {
        let db = Database::open_memory().await.unwrap();
        let ledger = Arc::new(CountingLedger {
            increments: AtomicUsize::new(0),
        });
        let service = AnalysisService::new(
            tiered(&db),
            ledger.clone(),
            Some(Arc::new(ScriptedClient::new(vec![Ok("本文のみ".into())]))),
            PromptBuilder::default(),
        );

        let response = service.generate(&request("pages")).await.unwrap();
        assert_eq!(response.summary, "本文のみ");
        assert!(response.recommendations.is_empty());
        assert_eq!(ledger.increments.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_client_is_unconfigured() {
        let db = Database::open_memory().await.unwrap();
        let service = AnalysisService::new(
            tiered(&db),
            Arc::new(SqliteUsageLedger::new(db.clone())),
            None,
            PromptBuilder::default(),
        );
        let err = service.generate(&request("summary")).await.unwrap_err();
        assert!(matches!(err, Error::Unconfigured(_)));
    }

    #[tokio::test]
    async fn test_upstream_error_is_not_persisted() {
        let db = Database::open_memory().await.unwrap();
        let ledger = SqliteUsageLedger::new(db.clone());
        let service = AnalysisService::new(
            tiered(&db),
            Arc::new(ledger.clone()),
            Some(Arc::new(ScriptedClient::new(vec![Err(Error::UpstreamRateLimited(
                "429".into(),
            ))]))),
            PromptBuilder::default(),
        );

        let err = service.generate(&request("summary")).await.unwrap_err();
        assert!(matches!(err, Error::UpstreamRateLimited(_)));

        let counter = ledger
            .counter_at("u1", UsageCategory::Summary, Utc::now())
            .await
            .unwrap();
        assert_eq!(counter.count, 0);
    }

    #[tokio::test]
    async fn test_unauthenticated_before_anything_else() {
        let db = Database::open_memory().await.unwrap();
        let client = Arc::new(ScriptedClient::new(vec![]));
        let service = AnalysisService::new(
            tiered(&db),
            Arc::new(SqliteUsageLedger::new(db.clone())),
            Some(client.clone()),
            PromptBuilder::default(),
        );
        let mut req = request("summary");
        req.user_id = None;
        let err = service.generate(&req).await.unwrap_err();
        assert!(matches!(err, Error::Unauthenticated));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_primary_cache_write_failure_does_not_fail_request() {
        let db = Database::open_memory().await.unwrap();
        let ledger = SqliteUsageLedger::new(db.clone());
        let client = Arc::new(ScriptedClient::new(vec![
            Ok("一回目".into()),
            Ok("二回目".into()),
        ]));
        let service = AnalysisService::new(
            TieredCache::new(Arc::new(BrokenCache), None),
            Arc::new(ledger.clone()),
            Some(client.clone()),
            PromptBuilder::default(),
        );

        let first = service.generate(&request("summary")).await.unwrap();
        assert_eq!(first.summary, "一回目");
        assert!(!first.from_cache);

        // Nothing was stored, so the next request generates again.
        let second = service.generate(&request("summary")).await.unwrap();
        assert_eq!(second.summary, "二回目");
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);

        let counter = ledger
            .counter_at("u1", UsageCategory::Summary, Utc::now())
            .await
            .unwrap();
        assert_eq!(counter.count, 2);
    }

    #[test]
    fn test_extractor_panic_yields_no_recommendations() {
        let raw = "## 改善提案\n1. 導線改善: CTAを上部に移動";
        assert!(recover_recommendations(raw, &key(), panicking_extractor).is_empty());
        assert_eq!(recover_recommendations(raw, &key(), extract::extract).len(), 1);
    }

    #[test]
    fn test_stripper_panic_yields_raw_text() {
        let raw = "## 概況\n安定しています。\n\n## 改善提案\n1. 導線改善: CTAを上部に移動";
        assert_eq!(recover_summary(raw, &key(), panicking_stripper), raw);
        assert_eq!(
            recover_summary(raw, &key(), dedup::strip),
            "## 概況\n安定しています。"
        );
    }
}

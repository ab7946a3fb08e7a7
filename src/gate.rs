//! Quota and cache admission for a generation request.

use crate::analysis::{AnalysisKey, CachedAnalysis};
use crate::cache::CacheBackend;
use crate::error::{Error, Result};
use crate::page_type::UsageCategory;
use crate::usage::UsageLedger;

#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// No usable cache entry; generate a fresh analysis.
    Proceed,
    ReturnCached(CachedAnalysis),
    /// The monthly limit for this category is used up.
    Reject(UsageCategory),
}

impl GateDecision {
    /// `Reject` becomes `Error::QuotaExceeded`.
    pub fn into_result(self) -> Result<Option<CachedAnalysis>> {
        match self {
            GateDecision::Proceed => Ok(None),
            GateDecision::ReturnCached(hit) => Ok(Some(hit)),
            GateDecision::Reject(category) => Err(Error::QuotaExceeded { category }),
        }
    }
}

/// Decide whether a request is served from cache, generated, or refused.
///
/// A cache hit does not bypass the quota: the ledger is consulted on every
/// path, so a user whose plan shrank since the entry was written is refused.
/// Ledger errors propagate, so the gate fails closed.
pub async fn evaluate(
    cache: &dyn CacheBackend,
    ledger: &dyn UsageLedger,
    key: &AnalysisKey,
    force_regenerate: bool,
) -> Result<GateDecision> {
    let category = key.page_type.usage_category();

    let cached = if force_regenerate {
        log::debug!("Skipping cache for {}/{}: regeneration forced", key.user_id, key.page_type);
        None
    } else {
        cache.get(key).await?
    };

    if !ledger.can_generate(&key.user_id, category).await? {
        log::info!(
            "Rejecting {} request for {}: monthly {category} limit reached{}",
            key.page_type,
            key.user_id,
            if cached.is_some() { " (cache hit withheld)" } else { "" }
        );
        return Ok(GateDecision::Reject(category));
    }

    Ok(match cached {
        Some(hit) => GateDecision::ReturnCached(hit),
        None => GateDecision::Proceed,
    })
}

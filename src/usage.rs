//! Per-user, per-category monthly generation counters.
//!
//! Counters are keyed by calendar month, so a new month starts from zero
//! without any rollover job. Reading and incrementing are separate calls:
//! two concurrent generations can both pass `can_generate` and both
//! increment.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::date_util::{month_key, next_month_start};
use crate::error::{Error, Result};
use crate::page_type::UsageCategory;
use crate::storage::repository;
use crate::storage::Database;

pub const DEFAULT_SUMMARY_LIMIT: i64 = 100;
pub const DEFAULT_IMPROVEMENT_LIMIT: i64 = 10;

#[async_trait]
pub trait UsageLedger: Send + Sync {
    /// Whether one more generation fits under this month's limit.
    async fn can_generate(&self, user_id: &str, category: UsageCategory) -> Result<bool>;

    async fn increment(&self, user_id: &str, category: UsageCategory) -> Result<()>;
}

/// One category's standing for the current month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageCounter {
    pub user_id: String,
    pub category: UsageCategory,
    pub period_key: String,
    pub count: i64,
    pub limit: i64,
    pub resets_on: NaiveDate,
}

impl UsageCounter {
    pub fn remaining(&self) -> i64 {
        (self.limit - self.count).max(0)
    }
}

/// Ledger backed by the `usage_counters` / `usage_limits` tables. Limits come
/// from a per-user override, then `usage_limit_<category>` config, then the
/// built-in default.
#[derive(Clone)]
pub struct SqliteUsageLedger {
    db: Database,
}

impl SqliteUsageLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Counter snapshot as of `at`.
    pub async fn counter_at(
        &self,
        user_id: &str,
        category: UsageCategory,
        at: DateTime<Utc>,
    ) -> Result<UsageCounter> {
        let period_key = month_key(at);
        let (count, limit) = self
            .db
            .reader()
            .call({
                let user_id = user_id.to_string();
                let period_key = period_key.clone();
                move |conn| {
                    let count =
                        repository::get_usage_count(conn, &user_id, category.as_str(), &period_key)?;
                    let limit = effective_limit(conn, &user_id, category)?;
                    Ok::<(i64, i64), rusqlite::Error>((count, limit))
                }
            })
            .await?;

        Ok(UsageCounter {
            user_id: user_id.to_string(),
            category,
            period_key,
            count,
            limit,
            resets_on: next_month_start(at),
        })
    }

    pub async fn increment_at(
        &self,
        user_id: &str,
        category: UsageCategory,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.db
            .writer()
            .call({
                let user_id = user_id.to_string();
                let period_key = month_key(at);
                move |conn| {
                    repository::increment_usage(conn, &user_id, category.as_str(), &period_key)
                }
            })
            .await?;
        Ok(())
    }

    /// Per-user override, e.g. after a plan change.
    pub async fn set_limit(&self, user_id: &str, category: UsageCategory, limit: i64) -> Result<()> {
        if limit < 0 {
            return Err(Error::InvalidArgument(format!(
                "usage limit must be non-negative, got {limit}"
            )));
        }
        self.db
            .writer()
            .call({
                let user_id = user_id.to_string();
                move |conn| repository::set_usage_limit(conn, &user_id, category.as_str(), limit)
            })
            .await?;
        Ok(())
    }
}

fn effective_limit(
    conn: &rusqlite::Connection,
    user_id: &str,
    category: UsageCategory,
) -> std::result::Result<i64, rusqlite::Error> {
    if let Some(limit) = repository::get_usage_limit(conn, user_id, category.as_str())? {
        return Ok(limit);
    }
    let configured = repository::get_config(conn, &format!("usage_limit_{category}"))?
        .and_then(|v| v.trim().parse::<i64>().ok());
    Ok(configured.unwrap_or(match category {
        UsageCategory::Summary => DEFAULT_SUMMARY_LIMIT,
        UsageCategory::Improvement => DEFAULT_IMPROVEMENT_LIMIT,
    }))
}

#[async_trait]
impl UsageLedger for SqliteUsageLedger {
    async fn can_generate(&self, user_id: &str, category: UsageCategory) -> Result<bool> {
        let counter = self.counter_at(user_id, category, Utc::now()).await?;
        Ok(counter.count < counter.limit)
    }

    async fn increment(&self, user_id: &str, category: UsageCategory) -> Result<()> {
        self.increment_at(user_id, category, Utc::now()).await
    }
}

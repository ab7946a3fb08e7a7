use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::date_util::{timestamp, DateRange};
use crate::error::{Error, Result};
use crate::page_type::PageType;

/// Recommendation bucket. Labeled-block output keeps whatever lower-cased
/// label the model wrote, so values outside the known set survive as `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Content,
    Design,
    Acquisition,
    Feature,
    Other,
    Custom(String),
}

impl Category {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "content" => Category::Content,
            "design" => Category::Design,
            "acquisition" => Category::Acquisition,
            "feature" => Category::Feature,
            "other" => Category::Other,
            other => Category::Custom(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Category::Content => "content",
            Category::Design => "design",
            Category::Acquisition => "acquisition",
            Category::Feature => "feature",
            Category::Other => "other",
            Category::Custom(label) => label,
        }
    }
}

impl From<String> for Category {
    fn from(s: String) -> Self {
        Category::from_label(&s)
    }
}

impl From<Category> for String {
    fn from(c: Category) -> Self {
        c.as_str().to_string()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recommendation urgency. Same verbatim-label rule as `Category`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Priority {
    Urgent,
    High,
    Medium,
    Low,
    Custom(String),
}

impl Priority {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "urgent" => Priority::Urgent,
            "high" => Priority::High,
            "medium" => Priority::Medium,
            "low" => Priority::Low,
            other => Priority::Custom(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Priority::Urgent => "urgent",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
            Priority::Custom(label) => label,
        }
    }
}

impl From<String> for Priority {
    fn from(s: String) -> Self {
        Priority::from_label(&s)
    }
}

impl From<Priority> for String {
    fn from(p: Priority) -> Self {
        p.as_str().to_string()
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structured recommendation recovered from model output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationRecord {
    pub title: String,
    pub description: String,
    pub category: Category,
    pub priority: Priority,
    /// Only the labeled-block strategy fills this in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_impact: Option<String>,
}

/// Composite cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisKey {
    pub user_id: String,
    pub site_id: String,
    pub page_type: PageType,
    pub range: DateRange,
}

/// A previously generated (summary, recommendations) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedAnalysis {
    pub key: AnalysisKey,
    pub summary: String,
    pub recommendations: Vec<RecommendationRecord>,
    pub generated_at: DateTime<Utc>,
}

/// Inbound generation request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub site_id: String,
    #[serde(default)]
    pub page_type: String,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    #[serde(default)]
    pub metrics: serde_json::Value,
    #[serde(default)]
    pub force_regenerate: bool,
}

impl AnalysisRequest {
    /// Check identity and required fields, producing the cache key.
    pub fn validate(&self) -> Result<AnalysisKey> {
        let user_id = self
            .user_id
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or(Error::Unauthenticated)?;

        let site_id = self.site_id.trim();
        if site_id.is_empty() {
            return Err(Error::InvalidArgument("site_id is required".into()));
        }
        if self.page_type.trim().is_empty() {
            return Err(Error::InvalidArgument("page_type is required".into()));
        }
        let range = DateRange::parse(&self.start_date, &self.end_date)?;

        Ok(AnalysisKey {
            user_id: user_id.to_string(),
            site_id: site_id.to_string(),
            page_type: PageType::from_tag(&self.page_type),
            range,
        })
    }
}

/// Outbound response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    pub summary: String,
    pub recommendations: Vec<RecommendationRecord>,
    pub from_cache: bool,
    pub generated_at: String,
}

impl AnalysisResponse {
    pub fn from_cached(analysis: CachedAnalysis, from_cache: bool) -> Self {
        Self {
            generated_at: timestamp(analysis.generated_at),
            summary: analysis.summary,
            recommendations: analysis.recommendations,
            from_cache,
        }
    }
}

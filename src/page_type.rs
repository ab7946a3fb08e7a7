use std::fmt;

use serde::{Deserialize, Serialize};

/// Report page a generation request is for. Selects the prompt template and
/// the extraction/deduplication strategy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PageType {
    Summary,
    Users,
    Day,
    Week,
    Hour,
    Demographics,
    Pages,
    PageCategories,
    LandingPages,
    FileDownloads,
    ExternalLinks,
    Channels,
    Keywords,
    Referrals,
    Conversions,
    ComprehensiveImprovement,
    /// Unrecognized tag; rendered with the generic template.
    Unknown(String),
}

impl PageType {
    /// Parse a page-type tag. Never fails: unknown tags become `Unknown`.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim() {
            "summary" => PageType::Summary,
            "users" => PageType::Users,
            "day" => PageType::Day,
            "week" => PageType::Week,
            "hour" => PageType::Hour,
            "demographics" => PageType::Demographics,
            "pages" => PageType::Pages,
            "page_categories" => PageType::PageCategories,
            "landing_pages" => PageType::LandingPages,
            "file_downloads" => PageType::FileDownloads,
            "external_links" => PageType::ExternalLinks,
            "channels" => PageType::Channels,
            "keywords" => PageType::Keywords,
            "referrals" => PageType::Referrals,
            "conversions" => PageType::Conversions,
            "comprehensive_improvement" => PageType::ComprehensiveImprovement,
            other => PageType::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PageType::Summary => "summary",
            PageType::Users => "users",
            PageType::Day => "day",
            PageType::Week => "week",
            PageType::Hour => "hour",
            PageType::Demographics => "demographics",
            PageType::Pages => "pages",
            PageType::PageCategories => "page_categories",
            PageType::LandingPages => "landing_pages",
            PageType::FileDownloads => "file_downloads",
            PageType::ExternalLinks => "external_links",
            PageType::Channels => "channels",
            PageType::Keywords => "keywords",
            PageType::Referrals => "referrals",
            PageType::Conversions => "conversions",
            PageType::ComprehensiveImprovement => "comprehensive_improvement",
            PageType::Unknown(tag) => tag,
        }
    }

    pub fn is_comprehensive_improvement(&self) -> bool {
        matches!(self, PageType::ComprehensiveImprovement)
    }

    /// Fixed page-type to usage-category lookup.
    pub fn usage_category(&self) -> UsageCategory {
        match self {
            PageType::ComprehensiveImprovement => UsageCategory::Improvement,
            _ => UsageCategory::Summary,
        }
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Independently metered generation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageCategory {
    Summary,
    Improvement,
}

impl UsageCategory {
    pub const ALL: [UsageCategory; 2] = [UsageCategory::Summary, UsageCategory::Improvement];

    pub fn as_str(&self) -> &'static str {
        match self {
            UsageCategory::Summary => "summary",
            UsageCategory::Improvement => "improvement",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "summary" => Some(UsageCategory::Summary),
            "improvement" => Some(UsageCategory::Improvement),
            _ => None,
        }
    }
}

impl fmt::Display for UsageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Recovers structured recommendations from free-form model output.
//!
//! The model is asked to follow a layout, but nothing enforces it. Each
//! strategy is a best-effort recogniser for one layout; the page type picks
//! an ordered list of strategies and the first one that yields records wins.
//! Finding nothing is a normal outcome and produces an empty list.

pub mod labeled;
pub mod numbered;

use crate::analysis::RecommendationRecord;
use crate::page_type::PageType;

/// A layout recogniser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// `---`-separated blocks of `label: value` lines.
    LabeledBlock,
    /// `1. title: description` style lists.
    NumberedList,
}

const IMPROVEMENT_STRATEGIES: &[Strategy] = &[Strategy::LabeledBlock, Strategy::NumberedList];
const DEFAULT_STRATEGIES: &[Strategy] = &[Strategy::NumberedList];

impl Strategy {
    /// Run the recogniser. `None` means it found no records.
    pub fn apply(self, raw: &str) -> Option<Vec<RecommendationRecord>> {
        let records = match self {
            Strategy::LabeledBlock => labeled::parse_labeled_blocks(raw),
            Strategy::NumberedList => numbered::parse_numbered_list(raw),
        };
        if records.is_empty() {
            None
        } else {
            Some(records)
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Strategy::LabeledBlock => "labeled-block",
            Strategy::NumberedList => "numbered-list",
        }
    }
}

/// Strategies to try for a page type, in order.
pub fn strategies_for(page_type: &PageType) -> &'static [Strategy] {
    if page_type.is_comprehensive_improvement() {
        IMPROVEMENT_STRATEGIES
    } else {
        DEFAULT_STRATEGIES
    }
}

/// Extract recommendations in encounter order.
pub fn extract(raw: &str, page_type: &PageType) -> Vec<RecommendationRecord> {
    for strategy in strategies_for(page_type) {
        match strategy.apply(raw) {
            Some(records) => {
                log::debug!(
                    "{} strategy extracted {} recommendations for {page_type}",
                    strategy.name(),
                    records.len()
                );
                return records;
            }
            None => log::debug!("{} strategy found nothing for {page_type}", strategy.name()),
        }
    }
    Vec::new()
}

use std::sync::LazyLock;

use regex::Regex;

use crate::analysis::{Category, Priority, RecommendationRecord};

/// `<int>. <text>` at the start of a (trimmed) line.
pub(crate) static RE_NUMBERED_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\.\s+(.+)$").unwrap());

/// Sentence-boundary split only applies within this many characters.
const SENTENCE_SPLIT_WINDOW: usize = 50;

const SENTENCE_ENDINGS: [char; 6] = ['。', '.', '!', '?', '！', '？'];

// Checked in order; first bucket with a hit wins.
const CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (
        Category::Content,
        &["コンテンツ", "記事", "ブログ", "文章", "content", "article", "blog", "copy"],
    ),
    (
        Category::Design,
        &["デザイン", "レイアウト", "ボタン", "ui", "ux", "design", "layout", "button"],
    ),
    (
        Category::Acquisition,
        &["集客", "流入", "広告", "seo", "検索", "acquisition", "traffic", "campaign", "ads"],
    ),
    (
        Category::Feature,
        &["機能", "フォーム", "実装", "feature", "form", "tool", "implement"],
    ),
];

const URGENT_KEYWORDS: &[&str] = &["緊急", "至急", "すぐに", "urgent", "immediately", "critical"];
const HIGH_KEYWORDS: &[&str] = &["重要", "優先", "important", "high priority"];

/// Lines starting with a markdown heading marker.
pub(crate) fn is_heading(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

/// Parse `line` as a numbered item, returning its index and text.
pub(crate) fn numbered_item(line: &str) -> Option<(u32, &str)> {
    let caps = RE_NUMBERED_ITEM.captures(line.trim())?;
    let index = caps.get(1)?.as_str().parse().ok()?;
    Some((index, caps.get(2)?.as_str()))
}

struct OpenItem {
    title: String,
    description: String,
}

impl OpenItem {
    fn start(text: &str) -> Self {
        let text = text.replace("**", "");
        let (title, description) = split_title(text.trim());
        Self {
            title: title.to_string(),
            description: description.to_string(),
        }
    }

    fn append(&mut self, line: &str) {
        if !self.description.is_empty() {
            self.description.push(' ');
        }
        self.description.push_str(line);
    }

    fn finish(self, position: usize) -> RecommendationRecord {
        let full_text = format!("{} {}", self.title, self.description);
        RecommendationRecord {
            category: estimate_category(&full_text),
            priority: estimate_priority(&full_text, position),
            title: self.title,
            description: self.description,
            expected_impact: None,
        }
    }
}

/// Split item text into title and description: at the first colon, else at a
/// sentence ending inside the split window, else all title.
fn split_title(text: &str) -> (&str, &str) {
    if let Some(i) = text.find([':', '：']) {
        let colon_len = text[i..].chars().next().map_or(1, char::len_utf8);
        return (text[..i].trim(), text[i + colon_len..].trim());
    }
    let boundary = text
        .char_indices()
        .take(SENTENCE_SPLIT_WINDOW)
        .find(|&(i, c)| i > 0 && is_sentence_end(text, i, c));
    match boundary {
        Some((i, c)) => (text[..i].trim(), text[i + c.len_utf8()..].trim()),
        None => (text, ""),
    }
}

/// An ASCII period only ends a sentence before whitespace or end of text,
/// so `65.3` and `v1.2` stay whole.
fn is_sentence_end(text: &str, i: usize, c: char) -> bool {
    if !SENTENCE_ENDINGS.contains(&c) {
        return false;
    }
    if c != '.' {
        return true;
    }
    text[i + 1..].chars().next().is_none_or(char::is_whitespace)
}

/// Japanese keywords match anywhere. ASCII keywords must stand as a word,
/// optionally pluralized, so `ui` does not fire inside `build`.
fn has_keyword(lower: &str, keyword: &str) -> bool {
    if !keyword.is_ascii() {
        return lower.contains(keyword);
    }
    let is_word = |c: char| c.is_ascii_alphanumeric();
    lower.match_indices(keyword).any(|(i, _)| {
        let before = lower[..i].chars().next_back();
        let mut after = lower[i + keyword.len()..].chars();
        let next = match after.next() {
            Some('s') => after.next(),
            other => other,
        };
        !before.is_some_and(is_word) && !next.is_some_and(is_word)
    })
}

/// Best-effort bucket from keywords.
pub fn estimate_category(text: &str) -> Category {
    let lower = text.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| has_keyword(&lower, k)))
        .map(|(category, _)| category.clone())
        .unwrap_or(Category::Other)
}

/// Keywords take precedence over list position.
pub fn estimate_priority(text: &str, position: usize) -> Priority {
    let lower = text.to_lowercase();
    if URGENT_KEYWORDS.iter().any(|k| has_keyword(&lower, k)) {
        Priority::Urgent
    } else if HIGH_KEYWORDS.iter().any(|k| has_keyword(&lower, k)) || position == 0 {
        Priority::High
    } else if position == 1 {
        Priority::Medium
    } else {
        Priority::Low
    }
}

/// Collect `1. ...` items, folding continuation lines into the description.
pub fn parse_numbered_list(raw: &str) -> Vec<RecommendationRecord> {
    let mut records = Vec::new();
    let mut open: Option<OpenItem> = None;

    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || is_heading(trimmed) {
            continue;
        }
        if let Some((_, text)) = numbered_item(trimmed) {
            if let Some(item) = open.take() {
                records.push(item.finish(records.len()));
            }
            open = Some(OpenItem::start(text));
        } else if trimmed.starts_with('-') {
            continue;
        } else if let Some(item) = open.as_mut() {
            item.append(trimmed);
        }
    }

    if let Some(item) = open {
        records.push(item.finish(records.len()));
    }
    records
}

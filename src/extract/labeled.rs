use crate::analysis::{Category, Priority, RecommendationRecord};

/// Line separating labeled blocks.
pub const BLOCK_SEPARATOR: &str = "---";

pub const LABEL_TITLE: &str = "タイトル";
pub const LABEL_DESCRIPTION: &str = "説明";
pub const LABEL_CATEGORY: &str = "カテゴリ";
pub const LABEL_PRIORITY: &str = "優先度";
pub const LABEL_EXPECTED_IMPACT: &str = "期待効果";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Description,
    Category,
    Priority,
    ExpectedImpact,
}

const FIELDS: [(&str, Field); 5] = [
    (LABEL_TITLE, Field::Title),
    (LABEL_DESCRIPTION, Field::Description),
    (LABEL_CATEGORY, Field::Category),
    (LABEL_PRIORITY, Field::Priority),
    (LABEL_EXPECTED_IMPACT, Field::ExpectedImpact),
];

#[derive(Debug, Default)]
struct BlockFields {
    title: String,
    description: String,
    category: String,
    priority: String,
    expected_impact: String,
}

impl BlockFields {
    fn set(&mut self, field: Field, value: &str) {
        let slot = match field {
            Field::Title => &mut self.title,
            Field::Description => &mut self.description,
            Field::Category => &mut self.category,
            Field::Priority => &mut self.priority,
            Field::ExpectedImpact => &mut self.expected_impact,
        };
        *slot = value.trim().to_string();
    }

    fn append_description(&mut self, line: &str) {
        if !self.description.is_empty() {
            self.description.push(' ');
        }
        self.description.push_str(line);
    }

    fn into_record(self) -> Option<RecommendationRecord> {
        if self.title.is_empty()
            || self.description.is_empty()
            || self.category.is_empty()
            || self.priority.is_empty()
        {
            return None;
        }
        Some(RecommendationRecord {
            title: self.title,
            description: self.description,
            category: Category::from_label(&self.category),
            priority: Priority::from_label(&self.priority),
            expected_impact: Some(self.expected_impact).filter(|s| !s.is_empty()),
        })
    }
}

/// Match `label: value` (ASCII or full-width colon), tolerating bold
/// markers and a leading bullet around the label.
fn match_label(line: &str) -> Option<(Field, &str)> {
    let line = line.trim_start_matches(['-', '*', ' ']);
    FIELDS.iter().find_map(|(label, field)| {
        let rest = line.strip_prefix(label)?;
        let rest = rest.trim_start_matches('*');
        let value = rest
            .strip_prefix(':')
            .or_else(|| rest.strip_prefix('：'))?;
        Some((*field, value.trim_start_matches('*')))
    })
}

/// Split on the separator line and turn each complete block into a record.
pub fn parse_labeled_blocks(raw: &str) -> Vec<RecommendationRecord> {
    split_blocks(raw)
        .into_iter()
        .filter_map(|block| parse_block(&block))
        .collect()
}

fn split_blocks(raw: &str) -> Vec<Vec<&str>> {
    let mut blocks = vec![Vec::new()];
    for line in raw.lines() {
        if line.trim() == BLOCK_SEPARATOR {
            blocks.push(Vec::new());
        } else if let Some(current) = blocks.last_mut() {
            current.push(line);
        }
    }
    blocks
}

fn parse_block(lines: &[&str]) -> Option<RecommendationRecord> {
    let mut fields = BlockFields::default();
    let mut in_description = false;

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some((field, value)) = match_label(line) {
            fields.set(field, value);
            in_description = field == Field::Description;
        } else if in_description {
            fields.append_description(line);
        }
    }

    fields.into_record()
}

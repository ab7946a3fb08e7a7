//! Renders generation requests from a page type, a date range and the
//! metrics payload shown on that page.

pub mod knowledge_base;

use serde_json::Value;

use crate::date_util::{truncate, DateRange};
use crate::dedup::SELECTION_MARKERS;
use crate::extract::labeled::{
    BLOCK_SEPARATOR, LABEL_CATEGORY, LABEL_DESCRIPTION, LABEL_EXPECTED_IMPACT, LABEL_PRIORITY,
    LABEL_TITLE,
};
use crate::page_type::PageType;

pub use knowledge_base::{KnowledgeBase, KnowledgeItem};

/// Bumping this invalidates cache entries in both tiers.
pub const PROMPT_VERSION: &str = "analysis-v1";

const MAX_METRICS_CHARS: usize = 12_000;
const MIN_SELECTIONS: usize = 3;
const MAX_SELECTIONS: usize = 5;

/// Title and analysis focus for pages sharing the common template.
struct PageProfile {
    title: &'static str,
    focus: &'static str,
}

fn profile(page_type: &PageType) -> Option<PageProfile> {
    let (title, focus) = match page_type {
        PageType::Summary => ("全体サマリー", "セッション・ユーザー・コンバージョンの全体的な推移と変化の要因"),
        PageType::Users => ("ユーザー分析", "新規・リピーターの構成と定着の状況"),
        PageType::Day => ("日別分析", "日ごとの変動、急増・急減した日とその要因"),
        PageType::Week => ("曜日別分析", "曜日ごとの傾向と施策を打つべき曜日"),
        PageType::Hour => ("時間帯別分析", "時間帯ごとのアクセス傾向と配信・更新に適した時間"),
        PageType::Demographics => ("ユーザー属性", "地域・デバイス・年齢層など属性ごとの特徴"),
        PageType::Pages => ("ページ別分析", "閲覧の多いページと成果につながっているページ"),
        PageType::PageCategories => ("ページカテゴリ分析", "カテゴリごとの閲覧傾向と強化すべき領域"),
        PageType::LandingPages => ("ランディングページ分析", "入口ページごとの直帰・エンゲージメントと成果"),
        PageType::FileDownloads => ("ファイルダウンロード分析", "ダウンロードされている資料と関心の傾向"),
        PageType::ExternalLinks => ("外部リンククリック分析", "外部への遷移先と離脱の傾向"),
        PageType::Channels => ("集客チャネル分析", "チャネルごとの流入量と質、コンバージョン貢献"),
        PageType::Keywords => ("流入キーワード分析", "検索クエリの傾向、表示回数・クリック率・掲載順位"),
        PageType::Referrals => ("参照元サイト分析", "参照元ごとの流入と成果"),
        PageType::Conversions => ("コンバージョン分析", "コンバージョンの推移と達成に寄与した要素"),
        PageType::ComprehensiveImprovement | PageType::Unknown(_) => return None,
    };
    Some(PageProfile { title, focus })
}

/// Builds prompt text. Holds the tenant's knowledge base.
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    knowledge_base: KnowledgeBase,
}

impl PromptBuilder {
    pub fn new(knowledge_base: KnowledgeBase) -> Self {
        Self { knowledge_base }
    }

    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.knowledge_base
    }

    pub fn build(&self, page_type: &PageType, range: &DateRange, metrics: &Value) -> String {
        match page_type {
            PageType::ComprehensiveImprovement => self.build_comprehensive(range, metrics),
            other => match profile(other) {
                Some(profile) => build_shared(&profile, range, metrics),
                None => build_generic(other, range, metrics),
            },
        }
    }

    fn build_comprehensive(&self, range: &DateRange, metrics: &Value) -> String {
        let period = describe_period(range);
        let highlights = render_highlights(metrics);
        let metrics_json = render_metrics(metrics);
        let knowledge = self.knowledge_base.render();
        let heading = SELECTION_MARKERS[0];

        format!(
            r#"あなたはWebサイト改善の専門コンサルタントです。{period}のアクセス解析データをもとに、サイト全体の総合分析と改善施策の選定を行ってください。

主要指標:
{highlights}

データ(JSON):
{metrics_json}

改善施策ナレッジベース:
{knowledge}

出力は次の2部構成にしてください。

第1部「## 総合分析」
- 集客・行動・成果の観点から現状と課題を文章で説明してください。
- この部分には改善提案や施策を一切含めないでください。

第2部「## {heading}」
- 上記ナレッジベースから、データに照らして効果の高い施策を{MIN_SELECTIONS}〜{MAX_SELECTIONS}件、IDで選んでください。
- 各施策は次の5項目だけで記述し、施策と施策の間は「{BLOCK_SEPARATOR}」だけの行で区切ってください。

{BLOCK_SEPARATOR}
{LABEL_TITLE}: [ID] 施策名
{LABEL_DESCRIPTION}: このサイトのデータに基づく具体的な実施内容
{LABEL_CATEGORY}: content / design / acquisition / feature / other のいずれか
{LABEL_PRIORITY}: urgent / high / medium / low のいずれか
{LABEL_EXPECTED_IMPACT}: 想定される効果
{BLOCK_SEPARATOR}"#
        )
    }
}

fn build_shared(profile: &PageProfile, range: &DateRange, metrics: &Value) -> String {
    let period = describe_period(range);
    let highlights = render_highlights(metrics);
    let metrics_json = render_metrics(metrics);
    format!(
        r#"あなたはWebサイトのアクセス解析の専門家です。以下は「{title}」レポートの{period}のデータです。

分析の重点: {focus}

主要指標:
{highlights}

データ(JSON):
{metrics_json}

まず現状の分析を見出し付きの文章で簡潔にまとめてください。
その後「## 改善提案」という見出しの下に、具体的な改善提案を「1. タイトル: 説明」の形式の番号付きリストで3〜5件挙げてください。"#,
        title = profile.title,
        focus = profile.focus,
    )
}

fn build_generic(page_type: &PageType, range: &DateRange, metrics: &Value) -> String {
    let period = describe_period(range);
    let metrics_json = render_metrics(metrics);
    format!(
        r#"以下は「{page_type}」ページの{period}のアクセス解析データです。特徴的な点を簡潔に要約してください。

データ(JSON):
{metrics_json}"#
    )
}

fn describe_period(range: &DateRange) -> String {
    format!(
        "{}〜{}（{}日間）",
        range.start_key(),
        range.end_key(),
        range.days()
    )
}

fn render_metrics(metrics: &Value) -> String {
    let json = serde_json::to_string_pretty(metrics).unwrap_or_default();
    let shown = truncate(&json, MAX_METRICS_CHARS);
    if shown.len() < json.len() {
        format!("{shown}\n…(省略)")
    } else {
        json
    }
}

const HIGHLIGHT_FIELDS: [(&str, &str); 5] = [
    ("sessions", "セッション"),
    ("users", "ユーザー"),
    ("pageViews", "ページビュー"),
    ("conversions", "コンバージョン"),
    ("engagementRate", "エンゲージメント率"),
];

/// Headline numbers from well-known top-level metric fields.
fn render_highlights(metrics: &Value) -> String {
    let mut lines: Vec<String> = HIGHLIGHT_FIELDS
        .iter()
        .filter_map(|(field, label)| {
            let value = metrics.get(field)?;
            value.is_number().then(|| format!("- {label}: {value}"))
        })
        .collect();

    let sessions = metrics.get("sessions").and_then(Value::as_f64);
    let conversions = metrics.get("conversions").and_then(Value::as_f64);
    if let (Some(sessions), Some(conversions)) = (sessions, conversions) {
        if sessions > 0.0 {
            lines.push(format!(
                "- コンバージョン率: {:.2}%",
                conversions / sessions * 100.0
            ));
        }
    }

    if lines.is_empty() {
        "- (主要指標なし)".to_string()
    } else {
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn range() -> DateRange {
        DateRange::parse("2025-01-01", "2025-01-31").unwrap()
    }

    #[test]
    fn test_shared_template_includes_metrics_and_period() {
        let prompt = PromptBuilder::default().build(
            &PageType::Summary,
            &range(),
            &json!({"sessions": 1000, "conversions": 10}),
        );
        assert!(prompt.contains("全体サマリー"));
        assert!(prompt.contains("2025-01-01〜2025-01-31（31日間）"));
        assert!(prompt.contains("- セッション: 1000"));
        assert!(prompt.contains("- コンバージョン率: 1.00%"));
        assert!(prompt.contains("番号付きリスト"));
    }

    #[test]
    fn test_shared_pages_use_their_profile() {
        let prompt =
            PromptBuilder::default().build(&PageType::Keywords, &range(), &json!({}));
        assert!(prompt.contains("流入キーワード分析"));
        assert!(prompt.contains("(主要指標なし)"));
    }

    #[test]
    fn test_unknown_page_uses_generic_template() {
        let prompt = PromptBuilder::default().build(
            &PageType::from_tag("heatmap"),
            &range(),
            &json!({"clicks": 5}),
        );
        assert!(prompt.contains("「heatmap」"));
        assert!(!prompt.contains("番号付きリスト"));
        assert!(prompt.contains("\"clicks\": 5"));
    }

    #[test]
    fn test_comprehensive_template_embeds_contract() {
        let builder = PromptBuilder::default();
        let prompt = builder.build(
            &PageType::ComprehensiveImprovement,
            &range(),
            &json!({"sessions": 10}),
        );
        for item in builder.knowledge_base().items() {
            assert!(prompt.contains(&format!("[{}]", item.id)));
        }
        for label in [
            LABEL_TITLE,
            LABEL_DESCRIPTION,
            LABEL_CATEGORY,
            LABEL_PRIORITY,
            LABEL_EXPECTED_IMPACT,
        ] {
            assert!(prompt.contains(&format!("{label}: ")));
        }
        assert!(prompt.contains(&format!("## {}", SELECTION_MARKERS[0])));
        assert!(prompt.contains("3〜5件"));
        assert!(prompt.contains("改善提案や施策を一切含めない"));
    }

    #[test]
    fn test_large_metrics_are_truncated() {
        let big: Vec<u32> = (0..10_000).collect();
        let prompt =
            PromptBuilder::default().build(&PageType::Pages, &range(), &json!({"rows": big}));
        assert!(prompt.contains("…(省略)"));
    }
}

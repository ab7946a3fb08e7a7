use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A candidate improvement the model may select from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeItem {
    pub id: String,
    pub title: String,
    pub category: String,
    pub description: String,
    #[serde(default)]
    pub expected_impact: Option<String>,
}

/// Fixed, enumerated list of improvement candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeBase {
    items: Vec<KnowledgeItem>,
}

impl KnowledgeBase {
    pub fn new(items: Vec<KnowledgeItem>) -> Self {
        Self { items }
    }

    /// Load a JSON array of items. Ids must be non-empty and unique.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let items: Vec<KnowledgeItem> = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("invalid knowledge base {}: {e}", path.display())))?;

        let mut seen = std::collections::HashSet::new();
        for item in &items {
            if item.id.trim().is_empty() {
                return Err(Error::Config("knowledge base item with empty id".into()));
            }
            if !seen.insert(item.id.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate knowledge base id: {}",
                    item.id
                )));
            }
        }
        if items.is_empty() {
            return Err(Error::Config(format!(
                "knowledge base {} has no items",
                path.display()
            )));
        }
        Ok(Self { items })
    }

    pub fn items(&self) -> &[KnowledgeItem] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&KnowledgeItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Enumerated block embedded in the comprehensive prompt.
    pub fn render(&self) -> String {
        self.items
            .iter()
            .map(|item| {
                let impact = item
                    .expected_impact
                    .as_deref()
                    .map(|i| format!(" / 期待効果: {i}"))
                    .unwrap_or_default();
                format!(
                    "[{}] {}（{}）: {}{impact}",
                    item.id, item.title, item.category, item.description
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Built-in candidates used when no tenant file is configured.
    pub fn builtin() -> Self {
        let item = |id: &str, title: &str, category: &str, description: &str, impact: &str| {
            KnowledgeItem {
                id: id.to_string(),
                title: title.to_string(),
                category: category.to_string(),
                description: description.to_string(),
                expected_impact: Some(impact.to_string()),
            }
        };
        Self::new(vec![
            item("KB-01", "ファーストビューのCTA配置", "design",
                "主要な問い合わせ・資料請求ボタンをスクロールなしで見える位置に置く", "CVR 10〜20%改善"),
            item("KB-02", "フォーム項目の削減", "feature",
                "必須項目を絞り込み、入力支援（住所補完など）を追加する", "フォーム完了率 15%改善"),
            item("KB-03", "ランディングページの訴求統一", "content",
                "広告・検索クエリとLPの見出しを一致させ、直帰を減らす", "直帰率 10%低下"),
            item("KB-04", "導入事例コンテンツの拡充", "content",
                "業種別の事例記事を追加し、検討段階のユーザーを後押しする", "事例経由CV 20%増"),
            item("KB-05", "検索意図に沿った記事の追加", "acquisition",
                "流入キーワードの周辺テーマで記事を作成し自然検索流入を増やす", "自然検索流入 15%増"),
            item("KB-06", "タイトル・メタディスクリプションの最適化", "acquisition",
                "表示回数が多くCTRの低いページの検索結果表示を改善する", "CTR 1〜2pt改善"),
            item("KB-07", "モバイル表示の改善", "design",
                "モバイルでの文字サイズ・タップ領域・表示速度を見直す", "モバイル直帰率 10%低下"),
            item("KB-08", "ページ表示速度の改善", "feature",
                "画像圧縮・遅延読み込みで主要ページのLCPを短縮する", "離脱率 5〜10%低下"),
            item("KB-09", "内部リンクと回遊導線の整備", "design",
                "関連ページ・次に読むべきページへのリンクを設置する", "ページ/セッション 10%増"),
            item("KB-10", "資料ダウンロード導線の追加", "feature",
                "検討初期のユーザー向けにホワイトペーパー等のDL導線を設ける", "リード獲得数 20%増"),
            item("KB-11", "広告キャンペーンの配分見直し", "acquisition",
                "CVRの高いチャネル・キャンペーンに予算を寄せる", "CPA 10〜15%改善"),
            item("KB-12", "よくある質問ページの整備", "content",
                "問い合わせの多い疑問に先回りで答え、不安を解消する", "問い合わせ前離脱の減少"),
        ])
    }
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::builtin()
    }
}

//! # メールテンプレート
//!
//! 件名・HTML・テキストの 3 パートからなるテンプレートと、
//! テンプレート変数の抽出・検証・マージを定義する。
//!
//! ## 設計方針
//!
//! - **レンダリングはインフラ層**: このモジュールは変数の静的解析のみを行い、
//!   実際のレンダリング（tera）は `mailcast-infra` の `TemplateRenderer` が担う
//! - **変数の優先順位**: スケジュールのデフォルト値 < 購読者メタデータ

use std::{
    collections::{BTreeSet, HashMap},
    sync::LazyLock,
};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{DomainError, user::UserId};

define_uuid_id! {
    /// テンプレート ID
    pub struct TemplateId;
}

/// テンプレート変数（変数名 → 値）
pub type TemplateData = HashMap<String, String>;

/// `{{ name }}` / `{{ name | filter }}` / `{{ name.field }}` のルート識別子を捕捉する
static VARIABLE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{-?\s*([A-Za-z_][A-Za-z0-9_]*)").expect("変数抽出の正規表現が不正")
});

/// 変数として扱わない予約語
const RESERVED_IDENTIFIERS: &[&str] = &["true", "false", "loop", "__tera_context"];

/// メールテンプレート
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub id:           TemplateId,
    pub user_id:      UserId,
    pub name:         String,
    pub subject_part: String,
    pub html_part:    String,
    pub text_part:    String,
}

impl Template {
    /// 3 パートで参照されている変数名を重複なく返す
    pub fn variables(&self) -> BTreeSet<String> {
        [&self.subject_part, &self.html_part, &self.text_part]
            .into_iter()
            .flat_map(|part| VARIABLE_PATTERN.captures_iter(part))
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str())
            .filter(|name| !RESERVED_IDENTIFIERS.contains(name))
            .map(str::to_string)
            .collect()
    }

    /// 参照されている全変数がデフォルト値で埋まることを検証する
    ///
    /// 不足している変数名をソート済みでエラーメッセージに含める。
    pub fn validate_variables(&self, defaults: &TemplateData) -> Result<(), DomainError> {
        let missing: Vec<String> = self
            .variables()
            .into_iter()
            .filter(|name| !defaults.contains_key(name))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(DomainError::Validation(format!(
                "テンプレート変数のデフォルト値が不足しています: {}",
                missing.join(", ")
            )))
        }
    }
}

/// デフォルト値に購読者メタデータを上書きマージする
///
/// 同じキーがあれば購読者側の値を採用する。
pub fn merge_variables(
    defaults: &TemplateData,
    subscriber_metadata: &HashMap<String, String>,
) -> TemplateData {
    let mut merged = defaults.clone();
    merged.extend(
        subscriber_metadata
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );
    merged
}

/// レンダリング済みの 3 パート
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedParts {
    pub subject: String,
    pub html:    String,
    pub text:    String,
}

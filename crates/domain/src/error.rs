//! # ドメイン層エラー定義
//!
//! ビジネスルール違反やドメイン固有の例外状態を表現するエラー型。
//!
//! ## 設計方針
//!
//! - **型による分類**: エラーの種類を列挙型で明示し、パターンマッチで処理可能に
//! - **thiserror 活用**: `#[error(...)]` マクロでエラーメッセージを自動生成
//!
//! ## 使用例
//!
//! ```rust
//! use mailcast_domain::DomainError;
//!
//! fn validate_address(address: &str) -> Result<(), DomainError> {
//!     if address.is_empty() {
//!         return Err(DomainError::Validation("送信元アドレスは必須です".to_string()));
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// ドメイン層で発生するエラー
///
/// ユースケース層でこのエラーを受け取り、ログ出力やメッセージの
/// 破棄/再配信の判断に使う。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    /// バリデーションエラー
    ///
    /// 入力値がビジネスルールに違反している場合に使用する。
    ///
    /// # 例
    ///
    /// - テンプレート変数がデフォルト値で埋まらない
    /// - 不正なステータス文字列
    #[error("バリデーションエラー: {0}")]
    Validation(String),

    /// エンティティが見つからない
    ///
    /// # フィールド
    ///
    /// - `entity_type`: エンティティの種類（コンパイル時に決定される `&'static str`）
    /// - `id`: 検索に使用した識別子
    #[error("{entity_type} が見つかりません: {id}")]
    NotFound {
        /// エンティティの種類（"Campaign", "Template" など）
        entity_type: &'static str,
        /// 検索に使用した識別子
        id:          String,
    },

    /// 不正な状態遷移
    ///
    /// 終端状態（`sent` / `failed`）のキャンペーンを再度遷移させようとした場合など。
    #[error("{entity_type} の状態遷移が不正です: {from} → {to}")]
    InvalidStateTransition {
        entity_type: &'static str,
        from:        String,
        to:          String,
    },
}

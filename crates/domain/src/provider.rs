//! # 送信プロバイダ
//!
//! プロバイダへの送信要求と、その結果の分類を定義する。
//!
//! 結果は閉じた列挙型 [`ProviderOutcome`] で表し、ログ記録・再試行の判断は
//! この列挙に対する網羅的な `match` で行う。
//!
//! | 結果 | 送信ログ | メッセージ | 重複排除キー |
//! |------|---------|-----------|-------------|
//! | `Success` | successful | 削除 | 保持 |
//! | `Terminal*` | failed | 削除 | 保持 |
//! | `Retryable` | 書かない | 残す（再配信） | 削除 |

use crate::{send_log::description, user::ProviderKeys};

/// プロバイダに渡す 1 通分の送信要求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub to:                String,
    /// `From` ヘッダー形式の送信元
    pub source:            String,
    pub subject:           String,
    pub html_body:         String,
    pub text_body:         String,
    /// SES 構成セット名（なければ指定しない）
    pub configuration_set: Option<String>,
    /// メッセージタグ（名前, 値）
    pub tags:              Vec<(String, String)>,
    pub provider_keys:     ProviderKeys,
}

/// 送信結果の分類
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderOutcome {
    /// 送信成功
    Success { message_id: String },
    /// メッセージが拒否された（内容・宛先の問題）
    TerminalRejected,
    /// 送信元ドメインが未検証
    TerminalUnverified,
    /// 構成セットなどの送信設定が存在しない
    TerminalConfigMissing,
    /// スロットリング・一時障害・分類不能なエラー
    Retryable { reason: String },
}

impl ProviderOutcome {
    /// 再試行しても結果が変わらない失敗か
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::TerminalRejected | Self::TerminalUnverified | Self::TerminalConfigMissing
        )
    }

    /// 送信ログに記録する説明文
    pub fn description(&self) -> &str {
        match self {
            Self::Success { .. } => description::SENT,
            Self::TerminalRejected => description::REJECTED,
            Self::TerminalUnverified => description::UNVERIFIED,
            Self::TerminalConfigMissing => description::CONFIG_MISSING,
            Self::Retryable { reason } => reason,
        }
    }
}

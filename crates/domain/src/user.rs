//! # ユーザー
//!
//! キャンペーンを所有するユーザーと、送信プロバイダの認証情報を定義する。
//!
//! ## ドメイン用語
//!
//! | 型 | ドメイン用語 | 備考 |
//! |---|------------|------|
//! | [`User`] | ユーザー | キャンペーン・セグメント・購読者の所有者 |
//! | [`ProviderKeys`] | プロバイダキー | ユーザーごとの SES 認証情報。配信メッセージに同梱される |

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

define_uuid_id! {
    /// ユーザー ID（一意識別子）
    pub struct UserId;
}

/// ユーザー
///
/// `uuid` は外部公開用の識別子。SES の構成セット名やメッセージタグに使う。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id:    UserId,
    pub uuid:  Uuid,
    pub email: String,
    pub name:  String,
}

/// 送信プロバイダの認証情報
///
/// `Debug` 出力ではシークレットをマスクする（ログへの平文出力を防止）。
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderKeys {
    pub access_key_id:     String,
    pub secret_access_key: String,
    pub region:            String,
}

impl fmt::Debug for ProviderKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderKeys")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("region", &self.region)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_keysのdebug出力はシークレットをマスクする() {
        let keys = ProviderKeys {
            access_key_id:     "AKIAEXAMPLE".to_string(),
            secret_access_key: "super-secret".to_string(),
            region:            "ap-northeast-1".to_string(),
        };

        let debug = format!("{keys:?}");

        assert!(debug.contains("AKIAEXAMPLE"));
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super-secret"));
    }

    #[test]
    fn provider_keysはjsonでフィールド名を保持する() {
        let keys = ProviderKeys {
            access_key_id:     "AKIAEXAMPLE".to_string(),
            secret_access_key: "secret".to_string(),
            region:            "us-east-1".to_string(),
        };

        let json = serde_json::to_value(&keys).unwrap();

        assert_eq!(json["access_key_id"], "AKIAEXAMPLE");
        assert_eq!(json["secret_access_key"], "secret");
        assert_eq!(json["region"], "us-east-1");
    }
}

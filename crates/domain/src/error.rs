//! # ドメイン層エラー定義
//!
//! ビジネスルール違反やドメイン固有の例外状態を表現するエラー型。
//!
//! ## エラーの種類と HTTP ステータスの対応
//!
//! | エラー種別 | HTTP ステータス | 用途 |
//! |-----------|----------------|------|
//! | `Validation` | 422 Unprocessable Entity | 入力値の検証失敗 |
//! | `NotFound` | 404 Not Found | エンティティが存在しない |
//!
//! ## 使用例
//!
//! ```rust
//! use notifyd_domain::DomainError;
//!
//! fn validate_text(text: &str) -> Result<(), DomainError> {
//!     if text.is_empty() {
//!         return Err(DomainError::Validation("本文は必須です".to_string()));
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// ドメイン層で発生するエラー
#[derive(Debug, Error)]
pub enum DomainError {
    /// バリデーションエラー
    ///
    /// 通知リクエストや登録リクエストの値がルールに違反している場合に使用する。
    ///
    /// # 例
    ///
    /// - 種別 ID の書式違反
    /// - text / html がどちらも未指定
    /// - 宛先メールアドレスの書式違反
    #[error("バリデーションエラー: {0}")]
    Validation(String),

    /// エンティティが見つからない
    #[error("{entity_type} が見つかりません: {id}")]
    NotFound {
        /// エンティティの種類（"Space", "Organization" など）
        entity_type: &'static str,
        /// 検索に使用した識別子
        id:          String,
    },
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_not_foundのメッセージにエンティティ種別とidを含む() {
        let err = DomainError::NotFound {
            entity_type: "Space",
            id:          "space-001".to_string(),
        };

        assert_eq!(err.to_string(), "Space が見つかりません: space-001");
    }

    #[test]
    fn test_validationのメッセージに詳細を含む() {
        let err = DomainError::Validation("種別 ID は必須です".to_string());

        assert_eq!(err.to_string(), "バリデーションエラー: 種別 ID は必須です");
    }
}

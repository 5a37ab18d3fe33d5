//! # テンプレートファイルストア
//!
//! `{root}/templates/` 以下の既定テンプレートと、運用者が置く
//! `{root}/templates/overrides/` の上書きテンプレートを読み込む。
//!
//! ## 設計方針
//!
//! - **上書き優先**: 同名ファイルが `overrides/` にあればそちらを使い、なければ既定を使う
//! - **読み込みのみ**: キャッシュは持たず、呼び出し側がリクエスト単位で読み込む

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

/// テンプレートの読み込みエラー
#[derive(Debug, Error)]
#[error("テンプレート {name} を読み込めません: {source}")]
pub struct TemplateLoadError {
    pub name:   String,
    #[source]
    pub source: std::io::Error,
}

/// テンプレート読み込み trait
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// 名前（例: `user_body.html`）でテンプレートを読み込む
    async fn load(&self, name: &str) -> Result<String, TemplateLoadError>;
}

/// ファイルシステム上のテンプレートストア
#[derive(Debug, Clone)]
pub struct FileTemplateStore {
    root: PathBuf,
}

impl FileTemplateStore {
    /// `root` は `templates/` ディレクトリを含むディレクトリ
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn default_path(&self, name: &str) -> PathBuf {
        self.root.join("templates").join(name)
    }

    fn override_path(&self, name: &str) -> PathBuf {
        self.root.join("templates").join("overrides").join(name)
    }

    async fn read(path: &Path, name: &str) -> Result<String, TemplateLoadError> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|source| TemplateLoadError {
                name: name.to_string(),
                source,
            })
    }
}

#[async_trait]
impl TemplateStore for FileTemplateStore {
    #[tracing::instrument(skip(self), level = "debug")]
    async fn load(&self, name: &str) -> Result<String, TemplateLoadError> {
        let override_path = self.override_path(name);
        let has_override = tokio::fs::try_exists(&override_path)
            .await
            .map_err(|source| TemplateLoadError {
                name: name.to_string(),
                source,
            })?;

        if has_override {
            tracing::debug!(path = %override_path.display(), "上書きテンプレートを使用します");
            Self::read(&override_path, name).await
        } else {
            Self::read(&self.default_path(name), name).await
        }
    }
}

//! # Notification Service 設定
//!
//! 環境変数から Notification Service の設定を読み込む。
//!
//! 必須の値が欠けている場合や、数値・真偽値として解釈できない値が
//! 設定されている場合は [`ConfigError`] を返す。起動処理はこれを
//! そのまま `anyhow::Error` として伝播させる。

use std::{env, str::FromStr, time::Duration as StdDuration};

use chrono::Duration;
use notifyd_domain::job::RetryPolicy;
use notifyd_infra::{notification::SmtpSettings, queue::QueueSettings};
use thiserror::Error;

/// 設定読み込みエラー
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// 必須の環境変数が設定されていない
    #[error("{0} が設定されていません")]
    Missing(&'static str),

    /// 値を解釈できない
    #[error("{name} の値が不正です: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// 送信バックエンド
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationBackend {
    /// SMTP サーバー経由で送信
    Smtp,
    /// 送信しない（ログ出力のみ）
    Noop,
}

/// Notification Service の設定
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// バインドアドレス
    pub host:           String,
    /// ポート番号
    pub port:           u16,
    /// データベース接続 URL
    pub database_url:   String,
    /// `templates/` を含むディレクトリ
    pub root_path:      String,
    /// 送信元メールアドレス
    pub sender:         String,
    /// 送信設定
    pub notification:   NotificationConfig,
    /// ディレクトリサービス設定
    pub directory:      DirectoryConfig,
    /// インスタンス番号（0 がリーダー）
    pub instance_index: u32,
    /// ジョブキューとワーカー設定
    pub queue:          QueueConfig,
    /// メッセージ GC 設定
    pub gc:             GcConfig,
}

/// 送信機能の設定
///
/// `NOTIFICATION_BACKEND` 環境変数で送信バックエンドを切り替える:
/// - `smtp`: SMTP サーバー経由で送信（デフォルト）
/// - `noop`: 送信しない（ログ出力のみ）
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub backend: NotificationBackend,
    pub smtp:    SmtpSettings,
}

/// ディレクトリサービスの接続先
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// ユーザーディレクトリ（UAA）の URL
    pub uaa_host:          String,
    pub uaa_client_id:     String,
    pub uaa_client_secret: String,
    /// 組織ディレクトリ（Cloud Controller）の URL
    pub cc_host:           String,
}

/// ジョブキューとワーカーの設定
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    /// ワーカー数
    pub worker_count: usize,
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff:  Duration,
    /// 1 回の予約で待つ最大時間
    pub reserve_wait: StdDuration,
    /// 予約のリース期間
    pub lease:        Duration,
}

impl QueueConfig {
    /// キュー実装に渡す設定に変換する
    pub fn settings(&self) -> QueueSettings {
        QueueSettings {
            retry_policy: RetryPolicy::new(self.max_attempts, self.base_backoff, self.max_backoff),
            lease: self.lease,
            ..QueueSettings::default()
        }
    }
}

/// メッセージ GC の設定
#[derive(Debug, Clone, Copy)]
pub struct GcConfig {
    /// 掃除の間隔
    pub interval:  StdDuration,
    /// 配信結果の保持期間
    pub retention: Duration,
}

impl NotifyConfig {
    /// 環境変数から設定を読み込む
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// 任意の参照関数から設定を読み込む
    ///
    /// テストでは環境変数を書き換えずに HashMap から読み込む。
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars { lookup: &lookup };

        Ok(Self {
            host:           vars.or("NOTIFY_HOST", "0.0.0.0"),
            port:           vars.parse_required("NOTIFY_PORT")?,
            database_url:   vars.required("DATABASE_URL")?,
            root_path:      vars.or("ROOT_PATH", "."),
            sender:         vars.required("SENDER")?,
            notification:   NotificationConfig {
                backend: match vars.or("NOTIFICATION_BACKEND", "smtp").as_str() {
                    "smtp" => NotificationBackend::Smtp,
                    "noop" => NotificationBackend::Noop,
                    other => {
                        return Err(ConfigError::Invalid {
                            name:  "NOTIFICATION_BACKEND",
                            value: other.to_string(),
                        });
                    }
                },
                smtp:    SmtpSettings {
                    host:     vars.or("SMTP_HOST", "localhost"),
                    port:     vars.parse_or("SMTP_PORT", 1025)?,
                    username: vars.optional("SMTP_USER"),
                    password: vars.optional("SMTP_PASS"),
                    tls:      vars.parse_or("SMTP_TLS", false)?,
                },
            },
            directory:      DirectoryConfig {
                uaa_host:          vars.required("UAA_HOST")?,
                uaa_client_id:     vars.required("UAA_CLIENT_ID")?,
                uaa_client_secret: vars.required("UAA_CLIENT_SECRET")?,
                cc_host:           vars.required("CC_HOST")?,
            },
            instance_index: vars.parse_or("INSTANCE_INDEX", 0)?,
            queue:          QueueConfig {
                worker_count: vars.parse_or("WORKER_COUNT", 10)?,
                max_attempts: vars.parse_or("JOB_MAX_ATTEMPTS", 10)?,
                base_backoff: Duration::seconds(vars.parse_or("JOB_BASE_BACKOFF_SECS", 1)?),
                max_backoff:  Duration::seconds(vars.parse_or("JOB_MAX_BACKOFF_SECS", 600)?),
                reserve_wait: StdDuration::from_secs(vars.parse_or("JOB_RESERVE_WAIT_SECS", 5)?),
                lease:        Duration::seconds(vars.parse_or("JOB_LEASE_SECS", 600)?),
            },
            gc:             GcConfig {
                interval:  StdDuration::from_secs(vars.parse_or("MESSAGE_GC_INTERVAL_SECS", 3600)?),
                retention: Duration::seconds(vars.parse_or("MESSAGE_RETENTION_SECS", 86_400)?),
            },
        })
    }

    /// リーダーインスタンスか（マイグレーションと unlock を担当する）
    pub fn is_leader(&self) -> bool {
        self.instance_index == 0
    }
}

struct Vars<'a, F> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    fn optional(&self, name: &'static str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.trim().is_empty())
    }

    fn or(&self, name: &'static str, default: &str) -> String {
        self.optional(name).unwrap_or_else(|| default.to_string())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.optional(name).ok_or(ConfigError::Missing(name))
    }

    fn parse<T: FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
        value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value })
    }

    fn parse_required<T: FromStr>(&self, name: &'static str) -> Result<T, ConfigError> {
        Self::parse(name, self.required(name)?)
    }

    fn parse_or<T: FromStr>(&self, name: &'static str, default: T) -> Result<T, ConfigError> {
        match self.optional(name) {
            Some(value) => Self::parse(name, value),
            None => Ok(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;

    fn required_vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("NOTIFY_PORT", "3000"),
            ("DATABASE_URL", "postgres://localhost/notifyd"),
            ("SENDER", "no-reply@example.com"),
            ("UAA_HOST", "http://uaa.example.com"),
            ("UAA_CLIENT_ID", "notifications"),
            ("UAA_CLIENT_SECRET", "secret"),
            ("CC_HOST", "http://api.example.com"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<NotifyConfig, ConfigError> {
        NotifyConfig::from_lookup(|name| vars.get(name).map(ToString::to_string))
    }

    #[test]
    fn test_必須項目だけでデフォルト値が適用される() {
        let config = load(&required_vars()).unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.root_path, ".");
        assert_eq!(config.notification.backend, NotificationBackend::Smtp);
        assert_eq!(config.notification.smtp.port, 1025);
        assert!(!config.notification.smtp.tls);
        assert!(config.is_leader());
        assert_eq!(config.queue.worker_count, 10);
        assert_eq!(config.queue.max_attempts, 10);
        assert_eq!(config.queue.base_backoff, Duration::seconds(1));
        assert_eq!(config.queue.max_backoff, Duration::seconds(600));
        assert_eq!(config.queue.reserve_wait, StdDuration::from_secs(5));
        assert_eq!(config.queue.lease, Duration::seconds(600));
        assert_eq!(config.gc.interval, StdDuration::from_secs(3600));
        assert_eq!(config.gc.retention, Duration::hours(24));
    }

    #[test]
    fn test_必須項目がなければmissingを返す() {
        let mut vars = required_vars();
        vars.remove("SENDER");

        assert_eq!(load(&vars).unwrap_err(), ConfigError::Missing("SENDER"));
    }

    #[test]
    fn test_数値として解釈できなければinvalidを返す() {
        let mut vars = required_vars();
        vars.insert("WORKER_COUNT", "ten");

        assert_eq!(
            load(&vars).unwrap_err(),
            ConfigError::Invalid {
                name:  "WORKER_COUNT",
                value: "ten".to_string(),
            }
        );
    }

    #[test]
    fn test_未知のバックエンドはinvalidを返す() {
        let mut vars = required_vars();
        vars.insert("NOTIFICATION_BACKEND", "ses");

        assert!(matches!(
            load(&vars),
            Err(ConfigError::Invalid {
                name: "NOTIFICATION_BACKEND",
                ..
            })
        ));
    }

    #[test]
    fn test_インスタンス番号が0以外ならリーダーではない() {
        let mut vars = required_vars();
        vars.insert("INSTANCE_INDEX", "2");
        vars.insert("NOTIFICATION_BACKEND", "noop");
        vars.insert("SMTP_USER", "mailer");
        vars.insert("SMTP_PASS", "pw");

        let config = load(&vars).unwrap();

        assert!(!config.is_leader());
        assert_eq!(config.notification.backend, NotificationBackend::Noop);
        assert_eq!(config.notification.smtp.username.as_deref(), Some("mailer"));
    }

    #[test]
    fn test_キュー設定はリトライ方針とリースに変換される() {
        let config = load(&required_vars()).unwrap();

        let settings = config.queue.settings();

        assert_eq!(settings.retry_policy.max_attempts(), 10);
        assert_eq!(settings.retry_policy.backoff(1), Duration::seconds(1));
        assert_eq!(settings.lease, Duration::seconds(600));
    }
}

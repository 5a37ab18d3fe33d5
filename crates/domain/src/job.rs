//! # 配信ジョブ
//!
//! 永続キューに積まれる 1 配信単位と、そのリトライ方針を定義する。
//!
//! ## 状態遷移
//!
//! ```text
//!            reserve              succeed
//! queued ──────────────▶ reserved ────────▶ (削除)
//!    ▲                      │
//!    │   fail (上限未満)     │ fail (上限到達) / discard
//!    └──────────────────────┤
//!                           ▼
//!                         (削除)
//! ```
//!
//! ## 設計方針
//!
//! - **バックオフは純粋関数**: 現在時刻とジッタを引数で受け取り、乱数や時計に依存しない
//! - **単調増加**: 上限未満の失敗は必ず直前の `available_at` より後の時刻を返す

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{DomainError, notification::Delivery};

define_uuid_id! {
    /// ジョブ ID
    pub struct JobId;
}

define_string_id! {
    /// ワーカー ID
    ///
    /// 予約者の識別に使う。プロセスをまたいで一意になるようインスタンス番号を含める。
    pub struct WorkerId {
        label: "ワーカー ID",
    }
}

/// ジョブの状態
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum JobState {
    Queued,
    Reserved,
}

/// 予約済みジョブ
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id:           JobId,
    pub payload:      serde_json::Value,
    pub state:        JobState,
    /// これまでに失敗した回数
    pub attempts:     u32,
    pub available_at: DateTime<Utc>,
    pub reserved_by:  Option<WorkerId>,
    pub created_at:   DateTime<Utc>,
}

impl Job {
    /// ペイロードを配信レコードとしてデコードする
    pub fn delivery(&self) -> Result<Delivery, DomainError> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| DomainError::Validation(format!("配信レコードを復元できません: {e}")))
    }
}

/// 失敗時の判定結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// `available_at` まで待って再予約可能
    Retry {
        attempts:     u32,
        available_at: DateTime<Utc>,
    },
    /// 上限に達したため恒久的に失敗
    Exhausted { attempts: u32 },
}

/// リトライ方針（上限付き指数バックオフ + ジッタ）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay:   Duration,
    max_delay:    Duration,
}

impl RetryPolicy {
    /// 最小の遅延。0 秒のバックオフは単調性を壊すため下限を設ける。
    const MIN_DELAY_MS: i64 = 1;

    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        let base_delay = base_delay.max(Duration::milliseconds(Self::MIN_DELAY_MS));
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// ジッタの上限（基本遅延と同じ幅）
    pub fn jitter_bound(&self) -> Duration {
        self.base_delay
    }

    /// `attempts` 回目の失敗後の待ち時間（ジッタなし）
    ///
    /// `base * 2^(attempts - 1)` を `max_delay` で打ち切る。
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(30);
        let factor = 1_i32 << exponent;
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// 失敗を記録した結果を判定する
    ///
    /// `previous_attempts` はこの失敗より前の失敗回数。`jitter` は `0..=jitter_bound()`
    /// の範囲に丸められる。
    pub fn on_failure(
        &self,
        previous_attempts: u32,
        now: DateTime<Utc>,
        jitter: Duration,
    ) -> FailOutcome {
        let attempts = previous_attempts.saturating_add(1);
        if attempts >= self.max_attempts {
            return FailOutcome::Exhausted { attempts };
        }

        let jitter = jitter.clamp(Duration::zero(), self.jitter_bound());
        FailOutcome::Retry {
            attempts,
            available_at: now + self.backoff(attempts) + jitter,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(10, Duration::seconds(1), Duration::minutes(10))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(5, Duration::seconds(2), Duration::seconds(20))
    }

    #[rstest]
    #[case(1, 2)]
    #[case(2, 4)]
    #[case(3, 8)]
    #[case(4, 16)]
    #[case(5, 20)]
    #[case(40, 20)]
    fn test_backoffは指数的に増え上限で打ち切られる(#[case] attempts: u32, #[case] secs: i64) {
        assert_eq!(policy().backoff(attempts), Duration::seconds(secs));
    }

    #[test]
    fn test_上限未満の失敗はretryを返す() {
        let now = Utc::now();

        let outcome = policy().on_failure(0, now, Duration::zero());

        assert_eq!(
            outcome,
            FailOutcome::Retry {
                attempts:     1,
                available_at: now + Duration::seconds(2),
            }
        );
    }

    #[test]
    fn test_上限に達するとexhaustedを返す() {
        let outcome = policy().on_failure(4, Utc::now(), Duration::zero());

        assert_eq!(outcome, FailOutcome::Exhausted { attempts: 5 });
    }

    #[test]
    fn test_ジッタは上限に丸められる() {
        let now = Utc::now();

        let outcome = policy().on_failure(0, now, Duration::hours(1));

        assert_eq!(
            outcome,
            FailOutcome::Retry {
                attempts:     1,
                available_at: now + Duration::seconds(4),
            }
        );
    }

    #[test]
    fn test_再試行のavailable_atは直前より常に後になる() {
        let policy = policy();
        let mut available_at = Utc::now();

        for previous in 0..policy.max_attempts() - 1 {
            // 予約されるのは available_at 以降なので、失敗時刻もそれ以降
            let now = available_at;
            match policy.on_failure(previous, now, Duration::zero()) {
                FailOutcome::Retry {
                    available_at: next, ..
                } => {
                    assert!(next > available_at);
                    available_at = next;
                }
                FailOutcome::Exhausted { .. } => panic!("上限前に exhausted になった"),
            }
        }
    }

    #[test]
    fn test_基本遅延ゼロでも最小遅延が適用される() {
        let policy = RetryPolicy::new(3, Duration::zero(), Duration::zero());

        assert!(policy.backoff(1) > Duration::zero());
    }

    #[test]
    fn test_壊れたペイロードはvalidationエラーになる() {
        let job = Job {
            id:           JobId::new(),
            payload:      serde_json::json!({"unexpected": true}),
            state:        JobState::Reserved,
            attempts:     0,
            available_at: Utc::now(),
            reserved_by:  None,
            created_at:   Utc::now(),
        };

        assert!(matches!(job.delivery(), Err(DomainError::Validation(_))));
    }
}

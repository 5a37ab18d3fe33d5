//! MessageRepository 統合テスト
//!
//! 実行方法:
//! ```bash
//! cargo test -p notifyd-infra --test message_repository_test
//! ```

mod common;

use chrono::Duration;
use common::test_now;
use notifyd_domain::{message::MessageStatus, notification::MessageId};
use notifyd_infra::repository::{MessageRepository, PostgresMessageRepository};
use pretty_assertions::assert_eq;
use sqlx::PgPool;

#[sqlx::test(migrations = "../../migrations")]
async fn test_記録したステータスを取得できる(pool: PgPool) {
    let sut = PostgresMessageRepository::new(pool);
    let id = MessageId::new();

    sut.upsert_status(&id, MessageStatus::Delivered, test_now())
        .await
        .unwrap();

    let message = sut.find_by_id(&id).await.unwrap().unwrap();
    assert_eq!(message.id, id);
    assert_eq!(message.status, MessageStatus::Delivered);
    assert_eq!(message.created_at, test_now());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_再記録でステータスを上書きし作成日時は保持する(pool: PgPool) {
    let sut = PostgresMessageRepository::new(pool);
    let id = MessageId::new();
    let later = test_now() + Duration::minutes(3);

    sut.upsert_status(&id, MessageStatus::Unavailable, test_now())
        .await
        .unwrap();
    sut.upsert_status(&id, MessageStatus::Delivered, later)
        .await
        .unwrap();

    let message = sut.find_by_id(&id).await.unwrap().unwrap();
    assert_eq!(message.status, MessageStatus::Delivered);
    assert_eq!(message.created_at, test_now());
    assert_eq!(message.updated_at, later);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_存在しないidはnoneを返す(pool: PgPool) {
    let sut = PostgresMessageRepository::new(pool);

    assert_eq!(sut.find_by_id(&MessageId::new()).await.unwrap(), None);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_期限より古い配信結果だけを上限件数まで削除する(pool: PgPool) {
    let sut = PostgresMessageRepository::new(pool);
    let old: Vec<MessageId> = (0..3).map(|_| MessageId::new()).collect();
    for (i, id) in old.iter().enumerate() {
        sut.upsert_status(id, MessageStatus::Delivered, test_now() + Duration::seconds(i as i64))
            .await
            .unwrap();
    }
    let fresh = MessageId::new();
    sut.upsert_status(&fresh, MessageStatus::Failed, test_now() + Duration::days(2))
        .await
        .unwrap();
    let cutoff = test_now() + Duration::days(1);

    let first = sut.delete_created_before(cutoff, 2).await.unwrap();
    let second = sut.delete_created_before(cutoff, 2).await.unwrap();
    let third = sut.delete_created_before(cutoff, 2).await.unwrap();

    assert_eq!((first, second, third), (2, 1, 0));
    for id in &old {
        assert_eq!(sut.find_by_id(id).await.unwrap(), None);
    }
    assert!(sut.find_by_id(&fresh).await.unwrap().is_some());
}

//! UnsubscribeRepository 統合テスト
//!
//! 実行方法:
//! ```bash
//! cargo test -p notifyd-infra --test unsubscribe_repository_test
//! ```

mod common;

use common::{client_id, kind_id, user};
use notifyd_domain::client::KindId;
use notifyd_infra::{
    PgTransactionManager,
    TransactionManager,
    repository::{PostgresUnsubscribeRepository, UnsubscribeRepository},
};
use sqlx::PgPool;

#[sqlx::test(migrations = "../../migrations")]
async fn test_全体の配信停止を判定できる(pool: PgPool) {
    sqlx::query("INSERT INTO global_unsubscribes (user_guid) VALUES ('user-1')")
        .execute(&pool)
        .await
        .unwrap();
    let sut = PostgresUnsubscribeRepository::new();
    let mut tx = PgTransactionManager::new(pool).begin().await.unwrap();

    assert!(sut.is_globally_unsubscribed(&mut tx, &user("user-1")).await.unwrap());
    assert!(!sut.is_globally_unsubscribed(&mut tx, &user("user-2")).await.unwrap());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_種別単位の配信停止は組が一致したときだけ有効(pool: PgPool) {
    sqlx::query(
        "INSERT INTO unsubscribes (user_guid, client_id, kind_id) VALUES ('user-1', 'billing', 'invoice.ready')",
    )
    .execute(&pool)
    .await
    .unwrap();
    let sut = PostgresUnsubscribeRepository::new();
    let mut tx = PgTransactionManager::new(pool).begin().await.unwrap();
    let other_kind = KindId::new("invoice.overdue").unwrap();

    assert!(
        sut.is_unsubscribed(&mut tx, &user("user-1"), &client_id(), &kind_id())
            .await
            .unwrap()
    );
    assert!(
        !sut.is_unsubscribed(&mut tx, &user("user-1"), &client_id(), &other_kind)
            .await
            .unwrap()
    );
    assert!(
        !sut.is_unsubscribed(&mut tx, &user("user-2"), &client_id(), &kind_id())
            .await
            .unwrap()
    );
}

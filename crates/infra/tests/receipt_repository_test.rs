//! ReceiptRepository 統合テスト
//!
//! 実行方法:
//! ```bash
//! cargo test -p notifyd-infra --test receipt_repository_test
//! ```

mod common;

use common::{client_id, kind_id, user};
use notifyd_infra::{
    PgTransactionManager,
    TransactionManager,
    repository::{PostgresReceiptRepository, ReceiptRepository},
};
use pretty_assertions::assert_eq;
use sqlx::PgPool;

async fn receipt_count(pool: &PgPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM receipts")
        .fetch_one(pool)
        .await
        .unwrap()
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_同じ組を繰り返し記録しても1行になる(pool: PgPool) {
    let sut = PostgresReceiptRepository::new();
    let tm = PgTransactionManager::new(pool.clone());

    for _ in 0..2 {
        let mut tx = tm.begin().await.unwrap();
        sut.create_receipts(
            &mut tx,
            &[user("user-1"), user("user-2")],
            &client_id(),
            &kind_id(),
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();
    }

    assert_eq!(receipt_count(&pool).await, 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_コミットしなければ記録されない(pool: PgPool) {
    let sut = PostgresReceiptRepository::new();
    {
        let mut tx = PgTransactionManager::new(pool.clone()).begin().await.unwrap();
        sut.create_receipts(&mut tx, &[user("user-1")], &client_id(), &kind_id())
            .await
            .unwrap();
    }

    assert_eq!(receipt_count(&pool).await, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_空の一覧では何もしない(pool: PgPool) {
    let sut = PostgresReceiptRepository::new();
    let mut tx = PgTransactionManager::new(pool.clone()).begin().await.unwrap();

    sut.create_receipts(&mut tx, &[], &client_id(), &kind_id())
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(receipt_count(&pool).await, 0);
}

use std::time::Duration;

use jobguard_application::AdmissionQueue;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use super::PostgresAdmissionQueue;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres admission queue tests: {error}");
    }

    Some(pool)
}

fn queue(pool: PgPool, visibility: Duration) -> PostgresAdmissionQueue {
    PostgresAdmissionQueue::new(pool, format!("queue-{}", Uuid::new_v4()), visibility)
        .unwrap_or_else(|_| unreachable!())
}

#[tokio::test]
async fn received_request_stays_hidden_until_deleted() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let queue = queue(pool, Duration::from_secs(300));
    let message_id = queue
        .enqueue("{\"day\":\"2024-01-01\"}", Some("run-2024-01-01"))
        .await
        .unwrap_or_else(|_| unreachable!());

    let received = queue
        .receive_one()
        .await
        .unwrap_or_else(|_| unreachable!())
        .unwrap_or_else(|| unreachable!());
    assert_eq!(received.message_id, message_id);
    assert_eq!(received.name.as_deref(), Some("run-2024-01-01"));

    let hidden = queue.receive_one().await.unwrap_or_else(|_| unreachable!());
    assert!(hidden.is_none());

    assert!(queue.delete(&received).await.is_ok());
    let remaining = sqlx::query_scalar::<_, i64>(
        "SELECT count(*) FROM admission_requests WHERE queue_name = $1",
    )
    .bind(queue.queue_name())
    .fetch_one(&queue.pool)
    .await;
    assert_eq!(remaining.ok(), Some(0));
}

#[tokio::test]
async fn expired_visibility_redelivers_with_new_receipt_handle() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let queue = queue(pool, Duration::from_secs(1));
    queue
        .enqueue("{}", None)
        .await
        .unwrap_or_else(|_| unreachable!());

    let first = queue
        .receive_one()
        .await
        .unwrap_or_else(|_| unreachable!())
        .unwrap_or_else(|| unreachable!());
    tokio::time::sleep(Duration::from_millis(1_200)).await;
    let second = queue
        .receive_one()
        .await
        .unwrap_or_else(|_| unreachable!())
        .unwrap_or_else(|| unreachable!());

    assert_eq!(first.message_id, second.message_id);
    assert_ne!(first.receipt_handle, second.receipt_handle);

    assert!(queue.delete(&first).await.is_ok());
    assert!(queue.delete(&second).await.is_ok());
    let after = queue.receive_one().await.unwrap_or_else(|_| unreachable!());
    assert!(after.is_none());
}

#[tokio::test]
async fn queues_are_isolated_by_name() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let first = queue(pool.clone(), Duration::from_secs(30));
    let second = queue(pool, Duration::from_secs(30));
    first
        .enqueue("{}", None)
        .await
        .unwrap_or_else(|_| unreachable!());

    let other = second.receive_one().await.unwrap_or_else(|_| unreachable!());
    assert!(other.is_none());
}

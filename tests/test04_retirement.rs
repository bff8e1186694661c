mod common;

use std::time::Duration;

use common::{build_pool, ready, wait_for_status};
use sql_pool::prelude::*;

#[tokio::test]
async fn invalid_connection_is_closed_instead_of_idled() -> Result<(), SqlPoolError> {
    let factory = MockFactory::new();
    let pool = build_pool(&factory, 2, 0).await;

    let mut conn = ready(pool.acquire(Duration::ZERO).await);
    conn.invalidate();
    pool.release(conn).await;

    assert_eq!(factory.closed(), 1);
    let status = pool.status();
    assert_eq!(status.available, 1);
    assert_eq!(status.idle, 1);
    assert_eq!(status.retired, 1);
    Ok(())
}

#[tokio::test]
async fn connection_closed_by_borrower_is_not_reused() -> Result<(), SqlPoolError> {
    let factory = MockFactory::new();
    let pool = build_pool(&factory, 2, 0).await;

    let mut conn = ready(pool.acquire(Duration::ZERO).await);
    let closed_id = conn.id();
    conn.close().await?;
    pool.release(conn).await;

    assert_eq!(factory.closed(), 1, "already-closed connection is not closed twice");
    let status = pool.status();
    assert_eq!(status.available, 1);
    assert_eq!(status.idle, 1);

    let other = ready(pool.acquire(Duration::ZERO).await);
    assert_ne!(other.id(), closed_id);
    Ok(())
}

#[tokio::test]
async fn close_failures_never_reach_the_releasing_caller() -> Result<(), SqlPoolError> {
    let factory = MockFactory::new();
    let pool = build_pool(&factory, 1, 0).await;
    factory.set_close_failures(true);

    let mut conn = ready(pool.acquire(Duration::ZERO).await);
    conn.invalidate();
    pool.release(conn).await;

    assert_eq!(factory.closed(), 1);
    assert_eq!(pool.status().available, 0);
    Ok(())
}

#[tokio::test]
async fn invalid_release_does_not_feed_a_waiter() -> Result<(), SqlPoolError> {
    let factory = MockFactory::new();
    let pool = build_pool(&factory, 1, 0).await;
    let mut held = ready(pool.acquire(Duration::ZERO).await);

    let outcome = tokio::spawn({
        let pool = pool.clone();
        async move { pool.acquire(Duration::from_millis(80)).await }
    });
    wait_for_status(&pool, |s| s.waiting == 1).await;

    held.invalidate();
    pool.release(held).await;
    assert!(outcome.await.expect("waiter panicked")?.is_timed_out());
    Ok(())
}

#[tokio::test]
async fn monitor_replaces_retired_connections() -> Result<(), SqlPoolError> {
    let factory = MockFactory::new();
    let pool = build_pool(&factory, 2, 2).await;

    let mut conn = ready(pool.acquire(Duration::ZERO).await);
    conn.invalidate();
    pool.release(conn).await;

    let status = wait_for_status(&pool, |s| s.available == 2).await;
    assert_eq!(status.idle, 2);
    assert_eq!(factory.opened(), 3);
    Ok(())
}

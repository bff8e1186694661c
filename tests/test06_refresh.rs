mod common;

use std::collections::HashSet;
use std::time::Duration;

use common::{build_pool, ready, wait_for_status};
use sql_pool::prelude::*;

#[tokio::test]
async fn reset_all_replaces_every_idle_connection() -> Result<(), SqlPoolError> {
    let factory = MockFactory::new();
    let pool = build_pool(&factory, 2, 1).await;
    assert_eq!(pool.status().idle, 2);

    let opened = pool.refresh(true).await?;
    assert_eq!(opened, 2);
    assert_eq!(factory.closed(), 2);

    let status = pool.status();
    assert_eq!(status.available, 2);
    assert_eq!(status.idle, 2);

    let a = ready(pool.acquire(Duration::ZERO).await);
    let b = ready(pool.acquire(Duration::ZERO).await);
    let ids: HashSet<u64> = [a.id(), b.id()].into_iter().collect();
    assert_eq!(ids, HashSet::from([2, 3]));
    Ok(())
}

#[tokio::test]
async fn reset_all_leaves_lent_connections_alone() -> Result<(), SqlPoolError> {
    let factory = MockFactory::new();
    let pool = build_pool(&factory, 3, 0).await;
    let lent = ready(pool.acquire(Duration::ZERO).await);

    assert_eq!(pool.refresh(true).await?, 2);
    assert_eq!(factory.closed(), 2);
    assert_eq!(pool.status().available, 3);

    pool.release(lent).await;
    assert_eq!(pool.status().idle, 3);
    Ok(())
}

#[tokio::test]
async fn refresh_stops_at_the_first_failed_open() {
    let factory = MockFactory::new();
    factory.set_down(true);
    let pool = build_pool(&factory, 4, 0).await;
    assert_eq!(factory.open_attempts(), 1, "initial refill gives up after one failure");
    assert_eq!(pool.status().available, 0);

    factory.set_down(false);
    factory.fail_next_opens(1);
    let err = pool.refresh(false).await.unwrap_err();
    assert!(matches!(err, SqlPoolError::OpenError(_)));
    assert_eq!(factory.open_attempts(), 2);
    assert_eq!(pool.status().available, 0, "a failed open gives its reservation back");

    assert_eq!(pool.refresh(false).await.unwrap(), 4);
    assert_eq!(pool.status().available, 4);
}

#[tokio::test]
async fn partial_refresh_keeps_what_it_opened() {
    let factory = MockFactory::new();
    factory.set_down(true);
    let pool = build_pool(&factory, 3, 0).await;
    factory.set_down(false);
    factory.fail_after(2);

    let err = pool.refresh(false).await.unwrap_err();
    assert!(matches!(err, SqlPoolError::OpenError(_)));
    assert_eq!(factory.opened(), 2);

    let status = pool.status();
    assert_eq!(status.available, 2);
    assert_eq!(status.idle, 2);
}

#[tokio::test]
async fn refresh_feeds_parked_callers_first() -> Result<(), SqlPoolError> {
    let factory = MockFactory::new();
    factory.set_down(true);
    let pool = build_pool(&factory, 1, 0).await;

    let waiter = tokio::spawn({
        let pool = pool.clone();
        async move { pool.acquire(Duration::ZERO).await }
    });
    wait_for_status(&pool, |s| s.waiting == 1).await;

    factory.set_down(false);
    assert_eq!(pool.refresh(false).await?, 1);
    let conn = ready(waiter.await.expect("waiter panicked"));
    assert_eq!(conn.id(), 0);

    let status = pool.status();
    assert_eq!(status.handoffs, 1);
    assert_eq!(status.idle, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_refreshes_never_overshoot() -> Result<(), SqlPoolError> {
    let factory = MockFactory::new();
    factory.set_down(true);
    let pool = build_pool(&factory, 3, 0).await;
    factory.set_down(false);
    factory.set_open_delay(Duration::from_millis(20));

    let (left, right) = tokio::join!(pool.refresh(false), pool.refresh(false));
    assert_eq!(left? + right?, 3);
    assert_eq!(factory.opened(), 3);
    assert_eq!(pool.status().available, 3);
    Ok(())
}

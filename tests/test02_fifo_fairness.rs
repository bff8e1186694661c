mod common;

use std::time::Duration;

use common::{build_pool, ready, wait_for_status};
use sql_pool::prelude::*;

#[tokio::test]
async fn first_waiter_gets_the_released_connection() -> Result<(), SqlPoolError> {
    let factory = MockFactory::new();
    let pool = build_pool(&factory, 1, 0).await;
    let held = ready(pool.acquire(Duration::ZERO).await);
    let held_id = held.id();

    let first = tokio::spawn({
        let pool = pool.clone();
        async move { pool.acquire(Duration::ZERO).await }
    });
    wait_for_status(&pool, |s| s.waiting == 1).await;

    let second = tokio::spawn({
        let pool = pool.clone();
        async move { pool.acquire(Duration::ZERO).await }
    });
    wait_for_status(&pool, |s| s.waiting == 2).await;

    pool.release(held).await;
    let got = ready(first.await.expect("first waiter panicked"));
    assert_eq!(got.id(), held_id);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!second.is_finished(), "second waiter must not be served yet");
    assert_eq!(pool.status().waiting, 1);

    pool.release(got).await;
    let got = ready(second.await.expect("second waiter panicked"));
    assert_eq!(got.id(), held_id);

    let status = pool.status();
    assert_eq!(status.handoffs, 2);
    assert_eq!(status.idle, 0);
    Ok(())
}

#[tokio::test]
async fn waiters_are_served_in_arrival_order() -> Result<(), SqlPoolError> {
    let factory = MockFactory::new();
    let pool = build_pool(&factory, 2, 0).await;
    let a = ready(pool.acquire(Duration::ZERO).await);
    let b = ready(pool.acquire(Duration::ZERO).await);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    for caller in 0..4 {
        let worker = pool.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let conn = ready(worker.acquire(Duration::ZERO).await);
            let _ = tx.send((caller, conn));
        });
        wait_for_status(&pool, |s| s.waiting == caller + 1).await;
    }

    pool.release(a).await;
    pool.release(b).await;
    let mut order = Vec::new();
    for _ in 0..2 {
        let (caller, conn) = rx.recv().await.expect("waiter finished");
        order.push(caller);
        pool.release(conn).await;
    }
    for _ in 0..2 {
        let (caller, conn) = rx.recv().await.expect("waiter finished");
        order.push(caller);
        drop(conn);
    }

    let (early, late) = order.split_at(2);
    assert!(early.iter().all(|caller| *caller < 2), "order was {order:?}");
    assert!(late.iter().all(|caller| *caller >= 2), "order was {order:?}");
    Ok(())
}

#[tokio::test]
async fn timed_out_waiter_is_skipped_for_the_next_one() -> Result<(), SqlPoolError> {
    let factory = MockFactory::new();
    let pool = build_pool(&factory, 1, 0).await;
    let held = ready(pool.acquire(Duration::ZERO).await);

    let impatient = tokio::spawn({
        let pool = pool.clone();
        async move { pool.acquire(Duration::from_millis(30)).await }
    });
    wait_for_status(&pool, |s| s.waiting == 1).await;
    let patient = tokio::spawn({
        let pool = pool.clone();
        async move { pool.acquire(Duration::ZERO).await }
    });
    wait_for_status(&pool, |s| s.waiting == 2).await;

    let outcome = impatient.await.expect("impatient waiter panicked")?;
    assert!(outcome.is_timed_out());
    assert_eq!(pool.status().waiting, 1);

    let held_id = held.id();
    pool.release(held).await;
    let got = ready(patient.await.expect("patient waiter panicked"));
    assert_eq!(got.id(), held_id);
    Ok(())
}

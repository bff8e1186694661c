#![allow(dead_code)]

use std::time::Duration;

use sql_pool::prelude::*;

pub const TARGET: &str = "mock://inventory";

pub async fn build_pool(factory: &MockFactory, max_size: usize, min_size: usize) -> Pool<MockFactory> {
    PoolOptions::builder("inventory", PoolTarget::new(TARGET).with_credentials("app", "secret"))
        .max_size(max_size)
        .min_size(min_size)
        .base_interval(Duration::from_millis(10))
        .backoff_step(Duration::from_millis(10))
        .max_interval(Duration::from_millis(40))
        .build(factory.clone())
        .await
        .expect("pool options are valid")
}

/// Poll the pool status until `check` passes, failing the test after two seconds.
pub async fn wait_for_status(pool: &Pool<MockFactory>, check: impl Fn(&PoolStatus) -> bool) -> PoolStatus {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let status = pool.status();
        if check(&status) {
            return status;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "pool never reached the expected state: {status:?}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub fn ready(outcome: Result<Acquired<PooledConnection<MockFactory>>, SqlPoolError>) -> PooledConnection<MockFactory> {
    match outcome {
        Ok(Acquired::Ready(conn)) => conn,
        Ok(Acquired::TimedOut { waited }) => panic!("acquire timed out after {waited:?}"),
        Err(err) => panic!("acquire failed: {err}"),
    }
}

//! Bounded pool of reusable database connections.
//!
//! Callers [`acquire`](Pool::acquire) a connection and [`release`](Pool::release) it when
//! done. When the pool is empty they queue up and are served first come, first served,
//! each one woken directly by the release that frees a connection. A background monitor
//! refills the pool when connections are retired and backs off while the database is down.
//!
//! The pool knows nothing about SQL or wire protocols: anything implementing
//! [`ConnectionFactory`] and [`Connection`] can be pooled.

pub mod config;
pub mod connection;
pub mod error;
pub mod pool;
pub mod prelude;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{MonitorOptions, PoolOptions, PoolOptionsBuilder, PoolTarget};
pub use connection::{Connection, ConnectionFactory};
pub use error::SqlPoolError;
pub use pool::{Acquired, Pool, PoolStatus, PooledConnection};

//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::config::{MonitorOptions, PoolOptions, PoolOptionsBuilder, PoolTarget};
pub use crate::connection::{Connection, ConnectionFactory};
pub use crate::error::SqlPoolError;
pub use crate::pool::{Acquired, Pool, PoolStatus, PooledConnection};

#[cfg(any(test, feature = "test-utils"))]
pub use crate::test_utils::{MockConnection, MockFactory};

//! The pool itself: acquire, release, refresh and shutdown.
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use sql_pool::prelude::*;
//!
//! let pool = PoolOptions::builder("orders", PoolTarget::new("postgres://db/orders").with_credentials("app", "secret"))
//!     .max_size(8)
//!     .min_size(2)
//!     .build(PgFactory)
//!     .await?;
//!
//! if let Acquired::Ready(conn) = pool.acquire(Duration::from_millis(250)).await? {
//!     // ... use conn ...
//!     pool.release(conn).await;
//! }
//! pool.close().await;
//! ```

mod monitor;
mod pooled;
mod shared;
mod state;
mod status;
mod wait_slot;

use std::sync::{Arc, PoisonError};
use std::time::Duration;

use crate::config::PoolOptions;
use crate::connection::ConnectionFactory;
use crate::error::SqlPoolError;

pub use pooled::PooledConnection;
pub use status::PoolStatus;

use shared::Shared;

/// Result of [`Pool::acquire`]: a connection, or the wait ran out.
#[derive(Debug)]
#[must_use]
pub enum Acquired<C> {
    Ready(C),
    /// No connection became available within the requested timeout.
    TimedOut { waited: Duration },
}

impl<C> Acquired<C> {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    #[must_use]
    pub fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    #[must_use]
    pub fn into_option(self) -> Option<C> {
        match self {
            Self::Ready(conn) => Some(conn),
            Self::TimedOut { .. } => None,
        }
    }

    /// Treat a timeout as an error.
    ///
    /// # Errors
    /// Returns [`SqlPoolError::AcquireTimeout`] for [`Acquired::TimedOut`].
    pub fn into_result(self) -> Result<C, SqlPoolError> {
        match self {
            Self::Ready(conn) => Ok(conn),
            Self::TimedOut { waited } => Err(SqlPoolError::AcquireTimeout(waited)),
        }
    }
}

/// A bounded pool of reusable connections.
///
/// Handles are cheap to clone and all share one pool. Callers that find the pool
/// empty queue up and are served strictly in arrival order; a background monitor
/// tops the pool back up whenever it falls below `min_size`, backing off while the
/// database is unreachable.
///
/// With `max_size == 0` the pool is a passthrough: `acquire` opens a fresh
/// connection every time and `release` closes it.
pub struct Pool<F: ConnectionFactory> {
    shared: Arc<Shared<F>>,
}

impl<F: ConnectionFactory> Clone for Pool<F> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<F: ConnectionFactory> std::fmt::Debug for Pool<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.shared.options.name)
            .field("max_size", &self.shared.options.max_size)
            .field("min_size", &self.shared.options.min_size)
            .finish_non_exhaustive()
    }
}

impl<F: ConnectionFactory> Pool<F> {
    /// Create a pool, fill it, and start its monitor.
    ///
    /// The initial refill runs before this returns. If the database is unreachable the
    /// pool still comes up, undersized, and the monitor keeps retrying in the background.
    ///
    /// # Errors
    /// Returns [`SqlPoolError::ConfigError`] if `options` fail validation.
    pub async fn new(options: PoolOptions, factory: F) -> Result<Self, SqlPoolError> {
        options.validate()?;
        let pool = Self {
            shared: Arc::new(Shared::new(options, factory)),
        };
        let opts = &pool.shared.options;

        if opts.is_pooled() {
            if let Err(err) = pool.shared.refresh(false).await {
                tracing::warn!(pool = %opts.name, error = %err, "initial refill incomplete, monitor will retry");
            }
            let handle = tokio::spawn(monitor::run(
                Arc::downgrade(&pool.shared),
                pool.shared.shutdown.clone(),
            ));
            *pool
                .shared
                .monitor
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        }

        tracing::info!(
            pool = %opts.name,
            max_size = opts.max_size,
            min_size = opts.min_size,
            available = pool.shared.lock_state().available(),
            "pool ready"
        );
        Ok(pool)
    }

    #[must_use]
    pub fn options(&self) -> &PoolOptions {
        &self.shared.options
    }

    /// Borrow a connection.
    ///
    /// Returns immediately with the most recently returned idle connection when one
    /// exists and nobody is queued. Otherwise waits, behind any earlier callers, for
    /// up to `timeout`; `Duration::ZERO` waits indefinitely. Dropping the returned
    /// future while it waits is safe and never loses a connection.
    ///
    /// # Errors
    /// Returns [`SqlPoolError::PoolClosed`] once the pool is closed, and in passthrough
    /// mode [`SqlPoolError::OpenError`] if a fresh connection cannot be opened.
    pub async fn acquire(&self, timeout: Duration) -> Result<Acquired<PooledConnection<F>>, SqlPoolError> {
        Ok(match self.shared.acquire(timeout).await? {
            Acquired::Ready(conn) => Acquired::Ready(PooledConnection::new(conn, &self.shared)),
            Acquired::TimedOut { waited } => Acquired::TimedOut { waited },
        })
    }

    /// Hand a connection back.
    ///
    /// Valid connections go to the longest-waiting caller, or back to the idle list.
    /// Invalid or closed connections are retired and the pool runs one short until the
    /// monitor refills it. Close failures are logged, never returned.
    ///
    /// A connection the borrower already closed is not closed again, but it still stops
    /// counting towards the pool. In passthrough mode every released connection is closed.
    pub async fn release(&self, conn: PooledConnection<F>) {
        if let Some(conn) = conn.into_conn() {
            self.shared.release(conn).await;
        }
    }

    /// Open connections until the pool holds `max_size`, optionally closing every
    /// idle connection first.
    ///
    /// Stops at the first connection that fails to open. Returns how many were opened.
    ///
    /// # Errors
    /// Returns the first [`SqlPoolError::OpenError`], or [`SqlPoolError::PoolClosed`].
    pub async fn refresh(&self, reset_all: bool) -> Result<usize, SqlPoolError> {
        self.shared.refresh(reset_all).await
    }

    /// Stop the monitor, close idle connections and turn away parked callers.
    ///
    /// Connections still on loan are closed as they are released.
    pub async fn close(&self) {
        self.shared.close().await;
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.lock_state().is_closed()
    }

    #[must_use]
    pub fn status(&self) -> PoolStatus {
        self.shared.status()
    }
}

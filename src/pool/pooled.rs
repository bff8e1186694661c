use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Weak};

use crate::connection::ConnectionFactory;

use super::shared::Shared;

/// A connection on loan from a [`Pool`](super::Pool).
///
/// Derefs to the underlying connection. Hand it back with
/// [`Pool::release`](super::Pool::release). If it is dropped instead (an early return,
/// a panicking task) it is released in the background on the current tokio runtime, so
/// the pool never loses track of it. Outside a runtime it is written off and the
/// monitor replaces it.
pub struct PooledConnection<F: ConnectionFactory> {
    conn: Option<F::Connection>,
    pool: Weak<Shared<F>>,
}

impl<F: ConnectionFactory> PooledConnection<F> {
    pub(super) fn new(conn: F::Connection, shared: &Arc<Shared<F>>) -> Self {
        Self {
            conn: Some(conn),
            pool: Arc::downgrade(shared),
        }
    }

    pub(super) fn into_conn(mut self) -> Option<F::Connection> {
        self.conn.take()
    }

    /// Take the connection out of the pool for good.
    ///
    /// The pool counts it as retired and the monitor opens a replacement if that
    /// leaves the pool below `min_size`. Closing the detached connection is up to the caller.
    #[must_use]
    pub fn detach(mut this: Self) -> F::Connection {
        let conn = this.conn.take();
        if let Some(shared) = this.pool.upgrade() {
            shared.forget_one();
        }
        // `conn` is only ever taken by value-consuming methods, so it is present here.
        match conn {
            Some(conn) => conn,
            None => unreachable!("pooled connection already taken"),
        }
    }
}

impl<F: ConnectionFactory> Deref for PooledConnection<F> {
    type Target = F::Connection;

    fn deref(&self) -> &F::Connection {
        match &self.conn {
            Some(conn) => conn,
            None => unreachable!("pooled connection already taken"),
        }
    }
}

impl<F: ConnectionFactory> DerefMut for PooledConnection<F> {
    fn deref_mut(&mut self) -> &mut F::Connection {
        match &mut self.conn {
            Some(conn) => conn,
            None => unreachable!("pooled connection already taken"),
        }
    }
}

impl<F: ConnectionFactory> fmt::Debug for PooledConnection<F>
where
    F::Connection: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection").field("conn", &self.conn).finish_non_exhaustive()
    }
}

impl<F: ConnectionFactory> Drop for PooledConnection<F> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        let Some(shared) = self.pool.upgrade() else {
            return;
        };
        tracing::debug!(pool = %shared.options.name, "connection dropped without release");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { shared.release(conn).await });
            }
            Err(_) => shared.forget_one(),
        }
    }
}

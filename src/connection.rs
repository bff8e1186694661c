use async_trait::async_trait;

use crate::config::PoolTarget;
use crate::error::SqlPoolError;

/// A live handle to a database, as seen by the pool.
///
/// The pool never looks inside a connection: it only asks whether the handle is
/// still usable and closes it when it is retired. Validity is allowed to change
/// at any time (a server restart, a dropped socket), so the pool re-checks it on
/// every release.
#[async_trait]
pub trait Connection: Send + 'static {
    /// Cheap liveness probe run when the connection is handed back.
    async fn is_valid(&mut self) -> bool;

    fn is_closed(&self) -> bool;

    /// Close the underlying resource.
    ///
    /// # Errors
    /// Returns [`SqlPoolError::CloseError`] if the backend refuses or fails the close. The pool
    /// logs and discards these; they never reach the caller of `release`.
    async fn close(&mut self) -> Result<(), SqlPoolError>;
}

/// Opens new connections against a [`PoolTarget`].
///
/// ```rust,ignore
/// struct PgFactory;
///
/// #[async_trait]
/// impl ConnectionFactory for PgFactory {
///     type Connection = PgConnection;
///
///     async fn open(&self, target: &PoolTarget) -> Result<PgConnection, SqlPoolError> {
///         PgConnection::connect(&target.url, &target.username, target.password())
///             .await
///             .map_err(|e| SqlPoolError::OpenError(e.to_string()))
///     }
/// }
/// ```
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    type Connection: Connection;

    /// # Errors
    /// Returns [`SqlPoolError::OpenError`] when the target cannot be reached or rejects the
    /// credentials.
    async fn open(&self, target: &PoolTarget) -> Result<Self::Connection, SqlPoolError>;
}

/// Close a connection that is leaving the pool for good, swallowing close failures.
pub(crate) async fn retire<C: Connection>(mut conn: C, pool: &str) {
    if conn.is_closed() {
        return;
    }
    if let Err(err) = conn.close().await {
        tracing::warn!(pool = %pool, error = %err, "ignoring failure while closing retired connection");
    }
}

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::PoolTarget;
use crate::connection::{Connection, ConnectionFactory};
use crate::error::SqlPoolError;

#[derive(Debug, Default)]
struct MockBackend {
    next_id: AtomicU64,
    open_attempts: AtomicU64,
    opened: AtomicU64,
    closed: AtomicU64,
    down: AtomicBool,
    failing_opens: AtomicU64,
    budgeted: AtomicBool,
    open_budget: AtomicU64,
    failing_closes: AtomicBool,
    open_delay_ms: AtomicU64,
    panic_next_open: AtomicBool,
}

/// Factory for [`MockConnection`]s. Clones share the same backend, so a test can keep
/// one handle to flip failures on and off while the pool owns another.
#[derive(Debug, Clone, Default)]
pub struct MockFactory {
    backend: Arc<MockBackend>,
}

impl MockFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// While down, every open fails.
    pub fn set_down(&self, down: bool) {
        self.backend.down.store(down, Ordering::SeqCst);
    }

    /// Fail the next `count` opens, then recover.
    pub fn fail_next_opens(&self, count: u64) {
        self.backend.failing_opens.store(count, Ordering::SeqCst);
    }

    /// Let `count` more opens succeed, then fail every open after that.
    pub fn fail_after(&self, count: u64) {
        self.backend.open_budget.store(count, Ordering::SeqCst);
        self.backend.budgeted.store(true, Ordering::SeqCst);
    }

    pub fn set_close_failures(&self, fail: bool) {
        self.backend.failing_closes.store(fail, Ordering::SeqCst);
    }

    pub fn set_open_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.backend.open_delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Make the next open panic instead of returning.
    pub fn panic_on_next_open(&self) {
        self.backend.panic_next_open.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn open_attempts(&self) -> u64 {
        self.backend.open_attempts.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn opened(&self) -> u64 {
        self.backend.opened.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn closed(&self) -> u64 {
        self.backend.closed.load(Ordering::SeqCst)
    }

    /// Opened and not yet closed.
    #[must_use]
    pub fn live(&self) -> u64 {
        self.opened().saturating_sub(self.closed())
    }

    fn take_scripted_failure(&self) -> bool {
        self.backend
            .failing_opens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }

    fn budget_exhausted(&self) -> bool {
        self.backend.budgeted.load(Ordering::SeqCst)
            && self
                .backend
                .open_budget
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_err()
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    type Connection = MockConnection;

    async fn open(&self, target: &PoolTarget) -> Result<MockConnection, SqlPoolError> {
        let backend = &self.backend;
        backend.open_attempts.fetch_add(1, Ordering::SeqCst);

        let delay = backend.open_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if backend.panic_next_open.swap(false, Ordering::SeqCst) {
            panic!("mock backend crashed while opening {}", target.url);
        }
        if backend.down.load(Ordering::SeqCst) || self.take_scripted_failure() || self.budget_exhausted() {
            return Err(SqlPoolError::OpenError(format!("{} is unreachable", target.url)));
        }

        let id = backend.next_id.fetch_add(1, Ordering::SeqCst);
        backend.opened.fetch_add(1, Ordering::SeqCst);
        Ok(MockConnection {
            id,
            valid: true,
            closed: false,
            backend: Arc::clone(backend),
        })
    }
}

/// In-memory stand-in for a database connection.
#[derive(Debug)]
pub struct MockConnection {
    id: u64,
    valid: bool,
    closed: bool,
    backend: Arc<MockBackend>,
}

impl MockConnection {
    /// Unique per factory, in open order starting at 0.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Make the next validity check fail, as if the server dropped the session.
    pub fn invalidate(&mut self) {
        self.valid = false;
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn is_valid(&mut self) -> bool {
        self.valid && !self.closed
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    async fn close(&mut self) -> Result<(), SqlPoolError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.backend.closed.fetch_add(1, Ordering::SeqCst);
        if self.backend.failing_closes.load(Ordering::SeqCst) {
            return Err(SqlPoolError::CloseError(format!("connection {} reset by peer", self.id)));
        }
        Ok(())
    }
}

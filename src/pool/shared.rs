use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::PoolOptions;
use crate::connection::{Connection, ConnectionFactory, retire};
use crate::error::SqlPoolError;

use super::Acquired;
use super::state::{Placement, PoolState};
use super::status::PoolStatus;
use super::wait_slot::WaitTicket;

type Conn<F> = <F as ConnectionFactory>::Connection;

/// State shared by every `Pool` handle and the monitor task.
pub(crate) struct Shared<F: ConnectionFactory> {
    pub(crate) options: PoolOptions,
    factory: F,
    state: Mutex<PoolState<Conn<F>>>,
    pub(crate) shutdown: CancellationToken,
    pub(crate) monitor: Mutex<Option<JoinHandle<()>>>,
}

impl<F: ConnectionFactory> Shared<F> {
    pub(crate) fn new(options: PoolOptions, factory: F) -> Self {
        let state = PoolState::new(options.max_size);
        Self {
            options,
            factory,
            state: Mutex::new(state),
            shutdown: CancellationToken::new(),
            monitor: Mutex::new(None),
        }
    }

    fn name(&self) -> &str {
        &self.options.name
    }

    // Nothing panics while the lock is held, so a poisoned guard still sees consistent state.
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, PoolState<Conn<F>>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn closed_error(&self) -> SqlPoolError {
        SqlPoolError::PoolClosed(format!("pool '{}' has been closed", self.name()))
    }

    pub(crate) async fn acquire(&self, timeout: Duration) -> Result<Acquired<Conn<F>>, SqlPoolError> {
        if !self.options.is_pooled() {
            if self.lock_state().is_closed() {
                return Err(self.closed_error());
            }
            let conn = self.factory.open(&self.options.target).await?;
            return Ok(Acquired::Ready(conn));
        }

        let ticket = {
            let mut state = self.lock_state();
            if state.is_closed() {
                return Err(self.closed_error());
            }
            if let Some(conn) = state.take_idle() {
                return Ok(Acquired::Ready(conn));
            }
            state.enqueue()
        };

        tracing::trace!(pool = %self.name(), slot = ticket.id, "parked waiting for a connection");
        let mut pending = PendingWait {
            shared: self,
            ticket: Some(ticket),
        };
        let received = pending.wait(timeout).await;
        let late = pending.deregister();

        match (received, late) {
            (Received::Conn(conn), _) | (_, Some(conn)) => Ok(Acquired::Ready(conn)),
            (Received::Closed, None) => Err(self.closed_error()),
            (Received::Elapsed, None) => {
                self.lock_state().record_timeout();
                tracing::debug!(pool = %self.name(), ?timeout, "timed out waiting for a connection");
                Ok(Acquired::TimedOut { waited: timeout })
            }
        }
    }

    pub(crate) async fn release(&self, mut conn: Conn<F>) {
        let pooled = self.options.is_pooled();

        if conn.is_closed() {
            if pooled {
                self.lock_state().forget_one();
                tracing::debug!(pool = %self.name(), "dropping connection that was closed by its borrower");
            }
            return;
        }

        if !conn.is_valid().await {
            tracing::debug!(pool = %self.name(), "retiring connection that failed validation");
            retire(conn, self.name()).await;
            if pooled {
                self.lock_state().forget_one();
            }
            return;
        }

        if !pooled {
            retire(conn, self.name()).await;
            return;
        }

        if let Err(conn) = self.distribute(conn) {
            self.lock_state().forget_one();
            retire(conn, self.name()).await;
        }
    }

    /// Write off a lent connection that will never come back.
    pub(crate) fn forget_one(&self) {
        if self.options.is_pooled() {
            self.lock_state().forget_one();
        }
    }

    /// Route a connection to the oldest parked caller, or the idle list.
    ///
    /// Hands the connection back if the pool has been closed.
    pub(crate) fn distribute(&self, conn: Conn<F>) -> Result<Placement, Conn<F>> {
        let placement = self.lock_state().distribute(conn)?;
        if let Placement::Handoff { slot, waited } = placement {
            tracing::trace!(pool = %self.name(), slot, ?waited, "handed connection to waiting caller");
        }
        Ok(placement)
    }

    pub(crate) async fn refresh(&self, reset_all: bool) -> Result<usize, SqlPoolError> {
        if !self.options.is_pooled() {
            if self.lock_state().is_closed() {
                return Err(self.closed_error());
            }
            return Ok(0);
        }

        if reset_all {
            let drained = {
                let mut state = self.lock_state();
                if state.is_closed() {
                    return Err(self.closed_error());
                }
                state.drain_idle()
            };
            tracing::info!(pool = %self.name(), count = drained.len(), "closing idle connections for reset");
            for conn in drained {
                retire(conn, self.name()).await;
            }
        }

        let mut opened = 0;
        loop {
            let reservation = {
                let mut state = self.lock_state();
                if state.is_closed() {
                    return Err(self.closed_error());
                }
                if !state.reserve(self.options.max_size) {
                    break;
                }
                Reservation {
                    shared: self,
                    armed: true,
                }
            };

            // Stop at the first failed open; the monitor retries later.
            let conn = match self.factory.open(&self.options.target).await {
                Ok(conn) => conn,
                Err(err) => {
                    tracing::warn!(pool = %self.name(), error = %err, opened, "refresh stopped: could not open connection");
                    return Err(err);
                }
            };

            self.lock_state().record_opened();
            match self.distribute(conn) {
                Ok(_) => reservation.commit(),
                Err(conn) => {
                    drop(reservation);
                    retire(conn, self.name()).await;
                    return Err(self.closed_error());
                }
            }
            opened += 1;
        }

        if opened > 0 {
            tracing::debug!(pool = %self.name(), opened, "refresh opened connections");
        }
        Ok(opened)
    }

    pub(crate) async fn close(&self) {
        self.shutdown.cancel();
        let monitor = self
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = monitor {
            if let Err(err) = handle.await {
                tracing::warn!(pool = %self.name(), error = %err, "monitor task ended abnormally");
            }
        }

        let drained = {
            let mut state = self.lock_state();
            if state.is_closed() {
                return;
            }
            state.close()
        };
        let count = drained.len();
        for conn in drained {
            retire(conn, self.name()).await;
        }
        tracing::info!(pool = %self.name(), closed_idle = count, "pool closed");
    }

    pub(crate) fn status(&self) -> PoolStatus {
        let state = self.lock_state();
        let counters = state.counters();
        PoolStatus {
            name: self.options.name.clone(),
            max_size: self.options.max_size,
            min_size: self.options.min_size,
            available: state.available(),
            idle: state.idle_len(),
            waiting: state.waiting_len(),
            in_use: state.available().saturating_sub(state.idle_len()),
            opened: counters.opened,
            retired: counters.retired,
            timeouts: counters.timeouts,
            handoffs: counters.handoffs,
            captured_at: Utc::now(),
        }
    }
}

impl<F: ConnectionFactory> Drop for Shared<F> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

enum Received<C> {
    Conn(C),
    Closed,
    Elapsed,
}

/// A caller parked in the wait queue.
///
/// Dropping it before `deregister` (the acquire future was cancelled) still pulls the
/// slot out of the queue and puts back any connection that raced in.
struct PendingWait<'a, F: ConnectionFactory> {
    shared: &'a Shared<F>,
    ticket: Option<WaitTicket<Conn<F>>>,
}

impl<F: ConnectionFactory> PendingWait<'_, F> {
    async fn wait(&mut self, timeout: Duration) -> Received<Conn<F>> {
        let Some(ticket) = self.ticket.as_mut() else {
            return Received::Closed;
        };
        let outcome = if timeout.is_zero() {
            Ok((&mut ticket.receiver).await)
        } else {
            tokio::time::timeout(timeout, &mut ticket.receiver).await
        };
        match outcome {
            Ok(Ok(conn)) => Received::Conn(conn),
            Ok(Err(_)) => Received::Closed,
            Err(_) => Received::Elapsed,
        }
    }

    /// Leave the queue and collect a connection that was assigned after the wait ended.
    fn deregister(&mut self) -> Option<Conn<F>> {
        let mut ticket = self.ticket.take()?;
        self.shared.lock_state().remove_waiter(ticket.id);
        // Only `distribute` sends, and only under the lock, so after removal the channel is final.
        ticket.receiver.close();
        ticket.receiver.try_recv().ok()
    }
}

impl<F: ConnectionFactory> Drop for PendingWait<'_, F> {
    fn drop(&mut self) {
        let Some(mut ticket) = self.ticket.take() else {
            return;
        };
        let mut state = self.shared.lock_state();
        state.remove_waiter(ticket.id);
        ticket.receiver.close();
        if let Ok(conn) = ticket.receiver.try_recv() {
            if state.distribute(conn).is_err() {
                state.forget_one();
                tracing::warn!(pool = %self.shared.name(), "dropped connection assigned to a cancelled caller after close");
            }
        }
    }
}

/// Capacity claimed in `available` for a connection that is still being opened.
struct Reservation<'a, F: ConnectionFactory> {
    shared: &'a Shared<F>,
    armed: bool,
}

impl<F: ConnectionFactory> Reservation<'_, F> {
    fn commit(mut self) {
        self.armed = false;
    }
}

impl<F: ConnectionFactory> Drop for Reservation<'_, F> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.lock_state().unreserve();
        }
    }
}

//! Pool bookkeeping guarded by the pool-wide mutex.

use std::collections::VecDeque;
use std::time::Duration;

use super::wait_slot::{WaitSlot, WaitTicket, wait_slot};

/// Upper bound on the idle list allocated up front; `max_size` comes from user config.
const IDLE_PREALLOC: usize = 64;

/// Where a distributed connection ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Placement {
    /// Handed to the parked caller holding slot `slot`, after it had waited `waited`.
    Handoff { slot: u64, waited: Duration },
    /// Nobody could take it, so it went to the head of the idle list.
    Idle,
}

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Counters {
    pub(crate) opened: u64,
    pub(crate) retired: u64,
    pub(crate) timeouts: u64,
    pub(crate) handoffs: u64,
}

pub(crate) struct PoolState<C> {
    /// Idle connections; the end of the vec is the most recently returned.
    idle: Vec<C>,
    /// Parked callers, oldest first.
    waiting: VecDeque<WaitSlot<C>>,
    /// Connections owned by the pool: idle, lent out, or being opened.
    available: usize,
    next_slot_id: u64,
    closed: bool,
    counters: Counters,
}

impl<C> PoolState<C> {
    pub(crate) fn new(max_size: usize) -> Self {
        Self {
            idle: Vec::with_capacity(max_size.min(IDLE_PREALLOC)),
            waiting: VecDeque::new(),
            available: 0,
            next_slot_id: 0,
            closed: false,
            counters: Counters::default(),
        }
    }

    pub(crate) fn available(&self) -> usize {
        self.available
    }

    pub(crate) fn idle_len(&self) -> usize {
        self.idle.len()
    }

    pub(crate) fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn counters(&self) -> Counters {
        self.counters
    }

    /// Pop the warmest idle connection, but only when nobody is queued ahead of the caller.
    pub(crate) fn take_idle(&mut self) -> Option<C> {
        if self.waiting.is_empty() {
            self.idle.pop()
        } else {
            None
        }
    }

    /// Park a new caller at the back of the queue.
    pub(crate) fn enqueue(&mut self) -> WaitTicket<C> {
        let id = self.next_slot_id;
        self.next_slot_id = self.next_slot_id.wrapping_add(1);
        let (slot, ticket) = wait_slot(id);
        self.waiting.push_back(slot);
        ticket
    }

    /// Remove a caller's slot from the queue, wherever it is.
    ///
    /// Returns false if `distribute` already popped it.
    pub(crate) fn remove_waiter(&mut self, id: u64) -> bool {
        // Timed-out callers are usually near the front.
        match self.waiting.iter().position(|slot| slot.id() == id) {
            Some(index) => {
                self.waiting.remove(index);
                true
            }
            None => false,
        }
    }

    /// Give `conn` to the longest-waiting caller that still accepts it, else idle it.
    ///
    /// Slots whose caller stopped waiting are dropped on the way. Hands the
    /// connection back once the pool is closed.
    pub(crate) fn distribute(&mut self, mut conn: C) -> Result<Placement, C> {
        if self.closed {
            return Err(conn);
        }

        while let Some(slot) = self.waiting.pop_front() {
            if !slot.is_waiting() {
                continue;
            }
            let id = slot.id();
            let waited = slot.enqueued_at().elapsed();
            match slot.assign(conn) {
                Ok(()) => {
                    self.counters.handoffs += 1;
                    return Ok(Placement::Handoff { slot: id, waited });
                }
                Err(refused) => conn = refused,
            }
        }

        self.idle.push(conn);
        Ok(Placement::Idle)
    }

    /// Claim room for one more connection. False once the pool is full.
    pub(crate) fn reserve(&mut self, max_size: usize) -> bool {
        if self.available < max_size {
            self.available += 1;
            true
        } else {
            false
        }
    }

    /// Give back a reservation whose connection never materialized.
    pub(crate) fn unreserve(&mut self) {
        self.available = self.available.saturating_sub(1);
    }

    pub(crate) fn record_opened(&mut self) {
        self.counters.opened += 1;
    }

    pub(crate) fn record_timeout(&mut self) {
        self.counters.timeouts += 1;
    }

    /// A connection the pool owned is gone for good.
    pub(crate) fn forget_one(&mut self) {
        self.available = self.available.saturating_sub(1);
        self.counters.retired += 1;
    }

    /// Take every idle connection out of the pool so it can be closed.
    pub(crate) fn drain_idle(&mut self) -> Vec<C> {
        let drained: Vec<C> = self.idle.drain(..).collect();
        self.available = self.available.saturating_sub(drained.len());
        self.counters.retired += drained.len() as u64;
        drained
    }

    /// Mark the pool closed, wake every parked caller, and hand back the idle set.
    pub(crate) fn close(&mut self) -> Vec<C> {
        self.closed = true;
        // Dropping the slots drops their senders, which wakes the receivers with an error.
        self.waiting.clear();
        self.drain_idle()
    }
}

//! One-shot rendezvous between a parked `acquire` call and the `distribute` call that feeds it.

use tokio::sync::oneshot;
use tokio::time::Instant;

/// Queue-side half of a waiting caller.
///
/// Owned by the pool's wait queue. Assigning consumes the slot, so a slot can be
/// satisfied at most once.
pub(crate) struct WaitSlot<C> {
    id: u64,
    enqueued_at: Instant,
    sender: oneshot::Sender<C>,
}

/// Caller-side half: the parked `acquire` call awaits this.
pub(crate) struct WaitTicket<C> {
    pub(crate) id: u64,
    pub(crate) receiver: oneshot::Receiver<C>,
}

pub(crate) fn wait_slot<C>(id: u64) -> (WaitSlot<C>, WaitTicket<C>) {
    let (sender, receiver) = oneshot::channel();
    (
        WaitSlot {
            id,
            enqueued_at: Instant::now(),
            sender,
        },
        WaitTicket { id, receiver },
    )
}

impl<C> WaitSlot<C> {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn enqueued_at(&self) -> Instant {
        self.enqueued_at
    }

    /// The caller is still parked on the other half.
    pub(crate) fn is_waiting(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Hand `conn` to the parked caller and wake it.
    ///
    /// Gives the connection back if the caller has already stopped waiting.
    pub(crate) fn assign(self, conn: C) -> Result<(), C> {
        self.sender.send(conn)
    }
}

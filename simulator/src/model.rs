use std::collections::HashSet;

use sql_pool::prelude::{MockFactory, PooledConnection};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Op {
    Acquire,
    /// Return the held connection untouched.
    Release,
    /// Mark the held connection broken, then return it.
    Invalidate,
    /// Close the held connection, then return it.
    CloseAndRelease,
    /// Drop the held connection without returning it.
    Abandon,
    Refresh { reset_all: bool },
    /// Take the database down for this many steps.
    Outage { steps: u64 },
    Sleep(u64),
}

impl Op {
    pub(crate) fn label(&self) -> String {
        match self {
            Op::Acquire => "acquire".to_string(),
            Op::Release => "release".to_string(),
            Op::Invalidate => "invalidate".to_string(),
            Op::CloseAndRelease => "close+release".to_string(),
            Op::Abandon => "abandon".to_string(),
            Op::Refresh { reset_all } => format!("refresh(reset_all={reset_all})"),
            Op::Outage { steps } => format!("outage({steps} steps)"),
            Op::Sleep(ms) => format!("sleep({ms}ms)"),
        }
    }
}

#[derive(Debug)]
pub(crate) struct TaskState {
    pub(crate) id: usize,
    pub(crate) conn: Option<PooledConnection<MockFactory>>,
}

impl TaskState {
    pub(crate) fn conn_id(&self) -> Option<u64> {
        self.conn.as_ref().map(|conn| conn.id())
    }
}

/// What the simulator knows independently of the pool.
#[derive(Debug, Default)]
pub(crate) struct Model {
    /// Connections a borrower broke or closed; none may ever be lent again.
    pub(crate) retired: HashSet<u64>,
    /// Step at which the current outage ends.
    pub(crate) outage_until: Option<u64>,
    pub(crate) handed_out: u64,
    pub(crate) timeouts: u64,
}
